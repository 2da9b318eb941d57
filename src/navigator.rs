//! Navigation engine.
//!
//! An [`AppGraph`] couples a validated [`GraphDefinition`] with the driver of
//! one device and keeps track of which state the UI is believed to be in.
//! Every navigating call takes `&mut self`; one graph serves one caller.

use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::config::GraphConfig;
use crate::driver::{AppiumDriver, UiDriver};
use crate::error::{Error, Result};
use crate::graph::{Context, GraphDefinition, State, StateId, Target};
use crate::popup::{builtin_popups, PopupHandler};

/// Nested realignments allowed while validating a single hop.
const MAX_RECOVERY_DEPTH: usize = 3;

pub struct AppGraph<D: UiDriver> {
    pub(crate) definition: Arc<GraphDefinition>,
    pub(crate) driver: D,
    pub(crate) config: GraphConfig,
    pub(crate) current: StateId,
    pub(crate) try_restart: bool,
    pub(crate) popups: Vec<PopupHandler>,
}

impl AppGraph<AppiumDriver> {
    /// Open an Appium session for `app_package` on `device_id` and bring the
    /// app to the foreground. The graph starts out in its initial state.
    pub fn connect(
        definition: Arc<GraphDefinition>,
        device_id: &str,
        app_package: &str,
        config: &GraphConfig,
    ) -> Result<Self> {
        let driver = AppiumDriver::connect(config, device_id, app_package)?;
        driver.activate_app()?;
        info!(
            "[Nav] {}: connected '{}' ({})",
            device_id,
            definition.name(),
            app_package
        );
        Ok(Self::new(definition, driver, config.clone()))
    }
}

impl<D: UiDriver> AppGraph<D> {
    pub fn new(definition: Arc<GraphDefinition>, driver: D, config: GraphConfig) -> Self {
        let popups = if config.builtin_popups { builtin_popups() } else { Vec::new() };
        Self {
            current: definition.initial_state(),
            definition,
            driver,
            config,
            try_restart: true,
            popups,
        }
    }

    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        self.driver.device_id()
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn current_state_name(&self) -> &str {
        self.definition.state(self.current).name()
    }

    /// Whether the one app restart of the current recovery episode is left.
    pub fn try_restart(&self) -> bool {
        self.try_restart
    }

    pub fn add_popup_handler(&mut self, handler: PopupHandler) {
        self.popups.push(handler);
    }

    pub fn popup_handlers(&self) -> &[PopupHandler] {
        &self.popups
    }

    /// Drive the UI from the believed current state to `target`.
    ///
    /// `context` is handed to every transition action and context validator
    /// on the way. Click failures trigger recovery and the walk continues;
    /// after `2 * |states| + 5` hops the graph gives up with
    /// [`Error::Unrecoverable`].
    pub fn go_to_state<'t>(&mut self, target: impl Into<Target<'t>>, context: &Context) -> Result<()> {
        let graph = Arc::clone(&self.definition);
        let target_ref = target.into();
        let target = graph
            .resolve(&target_ref)
            .ok_or_else(|| Error::UnknownState(target_ref.to_string()))?;

        // time may have passed since the last call; make sure we are where we think
        if let Err(e) = self.validate_state(self.current, context) {
            if !e.is_recoverable() {
                return Err(e);
            }
            warn!("[Nav] {}: initial state validation encountered a problem: {}", self.device_id(), e);
        }

        let max_hops = graph.max_hops();
        let mut hops = 0;
        while self.current != target {
            if hops >= max_hops {
                let err = Error::Unrecoverable {
                    target: graph.state(target).name().to_string(),
                    hops,
                };
                error!("[Nav] {}: {}", self.device_id(), err);
                return Err(err);
            }
            hops += 1;

            let path = graph
                .find_shortest_path(self.current, Target::Id(target))
                .ok_or_else(|| Error::NoPath {
                    from: graph.state(self.current).name().to_string(),
                    to: graph.state(target).name().to_string(),
                })?;
            let Some(hop) = path.first().copied() else {
                break;
            };
            info!(
                "[Nav] {}: {} -> {}",
                self.device_id(),
                graph.state(hop.from()),
                graph.state(hop.to())
            );

            let result = hop
                .run(&self.driver, context)
                .map_err(Error::from)
                .and_then(|_| self.validate_state(hop.to(), context));
            match result {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("[Nav] {}: transition or state validation failed: {}", self.device_id(), e);
                    if let Err(e) = self.recover_state(hop.to()) {
                        if !e.is_recoverable() {
                            return Err(e);
                        }
                        warn!("[Nav] {}: recovery hit a UI problem: {}", self.device_id(), e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        debug!("[Nav] {}: in '{}' after {} hop(s)", self.device_id(), graph.state(target), hops);
        Ok(())
    }

    /// Check that the UI shows `expected` and update the believed state.
    ///
    /// A screen that does not match at all goes through recovery. A screen of
    /// the right kind showing the wrong content backs out to its parent; the
    /// caller's loop then re-plans toward its goal.
    pub(crate) fn validate_state(&mut self, expected: StateId, context: &Context) -> Result<()> {
        self.validate_state_at(expected, context, 0)
    }

    fn validate_state_at(&mut self, expected: StateId, context: &Context, depth: usize) -> Result<()> {
        let graph = Arc::clone(&self.definition);
        let state = graph.state(expected);

        if !self.probe(state)? {
            if depth >= MAX_RECOVERY_DEPTH {
                return Err(Error::UnknownUiState {
                    expected: state.name().to_string(),
                });
            }
            warn!("[Nav] {}: UI does not show '{}', recovering", self.device_id(), state);
            self.recover_state(expected)?;
            return self.validate_state_at(self.current, context, depth + 1);
        }

        if !self.probe_context(state, context)? {
            let Some(parent) = state.parent_id() else {
                self.current = expected;
                return Ok(());
            };
            info!(
                "[Nav] {}: '{}' shows the wrong content ({}), backing out to '{}'",
                self.device_id(),
                state,
                context,
                graph.state(parent)
            );
            self.current = expected;
            if let Some(back) = graph.transition_between(expected, parent) {
                back.run(&self.driver, context)?;
            }
            return self.validate_state_at(parent, context, depth + 1);
        }

        self.current = expected;
        Ok(())
    }

    /// Validator result with click failures read as "not showing".
    pub(crate) fn probe(&self, state: &State) -> Result<bool> {
        match state.validate(&self.driver) {
            Ok(valid) => Ok(valid),
            Err(e) if e.is_click_failure() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn probe_context(&self, state: &State, context: &Context) -> Result<bool> {
        match state.validate_context(&self.driver, context) {
            Ok(valid) => Ok(valid),
            Err(e) if e.is_click_failure() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{compose_clicks, keys, GraphBuilder};
    use crate::testing::*;

    fn bob() -> Context {
        Context::new().with(keys::CONVERSATION, "Bob")
    }

    fn messaging_graph(driver: MockDriver) -> (AppGraph<MockDriver>, Messaging) {
        let app = messaging();
        let graph = AppGraph::new(Arc::clone(&app.graph), driver, test_config());
        (graph, app)
    }

    #[test]
    fn test_already_there_does_nothing() {
        let driver = MockDriver::new();
        driver.show(&[CONVERSATIONS]);
        let (mut graph, app) = messaging_graph(driver);

        graph.go_to_state(app.conversations, &Context::new()).unwrap();
        assert!(graph.driver().actions().is_empty());
        assert_eq!(graph.current_state(), app.conversations);
    }

    #[test]
    fn test_unknown_target_is_rejected_without_ui_work() {
        let driver = MockDriver::new();
        driver.show(&[CONVERSATIONS]);
        let (mut graph, _) = messaging_graph(driver);

        let err = graph.go_to_state("archive", &Context::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownState(ref name) if name == "archive"));
        assert!(graph.driver().actions().is_empty());
        assert_eq!(graph.driver().presence_checks(CONVERSATIONS), 0);
    }

    #[test]
    fn test_walks_path_and_uses_derived_back() {
        let bob_row = row("Bob");
        let driver = MockDriver::new();
        driver.show(&[CONVERSATIONS, OPEN_SETTINGS, bob_row.as_str()]);
        driver.on(&format!("click:{}", OPEN_SETTINGS), &[SETTINGS]);
        driver.on_text(&format!("click:{}", bob_row), &[CHAT, CHAT_HEADER], CHAT_HEADER, "Bob");
        let (mut graph, app) = messaging_graph(driver);

        graph.go_to_state("settings", &Context::new()).unwrap();
        assert_eq!(graph.current_state(), app.settings);
        assert_eq!(graph.current_state_name(), "settings");

        // settings -> conversations -> chat
        graph.driver().on("keycode:4", &[CONVERSATIONS, bob_row.as_str()]);
        graph.go_to_state(app.chat, &bob()).unwrap();
        assert_eq!(graph.current_state(), app.chat);
        assert_eq!(
            graph.driver().actions(),
            vec![
                format!("click:{}", OPEN_SETTINGS),
                "keycode:4".to_string(),
                format!("click:{}", row("Bob")),
            ]
        );
    }

    #[test]
    fn test_hop_cap_stops_a_target_that_never_validates() {
        let mut b = GraphBuilder::new("broken");
        let main = b.state(State::simple("main", &["//main"]).initial());
        let never = b.state(State::new("never", |_| Ok(false)).parent(main));
        b.transition(main, never, compose_clicks(&["//open"]));
        let definition = b.build().unwrap();

        let driver = MockDriver::new();
        driver.show(&["//main", "//open"]);
        let mut graph = AppGraph::new(definition, driver, test_config());

        let err = graph.go_to_state(never, &Context::new()).unwrap_err();
        assert!(matches!(err, Error::Unrecoverable { hops: 9, .. }), "{:?}", err);
        assert_eq!(graph.driver().actions().len(), 9);
        assert_eq!(graph.current_state(), main);
    }

    #[test]
    fn test_wrong_conversation_backs_out_and_retries() {
        let bob_row = row("Bob");
        let driver = MockDriver::new();
        driver.show(&[CONVERSATIONS, bob_row.as_str()]);
        // first tap lands in Alice's chat, the second in Bob's
        driver.on_text(&format!("click:{}", row("Bob")), &[CHAT, CHAT_HEADER], CHAT_HEADER, "Alice");
        driver.on_text(&format!("click:{}", row("Bob")), &[CHAT, CHAT_HEADER], CHAT_HEADER, "Bob");
        driver.on("keycode:4", &[CONVERSATIONS, bob_row.as_str()]);
        let (mut graph, app) = messaging_graph(driver);

        graph.go_to_state(app.chat, &bob()).unwrap();
        assert_eq!(graph.current_state(), app.chat);
        assert_eq!(
            graph.driver().actions(),
            vec![
                format!("click:{}", row("Bob")),
                "keycode:4".to_string(),
                format!("click:{}", row("Bob")),
            ]
        );
    }

    #[test]
    fn test_precheck_notices_the_wrong_conversation() {
        let bob_row = row("Bob");
        let driver = MockDriver::new();
        driver.show(&[CHAT, CHAT_HEADER]);
        driver.set_text(CHAT_HEADER, "Alice");
        driver.on("keycode:4", &[CONVERSATIONS, bob_row.as_str()]);
        driver.on_text(&format!("click:{}", row("Bob")), &[CHAT, CHAT_HEADER], CHAT_HEADER, "Bob");
        let (mut graph, app) = messaging_graph(driver);
        graph.current = app.chat;

        graph.go_to_state(app.chat, &bob()).unwrap();
        assert_eq!(graph.current_state(), app.chat);
        assert_eq!(
            graph.driver().actions(),
            vec!["keycode:4".to_string(), format!("click:{}", row("Bob"))]
        );
    }

    #[test]
    fn test_failed_precheck_back_out_is_logged_and_navigation_continues() {
        let bob_row = row("Bob");
        let driver = MockDriver::new();
        // believed in chat, which shows Alice instead of Bob
        driver.show(&[CHAT, CHAT_HEADER]);
        driver.set_text(CHAT_HEADER, "Alice");
        driver.fail_next("keycode:4", 1);
        driver.on("keycode:4", &[CONVERSATIONS, OPEN_SETTINGS, bob_row.as_str()]);
        driver.on(&format!("click:{}", OPEN_SETTINGS), &[SETTINGS]);
        let (mut graph, app) = messaging_graph(driver);
        graph.current = app.chat;

        let (result, logs) = capture_logs(|| graph.go_to_state(app.settings, &bob()));
        result.unwrap();
        assert_eq!(graph.current_state(), app.settings);
        assert_eq!(
            graph.driver().actions(),
            vec!["keycode:4".to_string(), format!("click:{}", OPEN_SETTINGS)]
        );
        assert!(
            logs.iter().any(|line| line.level == log::Level::Warn
                && line.message.contains("initial state validation encountered a problem")),
            "{:?}",
            logs
        );
    }

    #[test]
    fn test_fatal_precheck_error_is_returned() {
        let mut b = GraphBuilder::new("session_lost");
        let main = b.state(
            State::new("main", |_| Err(crate::error::DriverError::Session("invalid session id".into()))).initial(),
        );
        let other = b.state(State::simple("other", &["//other"]).parent(main));
        b.transition(main, other, compose_clicks(&["//open"]));
        let definition = b.build().unwrap();

        let driver = MockDriver::new();
        driver.show(&["//open"]);
        let mut graph = AppGraph::new(definition, driver, test_config());

        let err = graph.go_to_state(other, &Context::new()).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(err, Error::Driver(crate::error::DriverError::Session(_))), "{:?}", err);
        assert!(graph.driver().actions().is_empty());
        assert_eq!(graph.current_state(), main);
    }

    #[test]
    fn test_state_of_another_graph_is_rejected_without_ui_work() {
        let driver = MockDriver::new();
        driver.show(&[CONVERSATIONS, OPEN_SETTINGS]);
        let (mut graph, _) = messaging_graph(driver);
        let other = messaging();

        let err = graph.go_to_state(other.settings, &Context::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownState(_)), "{:?}", err);
        assert!(graph.driver().actions().is_empty());
        assert_eq!(graph.driver().presence_checks(CONVERSATIONS), 0);
    }

    #[test]
    fn test_failed_hop_recovers_and_continues() {
        let driver = MockDriver::new();
        driver.show(&[CONVERSATIONS, OPEN_SETTINGS]);
        driver.fail_next(&format!("click:{}", OPEN_SETTINGS), 1);
        driver.on(&format!("click:{}", OPEN_SETTINGS), &[SETTINGS]);
        let (mut graph, app) = messaging_graph(driver);

        graph.go_to_state(app.settings, &Context::new()).unwrap();
        assert_eq!(graph.current_state(), app.settings);
        assert_eq!(graph.driver().actions(), vec![format!("click:{}", OPEN_SETTINGS)]);
    }

    #[test]
    fn test_unexpected_screen_is_realigned() {
        let driver = MockDriver::new();
        // believed in conversations, actually in settings
        driver.show(&[SETTINGS]);
        driver.on("keycode:4", &[CONVERSATIONS, OPEN_SETTINGS]);
        let (mut graph, app) = messaging_graph(driver);

        graph.go_to_state(app.conversations, &Context::new()).unwrap();
        assert_eq!(graph.current_state(), app.conversations);
        assert_eq!(graph.driver().actions(), vec!["keycode:4"]);
    }
}
