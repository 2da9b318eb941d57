//! Scripted in-memory driver and fixtures shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Once};
use std::time::Duration;

use crate::config::GraphConfig;
use crate::driver::{DriverResult, UiDriver, UiElement};
use crate::error::DriverError;
use crate::graph::{compose_clicks, keys, Context, GraphBuilder, GraphDefinition, State, StateId};

struct Effect {
    visible: Vec<String>,
    text: Option<(String, String)>,
}

/// Fake device screen.
///
/// The screen is a set of visible locators. Every successful gesture is
/// recorded (`click:<locator>`, `keycode:<n>`, `activate`, ...) and may be
/// scripted to replace the visible set. Scripted effects for the same gesture
/// are consumed in order; the last one stays.
pub(crate) struct MockDriver {
    visible: RefCell<BTreeSet<String>>,
    texts: RefCell<HashMap<String, String>>,
    effects: RefCell<HashMap<String, VecDeque<Effect>>>,
    failures: RefCell<HashMap<String, usize>>,
    actions: RefCell<Vec<String>>,
    checks: RefCell<HashMap<String, usize>>,
    foreground: Cell<bool>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        Self {
            visible: RefCell::new(BTreeSet::new()),
            texts: RefCell::new(HashMap::new()),
            effects: RefCell::new(HashMap::new()),
            failures: RefCell::new(HashMap::new()),
            actions: RefCell::new(Vec::new()),
            checks: RefCell::new(HashMap::new()),
            foreground: Cell::new(true),
        }
    }

    pub(crate) fn show(&self, locators: &[&str]) {
        *self.visible.borrow_mut() = locators.iter().map(|l| l.to_string()).collect();
    }

    pub(crate) fn set_text(&self, locator: &str, text: &str) {
        self.texts.borrow_mut().insert(locator.to_string(), text.to_string());
    }

    pub(crate) fn set_foreground(&self, foreground: bool) {
        self.foreground.set(foreground);
    }

    /// After `action` succeeds, the screen shows exactly `visible`.
    pub(crate) fn on(&self, action: &str, visible: &[&str]) {
        self.push_effect(action, visible, None);
    }

    /// Like [`on`](Self::on), also setting the text of `locator`.
    pub(crate) fn on_text(&self, action: &str, visible: &[&str], locator: &str, text: &str) {
        self.push_effect(action, visible, Some((locator.to_string(), text.to_string())));
    }

    /// Make the next `times` attempts of `action` fail with a click failure.
    pub(crate) fn fail_next(&self, action: &str, times: usize) {
        self.failures.borrow_mut().insert(action.to_string(), times);
    }

    pub(crate) fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }

    pub(crate) fn presence_checks(&self, locator: &str) -> usize {
        self.checks.borrow().get(locator).copied().unwrap_or(0)
    }

    fn push_effect(&self, action: &str, visible: &[&str], text: Option<(String, String)>) {
        self.effects
            .borrow_mut()
            .entry(action.to_string())
            .or_default()
            .push_back(Effect {
                visible: visible.iter().map(|l| l.to_string()).collect(),
                text,
            });
    }

    fn visible_now(&self, locator: &str) -> bool {
        self.visible.borrow().contains(locator)
    }

    fn perform(&self, action: String) -> DriverResult<()> {
        if let Some(left) = self.failures.borrow_mut().get_mut(&action) {
            if *left > 0 {
                *left -= 1;
                return Err(DriverError::click_failure(&action, "scripted failure"));
            }
        }
        let mut effects = self.effects.borrow_mut();
        if let Some(queue) = effects.get_mut(&action) {
            let effect = if queue.len() > 1 { queue.pop_front() } else { None };
            let effect = effect.as_ref().or_else(|| queue.front());
            if let Some(effect) = effect {
                *self.visible.borrow_mut() = effect.visible.iter().cloned().collect();
                if let Some((locator, text)) = &effect.text {
                    self.texts.borrow_mut().insert(locator.clone(), text.clone());
                }
            }
        }
        self.actions.borrow_mut().push(action);
        Ok(())
    }

    fn require(&self, locator: &str) -> DriverResult<()> {
        if self.visible_now(locator) {
            Ok(())
        } else {
            Err(DriverError::click_failure(locator, "not present"))
        }
    }
}

struct MockElement<'a> {
    driver: &'a MockDriver,
    locator: String,
}

impl UiElement for MockElement<'_> {
    fn attribute(&self, name: &str) -> DriverResult<Option<String>> {
        match name {
            "text" => Ok(self.driver.texts.borrow().get(&self.locator).cloned()),
            _ => Ok(None),
        }
    }

    fn click(&self) -> DriverResult<()> {
        self.driver.click(&self.locator)
    }
}

impl UiDriver for MockDriver {
    fn device_id(&self) -> &str {
        "emulator-5554"
    }

    fn app_package(&self) -> &str {
        "org.example.app"
    }

    fn is_present(&self, locator: &str, _wait: Duration) -> DriverResult<bool> {
        *self.checks.borrow_mut().entry(locator.to_string()).or_default() += 1;
        Ok(self.visible_now(locator))
    }

    fn click(&self, locator: &str) -> DriverResult<()> {
        self.require(locator)?;
        self.perform(format!("click:{}", locator))
    }

    fn send_keys(&self, locator: &str, text: &str) -> DriverResult<()> {
        self.require(locator)?;
        self.perform(format!("send_keys:{}:{}", locator, text))
    }

    fn long_press(&self, locator: &str, _duration: Duration) -> DriverResult<()> {
        self.require(locator)?;
        self.perform(format!("long_press:{}", locator))
    }

    fn swipe_and_retry(&self, locator: &str, _max_attempts: usize) -> DriverResult<()> {
        self.require(locator)?;
        self.perform(format!("click:{}", locator))
    }

    fn get_element<'a>(&'a self, locator: &str) -> DriverResult<Box<dyn UiElement + 'a>> {
        self.require(locator)?;
        Ok(Box::new(MockElement {
            driver: self,
            locator: locator.to_string(),
        }))
    }

    fn activate_app(&self) -> DriverResult<()> {
        self.foreground.set(true);
        self.perform("activate".to_string())
    }

    fn terminate_app(&self) -> DriverResult<()> {
        self.foreground.set(false);
        self.visible.borrow_mut().clear();
        self.perform("terminate".to_string())
    }

    fn app_is_foreground(&self) -> DriverResult<bool> {
        Ok(self.foreground.get())
    }

    fn press_keycode(&self, code: u32) -> DriverResult<()> {
        self.perform(format!("keycode:{}", code))
    }

    fn tap(&self, x: i32, y: i32) -> DriverResult<()> {
        self.perform(format!("tap:{},{}", x, y))
    }

    fn screenshot(&self) -> DriverResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LogLine {
    pub(crate) level: log::Level,
    pub(crate) target: String,
    pub(crate) message: String,
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<LogLine>>> = RefCell::new(None);
}

/// Global logger that records into the calling test's thread, if it asked to.
struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = LogLine {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        };
        CAPTURED.with(|captured| {
            if let Some(lines) = captured.borrow_mut().as_mut() {
                lines.push(line);
            }
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static LOGGER_INIT: Once = Once::new();

/// Run `f` and return it together with everything it logged on this thread.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<LogLine>) {
    LOGGER_INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
    CAPTURED.with(|captured| *captured.borrow_mut() = Some(Vec::new()));
    let result = f();
    let lines = CAPTURED.with(|captured| captured.borrow_mut().take()).unwrap_or_default();
    (result, lines)
}

/// Config without pauses or built-in popups.
pub(crate) fn test_config() -> GraphConfig {
    GraphConfig {
        implicit_wait: Duration::ZERO,
        restart_pause: Duration::ZERO,
        builtin_popups: false,
        ..GraphConfig::default()
    }
}

pub(crate) const CONVERSATIONS: &str = "//conversations";
pub(crate) const CHAT: &str = "//chat";
pub(crate) const CHAT_HEADER: &str = "//chat_header";
pub(crate) const SETTINGS: &str = "//settings";
pub(crate) const OPEN_SETTINGS: &str = "//menu_settings";

pub(crate) fn row(name: &str) -> String {
    format!("//row[@text='{}']", name)
}

pub(crate) struct Messaging {
    pub(crate) graph: Arc<GraphDefinition>,
    pub(crate) conversations: StateId,
    pub(crate) chat: StateId,
    pub(crate) settings: StateId,
}

/// Small messaging app: a conversation list, a chat screen tied to the
/// `conversation` context key and a settings screen.
pub(crate) fn messaging() -> Messaging {
    let mut b = GraphBuilder::new("messaging");
    let conversations = b.state(State::simple("conversations", &[CONVERSATIONS]).initial());
    let chat = b.state(
        State::simple("chat", &[CHAT])
            .parent(conversations)
            .contextual(|driver, ctx| {
                let header = driver.get_element(CHAT_HEADER)?.text()?;
                Ok(Some(header.as_str()) == ctx.str(keys::CONVERSATION))
            }),
    );
    let settings = b.state(State::simple("settings", &[SETTINGS]).parent(conversations));
    b.transition(conversations, chat, |driver, ctx: &Context| {
        let name = ctx.str(keys::CONVERSATION).unwrap_or_default();
        driver.click(&row(name))
    });
    b.transition(conversations, settings, compose_clicks(&[OPEN_SETTINGS]));
    let graph = b.build().expect("messaging graph is valid");
    Messaging {
        graph,
        conversations,
        chat,
        settings,
    }
}
