//! Action dispatcher: run a domain operation in the state it needs.
//!
//! ```ignore
//! let sent = graph.run_action(
//!     Action::new("send_message", chat, |driver, ctx| {
//!         driver.send_keys(TEXT_BOX, ctx.str("message").unwrap_or_default())?;
//!         driver.click(SEND_BUTTON)?;
//!         Ok(())
//!     })
//!     .arg(keys::CONVERSATION, "Bob")
//!     .arg("message", "hi")
//!     .verify_with(|graph, ctx| message_is_listed(graph, ctx)),
//! )?;
//! ```

use log::{error, info, warn};
use serde_json::Value;
use std::sync::Arc;

use crate::driver::UiDriver;
use crate::error::{Error, Result};
use crate::graph::{Context, StateId, Target};
use crate::navigator::AppGraph;

type Body<'f, T> = Box<dyn FnMut(&dyn UiDriver, &Context) -> Result<T> + 'f>;
type Verify<'f, D> = Box<dyn FnOnce(&mut AppGraph<D>, &Context) -> Result<bool> + 'f>;

/// A domain operation bound to the state it has to run in.
pub struct Action<'f, D: UiDriver, T> {
    name: String,
    required: StateId,
    end_state: Option<StateId>,
    context: Context,
    body: Body<'f, T>,
    verify: Option<Verify<'f, D>>,
}

impl<'f, D: UiDriver, T> Action<'f, D, T> {
    pub fn new<F>(name: &str, required: StateId, body: F) -> Self
    where
        F: FnMut(&dyn UiDriver, &Context) -> Result<T> + 'f,
    {
        Self {
            name: name.to_string(),
            required,
            end_state: None,
            context: Context::new(),
            body: Box::new(body),
            verify: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Bind one named argument; also used for contextual validation on the
    /// way to the required state.
    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    /// The operation leaves the UI in `state` instead of the required state.
    pub fn ends_in(mut self, state: StateId) -> Self {
        self.end_state = Some(state);
        self
    }

    /// Check run after the operation. It may navigate freely; the graph is
    /// brought back to where the operation left it afterwards.
    pub fn verify_with<V>(mut self, verify: V) -> Self
    where
        V: FnOnce(&mut AppGraph<D>, &Context) -> Result<bool> + 'f,
    {
        self.verify = Some(Box::new(verify));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl<D: UiDriver> AppGraph<D> {
    /// Navigate to the action's required state and run it.
    ///
    /// A click failure in the body triggers recovery and exactly one retry.
    /// Any other error is logged and returned as is. A required or end state
    /// that is not part of this graph is rejected before touching the UI.
    pub fn run_action<T>(&mut self, action: Action<'_, D, T>) -> Result<T> {
        let Action {
            name,
            required,
            end_state,
            context,
            mut body,
            verify,
        } = action;
        let graph = Arc::clone(&self.definition);
        for id in std::iter::once(required).chain(end_state) {
            if !graph.contains(id) {
                return Err(Error::UnknownState(Target::Id(id).to_string()));
            }
        }

        self.go_to_state(required, &context)?;

        let arguments = serde_json::to_string(&context).unwrap_or_else(|_| format!("{{{}}}", context));
        info!(
            target: "ground_truth",
            "[{}] Executing action {} with arguments: {} for application: {}",
            self.device_id(),
            name,
            arguments,
            graph.name()
        );
        let value = match body(&self.driver, &context) {
            Ok(value) => value,
            Err(e) if e.is_recoverable() => {
                warn!(
                    "[Action] {}: '{}' failed in '{}': {}. Recovering and retrying once",
                    self.device_id(),
                    name,
                    graph.state(required),
                    e
                );
                self.recover_state(required)?;
                self.go_to_state(required, &context)?;
                body(&self.driver, &context).map_err(|e| {
                    error!("[Action] {}: '{}' failed again: {}", self.device_id(), name, e);
                    e
                })?
            }
            Err(e) => {
                error!(
                    "[Action] {}: unexpected error while executing '{}': {}",
                    self.device_id(),
                    name,
                    e
                );
                return Err(e);
            }
        };

        if let Some(end) = end_state {
            self.current = end;
        }

        if let Some(verify) = verify {
            self.run_verification(&name, verify, &context)?;
        }

        self.try_restart = true;
        Ok(value)
    }

    fn run_verification(&mut self, name: &str, verify: Verify<'_, D>, context: &Context) -> Result<()> {
        let captured = self.current;
        let fatal = match verify(self, context) {
            Ok(true) => {
                info!("[Action] {}: verification of '{}' passed", self.device_id(), name);
                None
            }
            Ok(false) => {
                warn!("[Action] {}: verification of '{}' failed", self.device_id(), name);
                None
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    "[Action] {}: verification of '{}' failed on the UI: {}",
                    self.device_id(),
                    name,
                    e
                );
                None
            }
            Err(e) => {
                error!(
                    "[Action] {}: unexpected error while verifying '{}': {}",
                    self.device_id(),
                    name,
                    e
                );
                Some(e)
            }
        };

        self.go_to_state(captured, context)?;
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
