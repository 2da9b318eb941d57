use std::fmt;
use std::sync::Arc;

use super::context::Context;
use super::state::StateId;
use crate::driver::{DriverResult, UiDriver};

pub type UiAction = Arc<dyn Fn(&dyn UiDriver, &Context) -> DriverResult<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Declared by the graph author.
    Explicit,
    /// Child to parent edge derived from a state's parent.
    Back,
}

/// Directed edge between two states carrying the gesture that moves the UI.
#[derive(Clone)]
pub struct Transition {
    from: StateId,
    to: StateId,
    kind: TransitionKind,
    action: UiAction,
}

impl Transition {
    pub(crate) fn new(from: StateId, to: StateId, kind: TransitionKind, action: UiAction) -> Self {
        Self { from, to, kind, action }
    }

    pub fn from(&self) -> StateId {
        self.from
    }

    pub fn to(&self) -> StateId {
        self.to
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn run(&self, driver: &dyn UiDriver, context: &Context) -> DriverResult<()> {
        (self.action)(driver, context)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Default action of derived back transitions.
pub fn back_action() -> UiAction {
    Arc::new(press_back)
}

fn press_back(driver: &dyn UiDriver, _: &Context) -> DriverResult<()> {
    driver.back()
}

/// Transition action clicking `locators` in order.
pub fn compose_clicks(locators: &[&str]) -> impl Fn(&dyn UiDriver, &Context) -> DriverResult<()> + Send + Sync + 'static {
    let locators: Vec<String> = locators.iter().map(|l| l.to_string()).collect();
    move |driver, _| {
        for locator in &locators {
            driver.click(locator)?;
        }
        Ok(())
    }
}
