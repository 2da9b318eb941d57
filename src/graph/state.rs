use std::fmt;
use std::sync::Arc;

use super::context::Context;
use crate::driver::{self, DriverResult, UiDriver};

pub type Validator = Arc<dyn Fn(&dyn UiDriver) -> DriverResult<bool> + Send + Sync>;
pub type ContextValidator = Arc<dyn Fn(&dyn UiDriver, &Context) -> DriverResult<bool> + Send + Sync>;

/// A state of one particular graph: the builder that issued it plus the
/// index it was registered under. Ids handed out by another builder never
/// resolve in this graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId {
    pub(crate) graph: u64,
    pub(crate) index: usize,
}

impl StateId {
    pub(crate) fn new(graph: u64, index: usize) -> Self {
        Self { graph, index }
    }

    pub fn index(self) -> usize {
        self.index
    }
}

/// A recognisable screen of the target app.
///
/// Every state has a validator telling whether the live UI shows it. A state
/// with a context validator is a *contextual* state: it can also tell whether
/// the screen shows the right content (e.g. the right conversation).
#[derive(Clone)]
pub struct State {
    name: String,
    initial: bool,
    parent: Option<StateId>,
    validator: Validator,
    context_validator: Option<ContextValidator>,
}

impl State {
    pub fn new<F>(name: &str, validator: F) -> Self
    where
        F: Fn(&dyn UiDriver) -> DriverResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            initial: false,
            parent: None,
            validator: Arc::new(validator),
            context_validator: None,
        }
    }

    /// State that is showing when every locator is present.
    pub fn simple(name: &str, locators: &[&str]) -> Self {
        let locators: Vec<String> = locators.iter().map(|l| l.to_string()).collect();
        Self::new(name, move |driver| driver::all_present(driver, &locators))
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Parent state; a back transition to it is derived at build time.
    pub fn parent(mut self, parent: StateId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn contextual<F>(mut self, validator: F) -> Self
    where
        F: Fn(&dyn UiDriver, &Context) -> DriverResult<bool> + Send + Sync + 'static,
    {
        self.context_validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn parent_id(&self) -> Option<StateId> {
        self.parent
    }

    pub fn is_contextual(&self) -> bool {
        self.context_validator.is_some()
    }

    pub fn validate(&self, driver: &dyn UiDriver) -> DriverResult<bool> {
        (self.validator)(driver)
    }

    /// Context check; states without a context validator always match.
    pub fn validate_context(&self, driver: &dyn UiDriver, context: &Context) -> DriverResult<bool> {
        match &self.context_validator {
            Some(validator) => validator(driver, context),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("parent", &self.parent)
            .field("contextual", &self.is_contextual())
            .finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
