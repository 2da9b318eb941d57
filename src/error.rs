use thiserror::Error;

/// Failure reported by a [`UiDriver`](crate::driver::UiDriver) call.
///
/// Only [`DriverError::ClickFailure`] is considered UI flakiness; navigation,
/// recovery and the action dispatcher react to it. Everything else is fatal.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Could not act on element '{locator}': {reason}")]
    ClickFailure { locator: String, reason: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn click_failure(locator: &str, reason: impl Into<String>) -> Self {
        DriverError::ClickFailure {
            locator: locator.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_click_failure(&self) -> bool {
        matches!(self, DriverError::ClickFailure { .. })
    }
}

/// Structural problem in a graph definition, reported once by
/// [`GraphBuilder::build`](crate::graph::GraphBuilder::build).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Transition or parent of '{state}' refers to a state id that is not part of this graph")]
    UnknownStateRef { state: String },

    #[error("Error creating state '{0}': initial state cannot have a parent state")]
    InitialStateWithParent(String),

    #[error("Graph needs an initial state")]
    NoInitialState,

    #[error("Graph can only have 1 initial state, currently more defined: {0:?}")]
    MultipleInitialStates(Vec<String>),

    #[error("Initial state '{0}' cannot be a contextual state")]
    ContextualInitialState(String),

    #[error("Contextual states without parent are not allowed: {0:?}")]
    ContextualStateWithoutParent(Vec<String>),

    #[error("Some states cannot be reached from the initial state, or cannot go back to the initial state: {0:?}")]
    UnreachableStates(Vec<String>),

    #[error("States must have a unique name. Multiple states are named {0:?}")]
    DuplicateStateNames(Vec<String>),

    #[error("State '{state}' has invalid transitions: multiple transitions defined to neighboring state(s) {targets:?}")]
    DuplicateTransitions { state: String, targets: Vec<String> },
}

/// Runtime error of navigation, recovery and action dispatch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("'{0}' is not a known state in this graph")]
    UnknownState(String),

    #[error("No path from '{from}' to '{to}'")]
    NoPath { from: String, to: String },

    #[error("Too many transitions ({hops}) while navigating to '{target}', unrecoverable")]
    Unrecoverable { target: String, hops: usize },

    #[error("Unknown state while expecting '{expected}', cannot recover")]
    UnknownUiState { expected: String },

    #[error("More than one state matches the current UI while expecting '{expected}': {matches:?}. Write stricter validators")]
    AmbiguousUiState { expected: String, matches: Vec<String> },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this failure is UI flakiness that recovery may fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Driver(e) if e.is_click_failure())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
