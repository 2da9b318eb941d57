//! Android UI automation on top of explicit state graphs.
//!
//! An app is described once as a [`GraphDefinition`]: the screens it can show
//! ([`State`]), how to get from one to the next ([`Transition`]) and which
//! screen the app starts in. An [`AppGraph`] then drives one device through
//! that graph: it plans the shortest route to a target state, checks every
//! hop against the live UI, recovers from popups and surprises, and runs
//! domain [`Action`]s in the state they need.

pub mod action;
pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod navigator;
pub mod popup;
pub mod recovery;

#[cfg(test)]
pub(crate) mod testing;

pub use action::Action;
pub use config::GraphConfig;
pub use driver::{AppiumDriver, UiDriver, UiElement};
pub use error::{DefinitionError, DriverError, Error, Result};
pub use graph::{
    back_action, compose_clicks, keys, Context, GraphBuilder, GraphDefinition, State, StateId, Target, Transition,
};
pub use navigator::AppGraph;
pub use popup::{builtin_popups, PopupHandler};
