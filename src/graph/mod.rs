//! State-graph model: states, transitions, the builder that validates them
//! and the planner that routes between them.

pub mod context;
pub mod definition;
pub mod planner;
pub mod state;
pub mod transition;
pub mod validator;

pub use context::{keys, Context};
pub use definition::{GraphBuilder, GraphDefinition};
pub use planner::{shortest_path, Target};
pub use state::{ContextValidator, State, StateId, Validator};
pub use transition::{back_action, compose_clicks, Transition, TransitionKind, UiAction};
pub use validator::validate_graph;
