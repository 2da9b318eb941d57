use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::context::Context;
use super::planner::{self, Target};
use super::state::{State, StateId};
use super::transition::{back_action, Transition, TransitionKind, UiAction};
use super::validator;
use crate::driver::{DriverResult, UiDriver};
use crate::error::DefinitionError;

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(1);

/// Registers the states and transitions of one app, then validates them
/// into an immutable [`GraphDefinition`].
///
/// ```ignore
/// let mut b = GraphBuilder::new("camera");
/// let photo = b.state(State::simple("photo", &[SHUTTER]).initial());
/// let settings = b.state(State::simple("settings", &[SETTINGS_TITLE]).parent(photo));
/// b.transition(photo, settings, compose_clicks(&[OPEN_SETTINGS]));
/// let graph = b.build()?;
/// ```
pub struct GraphBuilder {
    id: u64,
    name: String,
    states: Vec<State>,
    transitions: Vec<(StateId, StateId, UiAction)>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            states: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn state(&mut self, state: State) -> StateId {
        self.states.push(state);
        StateId::new(self.id, self.states.len() - 1)
    }

    pub fn transition<F>(&mut self, from: StateId, to: StateId, action: F) -> &mut Self
    where
        F: Fn(&dyn UiDriver, &Context) -> DriverResult<()> + Send + Sync + 'static,
    {
        self.transitions.push((from, to, Arc::new(action)));
        self
    }

    /// Assemble and validate. Fails on the first structural problem.
    pub fn build(self) -> Result<Arc<GraphDefinition>, DefinitionError> {
        let mut graph = self.assemble()?;
        graph.initial = validator::validate_graph(&graph)?;
        debug!(
            "[Graph] '{}' built: {} states, {} transitions",
            graph.name,
            graph.states.len(),
            graph.transitions.len()
        );
        Ok(Arc::new(graph))
    }

    /// Wire up adjacency, deriving back transitions, without validating.
    pub(crate) fn assemble(self) -> Result<GraphDefinition, DefinitionError> {
        let count = self.states.len();
        let known = |id: StateId| id.graph == self.id && id.index() < count;
        for state in &self.states {
            if state.parent_id().map_or(false, |p| !known(p)) {
                return Err(DefinitionError::UnknownStateRef { state: state.name().to_string() });
            }
            if state.is_initial() && state.parent_id().is_some() {
                return Err(DefinitionError::InitialStateWithParent(state.name().to_string()));
            }
        }
        for (from, to, _) in &self.transitions {
            if !known(*from) || !known(*to) {
                let name = self
                    .states
                    .get(from.index())
                    .filter(|_| known(*from))
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| format!("#{}", from.index()));
                return Err(DefinitionError::UnknownStateRef { state: name });
            }
        }

        let mut transitions = Vec::new();
        let mut outgoing = vec![Vec::new(); count];
        for (index, state) in self.states.iter().enumerate() {
            let id = StateId::new(self.id, index);
            if let Some(parent) = state.parent_id() {
                let overridden = self.transitions.iter().any(|(f, t, _)| *f == id && *t == parent);
                if !overridden {
                    outgoing[index].push(transitions.len());
                    transitions.push(Transition::new(id, parent, TransitionKind::Back, back_action()));
                }
            }
            for (from, to, action) in self.transitions.iter().filter(|(f, _, _)| *f == id) {
                let kind = if state.parent_id() == Some(*to) {
                    TransitionKind::Back
                } else {
                    TransitionKind::Explicit
                };
                outgoing[index].push(transitions.len());
                transitions.push(Transition::new(*from, *to, kind, Arc::clone(action)));
            }
        }

        Ok(GraphDefinition {
            id: self.id,
            name: self.name,
            states: self.states,
            transitions,
            outgoing,
            initial: StateId::new(self.id, 0),
        })
    }
}

/// Validated, immutable set of states and transitions of one app.
#[derive(Debug)]
pub struct GraphDefinition {
    id: u64,
    name: String,
    states: Vec<State>,
    transitions: Vec<Transition>,
    outgoing: Vec<Vec<usize>>,
    initial: StateId,
}

impl GraphDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Whether `id` was issued for this graph.
    pub fn contains(&self, id: StateId) -> bool {
        id.graph == self.id && id.index() < self.states.len()
    }

    /// Panics when `id` belongs to another graph; check with
    /// [`contains`](Self::contains) or [`resolve`](Self::resolve) first.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states.iter().enumerate().map(move |(i, s)| (StateId::new(self.id, i), s))
    }

    pub fn state_by_name(&self, name: &str) -> Option<StateId> {
        self.states
            .iter()
            .position(|s| s.name() == name)
            .map(|i| StateId::new(self.id, i))
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Outgoing transitions of `id` in declaration order; a derived back
    /// transition comes first.
    pub fn outgoing(&self, id: StateId) -> impl Iterator<Item = &Transition> {
        self.outgoing[id.index()].iter().map(move |&i| &self.transitions[i])
    }

    pub fn transition_between(&self, from: StateId, to: StateId) -> Option<&Transition> {
        self.outgoing(from).find(|t| t.to() == to)
    }

    /// Resolve a navigation target to a state of this graph.
    pub fn resolve(&self, target: &Target<'_>) -> Option<StateId> {
        match target {
            Target::Id(id) if self.contains(*id) => Some(*id),
            Target::Id(_) => None,
            Target::Name(name) => self.state_by_name(name),
        }
    }

    pub fn find_shortest_path(&self, from: StateId, destination: Target<'_>) -> Option<Vec<&Transition>> {
        planner::shortest_path(self, from, destination)
    }

    /// Hop budget of a single navigation.
    pub fn max_hops(&self) -> usize {
        self.states.len() * 2 + 5
    }
}
