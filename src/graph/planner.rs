//! Shortest-path planning over the transition graph.
//!
//! Breadth-first, so a path has the minimum number of UI hops. Outgoing
//! transitions are expanded in declaration order, which makes the choice
//! between equally short paths deterministic.

use std::collections::VecDeque;
use std::fmt;

use super::definition::GraphDefinition;
use super::state::StateId;
use super::transition::Transition;

/// Navigation destination, by id or by state name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    Id(StateId),
    Name(&'a str),
}

impl From<StateId> for Target<'_> {
    fn from(id: StateId) -> Self {
        Target::Id(id)
    }
}

impl<'a> From<&'a str> for Target<'a> {
    fn from(name: &'a str) -> Self {
        Target::Name(name)
    }
}

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "#{}", id.index()),
            Target::Name(name) => write!(f, "{}", name),
        }
    }
}

impl Target<'_> {
    pub(crate) fn matches(&self, graph: &GraphDefinition, id: StateId) -> bool {
        match self {
            Target::Id(target) => *target == id,
            Target::Name(name) => graph.state(id).name() == *name,
        }
    }
}

/// Transitions leading from `start` to `destination`, or `None` when the
/// destination cannot be reached or `start` is not a state of `graph`. An
/// empty path means `start` already is the destination.
pub fn shortest_path<'g>(
    graph: &'g GraphDefinition,
    start: StateId,
    destination: Target<'_>,
) -> Option<Vec<&'g Transition>> {
    if !graph.contains(start) {
        return None;
    }
    if destination.matches(graph, start) {
        return Some(Vec::new());
    }

    let mut visited = vec![false; graph.state_count()];
    // transition used to first reach each state
    let mut reached_by: Vec<Option<&'g Transition>> = vec![None; graph.state_count()];
    let mut queue = VecDeque::new();
    visited[start.index()] = true;
    queue.push_back(start);

    while let Some(state) = queue.pop_front() {
        for transition in graph.outgoing(state) {
            let next = transition.to();
            if visited[next.index()] {
                continue;
            }
            visited[next.index()] = true;
            reached_by[next.index()] = Some(transition);
            if destination.matches(graph, next) {
                return Some(unwind(&reached_by, start, next));
            }
            queue.push_back(next);
        }
    }
    None
}

fn unwind<'g>(reached_by: &[Option<&'g Transition>], start: StateId, end: StateId) -> Vec<&'g Transition> {
    let mut path = Vec::new();
    let mut cursor = end;
    while cursor != start {
        match reached_by[cursor.index()] {
            Some(transition) => {
                path.push(transition);
                cursor = transition.from();
            }
            None => break,
        }
    }
    path.reverse();
    path
}
