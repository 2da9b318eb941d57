//! Structural checks run once when a graph is built.

use std::collections::BTreeMap;

use super::definition::GraphDefinition;
use super::planner::{shortest_path, Target};
use super::state::StateId;
use crate::error::DefinitionError;

/// Check `graph` and return its initial state. Rules are checked in a fixed
/// order and the first violation is reported.
pub fn validate_graph(graph: &GraphDefinition) -> Result<StateId, DefinitionError> {
    let initial = single_initial(graph)?;

    if graph.state(initial).is_contextual() {
        return Err(DefinitionError::ContextualInitialState(graph.state(initial).name().to_string()));
    }

    let orphans: Vec<String> = graph
        .states()
        .filter(|(_, s)| s.is_contextual() && s.parent_id().is_none())
        .map(|(_, s)| s.name().to_string())
        .collect();
    if !orphans.is_empty() {
        return Err(DefinitionError::ContextualStateWithoutParent(orphans));
    }

    let unreachable: Vec<String> = graph
        .states()
        .filter(|(id, _)| *id != initial)
        .filter(|(id, _)| {
            shortest_path(graph, initial, Target::Id(*id)).is_none()
                || shortest_path(graph, *id, Target::Id(initial)).is_none()
        })
        .map(|(_, s)| s.name().to_string())
        .collect();
    if !unreachable.is_empty() {
        return Err(DefinitionError::UnreachableStates(unreachable));
    }

    let mut names: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, state) in graph.states() {
        *names.entry(state.name()).or_default() += 1;
    }
    let duplicated: Vec<String> = names
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name.to_string())
        .collect();
    if !duplicated.is_empty() {
        return Err(DefinitionError::DuplicateStateNames(duplicated));
    }

    for (id, state) in graph.states() {
        let mut targets: Vec<StateId> = Vec::new();
        let mut repeated: Vec<String> = Vec::new();
        for transition in graph.outgoing(id) {
            let to = transition.to();
            if targets.contains(&to) {
                let name = graph.state(to).name().to_string();
                if !repeated.contains(&name) {
                    repeated.push(name);
                }
            } else {
                targets.push(to);
            }
        }
        if !repeated.is_empty() {
            return Err(DefinitionError::DuplicateTransitions {
                state: state.name().to_string(),
                targets: repeated,
            });
        }
    }

    Ok(initial)
}

fn single_initial(graph: &GraphDefinition) -> Result<StateId, DefinitionError> {
    let initials: Vec<StateId> = graph
        .states()
        .filter(|(_, s)| s.is_initial())
        .map(|(id, _)| id)
        .collect();
    match initials.as_slice() {
        [] => Err(DefinitionError::NoInitialState),
        [only] => Ok(*only),
        many => Err(DefinitionError::MultipleInitialStates(
            many.iter().map(|id| graph.state(*id).name().to_string()).collect(),
        )),
    }
}
