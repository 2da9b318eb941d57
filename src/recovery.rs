//! Recovery protocol: what the graph does when the screen is not the state it
//! expected. Stages run cheapest first and stop as soon as one of them
//! realigns the believed state with the screen.

use log::{info, warn};
use std::sync::Arc;
use std::thread;

use crate::driver::UiDriver;
use crate::error::{Error, Result};
use crate::graph::{StateId, Target};
use crate::navigator::AppGraph;
use crate::popup::{self, SweepReport};

impl<D: UiDriver> AppGraph<D> {
    /// Try to get back to a known state after the UI failed to show `expected`.
    ///
    /// Returns `Ok` once the believed state matches the screen again, or after
    /// spending the restart budget (the caller re-validates and may come back
    /// here). Fails with [`Error::UnknownUiState`] / [`Error::AmbiguousUiState`]
    /// when the screen cannot be identified and no restart is left, and with
    /// [`Error::UnknownState`] when `expected` belongs to another graph.
    pub fn recover_state(&mut self, expected: StateId) -> Result<()> {
        let graph = Arc::clone(&self.definition);
        if !graph.contains(expected) {
            return Err(Error::UnknownState(Target::Id(expected).to_string()));
        }

        if !self.driver.app_is_foreground()? {
            warn!(
                "[Recovery] {}: {} is not in the foreground, activating",
                self.device_id(),
                self.driver.app_package()
            );
            self.driver.activate_app()?;
        }

        if self.probe(graph.state(self.current))? {
            return Ok(());
        }

        self.dismiss_popups()?;

        if self.probe(graph.state(self.current))? {
            return Ok(());
        }

        self.search_state(expected)
    }

    /// Popup sweep over the built-in and app handlers.
    pub fn dismiss_popups(&mut self) -> Result<SweepReport> {
        let report = popup::sweep(&self.driver, &self.popups, self.config.max_popup_passes)?;
        if report.exhausted {
            warn!(
                "[Recovery] {}: popups still showing after {} passes",
                self.device_id(),
                report.passes
            );
        }
        Ok(report)
    }

    /// Check the screen against every state; adopt a single match.
    fn search_state(&mut self, expected: StateId) -> Result<()> {
        let graph = Arc::clone(&self.definition);
        let mut matches = Vec::new();
        for (id, state) in graph.states() {
            if self.probe(state)? {
                matches.push(id);
            }
        }

        if let [found] = matches.as_slice() {
            info!(
                "[Recovery] {}: was in unknown state, expected '{}'. Recognized '{}', setting current state",
                self.device_id(),
                graph.state(expected),
                graph.state(*found)
            );
            self.current = *found;
            return Ok(());
        }

        if self.try_restart {
            warn!(
                "[Recovery] {}: not in a known state ({} matches). Restarting {} once",
                self.device_id(),
                matches.len(),
                self.driver.app_package()
            );
            self.try_restart = false;
            self.driver.restart_app()?;
            thread::sleep(self.config.restart_pause);
            return Ok(());
        }

        let expected = graph.state(expected).name().to_string();
        if matches.is_empty() {
            Err(Error::UnknownUiState { expected })
        } else {
            Err(Error::AmbiguousUiState {
                expected,
                matches: matches.iter().map(|id| graph.state(*id).name().to_string()).collect(),
            })
        }
    }
}
