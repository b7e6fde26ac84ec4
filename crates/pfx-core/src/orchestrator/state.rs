//! Orchestration states and their legal transitions.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::logging::event_names;

/// Steps of an install run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Init,
    DetectRuntime,
    SelectRuntime,
    InitEnvironment,
    AwaitReady,
    InstallComponents,
    DetectVersion,
    ApplyConfig,
    Finalize,
    Done,
    Aborted,
}

impl State {
    /// The forward sequence, excluding `Aborted`.
    pub const SEQUENCE: [State; 10] = [
        State::Init,
        State::DetectRuntime,
        State::SelectRuntime,
        State::InitEnvironment,
        State::AwaitReady,
        State::InstallComponents,
        State::DetectVersion,
        State::ApplyConfig,
        State::Finalize,
        State::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Init => "init",
            State::DetectRuntime => "detect_runtime",
            State::SelectRuntime => "select_runtime",
            State::InitEnvironment => "init_environment",
            State::AwaitReady => "await_ready",
            State::InstallComponents => "install_components",
            State::DetectVersion => "detect_version",
            State::ApplyConfig => "apply_config",
            State::Finalize => "finalize",
            State::Done => "done",
            State::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Aborted)
    }

    fn next(&self) -> Option<State> {
        let index = State::SEQUENCE.iter().position(|s| s == self)?;
        State::SEQUENCE.get(index + 1).copied()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: State,
    pub to: State,
}

/// Tracks the current state and the steps that completed.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: State,
    passed: Vec<State>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: State::Init,
            passed: Vec::new(),
        }
    }

    pub fn current(&self) -> State {
        self.current
    }

    /// States left through a forward transition.
    pub fn passed(&self) -> &[State] {
        &self.passed
    }

    /// Move to `to`: the next state in sequence, or `Aborted` from any
    /// non-terminal state.
    pub fn transition(&mut self, to: State) -> Result<(), TransitionError> {
        let from = self.current;
        let legal = !from.is_terminal() && (to == State::Aborted || from.next() == Some(to));
        if !legal {
            return Err(TransitionError { from, to });
        }
        if to != State::Aborted {
            self.passed.push(from);
        }
        info!(target: event_names::STATE_TRANSITION, from = %from, to = %to, "state transition");
        self.current = to;
        Ok(())
    }

    /// Advance to the next state in sequence.
    pub fn advance(&mut self) -> Result<State, TransitionError> {
        let to = self.current.next().ok_or(TransitionError {
            from: self.current,
            to: self.current,
        })?;
        self.transition(to)?;
        Ok(to)
    }
}
