//! Robot state machine
//!
//! Holds the single authoritative `RobotState` value and the transition
//! table. Nothing outside this module assigns the state field; every change
//! goes through [`StateMachine::transition`] so each one is logged and
//! auditable.

use crate::{ControlError, Result};
use std::fmt;
use tracing::{info, warn};

/// Robot operational states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotState {
    Disconnected,
    Idle,
    Moving,
    Inserting,
    Testing,
    Emergency,
}

impl RobotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotState::Disconnected => "DISCONNECTED",
            RobotState::Idle => "IDLE",
            RobotState::Moving => "MOVING",
            RobotState::Inserting => "INSERTING",
            RobotState::Testing => "TESTING",
            RobotState::Emergency => "EMERGENCY",
        }
    }

    /// True while the scheduler owns the actuator
    pub fn is_operating(&self) -> bool {
        matches!(
            self,
            RobotState::Moving | RobotState::Inserting | RobotState::Testing
        )
    }
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the current robot state
#[derive(Debug)]
pub struct StateMachine {
    current: RobotState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: RobotState::Disconnected,
        }
    }

    pub fn current(&self) -> RobotState {
        self.current
    }

    /// Whether the transition table allows `from -> to`
    pub fn is_allowed(from: RobotState, to: RobotState) -> bool {
        use RobotState::*;
        if from == to {
            return true;
        }
        match (from, to) {
            // Socket faults and actuator faults override anything
            (_, Disconnected) | (_, Emergency) => true,
            // Emergency is terminal pending operator intervention
            (Emergency, _) => false,
            (Disconnected, Idle) => true,
            (Idle, Moving) | (Idle, Inserting) | (Idle, Testing) => true,
            (Moving, Idle) | (Inserting, Idle) | (Testing, Idle) => true,
            _ => false,
        }
    }

    /// Apply a transition, logging old and new state.
    ///
    /// Same-state transitions are accepted silently so that the scheduler and
    /// dispatcher can both drive an operation back to IDLE without racing.
    pub fn transition(&mut self, to: RobotState) -> Result<()> {
        let from = self.current;
        if from == to {
            return Ok(());
        }
        if !Self::is_allowed(from, to) {
            warn!("Rejected state transition {} -> {}", from, to);
            return Err(ControlError::Transition {
                from: from.as_str(),
                to: to.as_str(),
            });
        }
        info!("State transition {} -> {}", from, to);
        self.current = to;
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
