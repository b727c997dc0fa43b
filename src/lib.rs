//! screwd - Control kernel for a screw-insertion robot controller
//!
//! Exposes a line-based TCP command interface to an operator/vision client,
//! drives the robot activity state machine and executes a bounded queue of
//! coordinate jobs one at a time. Physical motion and IO are behind the
//! [`actuator::Actuator`] seam; everything here is control-plane logic
//! deciding when to issue which actuator call.
//!
//! # Architecture
//!
//! Three long-lived tasks share one mutex-guarded [`core::ControlCore`]:
//!
//! - **ConnectionManager**: socket lifecycle, line assembly, reconnect loop
//! - **CommandDispatcher + OperationScheduler**: command validation and
//!   operation execution, handed off through a wake signal
//! - **StatusBroadcaster**: periodic unsolicited telemetry line
//!
//! Messages between the network task and the rest travel through
//! single-slot mailboxes with an explicit back-pressure timeout.

pub mod actuator;
pub mod command;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod mailbox;
pub mod net;
pub mod queue;
pub mod scheduler;
pub mod state;
pub mod status;

pub use actuator::{Actuator, Pose, SimActuator};
pub use command::{Command, LINE_ENDING};
pub use config::DaemonConfig;
pub use core::{ControlCore, PendingOp, SharedCore, StopFlag};
pub use dispatch::CommandDispatcher;
pub use error::{ControlError, Result};
pub use mailbox::{Mailbox, Outbox, OutboxReceiver};
pub use net::ConnectionManager;
pub use queue::{CoordinateJob, JobQueue};
pub use scheduler::OperationScheduler;
pub use state::{RobotState, StateMachine};
pub use status::StatusBroadcaster;
