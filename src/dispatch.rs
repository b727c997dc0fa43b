//! Command dispatch
//!
//! Consumes raw lines from the inbound mailbox, validates them against the
//! current state, mutates the shared core, answers on the reply lane and
//! hands long-running operations to the scheduler through the wake signal.

use crate::actuator::Actuator;
use crate::command::{self, reply, Command};
use crate::core::{PendingOp, SharedCore, StopFlag};
use crate::mailbox::Outbox;
use crate::scheduler::enter_emergency;
use crate::state::RobotState;
use crate::{ControlError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{error, info};

pub struct CommandDispatcher {
    core: SharedCore,
    actuator: Arc<dyn Actuator>,
    outbox: Outbox,
    stop: StopFlag,
    wake: Arc<Notify>,
}

impl CommandDispatcher {
    pub fn new(
        core: SharedCore,
        actuator: Arc<dyn Actuator>,
        outbox: Outbox,
        stop: StopFlag,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            core,
            actuator,
            outbox,
            stop,
            wake,
        }
    }

    /// Drain the inbound mailbox until the network side goes away
    pub async fn run(self, mut inbound: mpsc::Receiver<String>) {
        while let Some(line) = inbound.recv().await {
            self.handle_line(&line).await;
        }
        info!("Inbound mailbox closed, dispatcher exiting");
    }

    /// Process one received line and send the immediate response, if any
    pub async fn handle_line(&self, line: &str) {
        info!("Dispatching: {}", line);
        let response = match command::parse(line) {
            Ok(command) => match self.dispatch(command).await {
                Ok(response) => response,
                Err(ControlError::Actuator(fault)) => {
                    error!("Actuator fault during dispatch: {}", fault);
                    enter_emergency(&self.core, &self.actuator, &fault).await;
                    Some(reply::TASK_FAILED.to_string())
                }
                Err(err) => Some(error_response(&err)),
            },
            Err(err) => Some(error_response(&err)),
        };
        if let Some(response) = response {
            let _ = self.outbox.reply(response).await;
        }
    }

    /// Execute one parsed command and produce the immediate response.
    ///
    /// Long-running commands answer `ack` here; their terminal token comes
    /// from the scheduler when the operation finishes.
    async fn dispatch(&self, command: Command) -> Result<Option<String>> {
        match command {
            Command::Move { x, y, z, u } => {
                {
                    let mut core = self.core.lock().await;
                    require_idle(core.state())?;
                    core.set_pending(PendingOp::Move { x, y, z, u });
                    core.machine.transition(RobotState::Moving)?;
                }
                self.wake.notify_one();
                Ok(Some(reply::ACK.to_string()))
            }
            Command::Queue(jobs) => {
                let mut core = self.core.lock().await;
                require_idle(core.state())?;
                let stored = core.queue.set_all(&jobs);
                info!("Queue replaced with {} jobs", stored);
                Ok(Some(reply::QUEUE_APPENDED.to_string()))
            }
            Command::ClearQueue => {
                self.core.lock().await.queue.clear();
                Ok(Some(reply::QUEUE_CLEARED.to_string()))
            }
            Command::Insert => self.start_iteration(RobotState::Inserting).await,
            Command::Test => self.start_iteration(RobotState::Testing).await,
            Command::LoadMagazine(count) => {
                {
                    let mut core = self.core.lock().await;
                    require_idle(core.state())?;
                    core.set_magazine_count(count);
                    core.set_pending(PendingOp::LoadMagazine { count });
                    core.machine.transition(RobotState::Moving)?;
                }
                self.wake.notify_one();
                Ok(Some(reply::ACK.to_string()))
            }
            Command::Speed(factor) => {
                {
                    let mut core = self.core.lock().await;
                    require_idle(core.state())?;
                    core.set_speed_factor(factor);
                }
                // Actuator call happens outside the lock
                self.actuator.set_speed_factor(factor).await?;
                Ok(Some(format!("SPEED_SET {}", factor)))
            }
            Command::Motor(on) => {
                if on {
                    self.actuator.motor_on().await?;
                    Ok(Some(reply::MOTOR_ON.to_string()))
                } else {
                    self.actuator.motor_off().await?;
                    Ok(Some(reply::MOTOR_OFF.to_string()))
                }
            }
            Command::Stop => {
                self.stop.raise();
                {
                    let mut core = self.core.lock().await;
                    core.queue.clear();
                    if !core.state().is_operating() {
                        // Nothing running, so no iteration will consume the flag
                        self.stop.clear();
                    }
                }
                Ok(Some(reply::STOPPED.to_string()))
            }
            Command::Echo(args) => {
                if args.is_empty() {
                    Ok(Some("echo".to_string()))
                } else {
                    Ok(Some(format!("echo {}", args)))
                }
            }
            Command::Where => {
                let pose = self.actuator.current_pose();
                Ok(Some(format!(
                    "POSE {:.2}, {:.2}, {:.2}, {:.2}",
                    pose[0], pose[1], pose[2], pose[3]
                )))
            }
        }
    }

    async fn start_iteration(&self, target: RobotState) -> Result<Option<String>> {
        {
            let mut core = self.core.lock().await;
            require_idle(core.state())?;
            if core.queue.is_empty() {
                return Err(ControlError::Protocol("empty_queue".to_string()));
            }
            core.machine.transition(target)?;
        }
        self.wake.notify_one();
        Ok(Some(reply::ACK.to_string()))
    }
}

fn require_idle(state: RobotState) -> Result<()> {
    match state {
        RobotState::Idle => Ok(()),
        s if s.is_operating() => Err(ControlError::Busy("robot_busy".to_string())),
        RobotState::Emergency => Err(ControlError::Busy("emergency".to_string())),
        _ => Err(ControlError::Busy("not_connected".to_string())),
    }
}

fn error_response(err: &ControlError) -> String {
    match err {
        // The motor command has its own literal reject token on the wire
        ControlError::Protocol(reason) if reason.as_str() == "invalid_motor" => {
            reply::INVALID_MOTOR.to_string()
        }
        ControlError::Protocol(reason) => reply::error(reason),
        ControlError::Busy(reason) => reply::error(reason),
        ControlError::Transition { .. } => reply::error("wrong_state"),
        _ => reply::error("internal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimActuator;
    use crate::core::ControlCore;
    use crate::mailbox::{Outbox, OutboxReceiver};
    use std::time::Duration;

    struct Fixture {
        dispatcher: CommandDispatcher,
        core: SharedCore,
        actuator: Arc<SimActuator>,
        outbound: OutboxReceiver,
        wake: Arc<Notify>,
        stop: StopFlag,
    }

    fn fixture() -> Fixture {
        let core = ControlCore::shared(300, 50);
        let actuator = Arc::new(SimActuator::new());
        let (outbox, outbound) = Outbox::channel(Duration::from_millis(200));
        let stop = StopFlag::new();
        let wake = Arc::new(Notify::new());
        let dispatcher = CommandDispatcher::new(
            core.clone(),
            actuator.clone(),
            outbox,
            stop.clone(),
            wake.clone(),
        );
        Fixture {
            dispatcher,
            core,
            actuator,
            outbound,
            wake,
            stop,
        }
    }

    async fn connect(core: &SharedCore) {
        core.lock()
            .await
            .machine
            .transition(RobotState::Idle)
            .unwrap();
    }

    #[tokio::test]
    async fn move_from_idle_acks_and_stages_operation() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("move 10 20 30 0").await;
        assert_eq!(f.outbound.next().await.unwrap(), "ack");
        let mut core = f.core.lock().await;
        assert_eq!(core.state(), RobotState::Moving);
        assert_eq!(
            core.take_pending(),
            Some(PendingOp::Move {
                x: 10.0,
                y: 20.0,
                z: 30.0,
                u: 0.0
            })
        );
    }

    #[tokio::test]
    async fn move_rejected_while_busy_without_state_change() {
        let mut f = fixture();
        connect(&f.core).await;
        f.core
            .lock()
            .await
            .machine
            .transition(RobotState::Inserting)
            .unwrap();
        f.dispatcher.handle_line("move 1 2 3 4").await;
        assert_eq!(f.outbound.next().await.unwrap(), "ERROR robot_busy");
        assert_eq!(f.core.lock().await.state(), RobotState::Inserting);
    }

    #[tokio::test]
    async fn queue_replaces_and_answers_token() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("queue 1 2 3 4 5 6").await;
        assert_eq!(f.outbound.next().await.unwrap(), "QUEUE_APPENDED");
        let core = f.core.lock().await;
        assert_eq!(core.queue.len(), 3);
        assert_eq!(core.queue.cursor(), 0);
    }

    #[tokio::test]
    async fn oversized_queue_is_clamped_to_capacity() {
        let mut f = fixture();
        connect(&f.core).await;
        let mut line = String::from("queue");
        for i in 0..350 {
            line.push_str(&format!(" {} {}", i, i));
        }
        f.dispatcher.handle_line(&line).await;
        assert_eq!(f.outbound.next().await.unwrap(), "QUEUE_APPENDED");
        assert_eq!(f.core.lock().await.queue.len(), 300);
    }

    #[tokio::test]
    async fn insert_requires_non_empty_queue() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("insert").await;
        assert_eq!(f.outbound.next().await.unwrap(), "ERROR empty_queue");
        assert_eq!(f.core.lock().await.state(), RobotState::Idle);
    }

    #[tokio::test]
    async fn insert_transitions_and_wakes_scheduler() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("queue 1 2").await;
        f.outbound.next().await.unwrap();
        let notified = f.wake.notified();
        f.dispatcher.handle_line("insert").await;
        assert_eq!(f.outbound.next().await.unwrap(), "ack");
        notified.await;
        assert_eq!(f.core.lock().await.state(), RobotState::Inserting);
    }

    #[tokio::test]
    async fn speed_out_of_range_leaves_factor_unchanged() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("speed 150").await;
        assert_eq!(f.outbound.next().await.unwrap(), "ERROR speed_out_of_range");
        assert_eq!(f.core.lock().await.speed_factor(), 50);
    }

    #[tokio::test]
    async fn speed_in_range_is_applied_to_actuator() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("speed 30").await;
        assert_eq!(f.outbound.next().await.unwrap(), "SPEED_SET 30");
        assert_eq!(f.core.lock().await.speed_factor(), 30);
        assert_eq!(f.actuator.speed_factor(), 30);
    }

    #[tokio::test]
    async fn motor_commands_drive_actuator_power() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("motor on").await;
        assert_eq!(f.outbound.next().await.unwrap(), "MOTOR_ON");
        assert!(f.actuator.motor_is_on());
        f.dispatcher.handle_line("motor sideways").await;
        assert_eq!(f.outbound.next().await.unwrap(), "INVALID_MOTOR");
        f.dispatcher.handle_line("motor off").await;
        assert_eq!(f.outbound.next().await.unwrap(), "MOTOR_OFF");
        assert!(!f.actuator.motor_is_on());
    }

    #[tokio::test]
    async fn stop_with_no_active_operation_never_errors() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("queue 1 2").await;
        f.outbound.next().await.unwrap();
        f.dispatcher.handle_line("stop").await;
        assert_eq!(f.outbound.next().await.unwrap(), "STOPPED");
        let core = f.core.lock().await;
        assert_eq!((core.queue.len(), core.queue.cursor()), (0, 0));
        // No iteration was running, so the flag must not linger
        assert!(!f.stop.is_raised());
    }

    #[tokio::test]
    async fn stop_during_operation_leaves_flag_for_scheduler() {
        let f = fixture();
        connect(&f.core).await;
        {
            let mut core = f.core.lock().await;
            core.queue.set_all(&[crate::queue::CoordinateJob { x: 1.0, y: 2.0 }]);
            core.machine.transition(RobotState::Inserting).unwrap();
        }
        f.dispatcher.handle_line("stop").await;
        assert!(f.stop.is_raised());
        assert!(f.core.lock().await.queue.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_reports_error_token() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("levitate").await;
        assert_eq!(f.outbound.next().await.unwrap(), "ERROR unknown_command");
        assert_eq!(f.core.lock().await.state(), RobotState::Idle);
    }

    #[tokio::test]
    async fn echo_and_where_answer_inline() {
        let mut f = fixture();
        connect(&f.core).await;
        f.dispatcher.handle_line("echo 0 1 2 3").await;
        assert_eq!(f.outbound.next().await.unwrap(), "echo 0 1 2 3");
        f.dispatcher.handle_line("where").await;
        assert_eq!(
            f.outbound.next().await.unwrap(),
            "POSE 0.00, 0.00, 0.00, 0.00"
        );
    }
}
