//! Operation scheduler
//!
//! Executes the operation implied by the current robot state: a single
//! staged move, or one pass over the job queue for insert/test runs. The
//! task sleeps on the dispatcher's wake signal instead of polling, and the
//! shared lock is released across every actuator call so `stop` and status
//! sampling stay responsive. Actuator calls themselves are atomic and are
//! never interrupted mid-flight; cancellation is only observed at iteration
//! boundaries.

use crate::actuator::Actuator;
use crate::command::reply;
use crate::config::MotionConfig;
use crate::core::{PendingOp, SharedCore, StopFlag};
use crate::mailbox::Outbox;
use crate::queue::CoordinateJob;
use crate::state::RobotState;
use crate::Result;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Outcome of one queue pass
enum PassOutcome {
    Exhausted,
    Stopped,
    Faulted,
}

pub struct OperationScheduler {
    core: SharedCore,
    actuator: Arc<dyn Actuator>,
    outbox: Outbox,
    stop: StopFlag,
    wake: Arc<Notify>,
    motion: MotionConfig,
}

impl OperationScheduler {
    pub fn new(
        core: SharedCore,
        actuator: Arc<dyn Actuator>,
        outbox: Outbox,
        stop: StopFlag,
        wake: Arc<Notify>,
        motion: MotionConfig,
    ) -> Self {
        Self {
            core,
            actuator,
            outbox,
            stop,
            wake,
            motion,
        }
    }

    /// Sleep on the wake signal and execute whatever the dispatcher staged
    pub async fn run(self) {
        loop {
            self.wake.notified().await;
            self.run_once().await;
        }
    }

    /// Execute the operation implied by the current state, then return
    pub async fn run_once(&self) {
        let (state, pending) = {
            let mut core = self.core.lock().await;
            (core.state(), core.take_pending())
        };
        match state {
            RobotState::Moving => match pending {
                Some(PendingOp::Move { x, y, z, u }) => self.single_move(x, y, z, u).await,
                Some(PendingOp::LoadMagazine { count }) => self.load_magazine(count).await,
                None => {
                    warn!("Woken in MOVING with nothing staged");
                    self.finish(RobotState::Moving).await;
                }
            },
            RobotState::Inserting => self.queue_pass(RobotState::Inserting).await,
            RobotState::Testing => self.queue_pass(RobotState::Testing).await,
            other => {
                // Spurious wake, e.g. a stop that already cleaned up
                info!("Scheduler woken in {}, nothing to do", other);
            }
        }
    }

    async fn single_move(&self, x: f64, y: f64, z: f64, u: f64) {
        match self.actuator.move_to(x, y, z, u).await {
            Ok(()) => {
                let _ = self.outbox.reply(reply::POSITION_REACHED.to_string()).await;
                self.finish(RobotState::Moving).await;
            }
            Err(err) => self.fault(&err.to_string()).await,
        }
    }

    async fn load_magazine(&self, count: u32) {
        let [x, y, z, u] = self.motion.load_pose;
        match self.actuator.jump_to(x, y, z, u, self.motion.travel_limit_z).await {
            Ok(()) => {
                info!("Magazine load pose reached, {} parts declared", count);
                let _ = self.outbox.reply(reply::MAGAZINE_LOADED.to_string()).await;
                self.finish(RobotState::Moving).await;
            }
            Err(err) => self.fault(&err.to_string()).await,
        }
    }

    /// One pass over the queue for INSERTING or TESTING
    async fn queue_pass(&self, mode: RobotState) {
        let outcome = loop {
            let job = {
                let core = self.core.lock().await;
                if self.stop.is_raised() {
                    break PassOutcome::Stopped;
                }
                match core.queue.current() {
                    Some(job) => job,
                    None => break PassOutcome::Exhausted,
                }
            };
            let result = match mode {
                RobotState::Inserting => self.insert_sequence(job).await,
                _ => self.test_sequence(job).await,
            };
            match result {
                Ok(()) => {
                    self.core.lock().await.queue.advance();
                }
                Err(err) => {
                    self.fault(&err.to_string()).await;
                    break PassOutcome::Faulted;
                }
            }
        };
        match outcome {
            PassOutcome::Exhausted => {
                self.core.lock().await.queue.clear();
                let done = if mode == RobotState::Inserting {
                    reply::INSERT_DONE
                } else {
                    reply::TEST_DONE
                };
                let _ = self.outbox.reply(done.to_string()).await;
                self.finish(mode).await;
            }
            PassOutcome::Stopped => {
                // No DONE token on the cancelled path. The stop command
                // clears the queue itself, but a disconnect cancel raises
                // the flag without touching it, so wipe it here as well.
                info!("{} pass cancelled by stop", mode);
                self.core.lock().await.queue.clear();
                self.finish(mode).await;
            }
            PassOutcome::Faulted => {}
        }
    }

    /// Full insertion sequence for one job: approach, pick, drive, release
    async fn insert_sequence(&self, job: CoordinateJob) -> Result<()> {
        let m = &self.motion;
        self.actuator
            .jump_to(job.x, job.y, m.approach_z, 0.0, m.travel_limit_z)
            .await?;
        self.actuator.feeder_on().await?;
        self.actuator.gripper_close().await?;
        self.actuator.move_to(job.x, job.y, m.insert_z, 0.0).await?;
        self.actuator.gripper_open().await?;
        self.actuator.feeder_off().await?;
        self.actuator.move_to(job.x, job.y, m.approach_z, 0.0).await?;
        Ok(())
    }

    /// Probe sequence for one test point
    async fn test_sequence(&self, job: CoordinateJob) -> Result<()> {
        let m = &self.motion;
        self.actuator
            .jump_to(job.x, job.y, m.approach_z, 0.0, m.travel_limit_z)
            .await?;
        self.actuator.feeder_on().await?;
        self.actuator.feeder_off().await?;
        Ok(())
    }

    /// Return to IDLE if the operation state is still ours.
    ///
    /// A socket fault may have forced DISCONNECTED under our feet; that
    /// state wins. The stop flag is retired here unconditionally: any stop
    /// raised during this operation has now taken effect, and a flag left
    /// raised would cancel the next queue pass at its first boundary.
    async fn finish(&self, from: RobotState) {
        let mut core = self.core.lock().await;
        if core.state() == from {
            let _ = core.machine.transition(RobotState::Idle);
        }
        self.stop.clear();
    }

    async fn fault(&self, fault: &str) {
        let _ = self.outbox.reply(reply::TASK_FAILED.to_string()).await;
        enter_emergency(&self.core, &self.actuator, fault).await;
        self.stop.clear();
    }
}

/// Minimal safe shutdown on an unrecoverable actuator fault: release the
/// gripper, cut motor power, force EMERGENCY. The failed job is not retried
/// and the cursor is not advanced.
pub(crate) async fn enter_emergency(core: &SharedCore, actuator: &Arc<dyn Actuator>, fault: &str) {
    error!("Actuator fault, entering EMERGENCY: {}", fault);
    if let Err(e) = actuator.gripper_open().await {
        error!("Gripper release during emergency shutdown failed: {}", e);
    }
    if let Err(e) = actuator.motor_off().await {
        error!("Motor disable during emergency shutdown failed: {}", e);
    }
    let mut core = core.lock().await;
    let _ = core.machine.transition(RobotState::Emergency);
}
