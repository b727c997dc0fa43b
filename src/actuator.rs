//! Actuator interface
//!
//! Abstracts the physical motion/IO primitives the kernel treats as atomic
//! external calls. Every method is synchronous from the kernel's point of
//! view: it returns once the motion or IO completes, and a failure is a
//! fatal actuator fault (no retry at this level). The trait seam lets the
//! vendor-specific driver be swapped for the simulator in tests.

use crate::{ControlError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

/// Current robot pose as [x, y, z, u]
pub type Pose = [f64; 4];

/// Physical robot operations, vendor/hardware-specific behind this seam
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Straight move to the target pose
    async fn move_to(&self, x: f64, y: f64, z: f64, u: f64) -> Result<()>;

    /// Arch move: retract to `lim_z`, traverse, descend to the target
    async fn jump_to(&self, x: f64, y: f64, z: f64, u: f64, lim_z: f64) -> Result<()>;

    async fn gripper_open(&self) -> Result<()>;
    async fn gripper_close(&self) -> Result<()>;

    async fn feeder_on(&self) -> Result<()>;
    async fn feeder_off(&self) -> Result<()>;

    async fn motor_on(&self) -> Result<()>;
    async fn motor_off(&self) -> Result<()>;

    /// Speed factor 1-100 applied to subsequent motion
    async fn set_speed_factor(&self, factor: u8) -> Result<()>;

    /// Sample the current pose; read-only, never fails into EMERGENCY
    fn current_pose(&self) -> Pose;
}

#[derive(Debug, Default)]
struct SimState {
    pose: Pose,
    motor_on: bool,
    gripper_closed: bool,
    feeder_on: bool,
    speed_factor: u8,
    motions_done: usize,
    fail_on_motion: Option<usize>,
    call_log: Vec<String>,
}

/// In-process actuator used by tests and dry runs.
///
/// Tracks pose and IO state, records every call, and can be scripted to
/// fail on the n-th motion command to exercise the EMERGENCY path.
#[derive(Debug, Default)]
pub struct SimActuator {
    state: Mutex<SimState>,
}

impl SimActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fault: the `n`-th motion call (1-based) returns an error
    pub fn fail_on_motion(&self, n: usize) {
        self.state.lock().unwrap().fail_on_motion = Some(n);
    }

    /// Ordered record of every actuator call made so far
    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().unwrap().call_log.clone()
    }

    pub fn motor_is_on(&self) -> bool {
        self.state.lock().unwrap().motor_on
    }

    pub fn gripper_is_closed(&self) -> bool {
        self.state.lock().unwrap().gripper_closed
    }

    pub fn speed_factor(&self) -> u8 {
        self.state.lock().unwrap().speed_factor
    }

    fn motion(&self, name: &str, target: Pose) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.motions_done += 1;
        state
            .call_log
            .push(format!("{} {:.2} {:.2} {:.2} {:.2}", name, target[0], target[1], target[2], target[3]));
        if state.fail_on_motion == Some(state.motions_done) {
            return Err(ControlError::Actuator(format!(
                "simulated fault during {}",
                name
            )));
        }
        state.pose = target;
        Ok(())
    }

    fn io(&self, name: &str, apply: impl FnOnce(&mut SimState)) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.call_log.push(name.to_string());
        apply(&mut state);
        Ok(())
    }
}

#[async_trait]
impl Actuator for SimActuator {
    async fn move_to(&self, x: f64, y: f64, z: f64, u: f64) -> Result<()> {
        debug!("sim move_to ({:.2}, {:.2}, {:.2}, {:.2})", x, y, z, u);
        self.motion("move_to", [x, y, z, u])
    }

    async fn jump_to(&self, x: f64, y: f64, z: f64, u: f64, _lim_z: f64) -> Result<()> {
        debug!("sim jump_to ({:.2}, {:.2}, {:.2}, {:.2})", x, y, z, u);
        self.motion("jump_to", [x, y, z, u])
    }

    async fn gripper_open(&self) -> Result<()> {
        self.io("gripper_open", |s| s.gripper_closed = false)
    }

    async fn gripper_close(&self) -> Result<()> {
        self.io("gripper_close", |s| s.gripper_closed = true)
    }

    async fn feeder_on(&self) -> Result<()> {
        self.io("feeder_on", |s| s.feeder_on = true)
    }

    async fn feeder_off(&self) -> Result<()> {
        self.io("feeder_off", |s| s.feeder_on = false)
    }

    async fn motor_on(&self) -> Result<()> {
        self.io("motor_on", |s| s.motor_on = true)
    }

    async fn motor_off(&self) -> Result<()> {
        self.io("motor_off", |s| s.motor_on = false)
    }

    async fn set_speed_factor(&self, factor: u8) -> Result<()> {
        self.io("set_speed_factor", |s| s.speed_factor = factor)
    }

    fn current_pose(&self) -> Pose {
        self.state.lock().unwrap().pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn motion_updates_pose() {
        let sim = SimActuator::new();
        sim.move_to(10.0, 20.0, -75.0, 0.0).await.unwrap();
        assert_eq!(sim.current_pose(), [10.0, 20.0, -75.0, 0.0]);
    }

    #[tokio::test]
    async fn scripted_fault_leaves_pose_untouched() {
        let sim = SimActuator::new();
        sim.move_to(1.0, 1.0, 0.0, 0.0).await.unwrap();
        sim.fail_on_motion(2);
        let err = sim.jump_to(5.0, 5.0, 0.0, 0.0, -18.0).await.unwrap_err();
        assert!(matches!(err, ControlError::Actuator(_)));
        assert_eq!(sim.current_pose(), [1.0, 1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn io_state_tracks_calls() {
        let sim = SimActuator::new();
        sim.motor_on().await.unwrap();
        sim.gripper_close().await.unwrap();
        assert!(sim.motor_is_on());
        assert!(sim.gripper_is_closed());
        sim.motor_off().await.unwrap();
        assert!(!sim.motor_is_on());
        assert!(sim.call_log().contains(&"motor_off".to_string()));
    }
}
