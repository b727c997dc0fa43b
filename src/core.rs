//! Shared kernel state
//!
//! All mutable state the three tasks touch (state machine, job queue, speed
//! factor, pending operation) lives in one struct behind a single mutex.
//! Tasks never write fields from outside the lock, and the lock is never
//! held across an actuator call.

use crate::queue::JobQueue;
use crate::state::{RobotState, StateMachine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Single-shot operation handed from the dispatcher to the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingOp {
    Move { x: f64, y: f64, z: f64, u: f64 },
    LoadMagazine { count: u32 },
}

/// Mutex-guarded kernel state
#[derive(Debug)]
pub struct ControlCore {
    pub machine: StateMachine,
    pub queue: JobQueue,
    speed_factor: u8,
    pending: Option<PendingOp>,
    magazine_count: u32,
}

pub type SharedCore = Arc<Mutex<ControlCore>>;

impl ControlCore {
    pub fn new(queue_capacity: usize, default_speed: u8) -> Self {
        Self {
            machine: StateMachine::new(),
            queue: JobQueue::new(queue_capacity),
            speed_factor: default_speed,
            pending: None,
            magazine_count: 0,
        }
    }

    pub fn shared(queue_capacity: usize, default_speed: u8) -> SharedCore {
        Arc::new(Mutex::new(Self::new(queue_capacity, default_speed)))
    }

    pub fn state(&self) -> RobotState {
        self.machine.current()
    }

    pub fn speed_factor(&self) -> u8 {
        self.speed_factor
    }

    pub fn set_speed_factor(&mut self, factor: u8) {
        self.speed_factor = factor;
    }

    /// Stage the operation the scheduler executes on its next wake
    pub fn set_pending(&mut self, op: PendingOp) {
        self.pending = Some(op);
    }

    /// Consume the staged operation, if any
    pub fn take_pending(&mut self) -> Option<PendingOp> {
        self.pending.take()
    }

    pub fn magazine_count(&self) -> u32 {
        self.magazine_count
    }

    pub fn set_magazine_count(&mut self, count: u32) {
        self.magazine_count = count;
    }

    /// Consistent (state, cursor, queue length) snapshot for status lines
    pub fn snapshot(&self) -> (RobotState, usize, usize) {
        (self.machine.current(), self.queue.cursor(), self.queue.len())
    }
}

/// Cooperative cancellation flag for an in-flight queue iteration.
///
/// Set by the network fast path and the dispatcher, observed by the
/// scheduler at each iteration boundary. Actuator calls themselves are
/// never interrupted.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
