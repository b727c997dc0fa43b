//! Bounded coordinate job queue
//!
//! Ordered sequence of insertion/test points with a cursor. The invariant
//! `0 <= cursor <= len <= capacity` holds after every operation.

use tracing::warn;

/// One coordinate entry, millimeters in the robot frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateJob {
    pub x: f64,
    pub y: f64,
}

/// Bounded ordered queue of coordinate jobs with a processing cursor
#[derive(Debug)]
pub struct JobQueue {
    jobs: Vec<CoordinateJob>,
    cursor: usize,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            cursor: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replace the whole queue and rewind the cursor.
    ///
    /// Submissions beyond capacity are truncated, not rejected. Returns the
    /// number of jobs actually stored.
    pub fn set_all(&mut self, coords: &[CoordinateJob]) -> usize {
        let stored = coords.len().min(self.capacity);
        if stored < coords.len() {
            warn!(
                "Queue submission of {} jobs truncated to capacity {}",
                coords.len(),
                self.capacity
            );
        }
        self.jobs.clear();
        self.jobs.extend_from_slice(&coords[..stored]);
        self.cursor = 0;
        stored
    }

    /// Wipe all entries and rewind the cursor
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.cursor = 0;
    }

    /// Job under the cursor, if the queue is not exhausted
    pub fn current(&self) -> Option<CoordinateJob> {
        self.jobs.get(self.cursor).copied()
    }

    /// Move the cursor past the job just completed
    pub fn advance(&mut self) {
        if self.cursor < self.jobs.len() {
            self.cursor += 1;
        }
    }

    /// True once every job has been processed
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.jobs.len()
    }
}
