//! Periodic status broadcasting
//!
//! Emits an unsolicited telemetry line at a fixed interval. Ticks ride the
//! latest-wins status lane, so a slow client sees the freshest sample and
//! never stalls the kernel.

use crate::actuator::Actuator;
use crate::core::SharedCore;
use crate::mailbox::Outbox;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

pub struct StatusBroadcaster {
    core: SharedCore,
    actuator: Arc<dyn Actuator>,
    outbox: Outbox,
    period: Duration,
}

impl StatusBroadcaster {
    pub fn new(
        core: SharedCore,
        actuator: Arc<dyn Actuator>,
        outbox: Outbox,
        period: Duration,
    ) -> Self {
        Self {
            core,
            actuator,
            outbox,
            period,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;
            let line = self.compose().await;
            self.outbox.status(line);
        }
    }

    /// `STATUS <state>, <x>, <y>, <z>, <u>, <index>, <queueSize>`
    pub async fn compose(&self) -> String {
        let (state, cursor, len) = self.core.lock().await.snapshot();
        let pose = self.actuator.current_pose();
        format!(
            "STATUS {}, {:.2}, {:.2}, {:.2}, {:.2}, {}, {}",
            state, pose[0], pose[1], pose[2], pose[3], cursor, len
        )
    }
}
