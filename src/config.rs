//! Configuration loading for the insertion controller

use crate::{ControlError, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub motion: MotionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Address the command server binds to
    pub bind_addr: String,
    pub port: u16,
    /// How long a single accept attempt waits before retrying
    pub accept_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Maximum number of coordinate jobs held at once
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusConfig {
    /// Interval between unsolicited status lines
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailboxConfig {
    /// Back-pressure timeout before a pending message is dropped
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Z level used when traversing between jobs (mm)
    pub approach_z: f64,
    /// Z level driven to during an insertion (mm)
    pub insert_z: f64,
    /// Jump arc ceiling handed to the actuator (mm)
    pub travel_limit_z: f64,
    /// Pose presented to the operator for magazine loading [x, y, z, u]
    pub load_pose: [f64; 4],
    /// Speed factor applied at startup (1-100)
    pub default_speed: Option<u8>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8501,
            accept_timeout_secs: Some(10),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: Some(300) }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { interval_ms: Some(500) }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self { timeout_secs: Some(2) }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            approach_z: -75.0,
            insert_z: -140.0,
            travel_limit_z: -18.0,
            load_pose: [0.0, 0.0, -18.0, 0.0],
            default_speed: Some(50),
        }
    }
}

impl DaemonConfig {
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| ControlError::Config(format!("Failed to read {}: {}", config_path, e)))?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: DaemonConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity() == 0 {
            return Err(ControlError::Config("queue capacity must be > 0".to_string()));
        }
        let speed = self.default_speed();
        if !(1..=100).contains(&speed) {
            return Err(ControlError::Config(format!(
                "default speed {} outside 1-100",
                speed
            )));
        }
        Ok(())
    }

    /// Queue capacity with default fallback
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity.unwrap_or(300)
    }

    /// Status broadcast interval with default fallback
    pub fn status_interval_ms(&self) -> u64 {
        self.status.interval_ms.unwrap_or(500)
    }

    /// Mailbox back-pressure timeout with default fallback
    pub fn mailbox_timeout_secs(&self) -> u64 {
        self.mailbox.timeout_secs.unwrap_or(2)
    }

    /// Accept timeout with default fallback
    pub fn accept_timeout_secs(&self) -> u64 {
        self.network.accept_timeout_secs.unwrap_or(10)
    }

    /// Startup speed factor with default fallback
    pub fn default_speed(&self) -> u8 {
        self.motion.default_speed.unwrap_or(50)
    }

    /// Socket address the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind_addr, self.network.port)
    }
}
