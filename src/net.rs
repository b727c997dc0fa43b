//! TCP connection management
//!
//! Owns the listener and the socket lifecycle: accept with a bounded wait,
//! assemble newline-terminated lines into the inbound mailbox, drain the
//! outbound lanes onto the socket, and reconnect forever on any transport
//! fault. A network error is never fatal to the process.

use crate::command::{self, LINE_ENDING};
use crate::core::{SharedCore, StopFlag};
use crate::mailbox::{Mailbox, OutboxReceiver};
use crate::state::RobotState;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub struct ConnectionManager {
    listen_addr: String,
    accept_timeout: Duration,
    inbound: Mailbox,
    outbound: OutboxReceiver,
    core: SharedCore,
    stop: StopFlag,
}

impl ConnectionManager {
    pub fn new(
        listen_addr: String,
        accept_timeout: Duration,
        inbound: Mailbox,
        outbound: OutboxReceiver,
        core: SharedCore,
        stop: StopFlag,
    ) -> Self {
        Self {
            listen_addr,
            accept_timeout,
            inbound,
            outbound,
            core,
            stop,
        }
    }

    /// Bind once, then serve clients one at a time forever
    pub async fn run(mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.listen_addr))?;
        info!("Command server listening on {}", self.listen_addr);

        loop {
            let stream = match timeout(self.accept_timeout, listener.accept()).await {
                // No client yet, keep waiting
                Err(_) => {
                    debug!("No client within {:?}, retrying accept", self.accept_timeout);
                    continue;
                }
                Ok(Err(e)) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
                Ok(Ok((stream, peer))) => {
                    info!("Client connected from {}", peer);
                    stream
                }
            };

            self.on_connect().await;
            if let Err(e) = self.serve(stream).await {
                error!("Connection error: {}", e);
            } else {
                info!("Client disconnected");
            }
            self.on_disconnect().await;
        }
    }

    async fn on_connect(&self) {
        let mut core = self.core.lock().await;
        // A cancel raised while the link was down must not leak into the
        // new session and swallow its first queue pass
        self.stop.clear();
        if let Err(e) = core.machine.transition(RobotState::Idle) {
            // EMERGENCY survives a reconnect; the operator sees it in status
            warn!("Client attached but state held: {}", e);
        }
    }

    /// Mark the link down and cancel any in-flight queue iteration
    async fn on_disconnect(&self) {
        let mut core = self.core.lock().await;
        if core.state().is_operating() {
            warn!("Client lost mid-operation, raising stop");
            self.stop.raise();
        }
        let _ = core.machine.transition(RobotState::Disconnected);
    }

    /// Pump one client connection until EOF or a socket error
    async fn serve(&mut self, stream: TcpStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line.context("Socket read failed")? {
                        None => return Ok(()),
                        Some(raw) => {
                            let line = raw.trim_end_matches('\r').to_string();
                            if line.is_empty() {
                                continue;
                            }
                            // stop bypasses the mailbox so an in-flight queue
                            // pass observes it even while dispatch is blocked
                            if command::is_stop_line(&line) {
                                let operating = self.core.lock().await.state().is_operating();
                                if operating {
                                    info!("stop intercepted at network layer");
                                    self.stop.raise();
                                }
                            }
                            let _ = self.inbound.post(line).await;
                        }
                    }
                }
                message = self.outbound.next() => {
                    match message {
                        None => return Ok(()),
                        Some(message) => {
                            writer
                                .write_all(message.as_bytes())
                                .await
                                .context("Socket write failed")?;
                            writer
                                .write_all(LINE_ENDING.as_bytes())
                                .await
                                .context("Socket write failed")?;
                        }
                    }
                }
            }
        }
    }
}
