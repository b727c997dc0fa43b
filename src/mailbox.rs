//! Single-slot message mailboxes
//!
//! Protocol messages between the network task and the rest of the kernel go
//! through bounded channels of capacity 1. A producer facing a full slot
//! waits up to the configured timeout and then drops the message with a log
//! line: a stuck consumer costs a message, never a deadlock.
//!
//! The outbound side carries two lanes. Command replies are back-pressured
//! and never silently superseded; periodic status lines ride a latest-wins
//! slot, so a tick the writer has not picked up yet is replaced by the next
//! one. The socket writer drains replies first.

use crate::{ControlError, Result};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Sending half of a single-slot mailbox
#[derive(Clone)]
pub struct Mailbox {
    tx: mpsc::Sender<String>,
    timeout: Duration,
    label: &'static str,
}

impl Mailbox {
    /// Create a mailbox with one pending slot and its receiving half
    pub fn channel(timeout: Duration, label: &'static str) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx, timeout, label }, rx)
    }

    /// Post a message, waiting for the slot to clear.
    ///
    /// On timeout the message is dropped and logged, matching the
    /// loss-over-stall contract of the wire protocol.
    pub async fn post(&self, message: String) -> Result<()> {
        match self.tx.send_timeout(message, self.timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(message)) => {
                warn!(
                    "{} mailbox not consumed within {:?}, dropping: {}",
                    self.label, self.timeout, message
                );
                Err(ControlError::MailboxTimeout(self.label))
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(ControlError::MailboxTimeout(self.label))
            }
        }
    }
}

/// Producer side of the outbound lanes
#[derive(Clone)]
pub struct Outbox {
    replies: Mailbox,
    status_tx: watch::Sender<Option<String>>,
}

/// Consumer side of the outbound lanes, held by the socket writer
pub struct OutboxReceiver {
    replies: mpsc::Receiver<String>,
    status: watch::Receiver<Option<String>>,
}

impl Outbox {
    pub fn channel(timeout: Duration) -> (Self, OutboxReceiver) {
        let (replies, replies_rx) = Mailbox::channel(timeout, "outbound reply");
        let (status_tx, status_rx) = watch::channel(None);
        (
            Self { replies, status_tx },
            OutboxReceiver {
                replies: replies_rx,
                status: status_rx,
            },
        )
    }

    /// Queue a command acknowledgement or completion token (back-pressured)
    pub async fn reply(&self, message: String) -> Result<()> {
        self.replies.post(message).await
    }

    /// Publish a status line; a tick still unconsumed is overwritten, so
    /// the writer always sees the freshest sample
    pub fn status(&self, message: String) {
        let _ = self.status_tx.send(Some(message));
    }
}

impl OutboxReceiver {
    /// Next line to put on the wire, replies before status.
    ///
    /// Returns `None` once both producer halves are gone.
    pub async fn next(&mut self) -> Option<String> {
        // A waiting reply always wins over a status tick
        if let Ok(message) = self.replies.try_recv() {
            return Some(message);
        }
        loop {
            tokio::select! {
                biased;
                reply = self.replies.recv() => {
                    match reply {
                        Some(message) => return Some(message),
                        // Reply lane closed, fall through to drain status
                        None => {
                            while self.status.changed().await.is_ok() {
                                if let Some(message) = self.status.borrow_and_update().clone() {
                                    return Some(message);
                                }
                            }
                            return None;
                        }
                    }
                }
                changed = self.status.changed() => {
                    match changed {
                        Ok(()) => {
                            if let Some(message) = self.status.borrow_and_update().clone() {
                                return Some(message);
                            }
                        }
                        // Status lane closed, keep serving replies
                        Err(_) => return self.replies.recv().await,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_and_consume() {
        let (mailbox, mut rx) = Mailbox::channel(Duration::from_millis(50), "inbound");
        mailbox.post("move 1 2 3 4".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "move 1 2 3 4");
    }

    #[tokio::test]
    async fn unconsumed_message_is_dropped_after_timeout() {
        let (mailbox, _rx) = Mailbox::channel(Duration::from_millis(50), "inbound");
        mailbox.post("first".to_string()).await.unwrap();
        let err = mailbox.post("second".to_string()).await.unwrap_err();
        assert!(matches!(err, ControlError::MailboxTimeout(_)));
    }

    #[tokio::test]
    async fn second_writer_waits_for_slot() {
        let (mailbox, mut rx) = Mailbox::channel(Duration::from_millis(200), "outbound reply");
        mailbox.post("POSITION_REACHED".to_string()).await.unwrap();
        let writer = {
            let mailbox = mailbox.clone();
            tokio::spawn(async move { mailbox.post("STOPPED".to_string()).await })
        };
        // Consumer drains the slot; the blocked writer must then succeed
        assert_eq!(rx.recv().await.unwrap(), "POSITION_REACHED");
        writer.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap(), "STOPPED");
    }

    #[tokio::test]
    async fn replies_drain_before_status() {
        let (outbox, mut rx) = Outbox::channel(Duration::from_millis(100));
        outbox.status("STATUS IDLE".to_string());
        outbox.reply("INSERT_DONE".to_string()).await.unwrap();
        assert_eq!(rx.next().await.unwrap(), "INSERT_DONE");
        assert_eq!(rx.next().await.unwrap(), "STATUS IDLE");
    }

    #[tokio::test]
    async fn pending_status_is_superseded_not_queued() {
        let (outbox, mut rx) = Outbox::channel(Duration::from_millis(100));
        outbox.status("STATUS tick-1".to_string());
        outbox.status("STATUS tick-2".to_string());
        // tick-1 was never consumed; the fresher sample replaces it
        assert_eq!(rx.next().await.unwrap(), "STATUS tick-2");
        outbox.status("STATUS tick-3".to_string());
        assert_eq!(rx.next().await.unwrap(), "STATUS tick-3");
    }
}
