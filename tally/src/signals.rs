//! Module to control shutdown in tally.
//!
//! Everything that participates in controlled shutdown does so by holding a
//! clone of [`Shutdown`]. The binary signals it once, on operator
//! interrupt, and every clone observes the signal.

use std::sync::Arc;

use tokio::sync::broadcast;

/// Errors produced by [`Shutdown`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The mechanism underlying [`Shutdown`] failed catastrophically.
    #[error("shutdown broadcast failed: {0}")]
    Broadcast(#[from] broadcast::error::SendError<()>),
}

/// Mechanism to control shutdown in tally.
#[derive(Debug)]
pub struct Shutdown {
    /// The broadcast sender, singleton for all `Shutdown` instances derived
    /// from the same root `Shutdown`.
    sender: Arc<broadcast::Sender<()>>,

    /// The receive half of the channel used to listen for shutdown. One per
    /// instance.
    notify: broadcast::Receiver<()>,

    /// `true` if the shutdown signal has been received.
    received: bool,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create a new `Shutdown` instance. There should be only one call to
    /// this function; all subsequent instances should be clones.
    #[must_use]
    pub fn new() -> Self {
        let (sender, notify) = broadcast::channel(1);

        Self {
            sender: Arc::new(sender),
            notify,
            received: false,
        }
    }

    /// Receive the shutdown notice. This function will block if a notice has
    /// not already been sent.
    pub async fn recv(&mut self) {
        if self.received {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;
        self.received = true;
    }

    /// Send the shutdown signal through to this and all derived `Shutdown`
    /// instances. Returns the number of listening instances, or error.
    ///
    /// # Errors
    ///
    /// Function will return an error if the underlying tokio broadcast
    /// mechanism fails.
    pub fn signal(&self) -> Result<usize, Error> {
        Ok(self.sender.send(())?)
    }
}

impl Clone for Shutdown {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            notify: self.sender.subscribe(),
            received: self.received,
        }
    }
}
