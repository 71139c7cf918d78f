//! Channel-based panel source.
//!
//! Receives cycle outcomes from the background poll loop via a tokio watch
//! channel.

use std::sync::Arc;

use tokio::sync::{watch, Notify};

use super::PanelSource;
use crate::poll::CycleOutcome;

/// A panel source fed by [`spawn_poll_loop`](crate::poll::spawn_poll_loop).
///
/// # Example
///
/// ```
/// use monit_doctor::ChannelSource;
///
/// // Create a channel pair
/// let (tx, source) = ChannelSource::create("2 instances");
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    receiver: watch::Receiver<Option<CycleOutcome>>,
    description: String,
    refresh: Option<Arc<Notify>>,
}

impl ChannelSource {
    /// Create a new channel source.
    ///
    /// * `receiver` - The receiving end of a watch channel
    /// * `source_description` - Where outcomes come from (e.g. "3 instances")
    pub fn new(receiver: watch::Receiver<Option<CycleOutcome>>, source_description: &str) -> Self {
        Self {
            receiver,
            description: format!("poll: {}", source_description),
            refresh: None,
        }
    }

    /// Create a channel pair for sending outcomes to a ChannelSource.
    ///
    /// The channel starts empty: nothing is returned by [`PanelSource::poll`]
    /// until the first cycle has been sent.
    pub fn create(source_description: &str) -> (watch::Sender<Option<CycleOutcome>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self::new(rx, source_description))
    }

    /// Notify `refresh` when a refresh is requested.
    pub fn with_refresh(mut self, refresh: Arc<Notify>) -> Self {
        self.refresh = Some(refresh);
        self
    }
}

impl PanelSource for ChannelSource {
    fn poll(&mut self) -> Option<CycleOutcome> {
        if !self.receiver.has_changed().unwrap_or(false) {
            return None;
        }
        self.receiver.borrow_and_update().clone()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        // Fetch errors travel inside the outcome itself
        None
    }

    fn refresh(&mut self) {
        if let Some(refresh) = &self.refresh {
            refresh.notify_one();
        }
    }
}
