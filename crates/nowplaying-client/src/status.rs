//! Observable state of a live-status client and the gate that publishes it.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use nowplaying_proto::track::PlayingTrack;
use serde::Serialize;
use tokio::sync::watch;

/// Connection progress.  `Connecting` is re-entered after every drop;
/// `has_responded` on [`LiveStatus`] is what survives reconnects.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Connecting,
    /// Open, request sent, nothing accepted yet on this connection.
    AwaitingResponse,
    /// At least one status accepted on this connection.
    Steady,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LiveStatus {
    pub loading: bool,
    pub has_responded: bool,
    pub track: PlayingTrack,
    pub phase: Phase,
    /// False while in the disconnected substate.
    pub connected: bool,
    /// Identity of the track changed with the latest accepted response.
    pub track_changed: bool,
    /// The embed is reloading for a changed track and has not reported
    /// ready yet.  Unlike `track_changed` this survives repeated polls.
    pub refreshing: bool,
    /// When the latest status was accepted.
    pub updated_at: Option<DateTime<Utc>>,
    pub reconnects: u64,
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self {
            loading: true,
            has_responded: false,
            track: PlayingTrack::not_playing(),
            phase: Phase::Connecting,
            connected: false,
            track_changed: false,
            refreshing: false,
            updated_at: None,
            reconnects: 0,
        }
    }
}

impl LiveStatus {
    /// Still inside the initial "checking" window.
    pub fn is_checking(&self) -> bool {
        self.loading && !self.has_responded
    }

    /// Stop the spinner without touching the track.
    pub(crate) fn settle(&mut self) -> bool {
        let changed = self.loading || !self.has_responded;
        self.loading = false;
        self.has_responded = true;
        changed
    }
}

/// Owns the `watch` sender.  Once halted, every publish is dropped, so no
/// state change is visible after `stop()` returns.
pub(crate) struct StatusCell {
    tx: watch::Sender<LiveStatus>,
    halted: Mutex<bool>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(LiveStatus::default());
        Self {
            tx,
            halted: Mutex::new(false),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LiveStatus> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> LiveStatus {
        self.tx.borrow().clone()
    }

    /// Apply `f` and notify subscribers if it reports a change.
    /// Returns false when halted or nothing changed.
    pub(crate) fn publish<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut LiveStatus) -> bool,
    {
        let halted = self.halted.lock().unwrap_or_else(PoisonError::into_inner);
        if *halted {
            return false;
        }
        self.tx.send_if_modified(f)
    }

    /// Returns true only for the call that actually halted the cell.
    pub(crate) fn halt(&self) -> bool {
        let mut halted = self.halted.lock().unwrap_or_else(PoisonError::into_inner);
        !std::mem::replace(&mut *halted, true)
    }

    pub(crate) fn is_halted(&self) -> bool {
        *self.halted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
