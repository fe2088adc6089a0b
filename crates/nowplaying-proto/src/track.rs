//! Playback status as reported by the listening service.
//!
//! A `PlayingTrack` is a plain value: every accepted status response
//! replaces the previous one wholesale.  Track fields are only meaningful
//! while `is_playing` is true; a stale id can survive in a "not playing"
//! payload, so readers go through [`PlayingTrack::active_id`].

use serde::{Deserialize, Serialize};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayingTrack {
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_url: Option<String>,
    /// Elapsed position.  The producer keeps snake_case for the two timing fields.
    #[serde(default, rename = "progress_ms", skip_serializing_if = "Option::is_none")]
    pub progress_ms: Option<u64>,
    #[serde(default, rename = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl PlayingTrack {
    /// The "unknown / not playing" value held before any response arrives.
    pub fn not_playing() -> Self {
        Self::default()
    }

    /// Track id, but only while something is actually playing.
    pub fn active_id(&self) -> Option<&str> {
        if !self.is_playing {
            return None;
        }
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// "Artist – Title", "Title", or None when neither is known.
    pub fn display(&self) -> Option<String> {
        if !self.is_playing {
            return None;
        }
        let title = self.title.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let artist = self.artist.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match (artist, title) {
            (Some(a), Some(t)) => Some(format!("{} \u{2013} {}", a, t)),
            (None, Some(t)) => Some(t.to_string()),
            _ => None,
        }
    }

    /// Playback progress in 0.0..=1.0 when both timings are present.
    pub fn progress_ratio(&self) -> Option<f64> {
        let progress = self.progress_ms?;
        let duration = self.duration_ms.filter(|d| *d > 0)?;
        Some((progress as f64 / duration as f64).clamp(0.0, 1.0))
    }

    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity {
            is_playing: self.is_playing,
            id: self.id.clone(),
        }
    }
}

// ── Change detection ──────────────────────────────────────────────────────────

/// What counts as "a different track": the playing flag and the id.
/// Progress and display metadata are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackIdentity {
    pub is_playing: bool,
    pub id: Option<String>,
}

/// Tracks identity changes between accepted values and drives the
/// "content is refreshing" indicator of an embedded player.
///
/// A change invalidates the loaded embed until the embed reports ready
/// through [`ChangeTracker::mark_ready`].
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    last: TrackIdentity,
    refreshing: bool,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted value.  Returns true when its identity differs
    /// from the previous one.
    pub fn observe(&mut self, track: &PlayingTrack) -> bool {
        let identity = track.identity();
        if identity == self.last {
            return false;
        }
        self.last = identity;
        self.refreshing = true;
        true
    }

    /// The embedded presentation finished loading the current track.
    pub fn mark_ready(&mut self) {
        self.refreshing = false;
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn last(&self) -> &TrackIdentity {
        &self.last
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(id: &str) -> PlayingTrack {
        PlayingTrack {
            is_playing: true,
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_full_payload() {
        let json = r#"{
            "isPlaying": true,
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "title": "Never Gonna Give You Up",
            "artist": "Rick Astley",
            "albumImageUrl": "https://i.scdn.co/image/abc",
            "songUrl": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC",
            "progress_ms": 60000,
            "duration_ms": 213000
        }"#;
        let track: PlayingTrack = serde_json::from_str(json).unwrap();
        assert!(track.is_playing);
        assert_eq!(track.active_id(), Some("4uLU6hMCjMI75M1A2tKUQC"));
        assert_eq!(track.artist.as_deref(), Some("Rick Astley"));
        assert_eq!(track.duration_ms, Some(213000));
    }

    #[test]
    fn test_parse_minimal_payload() {
        let track: PlayingTrack = serde_json::from_str(r#"{"isPlaying":false}"#).unwrap();
        assert_eq!(track, PlayingTrack::not_playing());
    }

    #[test]
    fn test_missing_playing_flag_is_rejected() {
        assert!(serde_json::from_str::<PlayingTrack>(r#"{"id":"abc"}"#).is_err());
    }

    #[test]
    fn test_stale_id_hidden_when_not_playing() {
        let track = PlayingTrack {
            is_playing: false,
            id: Some("stale".into()),
            title: Some("Old Song".into()),
            ..Default::default()
        };
        assert_eq!(track.active_id(), None);
        assert_eq!(track.display(), None);
    }

    #[test]
    fn test_display_and_progress() {
        let mut track = playing("x");
        assert_eq!(track.display(), None);
        track.title = Some("Hey Jude".into());
        assert_eq!(track.display().as_deref(), Some("Hey Jude"));
        track.artist = Some("The Beatles".into());
        assert_eq!(track.display().as_deref(), Some("The Beatles \u{2013} Hey Jude"));

        track.progress_ms = Some(50);
        track.duration_ms = Some(200);
        assert_eq!(track.progress_ratio(), Some(0.25));
        track.duration_ms = Some(0);
        assert_eq!(track.progress_ratio(), None);
    }

    #[test]
    fn test_change_tracker_detects_new_id() {
        let mut tracker = ChangeTracker::new();
        assert!(tracker.observe(&playing("one")));
        tracker.mark_ready();
        assert!(!tracker.is_refreshing());

        assert!(tracker.observe(&playing("two")));
        assert!(tracker.is_refreshing());
    }

    #[test]
    fn test_change_tracker_ignores_metadata_only_updates() {
        let mut tracker = ChangeTracker::new();
        tracker.observe(&playing("one"));
        tracker.mark_ready();

        let mut later = playing("one");
        later.progress_ms = Some(12_000);
        assert!(!tracker.observe(&later));
        assert!(!tracker.is_refreshing());
    }

    #[test]
    fn test_change_tracker_detects_pause() {
        let mut tracker = ChangeTracker::new();
        tracker.observe(&playing("one"));
        let mut paused = playing("one");
        paused.is_playing = false;
        assert!(tracker.observe(&paused));
        assert!(!tracker.last().is_playing);
    }

    #[test]
    fn test_initial_not_playing_is_not_a_change() {
        let mut tracker = ChangeTracker::new();
        assert!(!tracker.observe(&PlayingTrack::not_playing()));
    }
}
