//! What the now-playing widget should show for a given status.

use nowplaying_proto::config::EmbedConfig;
use serde::Serialize;
use url::Url;

use crate::status::LiveStatus;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NowPlayingView {
    /// Initial window: no answer yet and the startup timeout has not fired.
    Checking,
    /// Nothing playing, or the service could not be reached.
    Idle,
    Listening {
        track_id: String,
        title: Option<String>,
        artist: Option<String>,
        /// "Artist – Title" when known, otherwise the track id.
        label: String,
        /// Playback progress in 0.0..=1.0.
        progress: Option<f64>,
        embed_url: Option<Url>,
        /// The embed is reloading for a new track and has not reported ready.
        refreshing: bool,
    },
}

impl NowPlayingView {
    pub fn from_status(status: &LiveStatus, embed: &EmbedConfig) -> Self {
        if status.is_checking() {
            return NowPlayingView::Checking;
        }
        let Some(id) = status.track.active_id() else {
            return NowPlayingView::Idle;
        };
        NowPlayingView::Listening {
            track_id: id.to_string(),
            title: status.track.title.clone(),
            artist: status.track.artist.clone(),
            label: status.track.display().unwrap_or_else(|| id.to_string()),
            progress: status.track.progress_ratio(),
            embed_url: embed_url(&embed.base_url, id),
            refreshing: status.refreshing,
        }
    }

    pub fn headline(&self) -> String {
        match self {
            NowPlayingView::Checking => "Checking music status...".to_string(),
            NowPlayingView::Idle => "Not listening to music right now".to_string(),
            NowPlayingView::Listening { label, .. } => {
                format!("Currently listening to: {}", label)
            }
        }
    }
}

/// `<base>/<id>?utm_source=generator`, with the id encoded as a single
/// path segment.  `None` when the base is not a usable URL.
pub fn embed_url(base: &str, track_id: &str) -> Option<Url> {
    let mut url = Url::parse(base).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push(track_id);
    url.query_pairs_mut().clear().append_pair("utm_source", "generator");
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowplaying_proto::track::PlayingTrack;

    fn responded(track: PlayingTrack) -> LiveStatus {
        LiveStatus {
            loading: false,
            has_responded: true,
            track,
            ..Default::default()
        }
    }

    #[test]
    fn test_checking_until_first_answer() {
        let view = NowPlayingView::from_status(&LiveStatus::default(), &EmbedConfig::default());
        assert_eq!(view, NowPlayingView::Checking);
        assert_eq!(view.headline(), "Checking music status...");
    }

    #[test]
    fn test_idle_when_not_playing_even_with_stale_id() {
        let status = responded(PlayingTrack {
            is_playing: false,
            id: Some("stale".into()),
            ..Default::default()
        });
        let view = NowPlayingView::from_status(&status, &EmbedConfig::default());
        assert_eq!(view, NowPlayingView::Idle);
    }

    #[test]
    fn test_listening_builds_embed_url() {
        let status = responded(PlayingTrack {
            is_playing: true,
            id: Some("4uLU6hMCjMI75M1A2tKUQC".into()),
            title: Some("Never Gonna Give You Up".into()),
            artist: Some("Rick Astley".into()),
            ..Default::default()
        });
        let view = NowPlayingView::from_status(&status, &EmbedConfig::default());
        match &view {
            NowPlayingView::Listening { embed_url, .. } => assert_eq!(
                embed_url.as_ref().map(Url::as_str),
                Some("https://open.spotify.com/embed/track/4uLU6hMCjMI75M1A2tKUQC?utm_source=generator")
            ),
            other => panic!("expected Listening, got {:?}", other),
        }
        assert_eq!(
            view.headline(),
            "Currently listening to: Rick Astley \u{2013} Never Gonna Give You Up"
        );
    }

    #[test]
    fn test_listening_falls_back_to_id_and_mirrors_refreshing() {
        let mut status = responded(PlayingTrack {
            is_playing: true,
            id: Some("abc".into()),
            artist: Some("  ".into()),
            progress_ms: Some(30_000),
            duration_ms: Some(120_000),
            ..Default::default()
        });
        status.refreshing = true;
        let view = NowPlayingView::from_status(&status, &EmbedConfig::default());
        match &view {
            NowPlayingView::Listening {
                label,
                progress,
                refreshing,
                ..
            } => {
                assert_eq!(label, "abc");
                assert_eq!(*progress, Some(0.25));
                assert!(*refreshing);
            }
            other => panic!("expected Listening, got {:?}", other),
        }
        assert_eq!(view.headline(), "Currently listening to: abc");

        // A bare change flag without a pending reload does not count.
        status.refreshing = false;
        status.track_changed = true;
        match NowPlayingView::from_status(&status, &EmbedConfig::default()) {
            NowPlayingView::Listening { refreshing, .. } => assert!(!refreshing),
            other => panic!("expected Listening, got {:?}", other),
        }
    }

    #[test]
    fn test_embed_url_escapes_hostile_ids() {
        let url = embed_url("https://open.spotify.com/embed/track/", "../x?y#z").unwrap();
        assert_eq!(
            url.as_str(),
            "https://open.spotify.com/embed/track/..%2Fx%3Fy%23z?utm_source=generator"
        );
        assert!(embed_url("not a url", "abc").is_none());
    }
}
