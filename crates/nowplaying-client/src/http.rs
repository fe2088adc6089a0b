use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use nowplaying_proto::config::EmbedConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::core::EmbedReadySignal;
use crate::status::LiveStatus;
use crate::view::NowPlayingView;

#[derive(Clone)]
struct HttpState {
    status_rx: watch::Receiver<LiveStatus>,
    embed: Arc<EmbedConfig>,
    embed_ready: EmbedReadySignal,
}

pub fn router(
    status_rx: watch::Receiver<LiveStatus>,
    embed: EmbedConfig,
    embed_ready: EmbedReadySignal,
) -> Router {
    let app_state = HttpState {
        status_rx,
        embed: Arc::new(embed),
        embed_ready,
    };

    Router::new()
        .route("/api/now-playing", get(get_status))
        .route("/api/now-playing/view", get(get_view))
        .route("/api/now-playing/embed-ready", post(post_embed_ready))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    status_rx: watch::Receiver<LiveStatus>,
    embed: EmbedConfig,
    embed_ready: EmbedReadySignal,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(status_rx, embed, embed_ready);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_status(State(state): State<HttpState>) -> Json<LiveStatus> {
    Json(state.status_rx.borrow().clone())
}

async fn get_view(State(state): State<HttpState>) -> Json<NowPlayingView> {
    let status = state.status_rx.borrow().clone();
    Json(NowPlayingView::from_status(&status, &state.embed))
}

async fn post_embed_ready(State(state): State<HttpState>) -> StatusCode {
    if state.embed_ready.signal() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use crate::core::DriverCommand;
    use axum::http::Request;
    use nowplaying_proto::track::PlayingTrack;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint_reflects_latest_value() {
        let (tx, rx) = watch::channel(LiveStatus::default());
        let (signal, _commands) = EmbedReadySignal::channel();
        let app = router(rx, EmbedConfig::default(), signal);

        let json = get_json(app.clone(), "/api/now-playing").await;
        assert_eq!(json["loading"], true);
        assert_eq!(json["has_responded"], false);

        tx.send_modify(|s| {
            s.loading = false;
            s.has_responded = true;
            s.track = PlayingTrack {
                is_playing: true,
                id: Some("abc123".into()),
                ..Default::default()
            };
        });
        let json = get_json(app, "/api/now-playing").await;
        assert_eq!(json["track"]["isPlaying"], true);
        assert_eq!(json["track"]["id"], "abc123");
    }

    #[tokio::test]
    async fn test_view_endpoint() {
        let (_tx, rx) = watch::channel(LiveStatus {
            loading: false,
            has_responded: true,
            ..Default::default()
        });
        let (signal, _commands) = EmbedReadySignal::channel();
        let json = get_json(
            router(rx, EmbedConfig::default(), signal),
            "/api/now-playing/view",
        )
        .await;
        assert_eq!(json["state"], "idle");
    }

    #[tokio::test]
    async fn test_embed_ready_is_forwarded() {
        let (_tx, rx) = watch::channel(LiveStatus::default());
        let (signal, mut commands) = EmbedReadySignal::channel();
        let app = router(rx, EmbedConfig::default(), signal);

        let post = || {
            Request::builder()
                .method("POST")
                .uri("/api/now-playing/embed-ready")
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(commands.try_recv(), Ok(DriverCommand::EmbedReady));

        drop(commands);
        let response = app.oneshot(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
