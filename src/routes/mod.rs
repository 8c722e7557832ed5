use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod matches;

/// Compose all route trees and attach the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(matches::router())
        .merge(docs::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::memory::InMemoryMatchStore,
        services::{
            enrichment::{Enrichment, NoopOracle},
            track_supply::CatalogTrackSource,
        },
        state::AppState,
    };

    async fn app(with_store: bool) -> Router<()> {
        let config = AppConfig::default();
        let enrichment = Enrichment::new(Arc::new(NoopOracle), config.enrichment.clone());
        let state = AppState::new(config, Arc::new(CatalogTrackSource::new("catalog")), enrichment);
        if with_store {
            state
                .set_match_store(Arc::new(InMemoryMatchStore::new()))
                .await;
        }
        router(state)
    }

    async fn call(app: &Router<()>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn degraded_backend_answers_503() {
        let app = app(false).await;
        let (status, body) = call(&app, "GET", "/match", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["message"].as_str().unwrap().contains("degraded"));

        let (status, body) = call(&app, "GET", "/healthcheck", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn lobby_flow_over_http() {
        let app = app(true).await;

        let (status, body) = call(&app, "POST", "/match/players", Some(json!({ "name": "ann" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["players"][0]["name"], "ann");
        assert_eq!(body["phase"], "lobby");

        let (status, _) = call(&app, "POST", "/match/players", Some(json!({ "name": "ann" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "POST", "/match/players", Some(json!({ "name": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "GET", "/match/players/ann", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lives"], 3);

        let (status, _) = call(&app, "GET", "/match/players/zed", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_with_builtin_tracks_hides_the_current_year() {
        let app = app(true).await;
        call(&app, "POST", "/match/players", Some(json!({ "name": "ann" }))).await;
        call(&app, "POST", "/match/players", Some(json!({ "name": "bob" }))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/match/start",
            Some(json!({ "target_score": 5, "source": "builtin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "guessing");
        assert_eq!(body["active_player"], "ann");
        assert!(body["current_card"]["year"].is_null());
        assert_eq!(body["players"][0]["timeline"].as_array().unwrap().len(), 1);

        let (status, _) = call(
            &app,
            "POST",
            "/match/guess",
            Some(json!({ "player": "bob", "position": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(
            &app,
            "POST",
            "/match/guess",
            Some(json!({ "player": " ann", "position": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "ann");
        assert_eq!(body["phase"], "guessing");
        assert!(!body["can_guess"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn reset_is_refused_while_the_match_runs() {
        let app = app(true).await;
        call(&app, "POST", "/match/players", Some(json!({ "name": "ann" }))).await;
        call(&app, "POST", "/match/start", Some(json!({}))).await;

        let (status, _) = call(&app, "POST", "/match/reset", Some(json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn lobby_reset_can_drop_players() {
        let app = app(true).await;
        call(&app, "POST", "/match/players", Some(json!({ "name": "ann" }))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/match/reset",
            Some(json!({ "keep_players": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["players"].as_array().unwrap().is_empty());
    }
}
