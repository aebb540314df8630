//! HTTP endpoints for the survey chat.
//!
//! Sessions are identified by the `survey_session` cookie. A request without
//! a usable cookie gets a fresh id, returned via `Set-Cookie`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::SurveyError;

use super::manager::SurveyManager;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "survey_session";

/// Shared state for survey routes.
#[derive(Clone)]
pub struct SurveyRouteState {
    pub manager: Arc<SurveyManager>,
}

/// Session id resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    id: String,
    is_new: bool,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Self {
        match session_cookie(headers) {
            Some(id) => Self { id, is_new: false },
            None => Self {
                id: Uuid::new_v4().to_string(),
                is_new: true,
            },
        }
    }

    /// Attach `Set-Cookie` if this session was minted for the request.
    fn attach(&self, mut response: Response) -> Response {
        if self.is_new {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| is_valid_session_id(id))
}

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn status_for(e: &SurveyError) -> StatusCode {
    match e {
        SurveyError::EmptyInput => StatusCode::BAD_REQUEST,
        SurveyError::Initialization(_) => StatusCode::SERVICE_UNAVAILABLE,
        SurveyError::Transport(_) | SurveyError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        SurveyError::InvalidTransition { .. } | SurveyError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `{error}` body with a safe message. Details only go to the log.
fn error_response(e: &SurveyError) -> Response {
    let status = status_for(e);
    if status.is_server_error() {
        error!(error = %e, "Survey request failed");
    }
    (status, Json(json!({"error": e.user_message()}))).into_response()
}

/// POST /api/survey/start
///
/// Resets the caller's survey and returns the opening message.
async fn start_survey(State(state): State<SurveyRouteState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    let response = match state.manager.start(&session.id).await {
        Ok(reply) => Json(json!({"reply": reply})).into_response(),
        Err(e) => error_response(&e),
    };
    session.attach(response)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

/// POST /chat
///
/// One survey turn: `{message}` in, `{reply}` or `{error}` out.
async fn chat(
    State(state): State<SurveyRouteState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let session = Session::from_headers(&headers);

    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected chat body");
            let response = error_response(&SurveyError::EmptyInput);
            return session.attach(response);
        }
    };

    let response = match state.manager.advance(&session.id, &body.message).await {
        Ok(turn) => Json(json!({"reply": turn.reply})).into_response(),
        Err(e) => error_response(&e),
    };
    session.attach(response)
}

/// GET /api/survey/status
async fn get_status(State(state): State<SurveyRouteState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    let response = match state.manager.status(&session.id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(&e),
    };
    session.attach(response)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Build the survey routes.
pub fn survey_routes(state: SurveyRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/api/survey/start", post(start_survey))
        .route("/api/survey/status", get(get_status))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::SurveyConfig;
    use crate::llm::ScriptedProvider;
    use crate::store::InMemorySessionStore;

    fn app(llm: Arc<ScriptedProvider>) -> Router {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = Arc::new(SurveyManager::new(llm, store, SurveyConfig::default()));
        survey_routes(SurveyRouteState { manager })
    }

    fn chat_request(cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post("/chat").header(header::CONTENT_TYPE, "application/json");
        if let Some(id) = cookie {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={id}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn cookie_parsing_finds_session_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; survey_session=abc-123; lang=es"),
        );
        let session = Session::from_headers(&headers);
        assert_eq!(
            session,
            Session {
                id: "abc-123".to_string(),
                is_new: false
            }
        );
    }

    #[test]
    fn invalid_cookie_mints_new_session() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("survey_session=../../etc"),
        );
        let session = Session::from_headers(&headers);
        assert!(session.is_new);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn error_statuses() {
        assert_eq!(status_for(&SurveyError::EmptyInput), StatusCode::BAD_REQUEST);
        let transport = crate::error::LlmError::Transport {
            provider: "x".into(),
            reason: "y".into(),
        };
        assert_eq!(
            status_for(&SurveyError::Initialization(transport)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn start_sets_cookie_and_returns_reply() {
        let llm = Arc::new(ScriptedProvider::new());
        llm.push_reply("¡Hola! ¿Del 0 al 10?");

        let response = app(llm)
            .oneshot(Request::post("/api/survey/start").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("survey_session="));
        assert!(cookie.contains("HttpOnly"));
        assert_eq!(json_body(response).await["reply"], "¡Hola! ¿Del 0 al 10?");
    }

    #[tokio::test]
    async fn known_session_gets_no_new_cookie() {
        let llm = Arc::new(ScriptedProvider::new());
        llm.push_reply("[INVALID_RATING] Del 0 al 10, por favor.");

        let response = app(llm)
            .oneshot(chat_request(Some("abc"), r#"{"message": "hola"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(json_body(response).await["reply"], "Del 0 al 10, por favor.");
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let llm = Arc::new(ScriptedProvider::new());
        let response = app(llm)
            .oneshot(chat_request(Some("abc"), r#"{"message": "   "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("escribe un mensaje"));
    }

    #[tokio::test]
    async fn unparsable_body_is_bad_request_with_error_json() {
        let llm = Arc::new(ScriptedProvider::new());
        let response = app(llm)
            .oneshot(chat_request(Some("abc"), "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await.get("error").is_some());
    }

    #[tokio::test]
    async fn transport_failure_is_bad_gateway_without_detail() {
        let llm = Arc::new(ScriptedProvider::new());
        llm.push_transport_error();

        let response = app(llm)
            .oneshot(chat_request(Some("abc"), r#"{"message": "8"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(!message.contains("connection reset"));
    }

    #[tokio::test]
    async fn failed_start_is_service_unavailable() {
        let llm = Arc::new(ScriptedProvider::new());
        llm.push_transport_error();

        let response = app(llm)
            .oneshot(Request::post("/api/survey/start").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("recarga"));
    }

    #[tokio::test]
    async fn cookieless_chats_are_swept_once_idle() {
        let llm = Arc::new(ScriptedProvider::new());
        let store = Arc::new(InMemorySessionStore::new());
        let manager = Arc::new(SurveyManager::new(
            llm.clone(),
            store.clone(),
            SurveyConfig::default(),
        ));
        let app = survey_routes(SurveyRouteState {
            manager: Arc::clone(&manager),
        });

        for _ in 0..50 {
            llm.push_reply("[INVALID_RATING] Del 0 al 10, por favor.");
            let response = app
                .clone()
                .oneshot(chat_request(None, r#"{"message": "hola"}"#))
                .await
                .unwrap();
            assert!(response.headers().get(header::SET_COOKIE).is_some());
        }
        assert_eq!(store.len().await, 50);

        let cutoff = chrono::Utc::now() + chrono::TimeDelta::seconds(1);
        assert_eq!(manager.expire_idle_before(cutoff).await.unwrap(), 50);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let llm = Arc::new(ScriptedProvider::new());
        let response = app(llm)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
