//! HTTP surface for Mattermost.
//!
//! - `GET  /`       service status
//! - `GET  /health` database readiness
//! - `POST /`       slash command (form encoded)
//! - `POST /vote`   vote button integration (JSON)
//! - `POST /end`    end button integration (JSON)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        FromRef, Request, State,
    },
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use pollbot_core::errors::InterfaceError;
use pollbot_core::PollEngine;
use pollbot_db::DbPool;
use pollbot_mattermost::{
    ActionPayload, ActionRouter, CommandRouter, RouteError, SlashCommandForm, SlashCommandPayload,
    TokenPolicy,
};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct AppState {
    commands: Arc<CommandRouter<PollEngine>>,
    actions: Arc<ActionRouter<PollEngine>>,
    token_policy: Arc<TokenPolicy>,
    public_url: Option<String>,
    health: HealthState,
}

impl AppState {
    pub fn new(
        engine: PollEngine,
        token_policy: TokenPolicy,
        db_pool: DbPool,
        public_url: Option<String>,
        default_max_votes: u32,
    ) -> Self {
        Self {
            commands: Arc::new(
                CommandRouter::new(engine.clone()).with_default_max_votes(default_max_votes),
            ),
            actions: Arc::new(ActionRouter::new(engine)),
            token_policy: Arc::new(token_policy),
            public_url,
            health: HealthState { db_pool },
        }
    }

    /// Base for the integration URLs embedded in poll buttons.
    fn base_url(&self, headers: &HeaderMap, uri: &Uri) -> String {
        if let Some(public_url) = &self.public_url {
            return public_url.clone();
        }

        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or_else(|| uri.authority().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_owned());
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .or_else(|| uri.scheme_str())
            .unwrap_or("http");

        format!("{scheme}://{host}/")
    }
}

impl FromRef<AppState> for HealthState {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status).post(slash_command))
        .route("/health", get(health::health))
        .route("/vote", post(vote))
        .route("/end", post(end))
        .layer(middleware::from_fn(correlate))
        .with_state(state)
}

async fn correlate(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(CorrelationId(correlation_id));

    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        info!(
            event_name = "system.server.request",
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );
        response
    }
    .instrument(span)
    .await
}

async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        service: "pollbot",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn slash_command(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    headers: HeaderMap,
    uri: Uri,
    form: Result<Form<SlashCommandForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return bad_request(rejection.body_text(), &correlation.0),
    };
    let payload = match SlashCommandPayload::try_from(form) {
        Ok(payload) => payload,
        Err(error) => return bad_request(error.to_string(), &correlation.0),
    };

    let base_url = state.base_url(&headers, &uri);
    match state.commands.route(payload, &state.token_policy, &base_url).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => failure(error, &correlation.0),
    }
}

async fn vote(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    headers: HeaderMap,
    uri: Uri,
    payload: Result<Json<ActionPayload>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), &correlation.0),
    };

    let base_url = state.base_url(&headers, &uri);
    match state.actions.vote(payload, &base_url).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => failure(error, &correlation.0),
    }
}

async fn end(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    payload: Result<Json<ActionPayload>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), &correlation.0),
    };

    match state.actions.end(payload).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => failure(error, &correlation.0),
    }
}

fn bad_request(detail: String, correlation_id: &str) -> Response {
    warn!(event_name = "system.server.bad_request", detail = %detail, "request rejected");
    error_response(InterfaceError::BadRequest {
        message: detail,
        correlation_id: correlation_id.to_owned(),
    })
}

fn failure(error: RouteError, correlation_id: &str) -> Response {
    let error = error.into_poll_error().into_interface(correlation_id);
    error!(
        event_name = "system.server.request_failed",
        error = %error,
        "request could not be completed"
    );
    error_response(error)
}

fn error_response(error: InterfaceError) -> Response {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = ErrorBody {
        error: error.user_message().to_owned(),
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use pollbot_core::PollEngine;
    use pollbot_db::{connect_with_settings, migrations, DbPool, SqlPollStore};
    use pollbot_mattermost::TokenPolicy;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, AppState};

    const HOST: &str = "www.example.com:5005";
    const BASE_URL: &str = "http://www.example.com:5005/";

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn app_with(tokens: &[&str], public_url: Option<&str>) -> Router {
        let pool = pool().await;
        let engine = PollEngine::new(Arc::new(SqlPollStore::new(pool.clone())));
        router(AppState::new(
            engine,
            TokenPolicy::new(tokens.iter().copied()),
            pool,
            public_url.map(str::to_owned),
            1,
        ))
    }

    async fn app() -> Router {
        app_with(&[], None).await
    }

    fn encode(value: &str) -> String {
        value
            .bytes()
            .map(|byte| match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    (byte as char).to_string()
                }
                _ => format!("%{byte:02X}"),
            })
            .collect()
    }

    fn slash(fields: &[(&str, &str)]) -> Request<Body> {
        let body = fields
            .iter()
            .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::HOST, HOST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request")
    }

    fn action(url: &str, user_id: &str, context: &Value) -> Request<Body> {
        let path = url.strip_prefix(BASE_URL.trim_end_matches('/')).unwrap_or(url);
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::HOST, HOST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "user_id": user_id, "context": context }).to_string()))
            .expect("request")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    fn assert_poll(body: &Value, message: &str, options: &[&str]) {
        assert_eq!(body["response_type"], "in_channel");
        assert_eq!(body["attachments"][0]["text"], message);
        let actions = body["attachments"][0]["actions"].as_array().expect("actions");
        assert_eq!(actions.len(), options.len() + 1);
        for (action, option) in actions.iter().zip(options) {
            assert!(action["name"].as_str().is_some_and(|name| name.contains(option)));
            assert_eq!(action["integration"]["url"], format!("{BASE_URL}vote"));
        }
        assert_eq!(actions[options.len()]["integration"]["url"], format!("{BASE_URL}end"));
    }

    fn actions_of(body: &Value) -> Vec<(String, Value)> {
        body["attachments"][0]["actions"]
            .as_array()
            .expect("actions")
            .iter()
            .map(|action| {
                let url = action["integration"]["url"].as_str().expect("url").to_owned();
                (url, action["integration"]["context"].clone())
            })
            .collect()
    }

    #[tokio::test]
    async fn status_is_ok() {
        let request =
            Request::builder().uri("/").header(header::HOST, HOST).body(Body::empty()).expect("req");
        let (status, body) = send(&app().await, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn health_reports_database_ready() {
        let request = Request::builder().uri("/health").body(Body::empty()).expect("req");
        let (status, body) = send(&app().await, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"]["status"], "ready");
    }

    #[tokio::test]
    async fn incomplete_slash_commands_are_bad_requests() {
        let app = app().await;

        let empty = Request::builder().method(Method::POST).uri("/").body(Body::empty()).expect("req");
        let (status, body) = send(&app, empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "The request could not be processed. Check inputs and try again."
        );
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));

        for fields in [vec![("user_id", "user0")], vec![("text", "bla")], vec![]] {
            let (status, _) = send(&app, slash(&fields)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "fields: {fields:?}");
        }
    }

    #[tokio::test]
    async fn slash_command_creates_poll() {
        let app = app().await;

        let (status, body) = send(&app, slash(&[("user_id", "user0"), ("text", "Poll message")])).await;
        assert_eq!(status, StatusCode::OK);
        assert_poll(&body, "Poll message", &["Yes", "No"]);

        let (status, body) = send(
            &app,
            slash(&[("user_id", "user0"), ("text", "Poll message --First --Second --Third")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_poll(&body, "Poll message", &["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn empty_text_gets_ephemeral_usage() {
        let (status, body) = send(&app().await, slash(&[("user_id", "user0"), ("text", "")])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response_type"], "ephemeral");
        assert!(body["text"].as_str().is_some_and(|text| !text.is_empty()));
    }

    #[tokio::test]
    async fn help_names_the_command_and_only_a_lone_help_counts() {
        let app = app().await;

        let (_, body) =
            send(&app, slash(&[("user_id", "user0"), ("text", "help"), ("command", "/foo")])).await;
        assert_eq!(body["response_type"], "ephemeral");
        assert!(body["text"].as_str().is_some_and(|text| text.contains("/foo")));

        let (_, body) =
            send(&app, slash(&[("user_id", "user0"), ("text", "help me"), ("command", "/foo")]))
                .await;
        assert_ne!(body["response_type"], "ephemeral");
    }

    #[tokio::test]
    async fn votes_follow_the_selection_policy() {
        let cases: [(&str, u32, &[(&str, usize)], [u32; 3]); 6] = [
            ("one vote", 1, &[("user2", 2)], [0, 0, 1]),
            ("three votes", 1, &[("user0", 0), ("user1", 1), ("user2", 2)], [1, 1, 1]),
            ("changed vote", 1, &[("user0", 0), ("user1", 1), ("user0", 1)], [0, 2, 0]),
            ("multi, three votes", 2, &[("user0", 0), ("user1", 1), ("user0", 1)], [1, 2, 0]),
            ("multi, unvote", 2, &[("user0", 0), ("user0", 1), ("user0", 1)], [1, 0, 0]),
            ("multi, overvote", 2, &[("user0", 0), ("user0", 1), ("user0", 2)], [0, 1, 1]),
        ];
        let app = app().await;

        for (name, max_votes, votes, expected) in cases {
            let command = format!("Message --Spam --Foo --Bar\n            --votes={max_votes}");
            let (_, created) = send(&app, slash(&[("user_id", "user0"), ("text", &command)])).await;
            let actions = actions_of(&created);
            assert_eq!(actions.len(), 4, "{name}");

            let mut last = Value::Null;
            for (user, option) in votes {
                let (url, context) = &actions[*option];
                let (status, body) = send(&app, action(url, user, context)).await;
                assert_eq!(status, StatusCode::OK, "{name}");
                assert!(body["ephemeral_text"].is_string(), "{name}");
                assert_poll(&body["update"]["props"], "Message", &["Spam", "Foo", "Bar"]);
                last = body;
            }

            let names: Vec<String> = last["update"]["props"]["attachments"][0]["actions"]
                .as_array()
                .expect("actions")
                .iter()
                .map(|action| action["name"].as_str().unwrap_or_default().to_owned())
                .collect();
            let expected_names: Vec<String> = ["Spam", "Foo", "Bar"]
                .iter()
                .zip(expected)
                .map(|(label, count)| format!("{label} ({count})"))
                .chain(["End Poll".to_owned()])
                .collect();
            assert_eq!(names, expected_names, "{name}");
        }
    }

    #[tokio::test]
    async fn end_replaces_buttons_with_fields() {
        let app = app().await;

        for votes in [vec![], vec![("user0", 0usize), ("user1", 1), ("user2", 2)]] {
            let (_, created) = send(
                &app,
                slash(&[("user_id", "user0"), ("text", "Message --Spam --Foo --Bar")]),
            )
            .await;
            let actions = actions_of(&created);
            for (user, option) in &votes {
                let (url, context) = &actions[*option];
                let (status, _) = send(&app, action(url, user, context)).await;
                assert_eq!(status, StatusCode::OK);
            }

            let (url, context) = &actions[3];
            let (status, body) = send(&app, action(url, "user0", context)).await;
            assert_eq!(status, StatusCode::OK);
            let fields = body["update"]["props"]["attachments"][0]["fields"]
                .as_array()
                .expect("fields");
            assert_eq!(fields.len(), 4);
            assert_eq!(fields[3]["value"], votes.len().to_string());

            // voting after the end is a private notice
            let (url, context) = &actions[0];
            let (status, late) = send(&app, action(url, "user9", context)).await;
            assert_eq!(status, StatusCode::OK);
            assert!(late.get("update").is_none());
            assert_eq!(late["ephemeral_text"], "This poll is closed.");
        }
    }

    #[tokio::test]
    async fn unknown_polls_get_a_notice() {
        let app = app().await;
        let context = json!({ "poll_id": "invalid123", "vote": 0 });

        for url in [format!("{BASE_URL}vote"), format!("{BASE_URL}end")] {
            let (status, body) = send(&app, action(&url, "user0", &context)).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.get("update").is_none());
            assert!(body.get("ephemeral_text").is_some());
        }
    }

    #[tokio::test]
    async fn malformed_action_bodies_are_bad_requests() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/vote")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"user_id\": \"user0\"}"))
            .expect("req");
        let (status, body) = send(&app().await, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["correlation_id"].is_string());
    }

    #[tokio::test]
    async fn token_policy_guards_slash_commands() {
        let open = app().await;
        let (_, body) =
            send(&open, slash(&[("user_id", "user0"), ("text", "Bla"), ("token", "abc123")])).await;
        assert_ne!(body["response_type"], "ephemeral");

        let guarded = app_with(&["xyz321", "abc123"], None).await;
        for token in ["abc123", "xyz321"] {
            let (_, body) =
                send(&guarded, slash(&[("user_id", "user0"), ("text", "Bla"), ("token", token)]))
                    .await;
            assert_ne!(body["response_type"], "ephemeral", "token {token}");
        }

        let (status, body) = send(
            &guarded,
            slash(&[("user_id", "user0"), ("text", "Bla"), ("token", "abc321")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response_type"], "ephemeral");
        assert!(body["text"]
            .as_str()
            .is_some_and(|text| text.to_lowercase().contains("invalid token")));
    }

    #[tokio::test]
    async fn public_url_overrides_the_request_host() {
        let app = app_with(&[], Some("https://polls.example.org/bot")).await;
        let (_, body) = send(&app, slash(&[("user_id", "user0"), ("text", "Q")])).await;
        let actions = actions_of(&body);
        assert_eq!(actions[0].0, "https://polls.example.org/bot/vote");
        assert_eq!(actions[2].0, "https://polls.example.org/bot/end");
    }

    #[tokio::test]
    async fn forwarded_proto_is_respected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::HOST, "polls.internal")
            .header("x-forwarded-proto", "https")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("user_id=user0&text=Q"))
            .expect("req");
        let (_, body) = send(&app().await, request).await;
        assert_eq!(actions_of(&body)[0].0, "https://polls.internal/vote");
    }

    #[tokio::test]
    async fn store_outage_is_a_503_with_correlation_id() {
        let pool = pool().await;
        let engine = PollEngine::new(Arc::new(SqlPollStore::new(pool.clone())));
        let app = router(AppState::new(engine, TokenPolicy::accept_all(), pool.clone(), None, 1));
        pool.close().await;

        let (status, body) = send(&app, slash(&[("user_id", "user0"), ("text", "Q")])).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));

        let context = json!({ "poll_id": "P-1", "vote": 0 });
        let (status, _) = send(&app, action(&format!("{BASE_URL}vote"), "user0", &context)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
