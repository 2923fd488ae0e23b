//! HTTP API
//!
//! - `GET /` liveness message
//! - `GET /health` provider, tools and calendar authorization
//! - `POST /chat` one agent turn
//! - `POST /send-email` direct SMTP send
//! - `POST /schedule` direct calendar insert
//! - `GET /oauth/{flow}/login` and `GET /oauth/{flow}/callback`

use crate::agent::{ChatAgent, DEFAULT_SESSION};
use crate::calendar::{CalendarApi, CalendarEvent};
use crate::error::AssistantError;
use crate::mail::{MailError, Mailer, OutgoingEmail};
use crate::oauth::{AuthorizationOutcome, OAuthError, OAuthRegistry};
use crate::tools::builtin::meeting::{build_meeting_draft, MeetingRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Everything the handlers share
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub mailer: Arc<dyn Mailer>,
    pub calendar: Arc<dyn CalendarApi>,
    pub oauth: Arc<OAuthRegistry>,
    pub default_timezone: String,
    pub cors_allow_any_origin: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default = "default_is_html")]
    pub is_html: bool,
}

fn default_is_html() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: String,
    tools: Vec<String>,
    calendar_authorized: bool,
    oauth_flows: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// All routes with CORS, request tracing and JSON rejections
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = if state.cors_allow_any_origin {
        warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allow_headers(vec!["content-type", "authorization", "accept", "origin"])
    } else {
        warp::cors()
    };

    // GET /
    let root_route = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&json!({"status": "Application running successfully"})));

    // GET /health
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health_handler);

    // POST /chat
    let chat_route = warp::path("chat")
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body::<ChatRequest>())
        .and(with_state(state.clone()))
        .and_then(chat_handler);

    // POST /send-email
    let send_email_route = warp::path("send-email")
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body::<SendEmailRequest>())
        .and(with_state(state.clone()))
        .and_then(send_email_handler);

    // POST /schedule
    let schedule_route = warp::path("schedule")
        .and(warp::path::end())
        .and(warp::post())
        .and(json_body::<MeetingRequest>())
        .and(with_state(state.clone()))
        .and_then(schedule_handler);

    // GET /oauth/{flow}/login
    let login_route = warp::path!("oauth" / String / "login")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(login_handler);

    // GET /oauth/{flow}/callback
    let callback_route = warp::path!("oauth" / String / "callback")
        .and(warp::get())
        .and(warp::query::<CallbackQuery>())
        .and(with_state(state))
        .and_then(callback_handler);

    root_route
        .or(health_route)
        .or(chat_route)
        .or(send_email_route)
        .or(schedule_route)
        .or(login_route)
        .or(callback_route)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

/// Bind and run until `shutdown` resolves
pub fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), AssistantError> {
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| AssistantError::internal_error(format!("Failed to bind {addr}: {e}")))?;

    info!(address = %bound, "HTTP server listening");
    Ok((bound, server))
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(error: &AssistantError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %error, "Request failed");
    } else {
        warn!(status = status.as_u16(), error = %error, "Request rejected");
    }

    json_reply(
        &ErrorResponse {
            error: error.client_message(),
        },
        status,
    )
}

async fn health_handler(state: Arc<AppState>) -> Result<Response, Infallible> {
    let response = HealthResponse {
        status: "ok",
        provider: state.agent.llm().name().to_string(),
        tools: state.agent.tools().list_tools(),
        calendar_authorized: state.calendar.is_authorized().await,
        oauth_flows: state.oauth.flow_names(),
    };
    Ok(json_reply(&response, StatusCode::OK))
}

async fn chat_handler(request: ChatRequest, state: Arc<AppState>) -> Result<Response, Infallible> {
    let session = request
        .session_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SESSION);
    info!(session = %session, length = request.message.len(), "Chat request received");

    Ok(match state.agent.chat(session, &request.message).await {
        Ok(reply) => json_reply(&ChatResponse { reply: reply.reply }, StatusCode::OK),
        Err(e) => error_reply(&e),
    })
}

async fn send_email_handler(
    request: SendEmailRequest,
    state: Arc<AppState>,
) -> Result<Response, Infallible> {
    let email = if request.is_html {
        OutgoingEmail::html(request.to, request.subject, request.body)
    } else {
        OutgoingEmail::text(request.to, request.subject, request.body)
    };

    Ok(match state.mailer.send(email).await {
        Ok(()) => json_reply(
            &json!({"message": "Email sent successfully"}),
            StatusCode::OK,
        ),
        Err(MailError::InvalidAddress(address)) => error_reply(&AssistantError::invalid_input(
            format!("Invalid recipient address '{address}'"),
        )),
        Err(e) => error_reply(&e.into()),
    })
}

async fn schedule_handler(
    request: MeetingRequest,
    state: Arc<AppState>,
) -> Result<Response, Infallible> {
    let draft = match build_meeting_draft(request, &state.default_timezone) {
        Ok(draft) => draft,
        Err(message) => return Ok(error_reply(&AssistantError::invalid_input(message))),
    };

    Ok(
        match state
            .calendar
            .insert_event(&CalendarEvent::from_draft(&draft))
            .await
        {
            Ok(created) => json_reply(
                &json!({
                    "status": "success",
                    "eventLink": created.html_link,
                    "eventId": created.id
                }),
                StatusCode::OK,
            ),
            Err(e) => error_reply(&e.into()),
        },
    )
}

async fn login_handler(flow: String, state: Arc<AppState>) -> Result<Response, Infallible> {
    let url = match state.oauth.begin(&flow).await {
        Ok(url) => url,
        Err(e) => return Ok(error_reply(&e.into())),
    };

    Ok(match url.parse::<Uri>() {
        Ok(uri) => warp::redirect::found(uri).into_response(),
        Err(e) => error_reply(&AssistantError::internal_error(format!(
            "Invalid consent URL: {e}"
        ))),
    })
}

async fn callback_handler(
    flow: String,
    query: CallbackQuery,
    state: Arc<AppState>,
) -> Result<Response, Infallible> {
    if let Some(denied) = query.error {
        return Ok(error_reply(&OAuthError::AuthorizationDenied(denied).into()));
    }

    let (code, oauth_state) = match (query.code, query.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => {
            return Ok(error_reply(&AssistantError::invalid_input(
                "Callback requires code and state",
            )))
        }
    };

    Ok(
        match state.oauth.complete(&flow, &code, &oauth_state).await {
            Ok(outcome) => json_reply(&outcome_body(&outcome), StatusCode::OK),
            Err(e) => error_reply(&e.into()),
        },
    )
}

/// Response body for a completed authorization; never includes the client secret
fn outcome_body(outcome: &AuthorizationOutcome) -> serde_json::Value {
    match outcome {
        AuthorizationOutcome::Saved { flow, path } => json!({
            "message": "Authorization successful",
            "flow": flow,
            "token_file": path,
        }),
        AuthorizationOutcome::Returned { flow, token } => json!({
            "message": "Authorization successful",
            "flow": flow,
            "token": token.token,
            "refresh_token": token.refresh_token,
            "scopes": token.scopes,
            "expiry": token.expiry,
        }),
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
    } else if rejection.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json".to_string(),
        )
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!(rejection = ?rejection, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(json_reply(&ErrorResponse { error: message }, status))
}
