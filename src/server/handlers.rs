// HTTP request handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{SafetyServer, ServerError, SessionSnapshot};
use crate::audit::{FlagId, FlaggedEntryRecord};
use crate::crisis::{
    ContactAction, ContactChannel, CrisisResource, DetectionResult, EscalationState, Language,
    MonitoredField, Observation, Submission, SubmissionDecision, Surface,
};

/// Create the main application router
pub fn create_router(server: Arc<SafetyServer>) -> Router {
    Router::new()
        .route("/v1/detect", post(handle_detect))
        .route("/v1/resources/:region", get(get_resource))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/fields", post(handle_field_change))
        .route("/v1/sessions/:id/submit", post(handle_submit))
        .route("/v1/sessions/:id/dismiss", post(handle_dismiss))
        .route("/v1/sessions/:id/contact", post(handle_contact))
        .route("/v1/flags", get(list_flags))
        .route("/v1/flags/:id/dismiss", post(dismiss_flag))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(server)
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// Handle POST /v1/detect - stateless detection
async fn handle_detect(
    State(server): State<Arc<SafetyServer>>,
    Json(request): Json<DetectRequest>,
) -> Json<DetectionResult> {
    let language = request
        .language
        .as_deref()
        .map(|tag| Language::resolve_or(tag, server.config().default_language))
        .unwrap_or(server.config().default_language);

    let result = server.detector().detect(&request.text, language);
    server.metrics().record_detection(language, &result);
    Json(result)
}

/// Handle GET /v1/resources/:region - never fails, unknown codes get the default
async fn get_resource(
    State(server): State<Arc<SafetyServer>>,
    Path(region): Path<String>,
) -> Json<CrisisResource> {
    Json(server.resources().resolve(&region).clone())
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Handle POST /v1/sessions
async fn create_session(
    State(server): State<Arc<SafetyServer>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(ServerError::BadRequest("user_id must not be empty".to_string()).into());
    }

    let id = server
        .open_session(
            &request.user_id,
            request.region.as_deref(),
            request.language.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(server.session_manager().snapshot(&id)?)))
}

/// Handle GET /v1/sessions/:id
async fn get_session(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(server.session_manager().snapshot(&id)?))
}

/// Handle DELETE /v1/sessions/:id
async fn delete_session(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !server.session_manager().delete(&id) {
        return Err(ServerError::SessionNotFound(id).into());
    }
    server
        .metrics()
        .set_active_sessions(server.session_manager().active_count());
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct FieldChangeRequest {
    pub field: MonitoredField,
    pub text: String,
}

/// Handle POST /v1/sessions/:id/fields - live input change
async fn handle_field_change(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
    Json(request): Json<FieldChangeRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let (language, observation) = server.session_manager().with_session(&id, |session| {
        (
            session.language(),
            session.on_field_change(request.field, &request.text),
        )
    })?;

    match &observation {
        Observation::Triggered(signal) => server.metrics().record_detection(
            language,
            &DetectionResult {
                matched: true,
                matched_phrases: signal.phrases.clone(),
                fail_safe: signal.fail_safe,
            },
        ),
        Observation::Clear => server
            .metrics()
            .record_detection(language, &DetectionResult::clear()),
        Observation::Unchanged => {}
    }

    Ok(Json(server.session_manager().snapshot(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct FieldValue {
    pub field: MonitoredField,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub surface: Surface,
    pub entry_id: String,
    pub fields: Vec<FieldValue>,
    /// Replays of the same attempt are not audited twice
    #[serde(default)]
    pub attempt_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub attempt_id: Uuid,
    pub decision: SubmissionDecision,
    pub flagged: bool,
    pub detection: DetectionResult,
    pub state: EscalationState,
}

/// Handle POST /v1/sessions/:id/submit - gate a content save
async fn handle_submit(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    if let Some(field) = request
        .fields
        .iter()
        .find(|value| value.field.surface() != request.surface)
    {
        return Err(ServerError::BadRequest(format!(
            "field {:?} does not belong to surface {}",
            field.field,
            request.surface.as_str()
        ))
        .into());
    }

    let fields: Vec<(MonitoredField, String)> = request
        .fields
        .into_iter()
        .map(|value| (value.field, value.text))
        .collect();
    let attempt_id = request.attempt_id.unwrap_or_else(Uuid::new_v4);
    let surface = request.surface;

    let (language, detection, outcome, state) =
        server.session_manager().with_session(&id, |session| {
            let (_, detection, outcome) =
                session.resubmit(attempt_id, surface, request.entry_id, fields);
            (session.language(), detection, outcome, session.state().clone())
        })?;

    server.metrics().record_detection(language, &detection);
    if outcome.flagged {
        server.metrics().record_escalation(surface);
    }

    Ok(Json(SubmitResponse {
        attempt_id,
        decision: outcome.decision,
        flagged: outcome.flagged,
        detection,
        state,
    }))
}

#[derive(Debug, Serialize)]
pub struct DismissResponse {
    pub state: EscalationState,
    /// Held submissions the caller may now persist, in submit order
    pub released: Vec<Submission>,
}

/// Handle POST /v1/sessions/:id/dismiss
async fn handle_dismiss(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
) -> Result<Json<DismissResponse>, AppError> {
    let response = server.session_manager().with_session(&id, |session| {
        let released = session.dismiss();
        DismissResponse {
            state: session.state().clone(),
            released,
        }
    })?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub channel: ContactChannel,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub action: Option<ContactAction>,
    pub state: EscalationState,
}

/// Handle POST /v1/sessions/:id/contact - modal stays open
async fn handle_contact(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
    Json(request): Json<ContactRequest>,
) -> Result<Json<ContactResponse>, AppError> {
    let response = server.session_manager().with_session(&id, |session| ContactResponse {
        action: session.contact(request.channel),
        state: session.state().clone(),
    })?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct FlagQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Handle GET /v1/flags - review queue
async fn list_flags(
    State(server): State<Arc<SafetyServer>>,
    Query(query): Query<FlagQuery>,
) -> Result<Json<Vec<FlaggedEntryRecord>>, AppError> {
    let flags = match query.user_id.as_deref() {
        Some(user_id) => server.recorder().flags_for_user(user_id).await?,
        None => server.recorder().list_flags().await?,
    };
    Ok(Json(flags))
}

/// Handle POST /v1/flags/:id/dismiss - acknowledge a flag
async fn dismiss_flag(
    State(server): State<Arc<SafetyServer>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let flag_id: FlagId = id
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid flag id {}", id)))?;

    let exists = server
        .recorder()
        .list_flags()
        .await?
        .iter()
        .any(|record| record.id == flag_id);
    if !exists {
        return Err(ServerError::FlagNotFound(id).into());
    }

    server.recorder().dismiss_flag(flag_id).await?;
    tracing::info!(%flag_id, "Flag dismissed");
    Ok(StatusCode::NO_CONTENT)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(server): State<Arc<SafetyServer>>) -> Result<Response, AppError> {
    let body = server.metrics().render()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Application error wrapper for proper HTTP error responses
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match self.0.downcast_ref::<ServerError>() {
            Some(ServerError::SessionNotFound(_)) | Some(ServerError::FlagNotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            Some(ServerError::SessionLimit { .. }) => (StatusCode::TOO_MANY_REQUESTS, "session_limit"),
            Some(ServerError::BadRequest(_)) => (StatusCode::BAD_REQUEST, "invalid_request"),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }

        let body = serde_json::json!({
            "error": {
                "message": self.0.to_string(),
                "type": error_type
            }
        });

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
