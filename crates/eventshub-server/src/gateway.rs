//! HTTP request gateway.
//!
//! Maps the `/api/v1` routes onto repository and token operations. Handlers
//! share an explicit [`AppContext`]; repository calls run on the blocking
//! pool so a slow disk never stalls the async workers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eventshub_core::TemporalCodec;
use eventshub_protocol::{
    AddEventRequest, AddEventResponse, ChecksumRequest, ChecksumResponse, Credentials,
    EventsResponse, KillRequest, KillResponse, ProtocolError, RangeRequest, ResponseStatus,
    StatusResponse, TokenMessage, VersionResponse, decode_body, routes,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::{AuthError, Claims, TokenAuthority};
use crate::repository::{EventRepository, StorageError, StorageResult};
use crate::signals::{ShutdownHandle, ShutdownReason};

/// Shared secret check for the kill switch endpoint.
pub struct KillSwitch {
    digest: [u8; 32],
    delay: Duration,
}

impl fmt::Debug for KillSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillSwitch")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl KillSwitch {
    pub fn new(secret: &str, delay: Duration) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
            delay,
        }
    }

    /// Whether `payload` is the configured secret. Compares digests, never
    /// the raw strings.
    pub fn matches(&self, payload: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(payload.as_bytes()).into();
        candidate == self.digest
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppContext {
    pub repository: Arc<dyn EventRepository>,
    pub tokens: Arc<TokenAuthority>,
    pub codec: TemporalCodec,
    pub shutdown: ShutdownHandle,
    pub kill_switch: Arc<KillSwitch>,
}

impl AppContext {
    pub fn new(
        repository: Arc<dyn EventRepository>,
        tokens: TokenAuthority,
        codec: TemporalCodec,
        shutdown: ShutdownHandle,
        kill_switch: KillSwitch,
    ) -> Self {
        Self {
            repository,
            tokens: Arc::new(tokens),
            codec,
            shutdown,
            kill_switch: Arc::new(kill_switch),
        }
    }

    /// Runs a repository call on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn EventRepository) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let repository = Arc::clone(&self.repository);
        tokio::task::spawn_blocking(move || op(repository.as_ref()))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?
            .map_err(ApiError::Storage)
    }
}

/// Gateway failure, rendered as a `ResponseStatus` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingSecret | AuthError::Signing(_) => Self::Internal(err.to_string()),
            other => Self::Unauthorized(other),
        }
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Unauthorized(err) => {
                warn!(error = %err, "Rejected unauthenticated request");
                err.to_string()
            }
            Self::BadRequest(message) => {
                debug!(%message, "Rejected malformed request");
                message.clone()
            }
            Self::Storage(err) => {
                error!(error = %err, "Storage failure");
                "Storage failure.".to_string()
            }
            Self::Internal(message) => {
                error!(%message, "Internal failure");
                "Internal failure.".to_string()
            }
        };
        (self.status_code(), Json(ResponseStatus::failure(message))).into_response()
    }
}

/// Gives a bare 408 from the timeout layer the usual failure body.
pub(crate) async fn timeout_envelope(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    warn!("Request timed out");
    (
        StatusCode::REQUEST_TIMEOUT,
        Json(ResponseStatus::failure("Request timed out.")),
    )
        .into_response()
}

/// Extractor for a request carrying a valid bearer token.
#[derive(Debug, Clone)]
pub struct Authorized(pub Claims);

impl FromRequestParts<AppContext> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, ctx: &AppContext) -> Result<Self, ApiError> {
        let token = presented_token(&parts.headers).unwrap_or_default();
        Ok(Self(ctx.tokens.verify(token)?))
    }
}

/// The `Token` header, or an `Authorization: Bearer` header.
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(routes::TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        return Some(token);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Builds the API router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route(routes::VERSION, get(version))
        .route(routes::LOGIN, post(login))
        .route(routes::INSERT_EVENT, post(insert_event))
        .route(
            routes::EVENT_CHECKSUM,
            get(event_checksum).post(event_checksum),
        )
        .route(routes::EVENTS_IN_RANGE, post(events_in_range))
        .route(routes::STATUS, get(status))
        .route(routes::KILL, post(kill))
        .with_state(ctx)
}

async fn version(Authorized(_): Authorized) -> Json<VersionResponse> {
    Json(VersionResponse::current())
}

#[instrument(skip_all)]
async fn login(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> Result<Json<TokenMessage>, ApiError> {
    let credentials: Credentials = decode_body(&body)?;
    let username = credentials.username.clone();

    let valid = ctx
        .blocking(move |repo| repo.authenticate(&credentials.username, &credentials.password))
        .await?;
    if !valid {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = ctx.tokens.issue(&username)?;
    info!(%username, "Issued token");
    Ok(Json(TokenMessage { token }))
}

#[instrument(skip_all)]
async fn insert_event(
    State(ctx): State<AppContext>,
    Authorized(claims): Authorized,
    body: Bytes,
) -> Result<Json<AddEventResponse>, ApiError> {
    let AddEventRequest { event } = decode_body(&body)?;
    if event.uuid.trim().is_empty() {
        return Err(ApiError::BadRequest("Event uuid is required.".to_string()));
    }

    let upsert = ctx
        .blocking(move |repo| repo.insert_or_update(&event))
        .await?;
    info!(
        user = %claims.user,
        uuid = %upsert.event.uuid,
        id = upsert.event.id,
        outcome = upsert.outcome.as_str(),
        "Event submitted"
    );
    Ok(Json(AddEventResponse::new(ResponseStatus::ok_with(
        upsert.outcome.as_str(),
    ))))
}

#[instrument(skip_all)]
async fn event_checksum(
    State(ctx): State<AppContext>,
    Authorized(_): Authorized,
    body: Bytes,
) -> Result<(StatusCode, Json<ChecksumResponse>), ApiError> {
    let ChecksumRequest { uuid } = decode_body(&body)?;
    if uuid.trim().is_empty() {
        return Err(ApiError::BadRequest("Event uuid is required.".to_string()));
    }

    let lookup = uuid.clone();
    match ctx.blocking(move |repo| repo.get_by_uuid(&lookup)).await? {
        Some(event) => Ok((StatusCode::OK, Json(ChecksumResponse::found(event.checksum())))),
        None => {
            debug!(%uuid, "Checksum requested for unknown event");
            Ok((
                StatusCode::NOT_FOUND,
                Json(ChecksumResponse::failure("Event not found.")),
            ))
        }
    }
}

#[instrument(skip_all)]
async fn events_in_range(
    State(ctx): State<AppContext>,
    Authorized(_): Authorized,
    body: Bytes,
) -> Result<Json<EventsResponse>, ApiError> {
    let RangeRequest { start, end } = decode_body(&body)?;
    let start = ctx.codec.encode(&start);
    let end = ctx.codec.encode(&end);

    let events = ctx
        .blocking(move |repo| repo.range_query(start, end))
        .await?;
    debug!(start, end, count = events.len(), "Range query");
    Ok(Json(EventsResponse::found(events)))
}

async fn status(State(ctx): State<AppContext>, Authorized(_): Authorized) -> Json<StatusResponse> {
    match ctx.blocking(|repo| repo.get_status()).await {
        Ok(record) => Json(StatusResponse::new(record.timestamp, record.version)),
        Err(err) => {
            warn!(error = %err, "Status unavailable");
            Json(StatusResponse::failure(err.to_string()))
        }
    }
}

async fn kill(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> Result<Json<KillResponse>, ApiError> {
    let request: KillRequest = decode_body(&body)?;
    if !ctx.kill_switch.matches(&request.payload) {
        warn!("Kill request rejected: wrong payload");
        return Ok(Json(KillResponse::rejected()));
    }

    let delay = ctx.kill_switch.delay();
    warn!(delay_ms = delay.as_millis() as u64, "Received external kill signal");
    ctx.shutdown.trigger_after(ShutdownReason::KillSwitch, delay);
    Ok(Json(KillResponse::scheduled(delay.as_secs())))
}
