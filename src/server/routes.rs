//! HTTP surface of the auth service.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check (no session required)
//! - `POST /auth/generate-link`: Emails a magic link for `{email}`
//! - `GET /auth/verify?token=..&userId=..`: Redeems a link, sets the session
//!   cookie and redirects
//! - `POST /auth/logout`: Clears the session cookie
//! - `GET /auth/profile`: Current user's profile (session required)
//! - `PUT /auth/profile`: Completes the profile with `{name}` (session required)

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::{header, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Duration;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::cookie::{clear_session_cookie, read_cookie, session_cookie, SESSION_COOKIE};
use super::error::ApiError;
use crate::auth::{AuthError, LinkIssuer, LinkRedeemer, SessionSigner, TokenCodec};
use crate::config::{Config, Environment};
use crate::db::{TokenStore, UserRepository};
use crate::mail::MailQueue;
use crate::models::{User, UserProfile};
use crate::validation::{GenerateLinkRequest, UpdateProfileRequest, VerifyQuery};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: UserRepository,
    pub issuer: Arc<LinkIssuer>,
    pub redeemer: Arc<LinkRedeemer>,
    pub sessions: SessionSigner,
    pub success_redirect_url: String,
    pub environment: Environment,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config, codec: TokenCodec, mail: MailQueue) -> Self {
        let users = UserRepository::new(pool.clone());
        let tokens = TokenStore::new(pool, codec);
        let sessions = SessionSigner::new(
            config.jwt_secret.as_bytes(),
            Duration::days(config.session_ttl_days),
        );

        Self {
            issuer: Arc::new(LinkIssuer::new(
                users.clone(),
                tokens.clone(),
                mail,
                config.public_url.clone(),
                Duration::minutes(config.link_ttl_minutes),
            )),
            redeemer: Arc::new(LinkRedeemer::new(tokens, users.clone(), sessions.clone())),
            users,
            sessions,
            success_redirect_url: config.success_redirect_url.clone(),
            environment: config.environment,
        }
    }

    fn api_error(&self, err: AuthError) -> ApiError {
        ApiError::from_auth(err, !self.environment.is_production())
    }

    fn secure_cookies(&self) -> bool {
        self.environment.is_production()
    }
}

/// The signed-in user, added to request extensions by [`require_session`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Builds the router. Callers add their own outer layers (tracing etc.).
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/auth/profile", get(profile).put(update_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/auth/generate-link", post(generate_link))
        .route("/auth/verify", get(verify))
        .route("/auth/logout", post(logout))
        .merge(protected_routes)
        .fallback(not_found)
        .with_state(state)
}

/// Span for `TraceLayer::make_span_with`.
///
/// Records the path only. The query string of `/auth/verify` carries a live
/// token and must stay out of the logs.
pub fn request_span(request: &Request) -> tracing::Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}

// ============================================================================
// Session middleware
// ============================================================================

async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(credential) = read_cookie(request.headers(), SESSION_COOKIE) else {
        return Err(state.api_error(AuthError::Unauthenticated));
    };

    let claims = state
        .sessions
        .verify(&credential)
        .map_err(|e| state.api_error(e))?;

    let user = state
        .users
        .find_by_id(claims.user_id)
        .await
        .map_err(|e| state.api_error(e.into()))?;
    let Some(user) = user else {
        tracing::warn!(user_id = %claims.user_id, "Session belongs to a missing user");
        return Err(state.api_error(AuthError::UserNotFound));
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ProfileResponse {
    profile: UserProfile,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn generate_link(
    State(state): State<AppState>,
    payload: Result<Json<GenerateLinkRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(body) = payload.map_err(body_rejection)?;
    let email = body.validate().map_err(ApiError::Validation)?;

    state
        .issuer
        .request_link(&email)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(MessageResponse {
        message: "Authentication link generated successfully",
    }))
}

async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Response, ApiError> {
    let session = state
        .redeemer
        .redeem(query.token.as_deref(), query.user_id.as_deref())
        .await
        .map_err(|e| state.api_error(e))?;

    let cookie = session_cookie(
        &session.credential.token,
        session.credential.max_age,
        session.credential.expires_at,
        state.secure_cookies(),
    );

    Ok((
        StatusCode::FOUND,
        [
            (header::LOCATION, state.success_redirect_url.clone()),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response())
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(state.secure_cookies()))],
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}

async fn profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        profile: user.profile(),
    })
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let Json(body) = payload.map_err(body_rejection)?;
    let name = body.validate().map_err(ApiError::Validation)?;

    let updated = state
        .users
        .update_profile(user.id, &name)
        .await
        .map_err(|e| state.api_error(e.into()))?
        .ok_or_else(|| state.api_error(AuthError::UserNotFound))?;

    tracing::info!(user_id = %updated.id, "Profile updated");

    Ok(Json(ProfileResponse {
        profile: updated.profile(),
    }))
}

/// Bodies that are not a JSON object at all. Field-level type problems are
/// reported by `validate` instead.
fn body_rejection(rejection: JsonRejection) -> ApiError {
    tracing::debug!("Rejected request body: {}", rejection.body_text());
    ApiError::BadRequest("Invalid JSON body".to_string())
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Cannot find {} on this server!", uri.path()))
}
