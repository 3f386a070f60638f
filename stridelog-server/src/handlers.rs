//! HTTP request handlers for the stridelog session service
//!
//! Core validation and crypto return explicit errors; this module is the
//! only place they are translated to status codes. Every authentication
//! failure maps to the same generic 401 body.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use stridelog_auth::{AuthError, TokenKind, TokenService};

use crate::middleware::authenticate;
use crate::store::{NewPrincipal, PrincipalStore, StoreError};

type BoxBody = Full<bytes::Bytes>;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub principals: Arc<dyn PrincipalStore>,
}

impl AppState {
    pub fn new(tokens: Arc<TokenService>, principals: Arc<dyn PrincipalStore>) -> Self {
        AppState { tokens, principals }
    }
}

/// Main request handler.
///
/// Generic over the body type so the integration suite can drive the
/// full routing in process.
pub async fn handle_request<B>(
    req: Request<B>,
    state: AppState,
) -> Result<Response<BoxBody>, Infallible>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/health") => handle_health().await,
        (&Method::POST, "/v1/auth/register") => handle_register(req, &state).await,
        (&Method::POST, "/v1/auth/login") => handle_login(req, &state).await,
        (&Method::POST, "/v1/auth/refresh") => handle_refresh(req, &state).await,
        (&Method::POST, "/v1/auth/logout") => handle_logout(req, &state).await,
        (&Method::GET, "/v1/me") => handle_me(req, &state).await,
        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            json!({"error": true, "message": "not found"}),
        )),
    };

    match result {
        Ok(response) => {
            info!("{} {} -> {}", method, path, response.status());
            Ok(response)
        }
        Err(err) if err.is_authentication_failure() => {
            // The specific failed check is logged, never surfaced.
            warn!(
                component = "auth",
                operation = "authenticate",
                error = %err,
                "{} {} rejected",
                method,
                path
            );
            Ok(unauthorized())
        }
        Err(err) => {
            error!("Handler error for {} {}: {}", method, path, err);
            Ok(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": true, "message": "internal server error"}),
            ))
        }
    }
}

/// JSON response builder
pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("server", concat!("stridelog/", env!("CARGO_PKG_VERSION")))
        .body(Full::new(bytes::Bytes::from(body.to_string())))
        .unwrap()
}

/// The one 401 every authentication failure maps to.
pub fn unauthorized() -> Response<BoxBody> {
    json_response(
        StatusCode::UNAUTHORIZED,
        json!({"error": true, "message": "authentication required"}),
    )
}

fn bad_request() -> Response<BoxBody> {
    json_response(
        StatusCode::BAD_REQUEST,
        json!({"error": true, "message": "invalid request body"}),
    )
}

async fn read_body<B>(body: B) -> Option<bytes::Bytes>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    match body.collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(err) => {
            debug!("failed to read request body: {}", err);
            None
        }
    }
}

async fn handle_health() -> Result<Response<BoxBody>, AuthError> {
    Ok(json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "service": "stridelog",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    ))
}

async fn handle_register<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<BoxBody>, AuthError>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    let Some(bytes) = read_body(req.into_body()).await else {
        return Ok(bad_request());
    };
    let new: NewPrincipal = match serde_json::from_slice(&bytes) {
        Ok(new) => new,
        Err(_) => return Ok(bad_request()),
    };
    if new.email.is_empty() || new.password.is_empty() {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": true, "message": "email and password are required"}),
        ));
    }

    match state.principals.create(new).await {
        Ok(principal) => {
            let pair = state.tokens.issue(&principal)?;
            info!(
                component = "auth",
                operation = "register",
                subject = %principal.id,
                "principal registered"
            );
            Ok(json_response(
                StatusCode::CREATED,
                json!({
                    "principal": {"id": principal.id, "email": principal.email},
                    "access_token": pair.access_token,
                    "refresh_token": pair.refresh_token,
                    "token_type": "Bearer",
                }),
            ))
        }
        Err(StoreError::EmailTaken) => Ok(json_response(
            StatusCode::CONFLICT,
            json!({"error": true, "message": "email already registered"}),
        )),
        Err(StoreError::Auth(err)) => Err(err),
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn handle_login<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>, AuthError>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    let Some(bytes) = read_body(req.into_body()).await else {
        return Ok(bad_request());
    };
    let creds: LoginRequest = match serde_json::from_slice(&bytes) {
        Ok(creds) => creds,
        Err(_) => return Ok(bad_request()),
    };

    match state
        .principals
        .verify_password(&creds.email, &creds.password)
        .await
    {
        Some(principal) => {
            let pair = state.tokens.issue(&principal)?;
            info!(
                component = "auth",
                operation = "login",
                subject = %principal.id,
                "login succeeded"
            );
            Ok(json_response(
                StatusCode::OK,
                json!({
                    "access_token": pair.access_token,
                    "refresh_token": pair.refresh_token,
                    "token_type": "Bearer",
                    "expires_in": state.tokens.config().access_ttl.as_secs(),
                }),
            ))
        }
        None => {
            warn!(component = "auth", operation = "login", "invalid credentials");
            Ok(json_response(
                StatusCode::UNAUTHORIZED,
                json!({"error": true, "message": "invalid email or password"}),
            ))
        }
    }
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn handle_refresh<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<BoxBody>, AuthError>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    let Some(bytes) = read_body(req.into_body()).await else {
        return Ok(bad_request());
    };
    let body: RefreshRequest = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(_) => return Ok(bad_request()),
    };

    let refresh = state
        .tokens
        .validate(&body.refresh_token, TokenKind::Refresh)?;

    let Some(principal) = state.principals.find_by_id(&refresh.subject).await else {
        warn!(
            component = "auth",
            operation = "refresh",
            subject = %refresh.subject,
            "refresh for unknown principal"
        );
        return Ok(unauthorized());
    };

    // Rotation: the used refresh token is retired before the new pair
    // goes out.
    state.tokens.revoke(&refresh);
    let pair = state.tokens.issue(&principal)?;

    Ok(json_response(
        StatusCode::OK,
        json!({
            "access_token": pair.access_token,
            "refresh_token": pair.refresh_token,
            "token_type": "Bearer",
            "expires_in": state.tokens.config().access_ttl.as_secs(),
        }),
    ))
}

#[derive(Deserialize, Default)]
struct LogoutRequest {
    refresh_token: Option<String>,
}

async fn handle_logout<B>(
    req: Request<B>,
    state: &AppState,
) -> Result<Response<BoxBody>, AuthError>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    let identity = authenticate(&req, &state.tokens)?;

    let Some(bytes) = read_body(req.into_body()).await else {
        return Ok(bad_request());
    };
    let body: LogoutRequest = if bytes.is_empty() {
        LogoutRequest::default()
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(_) => return Ok(bad_request()),
        }
    };

    state.tokens.revoke(&identity.token);
    if let Some(raw) = body.refresh_token.as_deref() {
        // Best effort: an invalid refresh token does not fail a logout
        // that already revoked the access token.
        if let Ok(refresh) = state.tokens.validate(raw, TokenKind::Refresh) {
            state.tokens.revoke(&refresh);
        }
    }

    Ok(json_response(StatusCode::OK, json!({"success": true})))
}

async fn handle_me<B>(req: Request<B>, state: &AppState) -> Result<Response<BoxBody>, AuthError>
where
    B: hyper::body::Body,
    B::Data: bytes::Buf,
    B::Error: std::fmt::Display,
{
    let identity = authenticate(&req, &state.tokens)?;

    let profile = state
        .principals
        .profile(&identity.id)
        .await
        .unwrap_or(serde_json::Value::Null);

    Ok(json_response(
        StatusCode::OK,
        json!({
            "id": identity.id,
            "email": identity.email,
            "profile": profile,
        }),
    ))
}
