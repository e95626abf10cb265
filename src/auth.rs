//! Authentication for the HTTP surface.
//!
//! Logins are checked by opening a throwaway connection to the target with
//! the supplied credentials. A successful login is turned into a pair of
//! HS256-signed tokens: a short-lived access token checked by
//! [`auth_middleware`] and a long-lived refresh token that can be exchanged
//! for a new pair.

use crate::db::ConnectionManager;
use crate::error::{DbError, DbResult};
use crate::models::Credentials;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

pub const MISSING_TOKEN_MESSAGE: &str = "Access token is missing";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Checks user credentials against a target database.
#[derive(Debug, Clone)]
pub struct AuthGate {
    manager: Arc<ConnectionManager>,
}

impl AuthGate {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Verify `login`/`password` by connecting to `target` with them.
    ///
    /// The probe connection bypasses the manager's pools and is always closed
    /// before returning. Unknown targets, rejected credentials and
    /// unreachable databases all fail with [`DbError::Authentication`].
    pub async fn authenticate(&self, target: &str, login: &str, password: &str) -> DbResult<bool> {
        let descriptor = self.manager.target(target).ok_or_else(|| {
            warn!(target_name = %target, login = %login, "Login for unknown target");
            DbError::authentication(login, format!("unknown target '{}'", target))
        })?;

        let credentials = Credentials::new(login, password);
        let probe = self
            .manager
            .driver()
            .connect(&descriptor.connection_string, Some(&credentials))
            .await
            .map_err(|e| {
                warn!(target_name = %target, login = %login, error = %e, "Login rejected");
                let reason = if e.is_authentication() {
                    "invalid login or password".to_string()
                } else {
                    e.to_string()
                };
                DbError::authentication(login, reason)
            })?;

        if let Err(e) = probe.close().await {
            warn!(target_name = %target, error = %e, "Failed to close login probe connection");
        }

        info!(target_name = %target, login = %login, "Login accepted");
        Ok(true)
    }
}

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Raw payload of a verified token, exactly as it was signed.
pub type TokenPayload = serde_json::Map<String, serde_json::Value>;

/// Claims of the session tokens issued by [`TokenIssuer`].
///
/// Claims this crate does not know about are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub iat: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<TokenKind>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Validate an HS256 token's signature and expiry and return its payload.
///
/// Any claims are accepted, the payload is returned untouched. No clock
/// leeway is applied. Issuer and audience are not checked here, see
/// [`TokenIssuer::verify_access`] for that.
pub fn verify_token(token: &str, secret: &str) -> DbResult<TokenPayload> {
    decode_claims(token, secret, None, None)
}

fn decode_claims<T: DeserializeOwned>(
    token: &str,
    secret: &str,
    issuer: Option<&str>,
    audience: Option<&str>,
) -> DbResult<T> {
    if token.trim().is_empty() {
        return Err(DbError::invalid_token("token is missing"));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    // Configured claims must be present, not just correct when present
    let mut required = vec!["exp"];
    if issuer.is_some() {
        required.push("iss");
    }
    if audience.is_some() {
        required.push("aud");
    }
    validation.set_required_spec_claims(&required[..]);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    match audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token has expired".to_string(),
                ErrorKind::InvalidSignature => "signature mismatch".to_string(),
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    "malformed token".to_string()
                }
                _ => e.to_string(),
            };
            DbError::invalid_token(reason)
        })
}

/// Signing settings for session tokens.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl TokenSettings {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            issuer: None,
            audience: None,
        }
    }
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("access_secret", &"****")
            .field("refresh_secret", &"****")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

/// Access and refresh tokens returned by a login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Signs and checks session tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(settings: TokenSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Issue a fresh token pair for `subject` logged in on `target`.
    pub fn issue(&self, subject: &str, target: Option<&str>) -> DbResult<TokenPair> {
        let access_token = self.sign(subject, target, TokenKind::Access)?;
        let refresh_token = self.sign(subject, target, TokenKind::Refresh)?;
        debug!(subject = %subject, "Issued token pair");
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_ttl_secs,
        })
    }

    /// Check an access token, including issuer and audience when configured.
    pub fn verify_access(&self, token: &str) -> DbResult<Claims> {
        let claims = self.decode_as(token, &self.settings.access_secret)?;
        if claims.typ == Some(TokenKind::Refresh) {
            return Err(DbError::invalid_token("refresh token used as access token"));
        }
        Ok(claims)
    }

    /// Exchange a valid refresh token for a new pair.
    pub fn refresh(&self, refresh_token: &str) -> DbResult<TokenPair> {
        let claims = self.decode_as(refresh_token, &self.settings.refresh_secret)?;
        if claims.typ != Some(TokenKind::Refresh) {
            return Err(DbError::invalid_token("not a refresh token"));
        }
        self.issue(&claims.sub, claims.target.as_deref())
    }

    fn decode_as(&self, token: &str, secret: &str) -> DbResult<Claims> {
        decode_claims(
            token,
            secret,
            self.settings.issuer.as_deref(),
            self.settings.audience.as_deref(),
        )
    }

    fn sign(&self, subject: &str, target: Option<&str>, kind: TokenKind) -> DbResult<String> {
        let (secret, ttl) = match kind {
            TokenKind::Access => (&self.settings.access_secret, self.settings.access_ttl_secs),
            TokenKind::Refresh => (
                &self.settings.refresh_secret,
                self.settings.refresh_ttl_secs,
            ),
        };
        let iat = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let claims = Claims {
            sub: subject.to_string(),
            target: target.map(String::from),
            iat,
            exp: iat + ttl,
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
            typ: Some(kind),
            extra: serde_json::Map::new(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| DbError::internal(format!("Failed to sign token: {}", e)))
    }
}

/// Bearer token middleware for protected routes.
///
/// A request without a token gets `401`, a request whose token does not
/// verify gets `403`. On success the [`Claims`] are added to the request
/// extensions.
pub async fn auth_middleware(
    State(issuer): State<Arc<TokenIssuer>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(&request) else {
        warn!(path = %request.uri().path(), "Authentication failed: missing access token");
        return message_response(StatusCode::UNAUTHORIZED, MISSING_TOKEN_MESSAGE);
    };

    match issuer.verify_access(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            warn!(token_prefix = %mask_token(token), error = %e, "Authentication failed: invalid token");
            message_response(StatusCode::FORBIDDEN, INVALID_TOKEN_MESSAGE)
        }
    }
}

/// The credential part of `Authorization: <scheme> <token>`.
fn extract_bearer_token(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    parts.next().filter(|token| !token.is_empty())
}

fn mask_token(token: &str) -> String {
    match token.get(..3) {
        Some(prefix) if token.len() > 3 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

/// JSON body of the form `{"message": "..."}`.
pub(crate) fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}
