//! Bearer token issuance and verification.
//!
//! Tokens are stateless HMAC-signed JWTs carrying `{user, authorized, exp}`.
//! New tokens are signed with HS512; verification also accepts HS256 and
//! HS384 signed with the same secret. There is no revocation: a token is
//! valid until its `exp`.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Result type for token operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Lifetime of tokens issued when none is configured.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Authentication failures. All map to 401 at the gateway.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authority has no signing secret.
    #[error("token secret is not configured")]
    MissingSecret,

    #[error("missing token")]
    MissingToken,

    #[error("unsupported signing algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("malformed token: {reason}")]
    MalformedToken { reason: String },

    #[error("token expired")]
    Expired,

    /// Username or password did not match.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl AuthError {
    fn malformed(reason: impl ToString) -> Self {
        Self::MalformedToken {
            reason: reason.to_string(),
        }
    }
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user: String,
    pub authorized: bool,
    /// Expiry, epoch seconds.
    pub exp: i64,
}

/// Issues and verifies bearer tokens with one shared secret.
pub struct TokenAuthority {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("secret", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl TokenAuthority {
    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issues a token for `subject` valid from now.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingSecret`] if the secret is empty.
    pub fn issue(&self, subject: &str) -> AuthResult<String> {
        self.issue_at(subject, Utc::now().timestamp())
    }

    /// Issues a token as if the current time were `now` (epoch seconds).
    ///
    /// # Errors
    ///
    /// See [`TokenAuthority::issue`].
    pub fn issue_at(&self, subject: &str, now: i64) -> AuthResult<String> {
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user: subject.to_string(),
            authorized: true,
            exp: now.saturating_add(lifetime),
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(AuthError::Signing)
    }

    /// Verifies a token against the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenAuthority::verify_at`].
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verifies a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingToken`] for an empty token
    /// - [`AuthError::UnsupportedAlgorithm`] for a non-HMAC header
    /// - [`AuthError::MalformedToken`] for bad encoding, a bad signature or
    ///   `authorized != true`
    /// - [`AuthError::Expired`] when `now >= exp`
    pub fn verify_at(&self, token: &str, now: i64) -> AuthResult<Claims> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if self.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let header = jsonwebtoken::decode_header(token).map_err(AuthError::malformed)?;
        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::UnsupportedAlgorithm {
                algorithm: format!("{:?}", header.alg),
            });
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        // Expiry is checked below against the caller's clock, without leeway.
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(AuthError::malformed)?;
        let claims = data.claims;

        if !claims.authorized {
            return Err(AuthError::malformed("token is not authorized"));
        }
        if now >= claims.exp {
            debug!(user = %claims.user, exp = claims.exp, now, "Rejected expired token");
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}
