//! HS256 JWT adapter for the `SessionValidator` port.
//!
//! Tokens are issued by the identity service with a shared secret. The
//! adapter validates:
//!
//! - **Signature**: HMAC-SHA256 with the shared secret
//! - **Expiry (exp)**: Must be in the future
//! - **Issuer (iss)** / **Audience (aud)**: When configured
//!
//! and maps `sub` + `role` to an [`AuthenticatedUser`].
//!
//! # Example
//!
//! ```ignore
//! let config = JwtConfig::new(secret).with_issuer("https://id.example.com");
//! let validator = JwtSessionValidator::new(config);
//! let user = validator.validate("eyJ...").await?;
//! ```

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId, UserRole};
use crate::ports::SessionValidator;

/// Configuration for the HS256 validator.
#[derive(Clone)]
pub struct JwtConfig {
    secret: SecretString,
    issuer: Option<String>,
    audience: Option<String>,
    /// Clock skew tolerance in seconds.
    leeway_secs: u64,
}

impl JwtConfig {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            issuer: None,
            audience: None,
            leeway_secs: 30,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

/// Claims the identity service puts in its tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject - the user ID
    pub sub: String,

    /// Expiry timestamp (Unix epoch seconds)
    pub exp: i64,

    #[serde(default)]
    pub role: UserRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Shared-secret JWT session validator.
pub struct JwtSessionValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionValidator {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                use jsonwebtoken::errors::ErrorKind;
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        tracing::debug!("Token expired");
                        AuthError::TokenExpired
                    }
                    ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
                        tracing::warn!(error = %e, "Token issued for another service");
                        AuthError::InvalidToken
                    }
                    _ => {
                        tracing::debug!(error = %e, "Token rejected");
                        AuthError::InvalidToken
                    }
                }
            },
        )?;

        let id = UserId::new(data.claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthenticatedUser::new(id, data.claims.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-session-secret";

    fn token(secret: &str, claims: &SessionClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims(role: UserRole, exp_offset: i64) -> SessionClaims {
        SessionClaims {
            sub: "user-1".into(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            role,
            iss: None,
            aud: None,
        }
    }

    fn validator() -> JwtSessionValidator {
        JwtSessionValidator::new(JwtConfig::new(SecretString::new(SECRET.into())))
    }

    #[tokio::test]
    async fn valid_token_yields_user_and_role() {
        let user = validator()
            .validate(&token(SECRET, &claims(UserRole::Admin, 600)))
            .await
            .unwrap();
        assert_eq!(user.id.as_str(), "user-1");
        assert_eq!(user.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn missing_role_defaults_to_user() {
        let user = validator()
            .validate(&token(SECRET, &claims(UserRole::default(), 600)))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::User);
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let err = validator()
            .validate(&token("another-secret", &claims(UserRole::User, 600)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn expired_token_is_reported() {
        let err = validator()
            .validate(&token(SECRET, &claims(UserRole::User, -3600)))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn issuer_is_enforced_when_configured() {
        let validator = JwtSessionValidator::new(
            JwtConfig::new(SecretString::new(SECRET.into())).with_issuer("https://id.test"),
        );
        let mut c = claims(UserRole::User, 600);
        c.iss = Some("https://evil.test".into());
        assert_eq!(
            validator.validate(&token(SECRET, &c)).await.unwrap_err(),
            AuthError::InvalidToken
        );

        c.iss = Some("https://id.test".into());
        assert!(validator.validate(&token(SECRET, &c)).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        assert_eq!(
            validator().validate("not-a-jwt").await.unwrap_err(),
            AuthError::InvalidToken
        );
    }
}
