//! Session token configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;
use crate::adapters::auth::JwtConfig;

const MIN_PRODUCTION_SECRET_LEN: usize = 32;

/// HS256 tokens issued by the identity service.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,

    /// Expected `iss`, when set
    pub jwt_issuer: Option<String>,

    /// Expected `aud`, when set
    pub jwt_audience: Option<String>,
}

impl AuthConfig {
    pub fn jwt_config(&self) -> JwtConfig {
        let mut config = JwtConfig::new(self.jwt_secret.clone());
        if let Some(issuer) = &self.jwt_issuer {
            config = config.with_issuer(issuer.clone());
        }
        if let Some(audience) = &self.jwt_audience {
            config = config.with_audience(audience.clone());
        }
        config
    }

    pub fn validate(&self, environment: Environment) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if environment == Environment::Production && secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(ValidationError::WeakJwtSecret(MIN_PRODUCTION_SECRET_LEN));
        }
        Ok(())
    }
}
