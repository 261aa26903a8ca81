use crate::core::errors::LedgerError;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;

/// Claims issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Stable user id at the provider
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct IdentityProfile {
    pub stable_user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<Claims> for IdentityProfile {
    fn from(claims: Claims) -> Self {
        IdentityProfile {
            stable_user_id: claims.sub,
            display_name: claims.name,
            avatar_url: claims.picture,
        }
    }
}

pub struct JwtService {
    secret: String,
}

impl JwtService {
    pub fn new(secret: String) -> Self {
        JwtService { secret }
    }

    /// Issues a one-hour token. Production tokens come from the provider;
    /// this is for local runs and tests that share the secret.
    pub fn generate_token(&self, user_id: &str, name: &str, picture: Option<&str>) -> Result<String, LedgerError> {
        let expiration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as usize + 3600)
            .map_err(|e| LedgerError::InternalServerError(format!("Time error: {}", e)))?;

        let claims = Claims {
            sub: user_id.to_string(),
            name: name.to_string(),
            picture: picture.map(String::from),
            exp: expiration,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| LedgerError::InternalServerError(format!("JWT encoding error: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, LedgerError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| LedgerError::InvalidToken(e.to_string()))?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(LedgerError::InvalidToken("empty subject".to_string()));
        }
        Ok(token_data.claims)
    }

    pub fn verify(&self, token: &str) -> Result<IdentityProfile, LedgerError> {
        self.validate_token(token).map(IdentityProfile::from)
    }
}
