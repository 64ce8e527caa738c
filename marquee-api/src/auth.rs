use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Requester identity; the holder id written into the seat map.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub const ROLE_ADMIN: &str = "ADMIN";

/// Decode the bearer token into claims. Identity extraction only; token
/// issuance, session management and sign-up live outside this service.
pub fn require_claims(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::Authentication(e.to_string()))?;
    Ok(data.claims)
}
