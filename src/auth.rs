use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// Share links are meant to last for the life of a trip and well beyond.
const TOKEN_LIFETIME_DAYS: i64 = 3650;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub group_id: Uuid,
    pub exp: usize,
}

/// Signing keys for share-link tokens, held in Rocket's managed state.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secret(secret: &str) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issues a token granting access to one group.
    pub fn issue(&self, group_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            group_id,
            exp: (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }
}

/// Request guard: the group a valid `Authorization: Bearer <token>` header grants.
pub struct GroupAuth {
    pub group_id: Uuid,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("invalid bearer token")]
    Invalid,
    #[error("token keys are not configured")]
    Unconfigured,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GroupAuth {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(keys) = request.rocket().state::<TokenKeys>() else {
            tracing::error!("token keys missing from managed state");
            return Outcome::Error((Status::InternalServerError, AuthError::Unconfigured));
        };

        let Some(header) = request.headers().get_one("Authorization") else {
            return Outcome::Error((Status::Unauthorized, AuthError::Missing));
        };
        let Some(token) = header.strip_prefix("Bearer ") else {
            return Outcome::Error((Status::Unauthorized, AuthError::Invalid));
        };

        match keys.verify(token) {
            Ok(claims) => Outcome::Success(GroupAuth {
                group_id: claims.group_id,
            }),
            Err(error) => {
                tracing::debug!(%error, "rejected share token");
                Outcome::Error((Status::Unauthorized, AuthError::Invalid))
            }
        }
    }
}
