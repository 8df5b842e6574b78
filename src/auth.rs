//! Bearer token verification.
//!
//! User accounts, sign-in and token issuance live in the external identity
//! service; this crate only verifies the JSON Web Tokens it issued and
//! extracts the caller's identity from them. [Claims] doubles as an axum
//! extractor, so any handler that names it in its signature is
//! authenticated.

use axum::{
    Json, RequestPartsExt,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Duration, OffsetDateTime};

use crate::{AppState, database_id::UserID, policy::Role};

/// How long issued tokens stay valid.
const TOKEN_LIFETIME: Duration = Duration::minutes(15);

/// The contents of a JSON Web Token: the verified identity of the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The ID of the user the token was issued to.
    pub sub: UserID,
    /// The role granted to the user.
    pub role: Role,
    /// The expiry time of the token.
    pub exp: usize,
    /// The time the token was issued.
    pub iat: usize,
}

impl<S> FromRequestParts<S> for Claims
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;

        let app_state = AppState::from_ref(state);
        let token_data = decode_token(bearer.token(), &app_state.jwt_keys.decoding_key)?;

        Ok(token_data.claims)
    }
}

/// The signing and verification keys for JWTs, derived from one shared
/// secret.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding_key: EncodingKey,
    pub decoding_key: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }
}

/// Errors that occur while verifying or minting tokens.
#[derive(Debug)]
pub enum AuthError {
    /// The bearer token is missing, malformed, expired or signed with the
    /// wrong key.
    InvalidToken,
    /// A token could not be created.
    TokenCreation,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenCreation => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Token creation error")
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Mint a token for `user_id` with `role`.
///
/// The server binary exposes this for operational tooling, and tests use it
/// to act as different roles.
///
/// # Errors
/// Returns an [AuthError::TokenCreation] if signing fails.
pub fn encode_token(
    user_id: UserID,
    role: Role,
    encoding_key: &EncodingKey,
) -> Result<String, AuthError> {
    let now = OffsetDateTime::now_utc();
    let claims = Claims {
        sub: user_id,
        role,
        exp: (now + TOKEN_LIFETIME).unix_timestamp() as usize,
        iat: now.unix_timestamp() as usize,
    };

    encode(&jsonwebtoken::Header::default(), &claims, encoding_key)
        .map_err(|_| AuthError::TokenCreation)
}

fn decode_token(
    token: &str,
    decoding_key: &DecodingKey,
) -> Result<TokenData<Claims>, AuthError> {
    decode::<Claims>(token, decoding_key, &Validation::default())
        .map_err(|_| AuthError::InvalidToken)
}
