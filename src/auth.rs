//! Session tokens and the extractors that check them.
//!
//! Tokens are HS256 JWTs. They arrive either as `Authorization: Bearer <token>`
//! or in a cookie: `session` for customers, `admin_session` for the admin.

use std::time::Duration;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::aggregates::{Role, User};
use crate::error::{Result, StorefrontError};

pub const USER_COOKIE: &str = "session";
pub const ADMIN_COOKIE: &str = "admin_session";
const ADMIN_SUBJECT: &str = "admin";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    admin_ttl: Duration,
    user_ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &[u8], admin_ttl: Duration, user_ttl: Duration) -> Self {
        Self { encoding: EncodingKey::from_secret(secret), decoding: DecodingKey::from_secret(secret), admin_ttl, user_ttl }
    }

    pub fn admin_ttl(&self) -> Duration { self.admin_ttl }
    pub fn user_ttl(&self) -> Duration { self.user_ttl }

    /// Mints a customer token; called by the sign-in callback once the identity provider vouches for the user.
    pub fn issue_user(&self, user_id: Uuid) -> Result<String> {
        self.issue(user_id.to_string(), Role::User, self.user_ttl)
    }

    pub fn issue_admin(&self) -> Result<String> {
        self.issue(ADMIN_SUBJECT.to_string(), Role::Admin, self.admin_ttl)
    }

    fn issue(&self, sub: String, role: Role, ttl: Duration) -> Result<String> {
        let iat = Utc::now().timestamp();
        let exp = iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        Ok(encode(&Header::new(Algorithm::HS256), &Claims { sub, role, iat, exp }, &self.encoding)?)
    }

    pub fn decode(&self, token: &str) -> Result<Claims> {
        Ok(decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?.claims)
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim)
}

fn cookie<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn unauthenticated() -> StorefrontError { StorefrontError::Unauthorized("Unauthorized request".into()) }

/// Resolves a customer token to an active user.
async fn load_user(state: &AppState, claims: Claims) -> Result<User> {
    if claims.role != Role::User { return Err(unauthenticated()); }
    let id = Uuid::parse_str(&claims.sub).map_err(|_| unauthenticated())?;
    let user = state.services.accounts.user(id).await.map_err(|_| unauthenticated())?;
    if !user.is_active() {
        return Err(StorefrontError::Forbidden(format!("Account is {}", user.status.as_str())));
    }
    Ok(user)
}

/// A signed-in, active customer.
pub struct UserSession(pub User);

/// The store administrator.
pub struct AdminSession;

/// Either kind of session; used where owners and the admin share a route.
pub enum AnySession {
    User(User),
    Admin,
}

impl AnySession {
    /// The customer's id, or `None` for the admin.
    pub fn user_id(&self) -> Option<Uuid> {
        match self { Self::User(u) => Some(u.id), Self::Admin => None }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for UserSession {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer(parts).or_else(|| cookie(parts, USER_COOKIE)).ok_or_else(unauthenticated)?;
        let claims = state.keys.decode(token)?;
        Ok(Self(load_user(state, claims).await?))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer(parts).or_else(|| cookie(parts, ADMIN_COOKIE)).ok_or_else(unauthenticated)?;
        let claims = state.keys.decode(token)?;
        if claims.role != Role::Admin { return Err(unauthenticated()); }
        Ok(Self)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AnySession {
    type Rejection = StorefrontError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer(parts)
            .or_else(|| cookie(parts, ADMIN_COOKIE))
            .or_else(|| cookie(parts, USER_COOKIE))
            .ok_or_else(unauthenticated)?;
        let claims = state.keys.decode(token)?;
        match claims.role {
            Role::Admin => Ok(Self::Admin),
            Role::User => Ok(Self::User(load_user(state, claims).await?)),
        }
    }
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(name: &str, token: &str, ttl: Duration) -> String {
    format!("{name}={token}; HttpOnly; Path=/; SameSite=Strict; Max-Age={}", ttl.as_secs())
}

/// `Set-Cookie` value that clears a session cookie.
pub fn expired_cookie(name: &str) -> String {
    format!("{name}=; HttpOnly; Path=/; SameSite=Strict; Max-Age=0")
}
