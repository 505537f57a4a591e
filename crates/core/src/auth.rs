//! Actor resolution.
//!
//! Credential issuance lives outside this crate. Transports hand the raw
//! credentials to an [`AuthVerifier`] and pass the resulting [`Actor`] to the
//! services: reads accept `Option<&Actor>`, mutations take `&Actor`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tubeline_common::{AppError, AppResult};

/// The authenticated user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    /// Actor for user `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Raw credentials as received by a transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: Option<String>,
}

impl Credentials {
    /// Extract a bearer token from an `Authorization` header value.
    #[must_use]
    pub fn from_header(header: Option<&str>) -> Self {
        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        Self { token }
    }
}

/// Resolves credentials to an actor.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verify `credentials`; failure is [`AppError::Unauthenticated`].
    async fn verify(&self, credentials: &Credentials) -> AppResult<Actor>;

    /// Verify when credentials are present, else resolve to no actor.
    async fn verify_optional(&self, credentials: &Credentials) -> AppResult<Option<Actor>> {
        if credentials.token.is_none() {
            return Ok(None);
        }
        self.verify(credentials).await.map(Some)
    }
}

/// Shared verifier handle.
pub type SharedAuthVerifier = Arc<dyn AuthVerifier>;

/// Verifier over a fixed token table, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as user `user_id`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl AuthVerifier for StaticTokenVerifier {
    async fn verify(&self, credentials: &Credentials) -> AppResult<Actor> {
        let user_id = credentials
            .token
            .as_deref()
            .and_then(|token| self.tokens.get(token))
            .ok_or(AppError::Unauthenticated)?;
        Ok(Actor::new(user_id.clone()))
    }
}

/// The actor of a mutation; absence is [`AppError::Unauthenticated`].
pub fn require_actor(actor: Option<&Actor>) -> AppResult<&Actor> {
    actor.ok_or(AppError::Unauthenticated)
}
