//! Request credentials, resolved identities and the credential store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::config::SessionConfig;
use crate::identity::role::Role;

/// Credentials presented with a request.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Opaque bearer token.
    pub bearer: Option<String>,
    /// Subject id the caller claims to be, checked against the resolved identity.
    pub claimed_subject: Option<String>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer: Some(token.into()),
            claimed_subject: None,
        }
    }

    pub fn with_claim(mut self, subject: impl Into<String>) -> Self {
        self.claimed_subject = Some(subject.into());
        self
    }

    /// Parse an `Authorization` header value. Anything other than a non-empty
    /// `Bearer` token is treated as no credentials.
    pub fn from_authorization(header: Option<&str>) -> Self {
        let bearer = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            bearer,
            claimed_subject: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("claimed_subject", &self.claimed_subject)
            .finish()
    }
}

/// Validity window of a session. Open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionWindow {
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

/// Where `now` falls relative to a session window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    NotYetValid,
    Expired,
}

impl SessionWindow {
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.not_before.is_some_and(|start| now < start) {
            SessionState::NotYetValid
        } else if self.not_after.is_some_and(|end| now >= end) {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

/// A resolved caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
    pub session: SessionWindow,
}

#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup of bearer tokens. Implementations may perform I/O; the identity
/// gate bounds every call with a timeout.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` means the token is not known.
    async fn lookup(&self, token: &str) -> Result<Option<Identity>, CredentialError>;
}

/// Token table loaded from configuration.
#[derive(Default)]
pub struct StaticCredentialStore {
    sessions: HashMap<String, Identity>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(sessions: &[SessionConfig]) -> Self {
        let mut store = Self::new();
        for session in sessions {
            store.insert(
                session.token.clone(),
                Identity {
                    subject: session.subject.clone(),
                    role: session.role,
                    session: SessionWindow {
                        not_before: session.valid_from,
                        not_after: session.valid_until,
                    },
                },
            );
        }
        store
    }

    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.sessions.insert(token.into(), identity);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn lookup(&self, token: &str) -> Result<Option<Identity>, CredentialError> {
        Ok(self.sessions.get(token).cloned())
    }
}
