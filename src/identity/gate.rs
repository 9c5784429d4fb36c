//! Identity gate: credential resolution and role check.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::identity::credentials::{CredentialStore, Credentials, Identity, SessionState};
use crate::identity::role::RoleSet;

/// Why the identity gate refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityFailure {
    MissingCredentials,
    InvalidCredentials,
    StoreUnavailable,
    SessionExpired,
    SessionNotYetValid,
    ClaimMismatch,
    InsufficientRole,
}

impl IdentityFailure {
    /// Valid session, wrong role. Everything else is unauthenticated.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, IdentityFailure::InsufficientRole)
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            IdentityFailure::MissingCredentials => "missing_credentials",
            IdentityFailure::InvalidCredentials => "invalid_credentials",
            IdentityFailure::StoreUnavailable => "credential_store_unavailable",
            IdentityFailure::SessionExpired => "session_expired",
            IdentityFailure::SessionNotYetValid => "session_not_yet_valid",
            IdentityFailure::ClaimMismatch => "identity_claim_mismatch",
            IdentityFailure::InsufficientRole => "insufficient_role",
        }
    }
}

/// A refusal, with the identity when one was resolved before the refusal.
#[derive(Debug, Clone)]
pub struct IdentityRejection {
    pub failure: IdentityFailure,
    pub identity: Option<Identity>,
}

impl IdentityRejection {
    fn unauthenticated(failure: IdentityFailure) -> Self {
        Self {
            failure,
            identity: None,
        }
    }
}

/// Proof that a request passed the identity gate.
///
/// Only [`IdentityGate::verify`] issues tickets; the rate limiter, validator
/// and business action take the identity from here instead of re-reading
/// credentials.
#[derive(Debug, Clone)]
pub struct GateTicket {
    request_id: String,
    operation: String,
    identity: Identity,
}

impl GateTicket {
    pub(crate) fn issue(request_id: &str, operation: &str, identity: Identity) -> Self {
        Self {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
            identity,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Resolves credentials to an [`Identity`] and checks it against the
/// operation's allowed roles.
pub struct IdentityGate {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    lookup_timeout: Duration,
}

impl IdentityGate {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            lookup_timeout,
        }
    }

    pub async fn verify(
        &self,
        request_id: &str,
        operation: &str,
        credentials: &Credentials,
        allowed: &RoleSet,
    ) -> Result<GateTicket, IdentityRejection> {
        let token = credentials
            .bearer
            .as_deref()
            .ok_or(IdentityRejection::unauthenticated(IdentityFailure::MissingCredentials))?;

        // Fail closed: a slow or broken store is the same as no session.
        let identity = match tokio::time::timeout(self.lookup_timeout, self.store.lookup(token)).await {
            Ok(Ok(Some(identity))) => identity,
            Ok(Ok(None)) => {
                return Err(IdentityRejection::unauthenticated(IdentityFailure::InvalidCredentials));
            }
            Ok(Err(e)) => {
                tracing::error!(request_id, operation, error = %e, "Credential lookup failed");
                return Err(IdentityRejection::unauthenticated(IdentityFailure::StoreUnavailable));
            }
            Err(_) => {
                tracing::error!(
                    request_id,
                    operation,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Credential lookup timed out"
                );
                return Err(IdentityRejection::unauthenticated(IdentityFailure::StoreUnavailable));
            }
        };

        match identity.session.state_at(self.clock.now_utc()) {
            SessionState::Active => {}
            SessionState::Expired => {
                return Err(IdentityRejection::unauthenticated(IdentityFailure::SessionExpired));
            }
            SessionState::NotYetValid => {
                return Err(IdentityRejection::unauthenticated(IdentityFailure::SessionNotYetValid));
            }
        }

        if let Some(claim) = credentials.claimed_subject.as_deref() {
            if claim != identity.subject {
                return Err(IdentityRejection::unauthenticated(IdentityFailure::ClaimMismatch));
            }
        }

        if !allowed.contains(identity.role) {
            return Err(IdentityRejection {
                failure: IdentityFailure::InsufficientRole,
                identity: Some(identity),
            });
        }

        tracing::trace!(request_id, operation, subject = %identity.subject, role = %identity.role, "Identity verified");
        Ok(GateTicket::issue(request_id, operation, identity))
    }
}
