use crate::room::UserId;
use async_trait::async_trait;
use serde::Serialize;

/// Identity resolved from a signaling token. Grounded on the teacher's
/// `Claims`/`AuthService::verify_token` (`services/src/auth/mod.rs`), widened
/// per guest-access supplementation (SPEC_FULL.md §11): a verifier may hand
/// back a guest identity it minted on the spot rather than one backed by a
/// user record, signalled by `is_guest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub email: Option<String>,
    pub is_guest: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is missing")]
    Missing,
    #[error("token is malformed or expired")]
    Invalid,
}

/// Session logic depends on this trait, never on a concrete JWT/OAuth
/// implementation — the inversion that lets `vidmesh-api` wire in
/// `jsonwebtoken` verification while `vidmesh-tests` wires in a static
/// fixture, both against the same contract.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use std::collections::HashMap;

    /// Maps literal token strings to identities; lets registry/media tests
    /// drive auth without a JWT dependency.
    #[derive(Default)]
    pub struct StaticTokenVerifier {
        tokens: HashMap<String, VerifiedIdentity>,
    }

    impl StaticTokenVerifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_token(mut self, token: impl Into<String>, identity: VerifiedIdentity) -> Self {
            self.tokens.insert(token.into(), identity);
            self
        }
    }

    #[async_trait]
    impl TokenVerifier for StaticTokenVerifier {
        async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
            self.tokens.get(token).cloned().ok_or(AuthError::Invalid)
        }
    }
}
