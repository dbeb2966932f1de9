use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use vidmesh_config::JwtSettings;
use vidmesh_session::auth::{AuthError, TokenVerifier, VerifiedIdentity};
use vidmesh_session::room::{UserId, GUEST_USER_PREFIX};

/// JWT claims, grounded on the teacher's `Claims`
/// (`services/src/auth/mod.rs`), widened with `is_guest`/`display_name` per
/// the guest-access supplementation (SPEC_FULL.md §11). Unlike the
/// teacher's access/refresh pair this crate only ever verifies signaling
/// tokens — refresh-token issuance is out of scope (spec.md §6.3 Non-goals:
/// account/session management lives upstream of this service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub display_name: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    #[serde(default)]
    pub is_guest: bool,
}

pub struct JwtTokenVerifier {
    settings: JwtSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtTokenVerifier {
    pub fn new(settings: JwtSettings) -> Self {
        let encoding_key = EncodingKey::from_secret(settings.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(settings.secret.as_bytes());
        Self {
            settings,
            encoding_key,
            decoding_key,
        }
    }

    /// Mints a short-lived guest token so a caller with no account can join
    /// an invited-only-off room without ever touching the real user store
    /// (SPEC_FULL.md §11, §12 Open Question: guest identity never calls the
    /// CallStore's user lookups — invariant P3 on `UserId::is_guest`).
    pub fn issue_guest_token(&self, display_name: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: format!("{GUEST_USER_PREFIX}{}", uuid::Uuid::new_v4()),
            email: None,
            display_name: display_name.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.settings.access_token_ttl_secs as i64)).timestamp(),
            iss: self.settings.issuer.clone(),
            is_guest: true,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| AuthError::Invalid)
    }
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let mut validation = Validation::default();
        validation.set_issuer(&[&self.settings.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::Invalid)?;
        let claims = data.claims;

        Ok(VerifiedIdentity {
            user_id: UserId::new(claims.sub),
            display_name: claims.display_name,
            email: claims.email,
            is_guest: claims.is_guest,
        })
    }
}
