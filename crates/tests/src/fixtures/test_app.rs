use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use vidmesh_api::{build_router, state::AppState};
use vidmesh_config::{
    AppSettings, DatabaseSettings, JwtSettings, MediasoupSettings, ReapSettings, Settings,
    TurnSettings,
};
use vidmesh_session::auth::{AuthError, TokenVerifier, VerifiedIdentity};
use vidmesh_session::call_store::{CallStore, InMemoryCallStore};
use vidmesh_session::room::{UserId, GUEST_USER_PREFIX};

use super::ws_client::WsClient;

/// Maps opaque bearer tokens to identities, mutable after construction so a
/// running `TestApp` can mint new test users on demand. Distinct from
/// `vidmesh_session::auth::test_util::StaticTokenVerifier` (that one is built
/// once, up front, for in-crate unit tests); this one exists purely for
/// black-box wiring and has no reason to live in `vidmesh-session` itself.
#[derive(Default)]
pub struct TestTokenVerifier {
    tokens: Mutex<HashMap<String, VerifiedIdentity>>,
}

impl TestTokenVerifier {
    fn register(&self, token: String, identity: VerifiedIdentity) {
        self.tokens.lock().unwrap().insert(token, identity);
    }
}

#[async_trait]
impl TokenVerifier for TestTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::Invalid)
    }
}

/// A running signaling server over `InMemoryCallStore` and a mintable token
/// fixture — no MongoDB, no real JWTs. Grounded on the teacher's
/// `TestApp::spawn` (`crates/tests/src/fixtures/test_app.rs`): bind to a
/// random port, spawn `axum::serve` in the background, hand back the address.
pub struct TestApp {
    pub addr: SocketAddr,
    pub settings: Settings,
    token_verifier: Arc<TestTokenVerifier>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Like `spawn`, but lets the caller tweak settings first — e.g.
    /// shrinking `reap.grace_period_secs` so reap-correctness tests don't
    /// have to wait out the production default.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = test_settings();
        mutator(&mut settings);

        let call_store: Arc<dyn CallStore> = Arc::new(InMemoryCallStore::new());
        let token_verifier = Arc::new(TestTokenVerifier::default());
        let app_state = AppState::with_collaborators(
            settings.clone(),
            call_store,
            token_verifier.clone() as Arc<dyn TokenVerifier>,
        )
        .await
        .expect("failed to build AppState against in-memory collaborators");

        vidmesh_api::spawn_reap_sweep(app_state.clone());
        let app = build_router(app_state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind a random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            addr,
            settings,
            token_verifier,
        }
    }

    /// Mints a bearer token for a non-guest identity and registers it with
    /// the fixture's verifier.
    pub fn issue_token(&self, user_id: &str, display_name: &str) -> String {
        let token = format!("test-token-{}", uuid::Uuid::new_v4().simple());
        self.token_verifier.register(
            token.clone(),
            VerifiedIdentity {
                user_id: UserId::new(user_id),
                display_name: display_name.to_string(),
                email: None,
                is_guest: false,
            },
        );
        token
    }

    /// Mints a bearer token for a guest identity (invariant P3: the
    /// resulting `userId` carries `GUEST_USER_PREFIX`).
    pub fn issue_guest_token(&self, display_name: &str) -> String {
        let token = format!("test-token-{}", uuid::Uuid::new_v4().simple());
        let user_id = format!("{GUEST_USER_PREFIX}{}", uuid::Uuid::new_v4().simple());
        self.token_verifier.register(
            token.clone(),
            VerifiedIdentity {
                user_id: UserId::new(user_id),
                display_name: display_name.to_string(),
                email: None,
                is_guest: true,
            },
        );
        token
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={token}", self.addr)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        WsClient::connect(&self.ws_url(token)).await
    }
}

fn test_settings() -> Settings {
    Settings {
        app: AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: DatabaseSettings {
            url: "mongodb://localhost:27019".to_string(),
            name: "vidmesh_test".to_string(),
            max_pool_size: Some(5),
            min_pool_size: Some(1),
        },
        jwt: JwtSettings {
            secret: "test-secret-key-for-jwt-signing-minimum-32-chars".to_string(),
            access_token_ttl_secs: 3600,
            issuer: "vidmesh-test".to_string(),
        },
        mediasoup: MediasoupSettings {
            num_workers: 1,
            listen_ip: "0.0.0.0".to_string(),
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 40100,
        },
        turn: TurnSettings {
            stun_server: None,
            turn_server_url: None,
            turn_server_username: None,
            turn_server_credential: None,
        },
        reap: ReapSettings {
            grace_period_secs: 1,
            sweep_interval_secs: 120,
            empty_room_ttl_secs: 300,
        },
    }
}
