use mongodb::Database;
use std::sync::Arc;
use vidmesh_config::Settings;
use vidmesh_db::MongoCallStore;
use vidmesh_session::auth::TokenVerifier;
use vidmesh_session::call_store::CallStore;
use vidmesh_session::clock::system_clock;
use vidmesh_session::media::{MediaSession, WorkerPool};
use vidmesh_session::room::RoomRegistry;

use crate::auth::JwtTokenVerifier;
use crate::ws::rate_limit::AuthRateLimiter;
use crate::ws::storage::WsStorage;

/// Everything a signaling connection needs, cheap to `Clone` (every field
/// is an `Arc` or plain data), grounded on the teacher's `AppState`
/// (`api/src/state.rs`). `token_verifier`/the registry's `CallStore` are
/// trait objects rather than concrete Mongo/JWT types (SPEC_FULL.md §0) so
/// `vidmesh-tests` can build the same router over in-memory fakes instead
/// of live collaborators.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub room_registry: Arc<RoomRegistry>,
    pub media_session: Arc<MediaSession>,
    pub ws_storage: Arc<WsStorage>,
    pub auth_rate_limiter: Arc<AuthRateLimiter>,
}

impl AppState {
    /// Production entry point: a live Mongo-backed `CallStore` and a
    /// JWT-verifying `TokenVerifier`.
    pub async fn new(db: Database, settings: Settings) -> anyhow::Result<Self> {
        let token_verifier: Arc<dyn TokenVerifier> = Arc::new(JwtTokenVerifier::new(settings.jwt.clone()));
        let call_store: Arc<dyn CallStore> = Arc::new(MongoCallStore::new(&db));
        Self::with_collaborators(settings, call_store, token_verifier).await
    }

    /// Wires arbitrary `CallStore`/`TokenVerifier` implementations instead
    /// of the Mongo/JWT pair `new` always builds — used by `vidmesh-tests`
    /// to run the real router against `InMemoryCallStore` and a static
    /// token fixture.
    pub async fn with_collaborators(
        settings: Settings,
        call_store: Arc<dyn CallStore>,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> anyhow::Result<Self> {
        let room_registry = Arc::new(RoomRegistry::new(
            call_store,
            system_clock(),
            settings.reap.clone(),
        ));

        let worker_pool = Arc::new(WorkerPool::new(&settings.mediasoup).await?);
        let media_session = Arc::new(MediaSession::new(worker_pool, &settings.mediasoup));

        let ws_storage = Arc::new(WsStorage::new());
        let auth_rate_limiter = Arc::new(AuthRateLimiter::new(system_clock(), 5, 900));

        Ok(Self {
            settings,
            token_verifier,
            room_registry,
            media_session,
            ws_storage,
            auth_rate_limiter,
        })
    }
}
