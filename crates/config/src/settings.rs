use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level configuration tree for the vidmesh session layer (spec.md §6.2).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub mediasoup: MediasoupSettings,
    pub turn: TurnSettings,
    pub reap: ReapSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    /// `ALLOWED_ORIGINS` — handshake-origin allow-list.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_ttl_secs: u64,
    pub issuer: String,
}

/// `MEDIASOUP_LISTEN_IP` / `MEDIASOUP_ANNOUNCED_IP` / `MEDIASOUP_MIN_PORT` /
/// `MEDIASOUP_MAX_PORT` and worker pool sizing.
#[derive(Debug, Deserialize, Clone)]
pub struct MediasoupSettings {
    pub num_workers: u32,
    pub listen_ip: String,
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

/// `STUN_SERVER` / `TURN_SERVER_URL` / `TURN_SERVER_USERNAME` /
/// `TURN_SERVER_CREDENTIAL`.
#[derive(Debug, Deserialize, Clone)]
pub struct TurnSettings {
    pub stun_server: Option<String>,
    pub turn_server_url: Option<String>,
    pub turn_server_username: Option<String>,
    pub turn_server_credential: Option<String>,
}

/// Reap grace period (per-participant) and sweep interval (defense in
/// depth), per spec.md §4.1.
#[derive(Debug, Deserialize, Clone)]
pub struct ReapSettings {
    pub grace_period_secs: u64,
    pub sweep_interval_secs: u64,
    pub empty_room_ttl_secs: u64,
}

impl Default for ReapSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
            sweep_interval_secs: 120,
            empty_room_ttl_secs: 300,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("VIDMESH"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27019")?
            .set_default("database.name", "vidmesh")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.access_token_ttl_secs", 3600)?
            .set_default("jwt.issuer", "vidmesh")?
            .set_default("mediasoup.num_workers", 2)?
            .set_default("mediasoup.listen_ip", "0.0.0.0")?
            .set_default("mediasoup.announced_ip", "127.0.0.1")?
            .set_default("mediasoup.rtc_min_port", 40000)?
            .set_default("mediasoup.rtc_max_port", 49999)?
            .set_default("turn.stun_server", "stun:stun.l.google.com:19302")?
            .set_default("turn.turn_server_url", None::<String>)?
            .set_default("turn.turn_server_username", None::<String>)?
            .set_default("turn.turn_server_credential", None::<String>)?
            .set_default("reap.grace_period_secs", 30)?
            .set_default("reap.sweep_interval_secs", 120)?
            .set_default("reap.empty_room_ttl_secs", 300)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::load().expect("failed to load default settings")
    }
}
