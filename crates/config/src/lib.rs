mod settings;

pub use settings::{
    AppSettings, DatabaseSettings, JwtSettings, MediasoupSettings, ReapSettings, Settings,
    TurnSettings,
};
