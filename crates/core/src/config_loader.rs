use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by layering the optional TOML file
    /// and `LIQMAP_`-prefixed environment variables over the defaults.
    ///
    /// `DB_PATH` overrides the historical store path regardless of the
    /// other layers.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from a specific TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let mut config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LIQMAP_").split("__"))
            .extract()?;

        if let Ok(db_path) = std::env::var("DB_PATH") {
            config.storage.db_path = db_path;
        }

        Ok(config)
    }
}
