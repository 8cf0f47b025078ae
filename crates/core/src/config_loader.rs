use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging `config/Config.toml` (if present) with
    /// `STOCKSENSE_`-prefixed environment variables. Missing sections fall
    /// back to defaults.
    ///
    /// # Errors
    /// Returns an error if an existing config file cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from an explicit TOML path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STOCKSENSE_").split("__"))
            .extract()?;
        Ok(config)
    }
}
