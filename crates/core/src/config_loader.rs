use crate::config::TradingConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging `config/Config.toml` with
    /// `ATLAS_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load() -> Result<TradingConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load_from(path: &str) -> Result<TradingConfig> {
        let config: TradingConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ATLAS_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration with a profile overlay (`Config.<profile>.toml`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed, or
    /// if the merged configuration fails validation.
    pub fn load_with_profile(profile: &str) -> Result<TradingConfig> {
        let config: TradingConfig = Figment::new()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("ATLAS_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }
}
