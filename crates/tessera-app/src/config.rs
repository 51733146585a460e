//! Application configuration.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tessera_core::{AppIdentity, Version};
use tessera_platform::PlatformConfig;

/// Application configuration.
///
/// Every field is optional in a config file; missing fields keep their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name and version reported to the driver.
    pub identity: AppIdentity,
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identity: AppIdentity::default(),
            title: "Tessera Viewer".to_string(),
            width: 800,
            height: 600,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title, also used as the
    /// application name.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            identity: AppIdentity::new(title.clone(), Version::new(0, 1, 0)),
            title,
            ..Self::default()
        }
    }

    /// Set the initial window size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the application version reported to the driver.
    pub fn with_version(mut self, version: Version) -> Self {
        self.identity.version = version;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("Invalid configuration")
    }

    /// Load a TOML config file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// Window settings.
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            ..PlatformConfig::default()
        }
    }
}
