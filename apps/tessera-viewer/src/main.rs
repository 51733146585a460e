//! Tessera Demo Viewer
//!
//! Renders a pair of rotating, vertex-colored quads and keeps rendering
//! through window resizes and minimization.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p tessera-viewer -- [OPTIONS]
//! ```
//!
//! Compiled shaders are read from `shaders/vertex.spv` and
//! `shaders/fragment.spv` relative to the working directory.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod content;
mod scene;

use std::path::PathBuf;

use clap::Parser;
use tessera_app::{init_logging, run, AppConfig};
use tessera_core::Version;

use crate::content::QuadScene;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; command line flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Initial window width
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height
    #[arg(long)]
    height: Option<u32>,

    /// Enable Vulkan validation layers
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Disable Vulkan validation layers
    #[arg(long)]
    no_validation: bool,

    /// Application version reported to the driver
    #[arg(long, value_name = "X.Y.Z")]
    app_version: Option<Version>,
}

impl Args {
    /// Config file (or defaults) with command line overrides applied.
    fn resolve(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_toml_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if self.validation {
            config.validation = true;
        }
        if self.no_validation {
            config.validation = false;
        }
        if let Some(version) = self.app_version {
            config.identity.version = version;
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    let config = args.resolve()?;
    run(config, QuadScene::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("tessera-viewer").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn no_flags_gives_defaults() {
        assert_eq!(parse(&[]).resolve().unwrap(), AppConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--width",
            "1024",
            "--height",
            "768",
            "--no-validation",
            "--app-version",
            "1.2.3",
        ])
        .resolve()
        .unwrap();

        assert_eq!((config.width, config.height), (1024, 768));
        assert!(!config.validation);
        assert_eq!(config.identity.version, Version::new(1, 2, 3));
    }

    #[test]
    fn validation_flags_conflict() {
        let result = Args::try_parse_from(["tessera-viewer", "--validation", "--no-validation"]);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_version_is_rejected() {
        let result = Args::try_parse_from(["tessera-viewer", "--app-version", "1.2"]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = parse(&["--config", "no/such/viewer.toml"]);
        assert!(args.resolve().is_err());
    }
}
