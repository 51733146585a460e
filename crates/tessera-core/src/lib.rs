//! Core types for the Tessera engine.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Application identity (name and three-part version)
//! - The window contract used by the frame scheduler
//! - Engine-wide constants
//! - Common error types

pub mod error;
pub mod identity;
pub mod window;

pub use error::{Error, Result};
pub use identity::{AppIdentity, Version};
pub use window::SurfaceWindow;

/// Engine-wide constants
pub mod constants {
    use crate::identity::Version;

    /// Name reported to the driver as the engine name.
    pub const ENGINE_NAME: &str = "Tessera";
    /// Engine version reported to the driver.
    pub const ENGINE_VERSION: Version = Version::new(0, 1, 0);
    /// Number of frame slots the CPU may record ahead of the GPU.
    pub const FRAMES_IN_FLIGHT: usize = 2;
}
