//! Application runner for the Tessera engine.
//!
//! Wires the window, the GPU context, the renderer and the frame scheduler
//! together and drives them until the window closes.
//!
//! # Example
//!
//! ```no_run
//! use tessera_app::{init_logging, run, AppConfig, CommandPool, FrameContent, GpuContext};
//!
//! fn start<C: FrameContent>(
//!     factory: impl FnOnce(&GpuContext, &CommandPool) -> tessera_gpu::Result<C>,
//! ) -> anyhow::Result<()> {
//!     init_logging();
//!     run(AppConfig::new("My App"), factory)
//! }
//! ```

mod config;
mod runner;

pub use config::AppConfig;
pub use runner::{init_logging, run};

// Re-export commonly used types for convenience
pub use tessera_gpu::{CommandPool, GpuContext};
pub use tessera_render::FrameContent;
