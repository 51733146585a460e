//! Application runner and frame loop.

use anyhow::Context;
use tessera_gpu::{CommandPool, GpuContext, GpuContextBuilder};
use tessera_platform::Window;
use tessera_render::{FrameContent, FrameScheduler, Renderer, SurfaceWindow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`; defaults to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Run an application until its window closes.
///
/// Creates the window, the GPU context and a [`Renderer`] whose content is
/// produced by `factory`, then alternates event pumping and frame ticks.
pub fn run<C, F>(config: AppConfig, factory: F) -> anyhow::Result<()>
where
    C: FrameContent,
    F: FnOnce(&GpuContext, &CommandPool) -> tessera_gpu::Result<C>,
{
    info!("{} starting...", config.identity);

    // Declared before the GPU context so the surface is destroyed first.
    let mut window = Window::new(config.platform_config()).context("Failed to open window")?;

    let gpu = GpuContextBuilder::new()
        .identity(config.identity.clone())
        .validation(config.validation)
        .build(&window)
        .context("Failed to initialize Vulkan")?;

    info!("GPU: {}", gpu.candidate().summary());

    if !window.wait_until_drawable() {
        info!("Window closed before the first frame");
        return Ok(());
    }

    let stats = {
        let mut renderer = Renderer::new(&gpu, window.framebuffer_size(), factory)
            .context("Failed to create renderer")?;
        let mut scheduler = FrameScheduler::for_backend(&renderer)?;

        info!("Application ready!");

        while !window.should_close() {
            window.tick();
            if window.should_close() {
                break;
            }
            scheduler
                .tick(&mut renderer, &mut window)
                .context("Frame failed")?;
        }

        scheduler.stats()
    };

    info!("Frame statistics:");
    info!("  Frames presented: {}", stats.frames_presented);
    info!("  Swapchain rebuilds: {}", stats.rebuilds);

    Ok(())
}
