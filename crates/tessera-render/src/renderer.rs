//! The Vulkan frame backend.

use ash::vk;
use tessera_core::constants::FRAMES_IN_FLIGHT;
use tessera_gpu::command::submit_command_buffers;
use tessera_gpu::{
    Acquired, CommandPool, FrameSlots, FrameStage, GpuContext, GpuError, Presented, Result,
    ShaderModule,
};

use crate::content::FrameContent;
use crate::generation::SwapchainGeneration;
use crate::scheduler::FrameBackend;
use crate::shader::load_shader;

/// Renders a [`FrameContent`] into the context's surface.
///
/// Owns everything that outlives a swapchain generation: the command pool,
/// frame slots, compiled shaders and the content. Borrowing the context
/// guarantees it is dropped after the renderer.
pub struct Renderer<'a, C: FrameContent> {
    ctx: &'a GpuContext,
    content: C,
    shaders: (ShaderModule, ShaderModule),
    command_pool: CommandPool,
    slots: FrameSlots,
    generation: Option<SwapchainGeneration>,
}

impl<'a, C: FrameContent> Renderer<'a, C> {
    /// Create the renderer and its first swapchain generation.
    ///
    /// `factory` creates the content once the command pool exists, so it can
    /// upload its long-lived resources.
    pub fn new<F>(ctx: &'a GpuContext, framebuffer_size: (u32, u32), factory: F) -> Result<Self>
    where
        F: FnOnce(&GpuContext, &CommandPool) -> Result<C>,
    {
        let device = ctx.device();

        let command_pool = unsafe {
            CommandPool::new(
                device,
                ctx.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        let slots = match unsafe { FrameSlots::new(device, FRAMES_IN_FLIGHT) } {
            Ok(slots) => slots,
            Err(e) => {
                unsafe { command_pool.destroy(device) };
                return Err(e);
            }
        };

        let mut content = match factory(ctx, &command_pool) {
            Ok(content) => content,
            Err(e) => {
                unsafe {
                    slots.destroy(device);
                    command_pool.destroy(device);
                }
                return Err(e);
            }
        };

        let shaders = match load_content_shaders(&content) {
            Ok(shaders) => shaders,
            Err(e) => {
                content.destroy(ctx);
                unsafe {
                    slots.destroy(device);
                    command_pool.destroy(device);
                }
                return Err(e);
            }
        };

        // From here on Drop releases whatever exists
        let mut renderer = Self {
            ctx,
            content,
            shaders,
            command_pool,
            slots,
            generation: None,
        };

        renderer.generation = Some(SwapchainGeneration::build(
            ctx,
            &renderer.command_pool,
            &mut renderer.content,
            &renderer.shaders,
            framebuffer_size,
        )?);

        Ok(renderer)
    }

    fn current_generation(&self) -> Result<&SwapchainGeneration> {
        self.generation
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("No swapchain generation".to_string()))
    }
}

fn load_content_shaders<C: FrameContent>(content: &C) -> Result<(ShaderModule, ShaderModule)> {
    let vertex = load_shader(content.vertex_shader())?;
    let fragment = load_shader(content.fragment_shader())?;
    tracing::debug!(
        vertex = %vertex.name,
        fragment = %fragment.name,
        "Loaded shaders"
    );
    Ok((vertex, fragment))
}

impl<C: FrameContent> FrameBackend for Renderer<'_, C> {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        let slot = self.slots.get(slot)?;
        unsafe { slot.wait(self.ctx.device()) }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquired> {
        let semaphore = self.slots.get(slot)?.image_available;
        let generation = self.current_generation()?;
        Ok(unsafe {
            generation
                .swapchain
                .acquire_next_image(self.ctx.swapchain_loader(), semaphore)
        })
    }

    fn prepare_frame(&mut self, image_index: u32) -> Result<()> {
        let extent = self.current_generation()?.extent();
        self.content.update(self.ctx, image_index as usize, extent)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let device = self.ctx.device();
        let slot = self.slots.get(slot)?;
        let cmd = self.current_generation()?.command_buffer(image_index)?;

        let as_frame_error = |e: GpuError| match e {
            GpuError::Vulkan(result) => GpuError::Frame {
                stage: FrameStage::Submit,
                result,
            },
            other => other,
        };

        unsafe {
            slot.reset(device).map_err(as_frame_error)?;
            submit_command_buffers(
                device,
                self.ctx.graphics_queue(),
                &[cmd],
                &[slot.image_available],
                &[vk::PipelineStageFlags::VERTEX_INPUT],
                &[slot.render_finished],
                slot.in_flight,
            )
            .map_err(as_frame_error)
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented> {
        let render_finished = self.slots.get(slot)?.render_finished;
        let generation = self.current_generation()?;
        Ok(unsafe {
            generation.swapchain.present(
                self.ctx.swapchain_loader(),
                self.ctx.present_queue(),
                image_index,
                &[render_finished],
            )
        })
    }

    fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> Result<()> {
        self.ctx.wait_idle()?;

        if let Some(old) = self.generation.take() {
            // SAFETY: the device is idle
            unsafe { old.destroy(self.ctx, &self.command_pool, &mut self.content)? };
        }

        let generation = SwapchainGeneration::build(
            self.ctx,
            &self.command_pool,
            &mut self.content,
            &self.shaders,
            framebuffer_size,
        )?;
        let extent = generation.extent();
        tracing::info!(
            width = extent.width,
            height = extent.height,
            "Rebuilt swapchain generation"
        );
        self.generation = Some(generation);

        Ok(())
    }
}

impl<C: FrameContent> Drop for Renderer<'_, C> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.wait_idle() {
            tracing::error!("Failed to wait for device idle during shutdown: {e}");
        }

        let device = self.ctx.device();
        unsafe {
            if let Some(generation) = self.generation.take() {
                if let Err(e) = generation.destroy(self.ctx, &self.command_pool, &mut self.content)
                {
                    tracing::error!("Failed to destroy swapchain generation: {e}");
                }
            }
            self.content.destroy(self.ctx);
            self.slots.destroy(device);
            self.command_pool.destroy(device);
        }

        tracing::debug!("Renderer destroyed");
    }
}
