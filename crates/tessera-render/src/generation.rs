//! Swapchain generations.
//!
//! A generation is every object whose shape depends on the surface: the
//! swapchain and its views, the depth target, render pass, framebuffers,
//! pipeline and the pre-recorded command buffers. It is built as one unit and
//! torn down as one unit when the surface changes.

use ash::vk;
use tessera_gpu::command::{begin_command_buffer, end_command_buffer};
use tessera_gpu::render_pass::{create_framebuffers, create_render_pass, destroy_framebuffers};
use tessera_gpu::{
    CommandPool, DepthTarget, GpuContext, GpuError, GraphicsPipeline, GraphicsPipelineConfig,
    Result, ShaderModule, Swapchain, SwapchainSettings,
};

use crate::content::FrameContent;

/// Color the render pass clears to.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One build of the swapchain-dependent objects.
pub struct SwapchainGeneration {
    pub swapchain: Swapchain,
    pub depth: DepthTarget,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub pipeline: GraphicsPipeline,
    pub command_buffers: Vec<vk::CommandBuffer>,
}

/// Objects created so far during a build, destroyed in reverse on failure.
#[derive(Default)]
struct Staged {
    swapchain: Option<Swapchain>,
    depth: Option<DepthTarget>,
    render_pass: Option<vk::RenderPass>,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    command_buffers: Vec<vk::CommandBuffer>,
    content_built: bool,
}

impl Staged {
    fn finish(self) -> Result<SwapchainGeneration> {
        let missing = || GpuError::InvalidState("Incomplete swapchain generation".to_string());
        Ok(SwapchainGeneration {
            swapchain: self.swapchain.ok_or_else(missing)?,
            depth: self.depth.ok_or_else(missing)?,
            render_pass: self.render_pass.ok_or_else(missing)?,
            framebuffers: self.framebuffers,
            pipeline: self.pipeline.ok_or_else(missing)?,
            command_buffers: self.command_buffers,
        })
    }

    /// # Safety
    /// Nothing staged may be in use by the GPU.
    unsafe fn unwind<C: FrameContent>(
        mut self,
        ctx: &GpuContext,
        pool: &CommandPool,
        content: &mut C,
    ) {
        let device = ctx.device();
        unsafe {
            pool.free(device, &self.command_buffers);
            if self.content_built {
                if let Err(e) = content.on_generation_destroyed(ctx) {
                    tracing::error!("Failed to release content of a partial generation: {e}");
                }
            }
            if let Some(pipeline) = &self.pipeline {
                pipeline.destroy(device);
            }
            destroy_framebuffers(device, &self.framebuffers);
            if let Some(render_pass) = self.render_pass {
                device.destroy_render_pass(render_pass, None);
            }
            if let Some(depth) = &mut self.depth {
                if let Err(e) = depth.destroy(ctx) {
                    tracing::error!("Failed to free depth target of a partial generation: {e}");
                }
            }
            if let Some(swapchain) = &self.swapchain {
                swapchain.destroy(device, ctx.swapchain_loader());
            }
        }
    }
}

impl SwapchainGeneration {
    /// Build a generation from the surface's current capabilities.
    ///
    /// Runs, in order: swapchain and color views, depth target, render pass,
    /// framebuffers, pipeline, content per-image data and recorded command
    /// buffers. On failure every object created so far is destroyed.
    pub fn build<C: FrameContent>(
        ctx: &GpuContext,
        pool: &CommandPool,
        content: &mut C,
        shaders: &(ShaderModule, ShaderModule),
        framebuffer_size: (u32, u32),
    ) -> Result<Self> {
        let mut staged = Staged::default();
        match Self::build_into(&mut staged, ctx, pool, content, shaders, framebuffer_size) {
            Ok(()) => staged.finish(),
            Err(e) => {
                // SAFETY: nothing from a failed build has been submitted
                unsafe { staged.unwind(ctx, pool, content) };
                Err(e)
            }
        }
    }

    fn build_into<C: FrameContent>(
        staged: &mut Staged,
        ctx: &GpuContext,
        pool: &CommandPool,
        content: &mut C,
        shaders: &(ShaderModule, ShaderModule),
        framebuffer_size: (u32, u32),
    ) -> Result<()> {
        let device = ctx.device();

        let support = ctx.surface_support()?;
        let settings = SwapchainSettings::choose(&support, framebuffer_size)?;
        let extent = settings.extent;

        let swapchain = staged.swapchain.insert(Swapchain::new(ctx, settings)?);
        let color_views = swapchain.views();
        let color_format = swapchain.format();

        let depth = staged.depth.insert(DepthTarget::new(ctx, extent)?);
        let depth_view = depth.view;
        let depth_format = depth.format;

        let render_pass = *staged
            .render_pass
            .insert(unsafe { create_render_pass(device, color_format, depth_format)? });

        staged.framebuffers = unsafe {
            create_framebuffers(device, render_pass, &color_views, depth_view, extent)?
        };

        let (vertex_shader, fragment_shader) = shaders;
        let config = GraphicsPipelineConfig::new(vertex_shader.clone(), fragment_shader.clone())
            .vertex_input(content.vertex_bindings(), content.vertex_attributes());
        let set_layouts = content.descriptor_set_layouts();
        let pipeline = staged.pipeline.insert(unsafe {
            GraphicsPipeline::new(device, &config, render_pass, extent, &set_layouts)?
        });
        let (pipeline, pipeline_layout) = (pipeline.pipeline, pipeline.layout);

        content.on_generation_built(ctx, color_views.len())?;
        staged.content_built = true;

        staged.command_buffers =
            unsafe { pool.allocate_command_buffers(device, color_views.len() as u32)? };

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        for (image_index, (&cmd, &framebuffer)) in staged
            .command_buffers
            .iter()
            .zip(&staged.framebuffers)
            .enumerate()
        {
            let render_pass_begin = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            // SAFETY: the command buffer is freshly allocated and every handle
            // recorded belongs to this generation
            unsafe {
                begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
                device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                content.record_draws(device, cmd, image_index, pipeline_layout);
                device.cmd_end_render_pass(cmd);
                end_command_buffer(device, cmd)?;
            }
        }

        tracing::info!(
            width = extent.width,
            height = extent.height,
            images = color_views.len(),
            "Built swapchain generation"
        );

        Ok(())
    }

    /// Number of swapchain images.
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Command buffer recorded for an image.
    pub fn command_buffer(&self, image_index: u32) -> Result<vk::CommandBuffer> {
        self.command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                GpuError::InvalidState(format!("No command buffer for image {image_index}"))
            })
    }

    /// Destroy the generation, consumers before producers.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy<C: FrameContent>(
        mut self,
        ctx: &GpuContext,
        pool: &CommandPool,
        content: &mut C,
    ) -> Result<()> {
        let device = ctx.device();
        unsafe {
            pool.free(device, &self.command_buffers);
            let released = content.on_generation_destroyed(ctx);
            self.pipeline.destroy(device);
            destroy_framebuffers(device, &self.framebuffers);
            device.destroy_render_pass(self.render_pass, None);
            let freed = self.depth.destroy(ctx);
            self.swapchain.destroy(device, ctx.swapchain_loader());
            released.and(freed)
        }
    }
}
