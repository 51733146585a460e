//! The content drawn into every swapchain image.

use ash::vk;
use tessera_gpu::{GpuContext, Result};

/// Scene content rendered by the [`crate::Renderer`].
///
/// Long-lived resources (vertex data, descriptor set layouts) belong to the
/// content itself. Per-image resources are created in
/// [`FrameContent::on_generation_built`] and released in
/// [`FrameContent::on_generation_destroyed`], once per swapchain generation.
pub trait FrameContent {
    /// Vertex shader name, resolved by [`crate::load_shader`].
    fn vertex_shader(&self) -> &str {
        "vertex"
    }

    /// Fragment shader name, resolved by [`crate::load_shader`].
    fn fragment_shader(&self) -> &str {
        "fragment"
    }

    /// Vertex buffer bindings consumed by the vertex shader.
    fn vertex_bindings(&self) -> Vec<vk::VertexInputBindingDescription>;

    /// Vertex attributes consumed by the vertex shader.
    fn vertex_attributes(&self) -> Vec<vk::VertexInputAttributeDescription>;

    /// Descriptor set layouts of the pipeline layout, in set order.
    fn descriptor_set_layouts(&self) -> Vec<vk::DescriptorSetLayout>;

    /// Create per-image data for a new generation with `image_count` images.
    fn on_generation_built(&mut self, ctx: &GpuContext, image_count: usize) -> Result<()>;

    /// Release per-image data of the generation being torn down.
    ///
    /// The device is idle when this is called.
    fn on_generation_destroyed(&mut self, ctx: &GpuContext) -> Result<()>;

    /// Record draw commands inside the generation's render pass.
    ///
    /// # Safety
    /// `cmd` is in the recording state inside a render pass with the
    /// generation's pipeline bound.
    unsafe fn record_draws(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        image_index: usize,
        pipeline_layout: vk::PipelineLayout,
    );

    /// Update the data read by image `image_index`.
    ///
    /// Called between acquiring the image and submitting its commands.
    fn update(&mut self, ctx: &GpuContext, image_index: usize, extent: vk::Extent2D)
        -> Result<()>;

    /// Release everything the content owns. The device is idle.
    fn destroy(&mut self, ctx: &GpuContext);
}
