//! Frame content of the viewer: the rotating quad pair.

use std::mem::size_of;
use std::time::Instant;

use ash::vk;
use tessera_gpu::{
    upload_buffer, write_uniform_buffer, CommandPool, DescriptorPool, DescriptorSetLayoutBuilder,
    GpuBuffer, GpuContext, GpuError, MemoryLocation, Result,
};
use tessera_render::FrameContent;

use crate::scene::{Transforms, Vertex, INDICES, VERTICES};

/// Vertex-colored geometry with one uniform buffer per swapchain image.
pub struct QuadScene {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
    set_layout: vk::DescriptorSetLayout,
    uniform_buffers: Vec<GpuBuffer>,
    descriptor_pool: Option<DescriptorPool>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    start: Instant,
}

impl QuadScene {
    /// Upload the geometry and create the descriptor set layout.
    pub fn new(ctx: &GpuContext, pool: &CommandPool) -> Result<Self> {
        let vertex_buffer = upload_buffer(
            ctx,
            pool,
            &VERTICES,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "quad vertices",
        )?;

        let mut index_buffer = match upload_buffer(
            ctx,
            pool,
            &INDICES,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "quad indices",
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                let mut vertex_buffer = vertex_buffer;
                ctx.allocator().lock().free_buffer(&mut vertex_buffer)?;
                return Err(e);
            }
        };

        let set_layout = match unsafe {
            DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .build(ctx.device())
        } {
            Ok(layout) => layout,
            Err(e) => {
                let mut vertex_buffer = vertex_buffer;
                let mut allocator = ctx.allocator().lock();
                allocator.free_buffer(&mut vertex_buffer)?;
                allocator.free_buffer(&mut index_buffer)?;
                return Err(e);
            }
        };

        tracing::debug!(
            vertices = VERTICES.len(),
            indices = INDICES.len(),
            "Uploaded scene geometry"
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: INDICES.len() as u32,
            set_layout,
            uniform_buffers: Vec::new(),
            descriptor_pool: None,
            descriptor_sets: Vec::new(),
            start: Instant::now(),
        })
    }

    fn create_per_image(&mut self, ctx: &GpuContext, image_count: usize) -> Result<()> {
        let device = ctx.device();
        let size = size_of::<Transforms>() as u64;

        {
            let mut allocator = ctx.allocator().lock();
            for image_index in 0..image_count {
                let buffer = allocator.create_buffer(
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::CpuToGpu,
                    &format!("transforms {image_index}"),
                )?;
                self.uniform_buffers.push(buffer);
            }
        }

        let count = image_count as u32;
        let pool = self
            .descriptor_pool
            .insert(unsafe { DescriptorPool::for_uniform_buffers(device, count)? });

        let layouts = vec![self.set_layout; image_count];
        self.descriptor_sets = unsafe { pool.allocate(device, &layouts)? };

        for (&set, buffer) in self.descriptor_sets.iter().zip(&self.uniform_buffers) {
            unsafe { write_uniform_buffer(device, set, 0, buffer.buffer, size) };
        }

        Ok(())
    }

    fn release_per_image(&mut self, ctx: &GpuContext) -> Result<()> {
        self.descriptor_sets.clear();
        if let Some(pool) = self.descriptor_pool.take() {
            unsafe { pool.destroy(ctx.device()) };
        }

        let mut allocator = ctx.allocator().lock();
        let mut result = Ok(());
        for mut buffer in self.uniform_buffers.drain(..) {
            result = result.and(allocator.free_buffer(&mut buffer));
        }
        result
    }
}

impl FrameContent for QuadScene {
    fn vertex_bindings(&self) -> Vec<vk::VertexInputBindingDescription> {
        Vertex::binding_descriptions()
    }

    fn vertex_attributes(&self) -> Vec<vk::VertexInputAttributeDescription> {
        Vertex::attribute_descriptions()
    }

    fn descriptor_set_layouts(&self) -> Vec<vk::DescriptorSetLayout> {
        vec![self.set_layout]
    }

    fn on_generation_built(&mut self, ctx: &GpuContext, image_count: usize) -> Result<()> {
        let created = self.create_per_image(ctx, image_count);
        if created.is_err() {
            // Partial per-image state is released here; the caller only
            // unwinds what it created itself.
            if let Err(e) = self.release_per_image(ctx) {
                tracing::error!("Failed to release partial uniform buffers: {e}");
            }
        }
        created
    }

    fn on_generation_destroyed(&mut self, ctx: &GpuContext) -> Result<()> {
        self.release_per_image(ctx)
    }

    unsafe fn record_draws(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        image_index: usize,
        pipeline_layout: vk::PipelineLayout,
    ) {
        let Some(&set) = self.descriptor_sets.get(image_index) else {
            tracing::error!(image_index, "No descriptor set for image");
            return;
        };

        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                0,
                &[set],
                &[],
            );
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        }
    }

    fn update(&mut self, _ctx: &GpuContext, image_index: usize, extent: vk::Extent2D) -> Result<()> {
        let transforms = Transforms::at(self.start.elapsed().as_secs_f32(), extent);
        self.uniform_buffers
            .get(image_index)
            .ok_or_else(|| GpuError::InvalidState(format!("No uniform buffer for image {image_index}")))?
            .write(&[transforms])
    }

    fn destroy(&mut self, ctx: &GpuContext) {
        if let Err(e) = self.release_per_image(ctx) {
            tracing::error!("Failed to free uniform buffers: {e}");
        }

        unsafe { ctx.device().destroy_descriptor_set_layout(self.set_layout, None) };

        let mut allocator = ctx.allocator().lock();
        for buffer in [&mut self.vertex_buffer, &mut self.index_buffer] {
            if let Err(e) = allocator.free_buffer(buffer) {
                tracing::error!("Failed to free geometry buffer: {e}");
            }
        }
    }
}
