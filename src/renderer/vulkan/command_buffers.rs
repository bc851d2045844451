use crate::{
  error::PresenterResult,
  renderer::vulkan::pipeline_source::{DrawBindings, Geometry},
};
use ash::{version::DeviceV1_0, vk, Device};
use log::info;
use std::sync::Arc;

/// One primary command buffer per framebuffer, recorded once per swapchain
/// generation and resubmitted every frame.  Dropping the set frees the buffers
/// back to the pool.
pub struct CommandBufferSet {
  command_buffers: Vec<vk::CommandBuffer>,
  command_pool: vk::CommandPool,
  logical_device: Arc<Device>,
}
impl CommandBufferSet {
  /// Allocates exactly `framebuffers.len()` buffers and records the draw into
  /// each one.
  pub fn new(
    logical_device: Arc<Device>, command_pool: vk::CommandPool, framebuffers: &[vk::Framebuffer],
    extent: vk::Extent2D, bindings: &DrawBindings, clear_color: [f32; 4],
  ) -> PresenterResult<CommandBufferSet> {
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
      .command_pool(command_pool)
      .level(vk::CommandBufferLevel::PRIMARY)
      .command_buffer_count(framebuffers.len() as u32)
      .build();
    let command_buffers = unsafe { logical_device.allocate_command_buffers(&allocate_info)? };

    // From here on drop frees them, even if recording fails.
    let set = CommandBufferSet {
      command_buffers,
      command_pool,
      logical_device,
    };

    for (&command_buffer, &framebuffer) in set.command_buffers.iter().zip(framebuffers.iter()) {
      set.record(command_buffer, framebuffer, extent, bindings, clear_color)?;
    }

    info!("Recorded {} command buffers", set.command_buffers.len());
    Ok(set)
  }

  pub fn len(&self) -> usize {
    self.command_buffers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.command_buffers.is_empty()
  }

  pub fn get(&self, image_index: usize) -> Option<vk::CommandBuffer> {
    self.command_buffers.get(image_index).copied()
  }

  fn record(
    &self, command_buffer: vk::CommandBuffer, framebuffer: vk::Framebuffer, extent: vk::Extent2D,
    bindings: &DrawBindings, clear_color: [f32; 4],
  ) -> PresenterResult<()> {
    let logical_device = &self.logical_device;

    unsafe {
      // Resubmitted every frame without re-recording, possibly while a previous
      // submission of it is still pending.
      let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
        .build();
      logical_device.begin_command_buffer(command_buffer, &begin_info)?;

      let render_area = vk::Rect2D::builder()
        .offset(vk::Offset2D::default())
        .extent(extent)
        .build();
      let clear_values = [
        vk::ClearValue {
          color: vk::ClearColorValue {
            float32: clear_color,
          },
        },
        vk::ClearValue {
          depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0f32,
            stencil: 0u32,
          },
        },
      ];
      let render_pass_begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(bindings.render_pass)
        .framebuffer(framebuffer)
        .render_area(render_area)
        .clear_values(&clear_values)
        .build();
      logical_device.cmd_begin_render_pass(
        command_buffer,
        &render_pass_begin_info,
        vk::SubpassContents::INLINE,
      );

      logical_device.cmd_bind_pipeline(
        command_buffer,
        vk::PipelineBindPoint::GRAPHICS,
        bindings.pipeline,
      );
      if !bindings.descriptor_sets.is_empty() {
        logical_device.cmd_bind_descriptor_sets(
          command_buffer,
          vk::PipelineBindPoint::GRAPHICS,
          bindings.pipeline_layout,
          0,
          &bindings.descriptor_sets,
          &[],
        );
      }

      match &bindings.geometry {
        Geometry::Indexed {
          vertex_buffer,
          index_buffer,
          index_type,
          index_count,
        } => {
          logical_device.cmd_bind_vertex_buffers(command_buffer, 0, &[*vertex_buffer], &[0]);
          logical_device.cmd_bind_index_buffer(command_buffer, *index_buffer, 0, *index_type);
          logical_device.cmd_draw_indexed(command_buffer, *index_count, 1, 0, 0, 0);
        }
        Geometry::NonIndexed {
          vertex_buffers,
          vertex_count,
        } => {
          if !vertex_buffers.is_empty() {
            let offsets = vec![0; vertex_buffers.len()];
            logical_device.cmd_bind_vertex_buffers(command_buffer, 0, vertex_buffers, &offsets);
          }
          logical_device.cmd_draw(command_buffer, *vertex_count, 1, 0, 0);
        }
      }

      logical_device.cmd_end_render_pass(command_buffer);
      logical_device.end_command_buffer(command_buffer)?;
    }

    Ok(())
  }
}
impl Drop for CommandBufferSet {
  fn drop(&mut self) {
    if self.command_buffers.is_empty() {
      return;
    }

    info!("Freeing {} command buffers...", self.command_buffers.len());
    unsafe {
      self
        .logical_device
        .free_command_buffers(self.command_pool, &self.command_buffers);
    }
  }
}
