use crate::{error::PresenterResult, renderer::vulkan::render_context::RenderContext};
use ash::vk;

/// What a swapchain generation looks like to whoever builds pipelines for it.
/// Viewport, scissor and render pass attachments all depend on this.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderTargetInfo {
  pub extent: vk::Extent2D,
  pub image_format: vk::Format,
  pub depth_format: vk::Format,
  pub image_count: usize,
}

/// The geometry recorded into every command buffer.
#[derive(Clone, Debug)]
pub enum Geometry {
  /// Bound at vertex binding 0, draws `index_count` indices.
  Indexed {
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    index_type: vk::IndexType,
    index_count: u32,
  },
  /// Buffers bound at consecutive bindings starting at 0 (may be empty when
  /// the vertex shader generates positions).
  NonIndexed {
    vertex_buffers: Vec<vk::Buffer>,
    vertex_count: u32,
  },
}

/// Everything command buffer recording binds.
#[derive(Builder, Clone, Debug)]
pub struct DrawBindings {
  /// Must be compatible with the swapchain framebuffers (one color attachment
  /// and one depth attachment), see
  /// [create_forward_render_pass](../render_pass/fn.create_forward_render_pass.html).
  pub render_pass: vk::RenderPass,
  pub pipeline: vk::Pipeline,
  pub pipeline_layout: vk::PipelineLayout,
  pub geometry: Geometry,
  /// Bound at set 0 onwards.
  #[builder(default)]
  pub descriptor_sets: Vec<vk::DescriptorSet>,
}
impl DrawBindings {
  pub fn builder() -> DrawBindingsBuilder {
    DrawBindingsBuilder::default()
  }
}

/// Implemented by the application to supply the render pass, pipeline and
/// geometry.  Called again for every swapchain generation, after the previous
/// generation's bindings were handed to `destroy` with the device idle.
pub trait PipelineSource {
  /// Builds render pass and pipeline for the given render targets.
  fn create(
    &mut self, context: &RenderContext, target: &RenderTargetInfo,
  ) -> PresenterResult<DrawBindings>;

  /// Destroys whatever `create` made for a generation that is being torn down.
  fn destroy(&mut self, context: &RenderContext, bindings: DrawBindings);
}
