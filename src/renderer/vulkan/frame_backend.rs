use crate::{
  error::{PresenterError, PresenterResult},
  renderer::{
    config::{Config, PresentMode},
    frame_synchronizer::{AcquireOutcome, FrameBackend, PresentOutcome},
    invalidation::SwapchainLifecycle,
    vulkan::{
      command_buffers::CommandBufferSet,
      draw_synchronization::DrawSynchronization,
      pipeline_source::{DrawBindings, PipelineSource, RenderTargetInfo},
      render_context::RenderContext,
      swap_chain::SwapchainState,
    },
  },
};
use ash::{version::DeviceV1_0, vk};
use log::{error, info};

/// The Vulkan side of the frame protocol: owns the swapchain generation, the
/// recorded command buffers, the per slot synchronization and the context
/// they are all built on.
///
/// Fields drop top to bottom, the context has to go last.
pub struct VulkanFrameBackend<P: PipelineSource> {
  command_buffers: Option<CommandBufferSet>,
  draw_bindings: Option<DrawBindings>,
  swapchain: SwapchainState,
  draw_synchronization: DrawSynchronization,
  pipeline_source: P,
  depth_format: vk::Format,
  window_extent: vk::Extent2D,
  requested_present_mode: PresentMode,
  clear_color: [f32; 4],
  context: RenderContext,
}
impl<P: PipelineSource> VulkanFrameBackend<P> {
  /// Nothing swapchain related is created here, build it through the
  /// [InvalidationController](../../invalidation/struct.InvalidationController.html).
  pub fn new(context: RenderContext, pipeline_source: P, config: &Config) -> PresenterResult<Self> {
    let depth_format = context.find_depth_format()?;
    info!("Selected depth format {:?}", depth_format);

    let swapchain = SwapchainState::new(&context);
    let draw_synchronization =
      DrawSynchronization::new(context.logical_device.clone(), config.frames_in_flight)?;

    Ok(Self {
      command_buffers: None,
      draw_bindings: None,
      swapchain,
      draw_synchronization,
      pipeline_source,
      depth_format,
      window_extent: vk::Extent2D {
        width: config.requested_width,
        height: config.requested_height,
      },
      requested_present_mode: config.present_mode,
      clear_color: config.clear_color,
      context,
    })
  }

  pub fn context(&self) -> &RenderContext {
    &self.context
  }

  pub fn swapchain(&self) -> &SwapchainState {
    &self.swapchain
  }

  pub fn draw_bindings(&self) -> Option<&DrawBindings> {
    self.draw_bindings.as_ref()
  }

  pub fn command_buffer_count(&self) -> usize {
    self.command_buffers.as_ref().map_or(0, CommandBufferSet::len)
  }

  /// The window size the next swapchain is negotiated against.
  pub fn window_extent(&self) -> vk::Extent2D {
    self.window_extent
  }

  pub fn set_window_extent(&mut self, width: u32, height: u32) {
    self.window_extent = vk::Extent2D { width, height };
  }

  fn destroy_draw_bindings(&mut self) {
    if let Some(bindings) = self.draw_bindings.take() {
      info!("Destroying pipeline state for the old swapchain...");
      self.pipeline_source.destroy(&self.context, bindings);
    }
  }
}
impl<P: PipelineSource> SwapchainLifecycle for VulkanFrameBackend<P> {
  fn wait_device_idle(&mut self) -> PresenterResult<()> {
    info!("Waiting for the device to be idle...");
    self.context.wait_idle()
  }

  fn destroy_command_buffers(&mut self) -> PresenterResult<()> {
    self.command_buffers = None;
    Ok(())
  }

  fn destroy_swapchain(&mut self) -> PresenterResult<()> {
    self.destroy_draw_bindings();
    self.swapchain.cleanup();
    Ok(())
  }

  fn create_swapchain(&mut self) -> PresenterResult<usize> {
    let image_count = self.swapchain.create_swapchain(
      &self.context,
      self.window_extent,
      self.requested_present_mode,
    )?;
    self.swapchain.create_image_views()?;
    self.swapchain.create_depth_buffer(self.depth_format)?;

    let target = RenderTargetInfo {
      extent: self
        .swapchain
        .extent()
        .ok_or(PresenterError::SwapchainMissing)?,
      image_format: self
        .swapchain
        .image_format()
        .ok_or(PresenterError::SwapchainMissing)?,
      depth_format: self.depth_format,
      image_count,
    };
    let bindings = self.pipeline_source.create(&self.context, &target)?;
    let render_pass = bindings.render_pass;
    self.draw_bindings = Some(bindings);

    self.swapchain.create_framebuffers(render_pass)?;
    let image_count = self.swapchain.verify_cardinality()?;
    self.draw_synchronization.track_images(image_count);

    Ok(image_count)
  }

  fn create_command_buffers(&mut self) -> PresenterResult<usize> {
    let bindings = self
      .draw_bindings
      .as_ref()
      .ok_or(PresenterError::SwapchainMissing)?;
    let extent = self
      .swapchain
      .extent()
      .ok_or(PresenterError::SwapchainMissing)?;

    let command_buffers = CommandBufferSet::new(
      self.context.logical_device.clone(),
      self.context.command_pool,
      &self.swapchain.framebuffers(),
      extent,
      bindings,
      self.clear_color,
    )?;
    let count = command_buffers.len();
    self.command_buffers = Some(command_buffers);

    Ok(count)
  }
}
impl<P: PipelineSource> FrameBackend for VulkanFrameBackend<P> {
  fn wait_for_slot(&mut self, slot: usize) -> PresenterResult<()> {
    self.draw_synchronization.wait_for_slot(slot)
  }

  fn acquire_next_image(&mut self, slot: usize) -> PresenterResult<AcquireOutcome> {
    let image_available = self.draw_synchronization.image_available_semaphore(slot);
    self.swapchain.acquire_next_image(image_available)
  }

  fn submit(&mut self, slot: usize, image_index: u32) -> PresenterResult<()> {
    let command_buffer = self
      .command_buffers
      .as_ref()
      .and_then(|set| set.get(image_index as usize))
      .ok_or(PresenterError::CommandBuffersMissing)?;

    self
      .draw_synchronization
      .prepare_submit(slot, image_index as usize)?;

    let wait_semaphores = [self.draw_synchronization.image_available_semaphore(slot)];
    // Vertex work may start before the image is available, only color output
    // waits.
    let wait_dst_stage_mask = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let command_buffers = [command_buffer];
    let signal_semaphores = [self.draw_synchronization.render_finished_semaphore(slot)];
    let submit_info = vk::SubmitInfo::builder()
      .wait_semaphores(&wait_semaphores)
      .wait_dst_stage_mask(&wait_dst_stage_mask)
      .command_buffers(&command_buffers)
      .signal_semaphores(&signal_semaphores)
      .build();

    unsafe {
      self.context.logical_device.queue_submit(
        self.context.queues.graphics_queue,
        &[submit_info],
        self.draw_synchronization.in_flight_fence(slot),
      )?;
    }
    Ok(())
  }

  fn present(&mut self, slot: usize, image_index: u32) -> PresenterResult<PresentOutcome> {
    let wait_semaphores = [self.draw_synchronization.render_finished_semaphore(slot)];
    self.swapchain.queue_present(
      self.context.queues.presentation_queue,
      image_index,
      &wait_semaphores,
    )
  }
}
impl<P: PipelineSource> Drop for VulkanFrameBackend<P> {
  fn drop(&mut self) {
    info!("Waiting for the device to be idle before cleaning up...");
    if let Err(e) = self.context.wait_idle() {
      error!("Failed to wait for idle! {}", e);
    }

    self.command_buffers = None;
    self.destroy_draw_bindings();
    self.swapchain.cleanup();
  }
}
