use crate::{
  error::{PresenterError, PresenterResult},
  renderer::{
    config::Config,
    frame_synchronizer::{FrameState, FrameSynchronizer},
    vulkan::{
      debug_utils_ext::DebugUserData, frame_backend::VulkanFrameBackend,
      pipeline_source::PipelineSource, render_context::RenderContext,
    },
    FrameOutcome, Presenter,
  },
};
use ash::vk;
use log::{info, warn};
use raw_window_handle::HasRawWindowHandle;
use std::{pin::Pin, sync::Arc};

/// Presents frames to a window through Vulkan.  The swapchain and everything
/// built on it are rebuilt internally whenever the window resizes or the
/// surface goes stale.
pub struct VulkanPresenter<P: PipelineSource> {
  frame_synchronizer: FrameSynchronizer,
  backend: VulkanFrameBackend<P>,
  rendering_enabled: bool,
  minimized: bool,
}
impl<P: PipelineSource> VulkanPresenter<P> {
  /// Creates the Vulkan context for `window` and builds the first swapchain.
  /// `window` must outlive the presenter.
  pub fn new<W: HasRawWindowHandle>(
    window: &W, pipeline_source: P, config: Config,
  ) -> PresenterResult<Self> {
    Self::new_with_debug_user_data(window, pipeline_source, config, None)
  }

  /// Like new, but validation messages are also counted in `debug_user_data`
  /// (debug builds only).
  pub fn new_with_debug_user_data<W: HasRawWindowHandle>(
    window: &W, pipeline_source: P, config: Config,
    debug_user_data: Option<Pin<Arc<DebugUserData>>>,
  ) -> PresenterResult<Self> {
    if config.frames_in_flight == 0 {
      return Err(PresenterError::InvalidConfig(
        "frames_in_flight must be at least 1".to_owned(),
      ));
    }

    let context = RenderContext::new(window, &config, debug_user_data)?;
    let mut backend = VulkanFrameBackend::new(context, pipeline_source, &config)?;
    let mut frame_synchronizer = FrameSynchronizer::new(config.frames_in_flight);

    let minimized = config.requested_width == 0 || config.requested_height == 0;
    if minimized {
      warn!("Window starts with no area, the swapchain is built once it has one");
      frame_synchronizer.request_invalidation();
    } else {
      frame_synchronizer.build(&mut backend)?;
    }

    Ok(Self {
      frame_synchronizer,
      backend,
      rendering_enabled: true,
      minimized,
    })
  }

  pub fn extent(&self) -> Option<vk::Extent2D> {
    self.backend.swapchain().extent()
  }

  pub fn image_format(&self) -> Option<vk::Format> {
    self.backend.swapchain().image_format()
  }

  pub fn present_mode(&self) -> Option<vk::PresentModeKHR> {
    self.backend.swapchain().present_mode()
  }

  pub fn image_count(&self) -> usize {
    self.backend.swapchain().image_count()
  }

  pub fn render_pass(&self) -> Option<vk::RenderPass> {
    self.backend.draw_bindings().map(|b| b.render_pass)
  }

  pub fn framebuffer(&self, image_index: usize) -> Option<vk::Framebuffer> {
    self.backend.swapchain().framebuffer(image_index)
  }

  pub fn frame_state(&self) -> FrameState {
    self.frame_synchronizer.state()
  }

  /// How many swapchains have been built so far.
  pub fn generation(&self) -> u64 {
    self.frame_synchronizer.generation()
  }

  pub fn frames_presented(&self) -> u64 {
    self.frame_synchronizer.frames_presented()
  }

  pub fn context(&self) -> &RenderContext {
    self.backend.context()
  }

  pub fn debug_user_data(&self) -> Option<&Pin<Arc<DebugUserData>>> {
    self.backend.context().debug_user_data()
  }
}
impl<P: PipelineSource> Presenter for VulkanPresenter<P> {
  fn frame(&mut self) -> PresenterResult<FrameOutcome> {
    if !self.rendering_enabled || self.minimized {
      return Ok(FrameOutcome::Skipped);
    }

    self.frame_synchronizer.draw_frame(&mut self.backend)
  }

  fn notify_resized(&mut self, width: u32, height: u32) {
    if width == 0 || height == 0 {
      if !self.minimized {
        info!("Window minimized, rendering paused");
      }
      self.minimized = true;
      return;
    }
    self.minimized = false;

    let current = self.backend.window_extent();
    let unchanged = current.width == width && current.height == height;
    if unchanged && self.backend.swapchain().has_swapchain() {
      return;
    }

    info!("Window resized to {}x{}, swapchain will be rebuilt", width, height);
    self.backend.set_window_extent(width, height);
    self.frame_synchronizer.request_invalidation();
  }

  fn set_rendering_enabled(&mut self, enabled: bool) {
    self.rendering_enabled = enabled;
  }

  fn wait_idle(&self) -> PresenterResult<()> {
    self.backend.context().wait_idle()
  }
}
