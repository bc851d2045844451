use crate::{
  error::{PresenterError, PresenterResult},
  renderer::{
    config::PresentMode,
    frame_synchronizer::{AcquireOutcome, PresentOutcome},
    vulkan::{
      capabilities::{negotiate, NegotiatedSwapchain},
      depth_buffer::DepthResources,
      images::{create_image_view, ImageAndView},
      render_context::RenderContext,
    },
  },
};
use ash::{extensions::khr::Swapchain, version::DeviceV1_0, vk, Device};
use log::{info, warn};
use std::sync::Arc;

/// A framebuffer over one swapchain image view and the shared depth view.
pub struct Framebuffer {
  pub framebuffer: vk::Framebuffer,
  logical_device: Arc<Device>,
}
impl Drop for Framebuffer {
  fn drop(&mut self) {
    unsafe {
      self
        .logical_device
        .destroy_framebuffer(self.framebuffer, None);
    }
  }
}

/// The swapchain and everything derived from its images.  Built in the order
/// swapchain, image views, depth buffer, framebuffers and destroyed in reverse
/// by [cleanup](#method.cleanup).
pub struct SwapchainState {
  swapchain: vk::SwapchainKHR,
  negotiated: Option<NegotiatedSwapchain>,
  images: Vec<vk::Image>,
  image_views: Vec<ImageAndView>,
  depth_buffer: Option<DepthResources>,
  framebuffers: Vec<Framebuffer>,
  swapchain_functions: Arc<Swapchain>,
  logical_device: Arc<Device>,
  allocator: Arc<vk_mem::Allocator>,
}
impl SwapchainState {
  /// An empty state, nothing is created until
  /// [create_swapchain](#method.create_swapchain).
  pub fn new(context: &RenderContext) -> Self {
    Self {
      swapchain: vk::SwapchainKHR::null(),
      negotiated: None,
      images: Vec::new(),
      image_views: Vec::new(),
      depth_buffer: None,
      framebuffers: Vec::new(),
      swapchain_functions: context.swapchain_functions.clone(),
      logical_device: context.logical_device.clone(),
      allocator: context.allocator.clone(),
    }
  }

  /// Negotiates with a fresh surface snapshot and creates the swapchain.
  /// Returns how many images the driver actually created, which may be more
  /// than requested.
  ///
  /// The predecessor must already be cleaned up, it is never passed as
  /// old_swapchain.
  pub fn create_swapchain(
    &mut self, context: &RenderContext, window_extent: vk::Extent2D,
    requested_present_mode: PresentMode,
  ) -> PresenterResult<usize> {
    if self.has_swapchain() {
      warn!("Creating a swapchain while the previous one is alive, cleaning it up first");
      self.cleanup();
    }

    let support = context.query_surface_support()?;
    let negotiated = negotiate(&support, window_extent, requested_present_mode);
    let (sharing_mode, queue_family_indices) = context.queue_families.sharing_mode();

    let swapchain_ci = vk::SwapchainCreateInfoKHR::builder()
      .surface(context.surface)
      .min_image_count(negotiated.image_count)
      .image_format(negotiated.surface_format.format)
      .image_color_space(negotiated.surface_format.color_space)
      .image_extent(negotiated.extent)
      .image_array_layers(1) // Not stereoscopic.
      .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
      .image_sharing_mode(sharing_mode)
      .queue_family_indices(&queue_family_indices)
      .pre_transform(negotiated.pre_transform)
      .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
      .present_mode(negotiated.present_mode)
      .clipped(true)
      .old_swapchain(vk::SwapchainKHR::null())
      .build();

    let swapchain = unsafe {
      self
        .swapchain_functions
        .create_swapchain(&swapchain_ci, None)?
    };
    let images = match unsafe { self.swapchain_functions.get_swapchain_images(swapchain) } {
      Ok(images) => images,
      Err(e) => {
        unsafe { self.swapchain_functions.destroy_swapchain(swapchain, None) };
        return Err(e.into());
      }
    };

    info!(
      "Created swapchain {}x{} {:?} {:?} with {} images (requested {})",
      negotiated.extent.width,
      negotiated.extent.height,
      negotiated.surface_format.format,
      negotiated.present_mode,
      images.len(),
      negotiated.image_count
    );

    self.swapchain = swapchain;
    self.negotiated = Some(negotiated);
    self.images = images;
    Ok(self.images.len())
  }

  /// One color view per swapchain image, in image order.
  pub fn create_image_views(&mut self) -> PresenterResult<()> {
    let format = self.negotiated()?.surface_format.format;

    let mut views = Vec::with_capacity(self.images.len());
    for &image in self.images.iter() {
      let view = create_image_view(
        &self.logical_device,
        image,
        format,
        vk::ImageAspectFlags::COLOR,
      )?;
      views.push(unsafe { ImageAndView::new(self.logical_device.clone(), image, view) });
    }

    self.image_views = views;
    Ok(())
  }

  /// The depth buffer shared by every framebuffer, matched to the swapchain
  /// extent.
  pub fn create_depth_buffer(&mut self, depth_format: vk::Format) -> PresenterResult<()> {
    let extent = self.negotiated()?.extent;
    self.depth_buffer = None;
    self.depth_buffer = Some(DepthResources::new(
      self.logical_device.clone(),
      self.allocator.clone(),
      depth_format,
      extent,
    )?);
    Ok(())
  }

  /// One framebuffer per image view, attaching the view and the depth buffer.
  /// The depth buffer has to exist first.
  pub fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> PresenterResult<()> {
    let extent = self.negotiated()?.extent;
    let depth_view = self
      .depth_buffer
      .as_ref()
      .ok_or(PresenterError::DepthBufferMissing)?
      .view;

    let mut framebuffers = Vec::with_capacity(self.image_views.len());
    for image_and_view in self.image_views.iter() {
      let attachments = [image_and_view.view, depth_view];
      let framebuffer_ci = vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1)
        .build();
      let framebuffer = unsafe {
        self
          .logical_device
          .create_framebuffer(&framebuffer_ci, None)?
      };
      framebuffers.push(Framebuffer {
        framebuffer,
        logical_device: self.logical_device.clone(),
      });
    }

    self.framebuffers = framebuffers;
    Ok(())
  }

  /// Destroys framebuffers, depth buffer, image views and the swapchain, in
  /// that order.  Safe to call repeatedly.  The GPU must be done with all of
  /// it.
  pub fn cleanup(&mut self) {
    if !self.framebuffers.is_empty() {
      info!("Destroying framebuffers...");
      self.framebuffers.clear();
    }

    self.depth_buffer = None;
    self.image_views.clear();
    self.images.clear();

    if self.has_swapchain() {
      info!("Destroying swapchain...");
      unsafe {
        self
          .swapchain_functions
          .destroy_swapchain(self.swapchain, None);
      }
      self.swapchain = vk::SwapchainKHR::null();
    }
    self.negotiated = None;
  }

  /// Gets the next image in the swapchain to draw to, signaling the given
  /// semaphore once it can be written.  Waits indefinitely.
  pub fn acquire_next_image(
    &self, image_available_semaphore: vk::Semaphore,
  ) -> PresenterResult<AcquireOutcome> {
    if !self.has_swapchain() {
      return Err(PresenterError::SwapchainMissing);
    }

    let result = unsafe {
      self.swapchain_functions.acquire_next_image(
        self.swapchain,
        u64::max_value(),
        image_available_semaphore,
        vk::Fence::null(),
      )
    };

    match result {
      Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
        image_index,
        suboptimal,
      }),
      Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
      Err(e) => Err(e.into()),
    }
  }

  /// Presents to the swapchain once the wait semaphores are signaled.
  pub fn queue_present(
    &self, presentation_queue: vk::Queue, image_index: u32, wait_semaphores: &[vk::Semaphore],
  ) -> PresenterResult<PresentOutcome> {
    if !self.has_swapchain() {
      return Err(PresenterError::SwapchainMissing);
    }

    let swapchains = [self.swapchain];
    let image_indices = [image_index];
    let present_info = vk::PresentInfoKHR::builder()
      .wait_semaphores(wait_semaphores)
      .swapchains(&swapchains)
      .image_indices(&image_indices)
      .build();

    let result = unsafe {
      self
        .swapchain_functions
        .queue_present(presentation_queue, &present_info)
    };

    match result {
      Ok(false) => Ok(PresentOutcome::Presented),
      Ok(true) => Ok(PresentOutcome::Suboptimal),
      Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
      Err(e) => Err(e.into()),
    }
  }

  /// Checks every image has exactly one view and one framebuffer, returning
  /// the image count.
  pub fn verify_cardinality(&self) -> PresenterResult<usize> {
    Self::check_cardinality(self.image_count(), self.image_view_count(), self.framebuffer_count())
  }

  fn check_cardinality(
    images: usize, image_views: usize, framebuffers: usize,
  ) -> PresenterResult<usize> {
    if images != image_views || images != framebuffers {
      return Err(PresenterError::SwapchainResourceMismatch {
        images,
        image_views,
        framebuffers,
      });
    }
    Ok(images)
  }

  pub fn has_swapchain(&self) -> bool {
    self.swapchain != vk::SwapchainKHR::null()
  }

  fn negotiated(&self) -> PresenterResult<&NegotiatedSwapchain> {
    self
      .negotiated
      .as_ref()
      .ok_or(PresenterError::SwapchainMissing)
  }

  pub fn extent(&self) -> Option<vk::Extent2D> {
    self.negotiated.map(|n| n.extent)
  }

  pub fn image_format(&self) -> Option<vk::Format> {
    self.negotiated.map(|n| n.surface_format.format)
  }

  pub fn present_mode(&self) -> Option<vk::PresentModeKHR> {
    self.negotiated.map(|n| n.present_mode)
  }

  pub fn depth_format(&self) -> Option<vk::Format> {
    self.depth_buffer.as_ref().map(|d| d.format)
  }

  pub fn image_count(&self) -> usize {
    self.images.len()
  }

  pub fn image_view_count(&self) -> usize {
    self.image_views.len()
  }

  pub fn framebuffer_count(&self) -> usize {
    self.framebuffers.len()
  }

  pub fn framebuffer(&self, image_index: usize) -> Option<vk::Framebuffer> {
    self.framebuffers.get(image_index).map(|f| f.framebuffer)
  }

  pub fn framebuffers(&self) -> Vec<vk::Framebuffer> {
    self.framebuffers.iter().map(|f| f.framebuffer).collect()
  }
}
impl Drop for SwapchainState {
  fn drop(&mut self) {
    self.cleanup();
  }
}
