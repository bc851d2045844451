use crate::error::PresenterResult;
use ash::{version::DeviceV1_0, vk, Device};
use log::{error, info};
use std::sync::Arc;

/// One semaphore pair and one fence per frame in flight, plus which fence last
/// rendered to each swapchain image.
///
/// Created once and kept across swapchain rebuilds, only the image table is
/// resized.
pub struct DrawSynchronization {
  image_available_semaphores: Vec<vk::Semaphore>,
  render_finished_semaphores: Vec<vk::Semaphore>,
  in_flight_fences: Vec<vk::Fence>,

  // Unowned tracking references to in_flight_fences, indexed by swapchain
  // image.  Null when no submission has used the image yet.
  images_in_flight: Vec<vk::Fence>,
  logical_device: Arc<Device>,
}
impl DrawSynchronization {
  pub fn new(logical_device: Arc<Device>, frames_in_flight: usize) -> PresenterResult<Self> {
    let mut sync = Self {
      image_available_semaphores: Vec::with_capacity(frames_in_flight),
      render_finished_semaphores: Vec::with_capacity(frames_in_flight),
      in_flight_fences: Vec::with_capacity(frames_in_flight),
      images_in_flight: Vec::new(),
      logical_device,
    };

    let semaphore_ci = vk::SemaphoreCreateInfo::default();
    // Signaled so the first wait on each slot returns immediately.
    let fence_ci = vk::FenceCreateInfo::builder()
      .flags(vk::FenceCreateFlags::SIGNALED)
      .build();
    for _ in 0..frames_in_flight {
      unsafe {
        // Pushed one at a time so Drop releases whatever was made on failure.
        let image_available = sync.logical_device.create_semaphore(&semaphore_ci, None)?;
        sync.image_available_semaphores.push(image_available);
        let render_finished = sync.logical_device.create_semaphore(&semaphore_ci, None)?;
        sync.render_finished_semaphores.push(render_finished);
        let fence = sync.logical_device.create_fence(&fence_ci, None)?;
        sync.in_flight_fences.push(fence);
      }
    }

    Ok(sync)
  }

  pub fn frames_in_flight(&self) -> usize {
    self.in_flight_fences.len()
  }

  pub fn image_available_semaphore(&self, slot: usize) -> vk::Semaphore {
    self.image_available_semaphores[slot]
  }

  pub fn render_finished_semaphore(&self, slot: usize) -> vk::Semaphore {
    self.render_finished_semaphores[slot]
  }

  pub fn in_flight_fence(&self, slot: usize) -> vk::Fence {
    self.in_flight_fences[slot]
  }

  /// Blocks until the last submission from this slot has completed.
  pub fn wait_for_slot(&self, slot: usize) -> PresenterResult<()> {
    let fences = [self.in_flight_fences[slot]];
    unsafe {
      self
        .logical_device
        .wait_for_fences(&fences, true, u64::max_value())?;
    }
    Ok(())
  }

  /// Right before submitting `slot`'s work to `image_index`: waits on
  /// whichever slot last rendered to that image, claims the image for this
  /// slot, and resets this slot's fence for the submit to signal.
  pub fn prepare_submit(&mut self, slot: usize, image_index: usize) -> PresenterResult<()> {
    let slot_fence = self.in_flight_fences[slot];
    let image_fence = self.images_in_flight[image_index];
    if image_fence != vk::Fence::null() && image_fence != slot_fence {
      unsafe {
        self
          .logical_device
          .wait_for_fences(&[image_fence], true, u64::max_value())?;
      }
    }
    self.images_in_flight[image_index] = slot_fence;

    unsafe { self.logical_device.reset_fences(&[slot_fence])? };
    Ok(())
  }

  /// Forgets image ownership and sizes the table for a new swapchain
  /// generation.  Only valid with the device idle.
  pub fn track_images(&mut self, image_count: usize) {
    self.images_in_flight.clear();
    self.images_in_flight.resize(image_count, vk::Fence::null());
  }
}
impl Drop for DrawSynchronization {
  fn drop(&mut self) {
    info!("Destroying all synchronization primitives...");
    unsafe {
      if let Err(e) = self.logical_device.device_wait_idle() {
        error!("Failed to wait for idle before destroying sync primitives! {}", e);
      }
      for &sem in self.image_available_semaphores.iter() {
        self.logical_device.destroy_semaphore(sem, None);
      }
      for &sem in self.render_finished_semaphores.iter() {
        self.logical_device.destroy_semaphore(sem, None);
      }
      for &fence in self.in_flight_fences.iter() {
        self.logical_device.destroy_fence(fence, None);
      }
    }
  }
}
