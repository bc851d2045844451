use crate::error::{PresenterError, PresenterResult};
use log::{info, warn};

/// The swapchain dependent resources of a backend, broken into the steps the
/// [InvalidationController](struct.InvalidationController.html) orders.
///
/// Implementors must not destroy anything in `destroy_*` that may still be
/// referenced by GPU work, the controller guarantees `wait_device_idle` ran
/// first.
pub trait SwapchainLifecycle {
  /// Block until every submission made so far has completed on the GPU.
  fn wait_device_idle(&mut self) -> PresenterResult<()>;

  /// Free the per image command buffers.
  fn destroy_command_buffers(&mut self) -> PresenterResult<()>;

  /// Destroy framebuffers, depth buffer, image views, pipeline state bound to
  /// them and the swapchain itself.
  fn destroy_swapchain(&mut self) -> PresenterResult<()>;

  /// Negotiate capabilities and build the swapchain plus every image derived
  /// resource.  Returns the number of images the backend actually created.
  fn create_swapchain(&mut self) -> PresenterResult<usize>;

  /// Allocate and record one command buffer per framebuffer.  Returns how
  /// many were recorded.
  fn create_command_buffers(&mut self) -> PresenterResult<usize>;
}

/// Tears down and rebuilds everything that depends on the swapchain, in the
/// only order that is safe while GPU work may be in flight.
#[derive(Default, Debug)]
pub struct InvalidationController {
  generation: u64,
  image_count: usize,
}
impl InvalidationController {
  pub fn new() -> Self {
    Self::default()
  }

  /// How many swapchains have been built, the initial one included.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Image count of the current generation.
  pub fn image_count(&self) -> usize {
    self.image_count
  }

  /// Builds the first generation, no teardown is needed.
  pub fn build<L: SwapchainLifecycle>(&mut self, lifecycle: &mut L) -> PresenterResult<u64> {
    let image_count = lifecycle.create_swapchain()?;
    let command_buffer_count = lifecycle.create_command_buffers()?;

    if image_count != command_buffer_count {
      return Err(PresenterError::CommandBufferCountMismatch {
        images: image_count,
        command_buffers: command_buffer_count,
      });
    }

    self.generation += 1;
    self.image_count = image_count;
    info!(
      "Swapchain generation {} built with {} images",
      self.generation, image_count
    );

    Ok(self.generation)
  }

  /// Procedure: Wait for the device to be idle, then clean up command buffers
  /// and the swapchain (in that order) and recreate them:
  /// * Swapchain, ImageViews, Depth Buffer, Framebuffers
  /// * Command Buffers.
  pub fn invalidate<L: SwapchainLifecycle>(&mut self, lifecycle: &mut L) -> PresenterResult<u64> {
    warn!(
      "Invalidating swapchain generation {}, rebuilding...",
      self.generation
    );

    lifecycle.wait_device_idle()?;
    lifecycle.destroy_command_buffers()?;
    lifecycle.destroy_swapchain()?;

    self.build(lifecycle)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::{InvalidationController, SwapchainLifecycle};
  use crate::error::{PresenterError, PresenterResult};

  #[derive(Copy, Clone, Debug, PartialEq, Eq)]
  pub(crate) enum LifecycleCall {
    WaitIdle,
    DestroyCommandBuffers,
    DestroySwapchain,
    CreateSwapchain,
    CreateCommandBuffers,
  }

  /// Fake swapchain whose handles are tagged with the generation that made
  /// them.
  #[derive(Default)]
  pub(crate) struct FakeLifecycle {
    pub calls: Vec<LifecycleCall>,
    pub image_counts: Vec<usize>,
    pub generation: u64,
    pub images: Vec<(u64, usize)>,
    pub command_buffers: Vec<(u64, usize)>,
    pub device_idle: bool,
    pub short_command_buffers: bool,
  }
  impl FakeLifecycle {
    pub fn with_image_counts(image_counts: &[usize]) -> Self {
      Self {
        image_counts: image_counts.to_vec(),
        ..Self::default()
      }
    }
  }
  impl SwapchainLifecycle for FakeLifecycle {
    fn wait_device_idle(&mut self) -> PresenterResult<()> {
      self.calls.push(LifecycleCall::WaitIdle);
      self.device_idle = true;
      Ok(())
    }

    fn destroy_command_buffers(&mut self) -> PresenterResult<()> {
      assert!(self.device_idle, "command buffers freed while GPU busy");
      self.calls.push(LifecycleCall::DestroyCommandBuffers);
      self.command_buffers.clear();
      Ok(())
    }

    fn destroy_swapchain(&mut self) -> PresenterResult<()> {
      assert!(self.device_idle, "swapchain destroyed while GPU busy");
      assert!(
        self.command_buffers.is_empty(),
        "swapchain destroyed while command buffers reference it"
      );
      self.calls.push(LifecycleCall::DestroySwapchain);
      self.images.clear();
      Ok(())
    }

    fn create_swapchain(&mut self) -> PresenterResult<usize> {
      assert!(self.images.is_empty(), "swapchain created over a live one");
      self.calls.push(LifecycleCall::CreateSwapchain);
      self.generation += 1;
      let count = if self.image_counts.len() > 1 {
        self.image_counts.remove(0)
      } else {
        self.image_counts[0]
      };
      self.images = (0..count).map(|i| (self.generation, i)).collect();
      self.device_idle = false;
      Ok(count)
    }

    fn create_command_buffers(&mut self) -> PresenterResult<usize> {
      self.calls.push(LifecycleCall::CreateCommandBuffers);
      self.command_buffers = self.images.clone();
      if self.short_command_buffers {
        self.command_buffers.pop();
      }
      Ok(self.command_buffers.len())
    }
  }

  #[test]
  fn build_creates_swapchain_then_command_buffers() {
    let mut lifecycle = FakeLifecycle::with_image_counts(&[3]);
    let mut controller = InvalidationController::new();

    assert_eq!(controller.build(&mut lifecycle).unwrap(), 1);
    assert_eq!(
      lifecycle.calls,
      vec![
        LifecycleCall::CreateSwapchain,
        LifecycleCall::CreateCommandBuffers
      ]
    );
    assert_eq!(controller.image_count(), 3);
  }

  #[test]
  fn invalidate_idles_tears_down_and_rebuilds_in_order() {
    let mut lifecycle = FakeLifecycle::with_image_counts(&[2, 3]);
    let mut controller = InvalidationController::new();
    controller.build(&mut lifecycle).unwrap();
    lifecycle.calls.clear();

    controller.invalidate(&mut lifecycle).unwrap();

    assert_eq!(
      lifecycle.calls,
      vec![
        LifecycleCall::WaitIdle,
        LifecycleCall::DestroyCommandBuffers,
        LifecycleCall::DestroySwapchain,
        LifecycleCall::CreateSwapchain,
        LifecycleCall::CreateCommandBuffers,
      ]
    );
    assert_eq!(controller.generation(), 2);
  }

  #[test]
  fn rebuilt_command_buffers_match_new_image_count_and_generation() {
    let mut lifecycle = FakeLifecycle::with_image_counts(&[2, 4]);
    let mut controller = InvalidationController::new();
    controller.build(&mut lifecycle).unwrap();

    controller.invalidate(&mut lifecycle).unwrap();

    assert_eq!(lifecycle.images.len(), 4);
    assert_eq!(lifecycle.command_buffers.len(), lifecycle.images.len());
    assert_eq!(controller.image_count(), 4);
    assert!(lifecycle
      .command_buffers
      .iter()
      .chain(lifecycle.images.iter())
      .all(|&(generation, _)| generation == 2));
  }

  #[test]
  fn cardinality_mismatch_is_fatal() {
    let mut lifecycle = FakeLifecycle::with_image_counts(&[3]);
    lifecycle.short_command_buffers = true;
    let mut controller = InvalidationController::new();

    let result = controller.build(&mut lifecycle);

    assert!(matches!(
      result,
      Err(PresenterError::CommandBufferCountMismatch {
        images: 3,
        command_buffers: 2
      })
    ));
    assert_eq!(controller.generation(), 0);
  }
}
