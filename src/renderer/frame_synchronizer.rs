use crate::{
  error::PresenterResult,
  renderer::{
    invalidation::{InvalidationController, SwapchainLifecycle},
    FrameOutcome,
  },
};
use log::{debug, warn};

/// Result of asking the surface for the next presentable image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
  /// Image is (or will be, once image available is signaled) ready to render
  /// to.  `suboptimal` means it still works but the swapchain should be
  /// rebuilt after this frame.
  Acquired { image_index: u32, suboptimal: bool },
  /// The surface changed underneath the swapchain, nothing can be rendered.
  OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
  Presented,
  Suboptimal,
  OutOfDate,
}

/// The per frame half of a backend.  Each `slot` is one frame in flight and
/// owns its own fence and semaphore pair.
pub trait FrameBackend: SwapchainLifecycle {
  /// Blocks the CPU until the last submission made from this slot completed.
  fn wait_for_slot(&mut self, slot: usize) -> PresenterResult<()>;

  /// Acquires the next swapchain image, signaling this slot's image available
  /// semaphore.
  fn acquire_next_image(&mut self, slot: usize) -> PresenterResult<AcquireOutcome>;

  /// Submits the recorded command buffer for `image_index`, waiting on image
  /// available at color attachment output and signaling render finished plus
  /// the slot fence.
  fn submit(&mut self, slot: usize, image_index: u32) -> PresenterResult<()>;

  /// Presents `image_index` once this slot's render finished is signaled.
  fn present(&mut self, slot: usize, image_index: u32) -> PresenterResult<PresentOutcome>;
}

/// Observable position in the acquire -> submit -> present protocol.  Each
/// state is entered right before its step runs, so after a fatal error it
/// names the step that failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
  Idle,
  Acquiring,
  Submitted,
  Presenting,
  Invalidated,
}

/// Drives one frame at a time through a [FrameBackend](trait.FrameBackend.html)
/// and hands stale surfaces to the
/// [InvalidationController](../invalidation/struct.InvalidationController.html).
pub struct FrameSynchronizer {
  state: FrameState,
  frames_in_flight: usize,
  current_slot: usize,
  frames_presented: u64,
  invalidation_requested: bool,
  invalidation: InvalidationController,
}
impl FrameSynchronizer {
  pub fn new(frames_in_flight: usize) -> Self {
    Self {
      state: FrameState::Idle,
      frames_in_flight: frames_in_flight.max(1),
      current_slot: 0,
      frames_presented: 0,
      invalidation_requested: false,
      invalidation: InvalidationController::new(),
    }
  }

  pub fn state(&self) -> FrameState {
    self.state
  }

  /// The slot the next frame will use.
  pub fn current_slot(&self) -> usize {
    self.current_slot
  }

  pub fn frames_in_flight(&self) -> usize {
    self.frames_in_flight
  }

  /// Frames the surface accepted for display (presented or suboptimal).
  pub fn frames_presented(&self) -> u64 {
    self.frames_presented
  }

  pub fn generation(&self) -> u64 {
    self.invalidation.generation()
  }

  pub fn invalidation_pending(&self) -> bool {
    self.invalidation_requested
  }

  /// Marks the swapchain stale (eg the window resized).  It is rebuilt before
  /// the next acquire.
  pub fn request_invalidation(&mut self) {
    self.invalidation_requested = true;
  }

  /// Builds the first swapchain generation.
  pub fn build<B: FrameBackend>(&mut self, backend: &mut B) -> PresenterResult<u64> {
    let generation = self.invalidation.build(backend)?;
    self.state = FrameState::Idle;
    Ok(generation)
  }

  /// Tears down and rebuilds the swapchain right away.
  pub fn invalidate<B: FrameBackend>(&mut self, backend: &mut B) -> PresenterResult<u64> {
    self.state = FrameState::Invalidated;
    let generation = self.invalidation.invalidate(backend)?;
    self.invalidation_requested = false;
    self.state = FrameState::Idle;
    Ok(generation)
  }

  /// Runs one full frame.  Out of date and suboptimal surfaces are absorbed
  /// by rebuilding, every other error is returned as is.
  pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> PresenterResult<FrameOutcome> {
    if self.invalidation_requested {
      self.invalidate(backend)?;
    }

    let slot = self.current_slot;
    backend.wait_for_slot(slot)?;

    self.state = FrameState::Acquiring;
    let (image_index, acquire_suboptimal) = match backend.acquire_next_image(slot)? {
      AcquireOutcome::Acquired {
        image_index,
        suboptimal,
      } => (image_index, suboptimal),
      AcquireOutcome::OutOfDate => {
        warn!("Swapchain out of date on acquire, abandoning frame");
        self.invalidate(backend)?;
        return Ok(FrameOutcome::Abandoned);
      }
    };
    if acquire_suboptimal {
      debug!("Acquired image {} from a suboptimal swapchain", image_index);
    }

    self.state = FrameState::Submitted;
    backend.submit(slot, image_index)?;

    self.state = FrameState::Presenting;
    let present_outcome = backend.present(slot, image_index)?;
    // The submission used this slot whether or not the image was shown.
    self.current_slot = (self.current_slot + 1) % self.frames_in_flight;

    let stale = match present_outcome {
      PresentOutcome::Presented => {
        self.frames_presented += 1;
        acquire_suboptimal
      }
      PresentOutcome::Suboptimal => {
        warn!("Swapchain reported {:?} on present", present_outcome);
        self.frames_presented += 1;
        true
      }
      PresentOutcome::OutOfDate => {
        warn!("Swapchain out of date on present, frame discarded");
        self.invalidate(backend)?;
        return Ok(FrameOutcome::Discarded);
      }
    };

    if stale || self.invalidation_requested {
      self.invalidate(backend)?;
      return Ok(FrameOutcome::PresentedThenInvalidated);
    }

    self.state = FrameState::Idle;
    Ok(FrameOutcome::Presented)
  }
}

#[cfg(test)]
mod tests {
  use super::{AcquireOutcome, FrameBackend, FrameState, FrameSynchronizer, PresentOutcome};
  use crate::{
    error::{PresenterError, PresenterResult},
    renderer::{invalidation::SwapchainLifecycle, FrameOutcome},
  };
  use std::collections::VecDeque;

  #[derive(Clone, Debug, PartialEq, Eq)]
  enum Call {
    WaitForSlot(usize),
    Acquire(usize),
    Submit(usize, u32),
    Present(usize, u32),
    WaitIdle,
    DestroyCommandBuffers,
    DestroySwapchain,
    CreateSwapchain,
    CreateCommandBuffers,
  }

  /// Backend that replays scripted acquire and present results.
  struct ScriptedBackend {
    calls: Vec<Call>,
    acquires: VecDeque<AcquireOutcome>,
    presents: VecDeque<PresentOutcome>,
    fatal_present: Option<PresenterError>,
    image_count: usize,
    next_image: u32,
  }
  impl ScriptedBackend {
    fn new(image_count: usize) -> Self {
      Self {
        calls: Vec::new(),
        acquires: VecDeque::new(),
        presents: VecDeque::new(),
        fatal_present: None,
        image_count,
        next_image: 0,
      }
    }

    fn invalidations(&self) -> usize {
      self.calls.iter().filter(|&c| *c == Call::WaitIdle).count()
    }
  }
  impl SwapchainLifecycle for ScriptedBackend {
    fn wait_device_idle(&mut self) -> PresenterResult<()> {
      self.calls.push(Call::WaitIdle);
      Ok(())
    }

    fn destroy_command_buffers(&mut self) -> PresenterResult<()> {
      self.calls.push(Call::DestroyCommandBuffers);
      Ok(())
    }

    fn destroy_swapchain(&mut self) -> PresenterResult<()> {
      self.calls.push(Call::DestroySwapchain);
      Ok(())
    }

    fn create_swapchain(&mut self) -> PresenterResult<usize> {
      self.calls.push(Call::CreateSwapchain);
      Ok(self.image_count)
    }

    fn create_command_buffers(&mut self) -> PresenterResult<usize> {
      self.calls.push(Call::CreateCommandBuffers);
      Ok(self.image_count)
    }
  }
  impl FrameBackend for ScriptedBackend {
    fn wait_for_slot(&mut self, slot: usize) -> PresenterResult<()> {
      self.calls.push(Call::WaitForSlot(slot));
      Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> PresenterResult<AcquireOutcome> {
      self.calls.push(Call::Acquire(slot));
      let image_index = self.next_image;
      self.next_image = (self.next_image + 1) % self.image_count as u32;
      Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Acquired {
        image_index,
        suboptimal: false,
      }))
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> PresenterResult<()> {
      self.calls.push(Call::Submit(slot, image_index));
      Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> PresenterResult<PresentOutcome> {
      self.calls.push(Call::Present(slot, image_index));
      if let Some(e) = self.fatal_present.take() {
        return Err(e);
      }
      Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
    }
  }

  fn built(frames_in_flight: usize, image_count: usize) -> (FrameSynchronizer, ScriptedBackend) {
    let _ = simple_logger::init_with_level(log::Level::Info);
    let mut backend = ScriptedBackend::new(image_count);
    let mut synchronizer = FrameSynchronizer::new(frames_in_flight);
    synchronizer.build(&mut backend).unwrap();
    backend.calls.clear();
    (synchronizer, backend)
  }

  #[test]
  fn healthy_frame_waits_acquires_submits_presents() {
    let (mut synchronizer, mut backend) = built(2, 3);

    let outcome = synchronizer.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(
      backend.calls,
      vec![
        Call::WaitForSlot(0),
        Call::Acquire(0),
        Call::Submit(0, 0),
        Call::Present(0, 0)
      ]
    );
    assert_eq!(synchronizer.state(), FrameState::Idle);
    assert_eq!(synchronizer.frames_presented(), 1);
  }

  #[test]
  fn out_of_date_acquire_abandons_frame_and_rebuilds_before_next_acquire() {
    let (mut synchronizer, mut backend) = built(2, 3);
    backend.acquires.push_back(AcquireOutcome::OutOfDate);

    let outcome = synchronizer.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Abandoned);
    assert!(!backend
      .calls
      .iter()
      .any(|c| matches!(c, Call::Submit(..) | Call::Present(..))));
    assert_eq!(
      &backend.calls[2..],
      &[
        Call::WaitIdle,
        Call::DestroyCommandBuffers,
        Call::DestroySwapchain,
        Call::CreateSwapchain,
        Call::CreateCommandBuffers
      ]
    );
    assert_eq!(synchronizer.frames_presented(), 0);
    assert_eq!(synchronizer.generation(), 2);

    backend.calls.clear();
    synchronizer.draw_frame(&mut backend).unwrap();
    assert_eq!(backend.calls[1], Call::Acquire(0));
  }

  #[test]
  fn suboptimal_present_displays_then_rebuilds() {
    let (mut synchronizer, mut backend) = built(2, 3);
    backend.presents.push_back(PresentOutcome::Suboptimal);

    let outcome = synchronizer.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::PresentedThenInvalidated);
    let present_at = backend
      .calls
      .iter()
      .position(|c| *c == Call::Present(0, 0))
      .unwrap();
    let idle_at = backend
      .calls
      .iter()
      .position(|c| *c == Call::WaitIdle)
      .unwrap();
    assert!(present_at < idle_at);
    assert_eq!(synchronizer.frames_presented(), 1);
    assert_eq!(synchronizer.state(), FrameState::Idle);
  }

  #[test]
  fn suboptimal_acquire_is_remembered_until_after_present() {
    let (mut synchronizer, mut backend) = built(2, 3);
    backend.acquires.push_back(AcquireOutcome::Acquired {
      image_index: 1,
      suboptimal: true,
    });

    let outcome = synchronizer.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::PresentedThenInvalidated);
    assert_eq!(backend.calls[2], Call::Submit(0, 1));
    assert_eq!(backend.calls[3], Call::Present(0, 1));
    assert_eq!(backend.invalidations(), 1);
  }

  #[test]
  fn out_of_date_present_rebuilds() {
    let (mut synchronizer, mut backend) = built(1, 2);
    backend.presents.push_back(PresentOutcome::OutOfDate);

    let outcome = synchronizer.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Discarded);
    assert_eq!(backend.calls[3], Call::Present(0, 0));
    assert_eq!(backend.invalidations(), 1);
    assert_eq!(synchronizer.frames_presented(), 0);
    assert_eq!(synchronizer.state(), FrameState::Idle);
  }

  #[test]
  fn only_shown_frames_are_counted_as_presented() {
    let (mut synchronizer, mut backend) = built(2, 3);
    backend.presents.push_back(PresentOutcome::Presented);
    backend.presents.push_back(PresentOutcome::OutOfDate);
    backend.presents.push_back(PresentOutcome::Suboptimal);

    for _ in 0..3 {
      synchronizer.draw_frame(&mut backend).unwrap();
    }

    assert_eq!(synchronizer.frames_presented(), 2);
    assert_eq!(synchronizer.current_slot(), 1);
  }

  #[test]
  fn slots_are_used_round_robin() {
    let (mut synchronizer, mut backend) = built(2, 3);

    for _ in 0..4 {
      synchronizer.draw_frame(&mut backend).unwrap();
    }

    let waited: Vec<usize> = backend
      .calls
      .iter()
      .filter_map(|c| match c {
        Call::WaitForSlot(slot) => Some(*slot),
        _ => None,
      })
      .collect();
    assert_eq!(waited, vec![0, 1, 0, 1]);
    assert_eq!(synchronizer.current_slot(), 0);
  }

  #[test]
  fn requested_invalidation_runs_before_acquire() {
    let (mut synchronizer, mut backend) = built(2, 3);
    synchronizer.request_invalidation();

    let outcome = synchronizer.draw_frame(&mut backend).unwrap();

    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(backend.calls[0], Call::WaitIdle);
    assert_eq!(backend.invalidations(), 1);
    assert!(!synchronizer.invalidation_pending());
  }

  #[test]
  fn fatal_submit_error_propagates() {
    struct FailingSubmit(ScriptedBackend);
    impl SwapchainLifecycle for FailingSubmit {
      fn wait_device_idle(&mut self) -> PresenterResult<()> {
        self.0.wait_device_idle()
      }
      fn destroy_command_buffers(&mut self) -> PresenterResult<()> {
        self.0.destroy_command_buffers()
      }
      fn destroy_swapchain(&mut self) -> PresenterResult<()> {
        self.0.destroy_swapchain()
      }
      fn create_swapchain(&mut self) -> PresenterResult<usize> {
        self.0.create_swapchain()
      }
      fn create_command_buffers(&mut self) -> PresenterResult<usize> {
        self.0.create_command_buffers()
      }
    }
    impl FrameBackend for FailingSubmit {
      fn wait_for_slot(&mut self, slot: usize) -> PresenterResult<()> {
        self.0.wait_for_slot(slot)
      }
      fn acquire_next_image(&mut self, slot: usize) -> PresenterResult<AcquireOutcome> {
        self.0.acquire_next_image(slot)
      }
      fn submit(&mut self, _slot: usize, _image_index: u32) -> PresenterResult<()> {
        Err(PresenterError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST))
      }
      fn present(&mut self, slot: usize, image_index: u32) -> PresenterResult<PresentOutcome> {
        self.0.present(slot, image_index)
      }
    }

    let mut backend = FailingSubmit(ScriptedBackend::new(2));
    let mut synchronizer = FrameSynchronizer::new(2);
    synchronizer.build(&mut backend).unwrap();

    let result = synchronizer.draw_frame(&mut backend);

    assert!(matches!(result, Err(ref e) if e.is_fatal()));
    assert!(!backend
      .0
      .calls
      .iter()
      .any(|c| matches!(c, Call::Present(..))));
    assert_eq!(synchronizer.state(), FrameState::Submitted);
  }

  #[test]
  fn fatal_present_error_leaves_presenting_state() {
    let (mut synchronizer, mut backend) = built(2, 3);
    backend.fatal_present = Some(PresenterError::VulkanError(
      ash::vk::Result::ERROR_DEVICE_LOST,
    ));

    let result = synchronizer.draw_frame(&mut backend);

    assert!(matches!(result, Err(ref e) if e.is_fatal()));
    assert_eq!(synchronizer.state(), FrameState::Presenting);
    assert_eq!(synchronizer.frames_presented(), 0);
    assert_eq!(backend.invalidations(), 0);
  }
}
