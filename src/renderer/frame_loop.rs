use crate::{
  error::PresenterResult,
  renderer::{FrameOutcome, Presenter},
};
use log::{error, info};

/// What the frame loop needs from the windowing system.
pub trait WindowEvents {
  /// Polled once per iteration, the loop exits when this returns false.
  fn should_continue(&mut self) -> bool;

  /// The most recent size the window was resized to since the last call, if
  /// any.
  fn take_resize(&mut self) -> Option<(u32, u32)>;
}

/// Counters collected over one run of [run_frame_loop](fn.run_frame_loop.html).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameLoopStats {
  pub frames_presented: u64,
  /// Frames that never reached the screen because the surface went stale.
  pub frames_abandoned: u64,
  pub frames_skipped: u64,
  pub invalidations: u64,
}
impl FrameLoopStats {
  fn record(&mut self, outcome: FrameOutcome) {
    match outcome {
      FrameOutcome::Presented => self.frames_presented += 1,
      FrameOutcome::PresentedThenInvalidated => {
        self.frames_presented += 1;
        self.invalidations += 1;
      }
      FrameOutcome::Abandoned | FrameOutcome::Discarded => {
        self.frames_abandoned += 1;
        self.invalidations += 1;
      }
      FrameOutcome::Skipped => self.frames_skipped += 1,
    }
  }
}

/// Draws frames until the window says to stop, forwarding resizes to the
/// presenter.  A fatal error ends the loop and is returned.  The device is
/// idled before returning either way so the caller can drop everything.
pub fn run_frame_loop<P: Presenter, W: WindowEvents>(
  presenter: &mut P, window: &mut W,
) -> PresenterResult<FrameLoopStats> {
  let mut stats = FrameLoopStats::default();

  let result = loop {
    if !window.should_continue() {
      break Ok(());
    }

    if let Some((width, height)) = window.take_resize() {
      presenter.notify_resized(width, height);
    }

    match presenter.frame() {
      Ok(outcome) => stats.record(outcome),
      Err(e) => {
        error!("Frame failed, exiting frame loop: {}", e);
        break Err(e);
      }
    }
  };

  let idle_result = presenter.wait_idle();
  result?;
  idle_result?;

  info!("Frame loop exited: {:?}", stats);
  Ok(stats)
}

#[cfg(test)]
mod tests {
  use super::{run_frame_loop, FrameLoopStats, WindowEvents};
  use crate::{
    error::{PresenterError, PresenterResult},
    renderer::{FrameOutcome, Presenter},
  };
  use ash::vk;
  use std::{cell::Cell, collections::VecDeque};

  struct FakePresenter {
    outcomes: VecDeque<PresenterResult<FrameOutcome>>,
    resizes: Vec<(u32, u32)>,
    waited_idle: Cell<bool>,
  }
  impl FakePresenter {
    fn new(outcomes: Vec<PresenterResult<FrameOutcome>>) -> Self {
      Self {
        outcomes: outcomes.into_iter().collect(),
        resizes: Vec::new(),
        waited_idle: Cell::new(false),
      }
    }
  }
  impl Presenter for FakePresenter {
    fn frame(&mut self) -> PresenterResult<FrameOutcome> {
      self
        .outcomes
        .pop_front()
        .unwrap_or(Ok(FrameOutcome::Presented))
    }

    fn notify_resized(&mut self, width: u32, height: u32) {
      self.resizes.push((width, height));
    }

    fn set_rendering_enabled(&mut self, _enabled: bool) {}

    fn wait_idle(&self) -> PresenterResult<()> {
      self.waited_idle.set(true);
      Ok(())
    }
  }

  /// Runs for a fixed number of iterations, resizing on the listed ones.
  struct FakeWindow {
    iterations_left: usize,
    iteration: usize,
    resize_at: Vec<(usize, (u32, u32))>,
  }
  impl WindowEvents for FakeWindow {
    fn should_continue(&mut self) -> bool {
      if self.iterations_left == 0 {
        return false;
      }
      self.iterations_left -= 1;
      self.iteration += 1;
      true
    }

    fn take_resize(&mut self) -> Option<(u32, u32)> {
      let iteration = self.iteration;
      self
        .resize_at
        .iter()
        .find(|(at, _)| *at == iteration)
        .map(|(_, size)| *size)
    }
  }

  #[test]
  fn loop_counts_outcomes_until_window_closes() {
    let mut presenter = FakePresenter::new(vec![
      Ok(FrameOutcome::Presented),
      Ok(FrameOutcome::Abandoned),
      Ok(FrameOutcome::PresentedThenInvalidated),
      Ok(FrameOutcome::Skipped),
      Ok(FrameOutcome::Discarded),
    ]);
    let mut window = FakeWindow {
      iterations_left: 6,
      iteration: 0,
      resize_at: vec![],
    };

    let stats = run_frame_loop(&mut presenter, &mut window).unwrap();

    assert_eq!(
      stats,
      FrameLoopStats {
        frames_presented: 3,
        frames_abandoned: 2,
        frames_skipped: 1,
        invalidations: 3,
      }
    );
    assert!(presenter.waited_idle.get());
  }

  #[test]
  fn resizes_are_forwarded_before_the_frame() {
    let mut presenter = FakePresenter::new(vec![]);
    let mut window = FakeWindow {
      iterations_left: 3,
      iteration: 0,
      resize_at: vec![(2, (1024, 768))],
    };

    run_frame_loop(&mut presenter, &mut window).unwrap();

    assert_eq!(presenter.resizes, vec![(1024, 768)]);
  }

  #[test]
  fn fatal_error_stops_the_loop() {
    let mut presenter = FakePresenter::new(vec![
      Ok(FrameOutcome::Presented),
      Err(PresenterError::VulkanError(vk::Result::ERROR_DEVICE_LOST)),
      Ok(FrameOutcome::Presented),
    ]);
    let mut window = FakeWindow {
      iterations_left: 10,
      iteration: 0,
      resize_at: vec![],
    };

    let result = run_frame_loop(&mut presenter, &mut window);

    assert!(matches!(
      result,
      Err(PresenterError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
    ));
    assert_eq!(presenter.outcomes.len(), 1);
    assert!(presenter.waited_idle.get());
  }
}
