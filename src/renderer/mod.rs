//! This is the main module of the presenter.
//!
//! In order to use it follow these steps:
//! 1) Create your system window (I reccomend using
//! [winit](https://www.crates.io/crates/winit))
//!
//! 2) Implement [PipelineSource](vulkan/pipeline_source/trait.PipelineSource.html)
//! for whatever builds your render pass, pipeline and geometry.  It is asked
//! to rebuild every time the swapchain is recreated, since the extent and
//! image format may change.
//!
//! 3) Create the presenter with `VulkanPresenter::new`, passing in your window,
//! your pipeline source and a [Config](config/struct.Config.html).
//! ```rust,no_run
//! # use vk_presenter::renderer::{config::Config, VulkanPresenter, Presenter};
//! # fn run<W: raw_window_handle::HasRawWindowHandle, P: vk_presenter::renderer::PipelineSource>(window: &W, pipeline_source: P) {
//! let config = Config::builder().requested_width(800).requested_height(600).build().unwrap();
//! let mut presenter = VulkanPresenter::new(window, pipeline_source, config).unwrap();
//! presenter.frame().unwrap();
//! # }
//! ```
//!
//! 4) Every time the window resizes call `notify_resized`, and call `frame`
//! once per loop iteration, or hand both to
//! [run_frame_loop](frame_loop/fn.run_frame_loop.html).
pub mod config;
pub mod frame_loop;
pub mod frame_synchronizer;
pub mod invalidation;
pub mod vulkan;

pub use frame_loop::{run_frame_loop, FrameLoopStats, WindowEvents};
pub use frame_synchronizer::{FrameBackend, FrameState, FrameSynchronizer};
pub use invalidation::{InvalidationController, SwapchainLifecycle};
pub use vulkan::{pipeline_source::PipelineSource, vulkan_presenter::VulkanPresenter};

use crate::error::PresenterResult;

#[cfg(debug_assertions)]
const IS_DEBUG_MODE: bool = true;
#[cfg(not(debug_assertions))]
const IS_DEBUG_MODE: bool = false;

const ENABLE_VALIDATION_LAYERS: bool = IS_DEBUG_MODE;

/// What happened to a single call to [frame](trait.Presenter.html#tymethod.frame).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
  /// Acquired, submitted and presented.
  Presented,
  /// Presented, but the surface reported it was suboptimal (or a resize was
  /// pending) so the swapchain was rebuilt right afterwards.
  PresentedThenInvalidated,
  /// The acquire reported an out of date surface, nothing was submitted and
  /// the swapchain was rebuilt.
  Abandoned,
  /// Submitted, but present reported an out of date surface so nothing was
  /// shown.  The swapchain was rebuilt.
  Discarded,
  /// Rendering is disabled (eg minimized window), nothing happened.
  Skipped,
}

/// This is the trait interface that every backend supports.  Used to drive
/// presentation to a window.
pub trait Presenter {
  /// Acquire an image, submit the recorded commands for it and present it.
  /// Stale surfaces are rebuilt internally, only fatal errors are returned.
  fn frame(&mut self) -> PresenterResult<FrameOutcome>;

  /// Tells the presenter the window is now this size.  The swapchain will be
  /// rebuilt to match before the next acquire (or right after the next
  /// present).  A zero sized window disables rendering until it grows again.
  fn notify_resized(&mut self, width: u32, height: u32);

  /// Enables or disables rendering, if disabled [frame] is a no-op.
  fn set_rendering_enabled(&mut self, enabled: bool);

  /// Blocks until the GPU has finished all submitted work.
  fn wait_idle(&self) -> PresenterResult<()>;
}
