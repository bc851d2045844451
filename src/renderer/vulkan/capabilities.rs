use crate::{error::PresenterResult, renderer::config::PresentMode};
use ash::{extensions::khr::Surface, vk};
use log::{info, warn};

/// What the surface supports right now.  Queried fresh before every swapchain
/// is built since a resize can change any of it.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
  pub capabilities: vk::SurfaceCapabilitiesKHR,
  pub formats: Vec<vk::SurfaceFormatKHR>,
  pub present_modes: Vec<vk::PresentModeKHR>,
}
impl SurfaceSupport {
  pub fn new(
    capabilities: vk::SurfaceCapabilitiesKHR, formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
  ) -> Self {
    Self {
      capabilities,
      formats,
      present_modes,
    }
  }

  /// Retrieves the details of the swapchain's supported formats, present modes,
  /// and capabilities.
  pub fn query(
    surface_functions: &Surface, surface: vk::SurfaceKHR, physical_device: vk::PhysicalDevice,
  ) -> PresenterResult<Self> {
    unsafe {
      let capabilities =
        surface_functions.get_physical_device_surface_capabilities(physical_device, surface)?;
      let formats =
        surface_functions.get_physical_device_surface_formats(physical_device, surface)?;
      let present_modes =
        surface_functions.get_physical_device_surface_present_modes(physical_device, surface)?;

      Ok(Self::new(capabilities, formats, present_modes))
    }
  }

  /// A device can only present to the surface if it offers at least one
  /// format and one present mode.
  pub fn is_adequate(&self) -> bool {
    !self.formats.is_empty() && !self.present_modes.is_empty()
  }
}

/// Everything the swapchain create info needs from negotiation.
#[derive(Copy, Clone, Debug)]
pub struct NegotiatedSwapchain {
  pub surface_format: vk::SurfaceFormatKHR,
  pub present_mode: vk::PresentModeKHR,
  pub extent: vk::Extent2D,
  pub image_count: u32,
  pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Picks format, present mode, extent and image count in one go.
pub fn negotiate(
  support: &SurfaceSupport, window_extent: vk::Extent2D, requested_present_mode: PresentMode,
) -> NegotiatedSwapchain {
  NegotiatedSwapchain {
    surface_format: choose_surface_format(&support.formats),
    present_mode: choose_present_mode(&support.present_modes, requested_present_mode),
    extent: choose_swap_extent(&support.capabilities, window_extent),
    image_count: choose_image_count(&support.capabilities),
    pre_transform: support.capabilities.current_transform,
  }
}

/// Uses B8G8R8A8_UNORM with SRGB_NONLINEAR if the surface allows it.  A single
/// UNDEFINED entry means the surface takes anything, so the preferred pair is
/// used.  Otherwise falls back to the first format the surface lists.
pub fn choose_surface_format(available_formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
  let preferred = vk::SurfaceFormatKHR {
    format: PREFERRED_FORMAT,
    color_space: PREFERRED_COLOR_SPACE,
  };

  match available_formats {
    [only] if only.format == vk::Format::UNDEFINED => preferred,
    [] => preferred,
    formats => *formats
      .iter()
      .find(|format| {
        format.format == PREFERRED_FORMAT && format.color_space == PREFERRED_COLOR_SPACE
      })
      .unwrap_or(&formats[0]),
  }
}

/// Honours the requested mode if the surface offers it, otherwise scans
/// Mailbox, then Immediate, then FIFO, which every surface must support.  See
/// [VkPresentModeKHR](https://renderdoc.org/vkspec_chunked/chap32.html#VkPresentModeKHR)
/// for details on modes.
pub fn choose_present_mode(
  available_present_modes: &[vk::PresentModeKHR], requested_present_mode: PresentMode,
) -> vk::PresentModeKHR {
  let requested = match requested_present_mode {
    PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
    PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    PresentMode::Fifo => vk::PresentModeKHR::FIFO,
  };

  let present_mode = [
    requested,
    vk::PresentModeKHR::MAILBOX,
    vk::PresentModeKHR::IMMEDIATE,
  ]
  .iter()
  .find(|&&mode| available_present_modes.contains(&mode))
  .copied()
  .unwrap_or(vk::PresentModeKHR::FIFO);

  info!("Selecting present mode: {:?}", present_mode);
  present_mode
}

/// Selects the resolution of the swap chain images.
/// This is almost always equal to the resolution of the Surface we're drawing
/// too, but some window managers let the application pick (current extent
/// width is u32::MAX), in which case the window size is clamped into the
/// supported range.
pub fn choose_swap_extent(
  capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D,
) -> vk::Extent2D {
  if capabilities.current_extent.width != u32::max_value() {
    return capabilities.current_extent;
  }

  let width = window_extent
    .width
    .max(capabilities.min_image_extent.width)
    .min(capabilities.max_image_extent.width);
  let height = window_extent
    .height
    .max(capabilities.min_image_extent.height)
    .min(capabilities.max_image_extent.height);

  if width != window_extent.width || height != window_extent.height {
    warn!(
      "Could not create a swapchain with the requested height and width, rendering to a \
       resolution of {}x{} instead",
      width, height
    );
  }

  vk::Extent2D { width, height }
}

/// One more than the minimum so we don't wait on the driver, capped at the
/// maximum when there is one (0 means no limit).  The driver may still create
/// more than this.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
  let desired = capabilities.min_image_count + 1;
  if capabilities.max_image_count > 0 {
    desired.min(capabilities.max_image_count)
  } else {
    desired
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
    vk::SurfaceFormatKHR {
      format,
      color_space,
    }
  }

  fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
      min_image_count: min,
      max_image_count: max,
      current_extent: vk::Extent2D {
        width: u32::max_value(),
        height: u32::max_value(),
      },
      min_image_extent: vk::Extent2D {
        width: 64,
        height: 32,
      },
      max_image_extent: vk::Extent2D {
        width: 1920,
        height: 1080,
      },
      ..Default::default()
    }
  }

  fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
  }

  #[test]
  fn preferred_pair_is_picked_wherever_it_appears() {
    let formats = [
      surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
      surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
      surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ];

    let chosen = choose_surface_format(&formats);

    assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
  }

  #[test]
  fn single_undefined_format_means_any_and_yields_preferred_pair() {
    let formats = [surface_format(
      vk::Format::UNDEFINED,
      vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
    )];

    let chosen = choose_surface_format(&formats);

    assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
  }

  #[test]
  fn first_format_is_the_fallback() {
    let formats = [
      surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
      surface_format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
    ];

    let chosen = choose_surface_format(&formats);

    assert_eq!(chosen.format, vk::Format::R8G8B8A8_SRGB);
  }

  #[test]
  fn mailbox_wins_whenever_present() {
    let modes = [
      vk::PresentModeKHR::FIFO,
      vk::PresentModeKHR::IMMEDIATE,
      vk::PresentModeKHR::MAILBOX,
      vk::PresentModeKHR::FIFO_RELAXED,
    ];

    assert_eq!(
      choose_present_mode(&modes, PresentMode::Mailbox),
      vk::PresentModeKHR::MAILBOX
    );
  }

  #[test]
  fn immediate_is_preferred_over_fifo_without_mailbox() {
    let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

    assert_eq!(
      choose_present_mode(&modes, PresentMode::Mailbox),
      vk::PresentModeKHR::IMMEDIATE
    );
  }

  #[test]
  fn fifo_is_the_guaranteed_fallback() {
    let modes = [vk::PresentModeKHR::FIFO_RELAXED, vk::PresentModeKHR::FIFO];

    assert_eq!(
      choose_present_mode(&modes, PresentMode::Mailbox),
      vk::PresentModeKHR::FIFO
    );
  }

  #[test]
  fn explicitly_requested_mode_is_honoured_when_supported() {
    let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];

    assert_eq!(
      choose_present_mode(&modes, PresentMode::Fifo),
      vk::PresentModeKHR::FIFO
    );
  }

  #[test]
  fn fixed_current_extent_is_used_verbatim() {
    let mut caps = capabilities(2, 3);
    caps.current_extent = extent(1280, 720);

    let chosen = choose_swap_extent(&caps, extent(4000, 10));

    assert_eq!((chosen.width, chosen.height), (1280, 720));
  }

  #[test]
  fn window_size_is_clamped_per_axis() {
    let caps = capabilities(2, 3);

    let too_big = choose_swap_extent(&caps, extent(4000, 500));
    assert_eq!((too_big.width, too_big.height), (1920, 500));

    let too_small = choose_swap_extent(&caps, extent(800, 1));
    assert_eq!((too_small.width, too_small.height), (800, 32));

    let inside = choose_swap_extent(&caps, extent(800, 600));
    assert_eq!((inside.width, inside.height), (800, 600));
  }

  #[test]
  fn image_count_is_min_plus_one_within_bound() {
    assert_eq!(choose_image_count(&capabilities(2, 3)), 3);
  }

  #[test]
  fn image_count_is_clamped_to_max() {
    assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
  }

  #[test]
  fn zero_max_image_count_is_unbounded() {
    assert_eq!(choose_image_count(&capabilities(4, 0)), 5);
  }

  #[test]
  fn negotiate_combines_every_choice() {
    let mut caps = capabilities(2, 0);
    caps.current_transform = vk::SurfaceTransformFlagsKHR::IDENTITY;
    let support = SurfaceSupport::new(
      caps,
      vec![surface_format(
        vk::Format::B8G8R8A8_UNORM,
        vk::ColorSpaceKHR::SRGB_NONLINEAR,
      )],
      vec![vk::PresentModeKHR::FIFO],
    );

    let negotiated = negotiate(&support, extent(640, 480), PresentMode::Mailbox);

    assert!(support.is_adequate());
    assert_eq!(negotiated.surface_format.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(negotiated.present_mode, vk::PresentModeKHR::FIFO);
    assert_eq!(
      (negotiated.extent.width, negotiated.extent.height),
      (640, 480)
    );
    assert_eq!(negotiated.image_count, 3);
    assert_eq!(
      negotiated.pre_transform,
      vk::SurfaceTransformFlagsKHR::IDENTITY
    );
  }
}
