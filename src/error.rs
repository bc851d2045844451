use ash::{vk, InstanceError};
use std::{error::Error, ffi::NulError, fmt};

pub type PresenterResult<T> = Result<T, PresenterError>;

#[derive(Debug)]
pub enum PresenterError {
  CouldNotLoadVulkan(String),
  CouldNotCreateInstance(&'static str, InstanceError),
  CStrError(NulError),
  CouldNotSelectPhysicalDevice,
  NoSuitableQueueFamilies,
  NoSuitableDepthBufferFormat,
  /// The surface no longer matches the swapchain, it must be rebuilt.
  SwapchainOutOfDate,
  SwapchainMissing,
  DepthBufferMissing,
  CommandBuffersMissing,
  CommandBufferCountMismatch {
    images: usize,
    command_buffers: usize,
  },
  /// Image views and framebuffers must correspond 1:1 with swapchain images.
  SwapchainResourceMismatch {
    images: usize,
    image_views: usize,
    framebuffers: usize,
  },
  InvalidConfig(String),
  VulkanError(vk::Result),
  VulkanMemoryAllocatorError(vk_mem::Error),
}
impl PresenterError {
  /// Out of date or suboptimal surfaces, absorbed by rebuilding the swapchain.
  pub fn is_stale_surface(&self) -> bool {
    matches!(self, PresenterError::SwapchainOutOfDate)
  }

  /// The device does not meet the minimum requirements.
  pub fn is_capability_exhaustion(&self) -> bool {
    matches!(
      self,
      PresenterError::CouldNotSelectPhysicalDevice
        | PresenterError::NoSuitableQueueFamilies
        | PresenterError::NoSuitableDepthBufferFormat
    )
  }

  /// Anything that is not a stale surface ends the frame loop.
  pub fn is_fatal(&self) -> bool {
    !self.is_stale_surface()
  }
}

impl fmt::Display for PresenterError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      PresenterError::CouldNotLoadVulkan(s) => write!(f, "Could not load Vulkan: {}", s),
      PresenterError::CouldNotCreateInstance(s, ie) => write!(f, "{} caused by {:?}", s, ie),
      PresenterError::CStrError(e) => write!(f, "{}", e),
      PresenterError::CouldNotSelectPhysicalDevice => write!(f, "Could Not Select Physical Device"),
      PresenterError::NoSuitableQueueFamilies => {
        write!(f, "No queue families support graphics and presentation")
      }
      PresenterError::NoSuitableDepthBufferFormat => {
        write!(f, "No depth buffer format is supported by this device")
      }
      PresenterError::SwapchainOutOfDate => write!(f, "Swapchain is out of date"),
      PresenterError::SwapchainMissing => write!(f, "No swapchain has been created"),
      PresenterError::DepthBufferMissing => {
        write!(f, "Framebuffers require a depth buffer to be created first")
      }
      PresenterError::CommandBuffersMissing => {
        write!(f, "No command buffers are recorded for the current swapchain")
      }
      PresenterError::CommandBufferCountMismatch {
        images,
        command_buffers,
      } => write!(
        f,
        "Recreated {} command buffers for {} swapchain images",
        command_buffers, images
      ),
      PresenterError::SwapchainResourceMismatch {
        images,
        image_views,
        framebuffers,
      } => write!(
        f,
        "Swapchain has {} images but {} image views and {} framebuffers",
        images, image_views, framebuffers
      ),
      PresenterError::InvalidConfig(s) => write!(f, "Invalid configuration: {}", s),
      PresenterError::VulkanError(r) => write!(f, "Vulkan Error: {:?}", r),
      PresenterError::VulkanMemoryAllocatorError(e) => {
        write!(f, "Vulkan Memory Allocator Error: {:?}", e)
      }
    }
  }
}

impl Error for PresenterError {}

impl From<NulError> for PresenterError {
  fn from(e: NulError) -> PresenterError {
    PresenterError::CStrError(e)
  }
}

impl From<vk::Result> for PresenterError {
  fn from(e: vk::Result) -> PresenterError {
    match e {
      vk::Result::ERROR_OUT_OF_DATE_KHR => PresenterError::SwapchainOutOfDate,
      e => PresenterError::VulkanError(e),
    }
  }
}

impl From<vk_mem::Error> for PresenterError {
  fn from(e: vk_mem::Error) -> PresenterError {
    PresenterError::VulkanMemoryAllocatorError(e)
  }
}

#[cfg(test)]
mod tests {
  use super::PresenterError;
  use ash::vk;

  #[test]
  fn out_of_date_is_absorbed_as_stale_surface() {
    let err: PresenterError = vk::Result::ERROR_OUT_OF_DATE_KHR.into();
    assert!(err.is_stale_surface());
    assert!(!err.is_fatal());
  }

  #[test]
  fn other_vulkan_results_are_fatal_device_errors() {
    let err: PresenterError = vk::Result::ERROR_DEVICE_LOST.into();
    assert!(matches!(
      err,
      PresenterError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
    ));
    assert!(err.is_fatal());
    assert!(!err.is_capability_exhaustion());
  }

  #[test]
  fn missing_depth_format_is_capability_exhaustion() {
    let err = PresenterError::NoSuitableDepthBufferFormat;
    assert!(err.is_capability_exhaustion());
    assert!(err.is_fatal());
  }
}
