use crate::{
  error::{PresenterError, PresenterResult},
  renderer::vulkan::images::create_image_view,
};
use ash::{version::DeviceV1_0, vk, Device};
use log::{error, info};
use std::sync::Arc;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
  vk::Format::D32_SFLOAT,
  vk::Format::D32_SFLOAT_S8_UINT,
  vk::Format::D24_UNORM_S8_UINT,
];

/// All resources relating to the Depth buffer (z buffer).
/// This includes the image, its memory, the view framebuffers attach, and the
/// format.  Shared by every framebuffer of a swapchain generation.
pub struct DepthResources {
  pub image: vk::Image,
  pub view: vk::ImageView,
  pub format: vk::Format,
  pub extent: vk::Extent2D,
  allocation: vk_mem::Allocation,
  logical_device: Arc<Device>,
  allocator: Arc<vk_mem::Allocator>,
}
impl DepthResources {
  pub fn new(
    logical_device: Arc<Device>, allocator: Arc<vk_mem::Allocator>, format: vk::Format,
    extent: vk::Extent2D,
  ) -> PresenterResult<DepthResources> {
    info!(
      "Creating {}x{} depth buffer with format {:?}",
      extent.width, extent.height, format
    );

    let image_ci = vk::ImageCreateInfo::builder()
      .image_type(vk::ImageType::TYPE_2D)
      .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
      .extent(vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: 1,
      })
      .mip_levels(1)
      .array_layers(1)
      .format(format)
      .tiling(vk::ImageTiling::OPTIMAL)
      .initial_layout(vk::ImageLayout::UNDEFINED)
      .sharing_mode(vk::SharingMode::EXCLUSIVE)
      .samples(vk::SampleCountFlags::TYPE_1)
      .build();
    let alloc_ci = vk_mem::AllocationCreateInfo {
      usage: vk_mem::MemoryUsage::GpuOnly,
      ..vk_mem::AllocationCreateInfo::default()
    };
    let (image, allocation, _) = allocator.create_image(&image_ci, &alloc_ci)?;

    let view = match create_image_view(&logical_device, image, format, aspect_mask(format)) {
      Ok(view) => view,
      Err(e) => {
        if let Err(destroy_err) = allocator.destroy_image(image, &allocation) {
          error!("Could not free depth image after failure: {:?}", destroy_err);
        }
        return Err(e);
      }
    };

    Ok(DepthResources {
      image,
      view,
      format,
      extent,
      allocation,
      logical_device,
      allocator,
    })
  }
}
impl Drop for DepthResources {
  fn drop(&mut self) {
    info!("Destroying depth buffer...");
    unsafe {
      self.logical_device.destroy_image_view(self.view, None);
    }
    if let Err(e) = self.allocator.destroy_image(self.image, &self.allocation) {
      error!("Could not free depth image: {:?}", e);
    }
  }
}

/// Returns the first candidate whose `tiling` features include all of
/// `features`.  Format properties come from `format_properties` so the search
/// does not need a live device.
pub fn find_supported_format<F>(
  format_candidates: &[vk::Format], tiling: vk::ImageTiling, features: vk::FormatFeatureFlags,
  format_properties: F,
) -> PresenterResult<vk::Format>
where
  F: Fn(vk::Format) -> vk::FormatProperties,
{
  format_candidates
    .iter()
    .copied()
    .find(|&format| {
      let props = format_properties(format);
      (tiling == vk::ImageTiling::LINEAR && props.linear_tiling_features.contains(features))
        || (tiling == vk::ImageTiling::OPTIMAL
          && props.optimal_tiling_features.contains(features))
    })
    .ok_or(PresenterError::NoSuitableDepthBufferFormat)
}

/// The preferred depth format usable as an optimally tiled depth stencil
/// attachment.
pub fn find_depth_format<F>(format_properties: F) -> PresenterResult<vk::Format>
where
  F: Fn(vk::Format) -> vk::FormatProperties,
{
  find_supported_format(
    &DEPTH_FORMAT_CANDIDATES,
    vk::ImageTiling::OPTIMAL,
    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    format_properties,
  )
}

pub fn has_stencil_component(format: vk::Format) -> bool {
  format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
  if has_stencil_component(format) {
    vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
  } else {
    vk::ImageAspectFlags::DEPTH
  }
}
