use crate::error::PresenterResult;
use ash::{version::DeviceV1_0, vk, Device};
use log::info;
use std::sync::Arc;

/// A swapchain image and the view the framebuffer renders through.  The image
/// itself belongs to the swapchain, only the view is destroyed on drop.
pub struct ImageAndView {
  pub image: vk::Image,
  pub view: vk::ImageView,
  logical_device: Arc<Device>,
}
impl ImageAndView {
  /// Creates an image and imageview pairing, with a Drop implementation.
  /// Unsafe because logical_device must outlive it.
  pub unsafe fn new(logical_device: Arc<Device>, image: vk::Image, view: vk::ImageView) -> Self {
    Self {
      image,
      view,
      logical_device,
    }
  }
}
impl Drop for ImageAndView {
  fn drop(&mut self) {
    unsafe {
      info!("Destroying swapchain image view...");
      self.logical_device.destroy_image_view(self.view, None);
    }
  }
}

/// Creates a 2D view over the whole of a single mip, single layer image.
pub fn create_image_view(
  logical_device: &Device, image: vk::Image, format: vk::Format, aspect_mask: vk::ImageAspectFlags,
) -> PresenterResult<vk::ImageView> {
  let component_mapping = vk::ComponentMapping::builder()
    .r(vk::ComponentSwizzle::IDENTITY)
    .g(vk::ComponentSwizzle::IDENTITY)
    .b(vk::ComponentSwizzle::IDENTITY)
    .a(vk::ComponentSwizzle::IDENTITY)
    .build();
  let subresource_range = vk::ImageSubresourceRange::builder()
    .aspect_mask(aspect_mask)
    .base_mip_level(0)
    .level_count(1)
    .base_array_layer(0)
    .layer_count(1)
    .build();
  let ci = vk::ImageViewCreateInfo::builder()
    .image(image)
    .view_type(vk::ImageViewType::TYPE_2D)
    .format(format)
    .components(component_mapping)
    .subresource_range(subresource_range)
    .build();

  Ok(unsafe { logical_device.create_image_view(&ci, None)? })
}
