use crate::error::PresenterResult;
use ash::{version::DeviceV1_0, vk, Device};

/// Creates a forward render pass with one subpass drawing to a presentable
/// color attachment (index 0) and a depth attachment (index 1).  A pipeline
/// source can use this for the render pass it hands back, it matches the
/// framebuffers the swapchain builds.
pub fn create_forward_render_pass(
  logical_device: &Device, color_format: vk::Format, depth_format: vk::Format,
) -> PresenterResult<vk::RenderPass> {
  let color_attachment = vk::AttachmentDescription::builder()
    .format(color_format)
    .samples(vk::SampleCountFlags::TYPE_1)
    .load_op(vk::AttachmentLoadOp::CLEAR) // Every frame redraws the whole image.
    .store_op(vk::AttachmentStoreOp::STORE)
    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
    .initial_layout(vk::ImageLayout::UNDEFINED)
    .final_layout(vk::ImageLayout::PRESENT_SRC_KHR) // Handed straight to the presentation engine.
    .build();
  let color_attachment_refs = [vk::AttachmentReference::builder()
    .attachment(0u32)
    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
    .build()];

  let depth_attachment = vk::AttachmentDescription::builder()
    .format(depth_format)
    .samples(vk::SampleCountFlags::TYPE_1)
    .load_op(vk::AttachmentLoadOp::CLEAR)
    .store_op(vk::AttachmentStoreOp::DONT_CARE) // Not read after the pass.
    .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
    .initial_layout(vk::ImageLayout::UNDEFINED)
    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    .build();
  let depth_attachment_ref = vk::AttachmentReference::builder()
    .attachment(1u32)
    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    .build();

  let attachments = [color_attachment, depth_attachment];

  let subpass_descriptions = [vk::SubpassDescription::builder()
    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
    .color_attachments(&color_attachment_refs) // layout(location = 0) in the fragment shader.
    .depth_stencil_attachment(&depth_attachment_ref)
    .build()];

  // The image available semaphore is waited at color attachment output, so
  // the layout transition has to wait for that stage as well.
  let dependencies = [vk::SubpassDependency::builder()
    .src_subpass(vk::SUBPASS_EXTERNAL)
    .dst_subpass(0u32)
    .src_stage_mask(
      vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
    )
    .src_access_mask(vk::AccessFlags::empty())
    .dst_stage_mask(
      vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
    )
    .dst_access_mask(
      vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
    )
    .build()];

  let render_pass_ci = vk::RenderPassCreateInfo::builder()
    .attachments(&attachments)
    .subpasses(&subpass_descriptions)
    .dependencies(&dependencies)
    .build();

  Ok(unsafe { logical_device.create_render_pass(&render_pass_ci, None)? })
}
