use ash::{version::DeviceV1_0, vk};
use log::{info, Level};
use std::{error::Error, ffi::CStr};
use vk_presenter::{
  error::{PresenterError, PresenterResult},
  renderer::{
    config::Config,
    run_frame_loop,
    vulkan::{
      pipeline_source::{DrawBindings, Geometry, RenderTargetInfo},
      render_context::RenderContext,
      render_pass::create_forward_render_pass,
    },
    PipelineSource, VulkanPresenter, WindowEvents,
  },
};
use vk_shader_macros::include_glsl;
use winit::{
  dpi::LogicalSize,
  event::{ElementState, Event, VirtualKeyCode, WindowEvent},
  event_loop::{ControlFlow, EventLoop},
  platform::desktop::EventLoopExtDesktop,
  window::WindowBuilder,
};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

const VERTEX_SHADER: &[u32] = include_glsl!("demos/shaders/triangle.vert");
const FRAGMENT_SHADER: &[u32] = include_glsl!("demos/shaders/triangle.frag");

// ================================================================================
//  Window Events
// ================================================================================
/// Pumps winit once per frame loop iteration, stopping after the main events
/// are cleared so the presenter gets to draw.
struct WinitEvents {
  event_loop: EventLoop<()>,
  running: bool,
  pending_resize: Option<(u32, u32)>,
}
impl WindowEvents for WinitEvents {
  fn should_continue(&mut self) -> bool {
    let running = &mut self.running;
    let pending_resize = &mut self.pending_resize;
    self.event_loop.run_return(|event, _, control_flow| {
      *control_flow = ControlFlow::Poll;

      match event {
        Event::MainEventsCleared => *control_flow = ControlFlow::Exit,
        Event::WindowEvent {
          event: WindowEvent::CloseRequested,
          ..
        } => {
          info!("Exiting due to close request event from window system...");
          *running = false;
          *control_flow = ControlFlow::Exit;
        }
        Event::WindowEvent {
          event: WindowEvent::KeyboardInput { input, .. },
          ..
        } => {
          if let (Some(VirtualKeyCode::Escape), ElementState::Pressed) =
            (input.virtual_keycode, input.state)
          {
            info!("Exiting due to escape press...");
            *running = false;
            *control_flow = ControlFlow::Exit;
          }
        }
        Event::WindowEvent {
          event: WindowEvent::Resized(size),
          ..
        } => *pending_resize = Some((size.width, size.height)),
        _ => (),
      }
    });

    self.running
  }

  fn take_resize(&mut self) -> Option<(u32, u32)> {
    self.pending_resize.take()
  }
}

// ================================================================================
//  Triangle Pipeline
// ================================================================================
/// Draws a single triangle whose vertices come from the vertex shader, no
/// buffers needed.
struct TrianglePipelineSource;
impl TrianglePipelineSource {
  fn create_shader_module(
    logical_device: &ash::Device, code: &[u32],
  ) -> PresenterResult<vk::ShaderModule> {
    let shader_module_ci = vk::ShaderModuleCreateInfo::builder().code(code).build();
    Ok(unsafe { logical_device.create_shader_module(&shader_module_ci, None)? })
  }
}
impl PipelineSource for TrianglePipelineSource {
  fn create(
    &mut self, context: &RenderContext, target: &RenderTargetInfo,
  ) -> PresenterResult<DrawBindings> {
    let logical_device = &context.logical_device;
    let vertex_module = Self::create_shader_module(logical_device, VERTEX_SHADER)?;
    let fragment_module = Self::create_shader_module(logical_device, FRAGMENT_SHADER)?;

    let render_pass =
      create_forward_render_pass(logical_device, target.image_format, target.depth_format)?;

    let entry_point_name = CStr::from_bytes_with_nul(b"main\0").unwrap();
    let shader_stage_cis = [
      vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vertex_module)
        .name(entry_point_name)
        .build(),
      vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(fragment_module)
        .name(entry_point_name)
        .build(),
    ];

    let vertex_input_ci = vk::PipelineVertexInputStateCreateInfo::default();
    let input_assembly_ci = vk::PipelineInputAssemblyStateCreateInfo::builder()
      .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
      .primitive_restart_enable(false)
      .build();

    // Baked for this generation's extent, rebuilt with the swapchain.
    let viewports = [vk::Viewport::builder()
      .width(target.extent.width as f32)
      .height(target.extent.height as f32)
      .min_depth(0f32)
      .max_depth(1.0f32)
      .build()];
    let scissors = [vk::Rect2D::builder()
      .offset(vk::Offset2D::default())
      .extent(target.extent)
      .build()];
    let viewport_state_ci = vk::PipelineViewportStateCreateInfo::builder()
      .viewports(&viewports)
      .scissors(&scissors)
      .build();

    let raster_state_ci = vk::PipelineRasterizationStateCreateInfo::builder()
      .polygon_mode(vk::PolygonMode::FILL)
      .line_width(1.0f32)
      .cull_mode(vk::CullModeFlags::NONE)
      .build();
    let multisample_state_ci = vk::PipelineMultisampleStateCreateInfo::builder()
      .rasterization_samples(vk::SampleCountFlags::TYPE_1)
      .min_sample_shading(1.0f32)
      .build();
    let depth_stencil_ci = vk::PipelineDepthStencilStateCreateInfo::builder()
      .depth_test_enable(true)
      .depth_write_enable(true)
      .depth_compare_op(vk::CompareOp::LESS)
      .max_depth_bounds(1.0f32)
      .build();
    let attachments = [vk::PipelineColorBlendAttachmentState::builder()
      .color_write_mask(vk::ColorComponentFlags::all())
      .blend_enable(false)
      .build()];
    let color_blend_ci = vk::PipelineColorBlendStateCreateInfo::builder()
      .logic_op(vk::LogicOp::COPY)
      .attachments(&attachments)
      .build();

    let pipeline_layout_ci = vk::PipelineLayoutCreateInfo::default();
    let pipeline_layout =
      unsafe { logical_device.create_pipeline_layout(&pipeline_layout_ci, None)? };

    let pipeline_ci = vk::GraphicsPipelineCreateInfo::builder()
      .stages(&shader_stage_cis)
      .vertex_input_state(&vertex_input_ci)
      .input_assembly_state(&input_assembly_ci)
      .viewport_state(&viewport_state_ci)
      .rasterization_state(&raster_state_ci)
      .multisample_state(&multisample_state_ci)
      .depth_stencil_state(&depth_stencil_ci)
      .color_blend_state(&color_blend_ci)
      .layout(pipeline_layout)
      .render_pass(render_pass)
      .subpass(0)
      .build();
    let pipelines = unsafe {
      logical_device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_ci], None)
    };
    // Modules are only needed until the pipeline is linked.
    unsafe {
      logical_device.destroy_shader_module(vertex_module, None);
      logical_device.destroy_shader_module(fragment_module, None);
    }
    let pipeline = pipelines.map_err(|(_, err)| err)?[0];

    let bindings = DrawBindings::builder()
      .render_pass(render_pass)
      .pipeline(pipeline)
      .pipeline_layout(pipeline_layout)
      .geometry(Geometry::NonIndexed {
        vertex_buffers: vec![],
        vertex_count: 3,
      })
      .build()
      .map_err(PresenterError::InvalidConfig)?;
    Ok(bindings)
  }

  fn destroy(&mut self, context: &RenderContext, bindings: DrawBindings) {
    unsafe {
      context
        .logical_device
        .destroy_pipeline(bindings.pipeline, None);
      context
        .logical_device
        .destroy_pipeline_layout(bindings.pipeline_layout, None);
      context
        .logical_device
        .destroy_render_pass(bindings.render_pass, None);
    }
  }
}

fn main() -> Result<(), Box<dyn Error>> {
  simple_logger::init_with_level(Level::Info)?;

  let event_loop = EventLoop::new();
  let window = WindowBuilder::new()
    .with_inner_size(LogicalSize::new(WIDTH, HEIGHT))
    .build(&event_loop)?;
  let size = window.inner_size();
  let config = Config::builder()
    .requested_width(size.width)
    .requested_height(size.height)
    .build()?;

  let mut presenter = VulkanPresenter::new(&window, TrianglePipelineSource, config)?;
  let mut events = WinitEvents {
    event_loop,
    running: true,
    pending_resize: None,
  };

  info!("Running main loop...");
  let stats = run_frame_loop(&mut presenter, &mut events)?;
  info!(
    "Presented {} frames over {} swapchain generations",
    stats.frames_presented,
    presenter.generation()
  );

  Ok(())
}
