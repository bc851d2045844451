use crate::{
  error::{PresenterError, PresenterResult},
  renderer::{
    config::Config,
    vulkan::{
      capabilities::SurfaceSupport,
      debug_utils_ext::{DebugUserData, DebugUtilsAndMessenger},
      depth_buffer,
      queues::{QueueFamilyIndices, Queues},
    },
    ENABLE_VALIDATION_LAYERS, IS_DEBUG_MODE,
  },
};
use ash::{
  extensions::{
    ext::DebugUtils,
    khr::{Surface, Swapchain},
  },
  version::{DeviceV1_0, EntryV1_0, InstanceV1_0},
  vk,
  vk::{DebugUtilsMessageSeverityFlagsEXT, DebugUtilsMessageTypeFlagsEXT},
  Device, Entry, Instance,
};
use lazy_static::lazy_static;
use log::{error, info, warn};
use raw_window_handle::HasRawWindowHandle;
use std::{
  ffi::{CStr, CString},
  os::raw::c_char,
  pin::Pin,
  sync::Arc,
};

lazy_static! {
  static ref VALIDATION_LAYERS: Vec<&'static CStr> =
    vec![CStr::from_bytes_with_nul(b"VK_LAYER_KHRONOS_validation\0").unwrap()];
}

/// Everything that lives as long as the presenter: driver loader, instance,
/// surface, device and queues, the graphics command pool and the memory
/// allocator.  Created once and destroyed once, swapchain generations come and
/// go on top of it.
pub struct RenderContext {
  _entry: Entry,
  pub instance: Arc<Instance>,
  pub surface: vk::SurfaceKHR,
  pub surface_functions: Surface,
  debug_utils_and_messenger: Option<DebugUtilsAndMessenger>,
  pub physical_device: vk::PhysicalDevice,
  pub logical_device: Arc<Device>,
  pub queue_families: QueueFamilyIndices,
  pub queues: Queues,
  pub command_pool: vk::CommandPool,
  pub swapchain_functions: Arc<Swapchain>,
  pub allocator: Arc<vk_mem::Allocator>,
}
impl RenderContext {
  pub fn new<W: HasRawWindowHandle>(
    window: &W, config: &Config, debug_user_data: Option<Pin<Arc<DebugUserData>>>,
  ) -> PresenterResult<RenderContext> {
    // Load vulkan driver dynamic library and populate functions.
    let entry =
      Entry::new().map_err(|e| PresenterError::CouldNotLoadVulkan(format!("{:?}", e)))?;

    // Releases whatever was created so far if a later step fails.
    let mut teardown = TeardownGuard::new();

    let instance = Self::create_instance(&entry, window, config)?;
    {
      let instance = instance.clone();
      teardown.push("instance", move || unsafe { instance.destroy_instance(None) });
    }

    // Only setup the debug utils extension and callback messenger if we are in
    // debug mode.  Declared after the guard so an early return drops it before
    // the instance is destroyed.
    let debug_utils_and_messenger = if IS_DEBUG_MODE {
      Some(DebugUtilsAndMessenger::new(
        &entry,
        &instance,
        DebugUtilsMessageSeverityFlagsEXT::all(),
        DebugUtilsMessageTypeFlagsEXT::all(),
        debug_user_data,
      )?)
    } else {
      None
    };

    let surface_functions = Surface::new(&entry, instance.as_ref());
    let surface = unsafe { ash_window::create_surface(&entry, instance.as_ref(), window, None)? };
    {
      let surface_functions = surface_functions.clone();
      teardown.push("surface", move || unsafe {
        surface_functions.destroy_surface(surface, None)
      });
    }

    let physical_device = Self::pick_physical_device(&instance, &surface_functions, surface)?;
    let (logical_device, queue_families, queues) = Self::create_logical_device_and_queues(
      &instance,
      physical_device,
      &surface_functions,
      surface,
    )?;
    {
      let logical_device = logical_device.clone();
      teardown.push("logical device", move || unsafe { logical_device.destroy_device(None) });
    }

    let command_pool = Self::create_command_pool(&logical_device, &queue_families)?;
    {
      let logical_device = logical_device.clone();
      teardown.push("command pool", move || unsafe {
        logical_device.destroy_command_pool(command_pool, None)
      });
    }

    let swapchain_functions = Arc::new(Swapchain::new(instance.as_ref(), logical_device.as_ref()));
    let allocator = Self::create_memory_allocator(
      instance.as_ref().clone(),
      physical_device,
      logical_device.as_ref().clone(),
      config.frames_in_flight,
    )?;

    // Everything is owned by the context from here on.
    teardown.disarm();

    Ok(RenderContext {
      _entry: entry,
      instance,
      surface,
      surface_functions,
      debug_utils_and_messenger,
      physical_device,
      logical_device,
      queue_families,
      queues,
      command_pool,
      swapchain_functions,
      allocator,
    })
  }

  pub fn debug_user_data(&self) -> Option<&Pin<Arc<DebugUserData>>> {
    self
      .debug_utils_and_messenger
      .as_ref()
      .map(|d| &d.debug_user_data)
  }

  /// Fresh snapshot of what the surface supports, never cache it across a
  /// rebuild.
  pub fn query_surface_support(&self) -> PresenterResult<SurfaceSupport> {
    SurfaceSupport::query(&self.surface_functions, self.surface, self.physical_device)
  }

  pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
    unsafe {
      self
        .instance
        .get_physical_device_format_properties(self.physical_device, format)
    }
  }

  /// The preferred depth buffer format this device supports.
  pub fn find_depth_format(&self) -> PresenterResult<vk::Format> {
    depth_buffer::find_depth_format(|format| self.format_properties(format))
  }

  pub fn wait_idle(&self) -> PresenterResult<()> {
    unsafe { Ok(self.logical_device.device_wait_idle()?) }
  }

  // ================================================================================
  //  Instance Creation
  // ================================================================================
  /// Creates an instance of the Vulkan client side driver given the raw handle.
  /// Only presentable window surfaces are supported.
  fn create_instance<W: HasRawWindowHandle>(
    entry: &Entry, window: &W, config: &Config,
  ) -> PresenterResult<Arc<Instance>> {
    let application_name = CString::new(config.application_details.name)?;
    let engine_name = CString::new(config.engine_details.name)?;
    let app_info = vk::ApplicationInfo::builder()
      .application_name(application_name.as_c_str())
      .application_version(config.application_details.version.as_u32())
      .engine_name(engine_name.as_c_str())
      .engine_version(config.engine_details.version.as_u32())
      .api_version(vk::make_version(1, 0, 0))
      .build();

    let layer_names: Vec<*const c_char> =
      if ENABLE_VALIDATION_LAYERS && Self::check_validation_layer_support(entry)? {
        VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
      } else {
        if ENABLE_VALIDATION_LAYERS {
          warn!("The requested validation layers were not available, continuing without them");
        }
        Vec::new()
      };

    let extension_names = Self::get_required_extensions(window)?;
    if IS_DEBUG_MODE {
      Self::log_extensions_dialog(entry, &extension_names)?;
    }
    let extension_names: Vec<*const c_char> =
      extension_names.iter().map(|&ext| ext.as_ptr()).collect();

    // Chained in so instance creation and destruction are covered as well.
    let mut debug_create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
      .message_severity(DebugUtilsMessageSeverityFlagsEXT::all())
      .message_type(DebugUtilsMessageTypeFlagsEXT::all())
      .pfn_user_callback(Some(DebugUtilsAndMessenger::debug_callback))
      .build();

    let mut instance_create_info = vk::InstanceCreateInfo::builder()
      .application_info(&app_info)
      .enabled_layer_names(&layer_names)
      .enabled_extension_names(&extension_names);
    if IS_DEBUG_MODE {
      instance_create_info = instance_create_info.push_next(&mut debug_create_info);
    }

    let instance = unsafe { entry.create_instance(&instance_create_info, None) }
      .map_err(|e| PresenterError::CouldNotCreateInstance("Vulkan instance creation failed", e))?;
    Ok(Arc::new(instance))
  }

  /// Returns all extension needed, depending on windowing system.
  fn get_required_extensions<W: HasRawWindowHandle>(
    window: &W,
  ) -> PresenterResult<Vec<&'static CStr>> {
    // Includes VK_KHR_Surface and the platform surface extension.
    let mut extensions = ash_window::enumerate_required_extensions(window)?;

    if IS_DEBUG_MODE {
      extensions.push(DebugUtils::name());
    }

    Ok(extensions)
  }

  /// Checks if all the validation layers specified are supported on this
  /// machine.
  fn check_validation_layer_support(entry: &Entry) -> PresenterResult<bool> {
    let available_layers: Vec<CString> = entry
      .enumerate_instance_layer_properties()?
      .iter()
      .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()).to_owned() })
      .collect();

    info!(
      "Supported Layers:\n\t{:?}\nRequested Layers:\n\t{:?}",
      available_layers, *VALIDATION_LAYERS
    );

    Ok(
      VALIDATION_LAYERS
        .iter()
        .all(|&requested_layer| available_layers.iter().any(|l| l.as_c_str() == requested_layer)),
    )
  }

  /// Logs extensions that are available and what was requested.
  fn log_extensions_dialog(entry: &Entry, extension_names: &[&CStr]) -> PresenterResult<()> {
    let available_extensions: Vec<CString> = entry
      .enumerate_instance_extension_properties()?
      .iter()
      .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()).to_owned() })
      .collect();
    info!(
      "Available Instance Extensions:\n\t{:?}\nRequested Instance Extensions:\n\t{:?}\n",
      available_extensions, extension_names
    );
    Ok(())
  }

  // ================================================================================
  //  Physical Device Helper Methods
  // ================================================================================
  /// Evaluates all the available physical devices in the system and picks the
  /// best one based on a heuristic.
  fn pick_physical_device(
    instance: &Instance, surface_functions: &Surface, surface: vk::SurfaceKHR,
  ) -> PresenterResult<vk::PhysicalDevice> {
    let available_physical_devices = unsafe { instance.enumerate_physical_devices()? };

    let mut suitable_devices_ranked: Vec<_> = available_physical_devices
      .into_iter()
      .filter_map(|device| Self::rank_device(instance, device, surface_functions, surface))
      .collect();
    // Highest rank first.
    suitable_devices_ranked.sort_by(|&(_, l_rank), &(_, r_rank)| r_rank.cmp(&l_rank));

    info!(
      "Physical Devices most to least desirable:\n\t{:?}",
      suitable_devices_ranked
    );

    suitable_devices_ranked
      .first()
      .map(|&(device, _)| device)
      .ok_or(PresenterError::CouldNotSelectPhysicalDevice)
  }

  /// Rank the devices, discrete over integrated over everything else.  None
  /// means the device can't present to this surface at all.
  fn rank_device(
    instance: &Instance, physical_device: vk::PhysicalDevice, surface_functions: &Surface,
    surface: vk::SurfaceKHR,
  ) -> Option<(vk::PhysicalDevice, u32)> {
    match Self::is_device_suitable(instance, physical_device, surface_functions, surface) {
      Ok(true) => {}
      Ok(false) => return None,
      Err(e) => {
        warn!(
          "Could not evaluate physical device {:?}: {}",
          physical_device, e
        );
        return None;
      }
    }

    let device_properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let score = match device_properties.device_type {
      vk::PhysicalDeviceType::DISCRETE_GPU => 10,
      vk::PhysicalDeviceType::INTEGRATED_GPU => 5,
      _ => 0,
    };

    Some((physical_device, score))
  }

  /// A device is usable if it has graphics and presentation queue families,
  /// supports the swapchain extension and offers at least one surface format
  /// and present mode.
  fn is_device_suitable(
    instance: &Instance, physical_device: vk::PhysicalDevice, surface_functions: &Surface,
    surface: vk::SurfaceKHR,
  ) -> PresenterResult<bool> {
    let has_queues =
      Self::find_queue_families(instance, physical_device, surface_functions, surface)?
        .is_complete();
    if !has_queues || !Self::device_supports_required_extensions(instance, physical_device)? {
      return Ok(false);
    }

    Ok(SurfaceSupport::query(surface_functions, surface, physical_device)?.is_adequate())
  }

  fn device_supports_required_extensions(
    instance: &Instance, physical_device: vk::PhysicalDevice,
  ) -> PresenterResult<bool> {
    let device_extension_properties =
      unsafe { instance.enumerate_device_extension_properties(physical_device)? };

    let supports_swapchain = device_extension_properties.iter().any(|ext_props| unsafe {
      CStr::from_ptr(ext_props.extension_name.as_ptr()) == Swapchain::name()
    });

    Ok(supports_swapchain)
  }

  /// Finds the queue family indices to use for the rendering command
  /// submissions.  Picks the first graphics family, and prefers presenting
  /// from that same family so the swapchain can use exclusive sharing.
  fn find_queue_families(
    instance: &Instance, physical_device: vk::PhysicalDevice, surface_functions: &Surface,
    surface: vk::SurfaceKHR,
  ) -> PresenterResult<QueueFamilyIndices> {
    let mut queue_family_indices = QueueFamilyIndices::default();
    let queue_family_properties =
      unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    for (i, properties) in queue_family_properties.iter().enumerate() {
      let i = i as u32;
      let is_graphics = properties.queue_flags.contains(vk::QueueFlags::GRAPHICS);
      let can_present = unsafe {
        surface_functions.get_physical_device_surface_support(physical_device, i, surface)?
      };

      if is_graphics && can_present {
        queue_family_indices.graphics_queue_family = Some(i);
        queue_family_indices.presentation_queue_family = Some(i);
        return Ok(queue_family_indices);
      }
      if is_graphics && queue_family_indices.graphics_queue_family.is_none() {
        queue_family_indices.graphics_queue_family = Some(i);
      }
      if can_present && queue_family_indices.presentation_queue_family.is_none() {
        queue_family_indices.presentation_queue_family = Some(i);
      }
    }

    Ok(queue_family_indices)
  }

  // ================================================================================
  //  Logical Device Helper Methods
  // ================================================================================
  /// Creates the logical device and fetches one queue from the graphics and
  /// presentation families (possibly the same queue).
  fn create_logical_device_and_queues(
    instance: &Instance, physical_device: vk::PhysicalDevice, surface_functions: &Surface,
    surface: vk::SurfaceKHR,
  ) -> PresenterResult<(Arc<Device>, QueueFamilyIndices, Queues)> {
    let queue_family_indices =
      Self::find_queue_families(instance, physical_device, surface_functions, surface)?;
    let (graphics_queue_family, presentation_queue_family) = match (
      queue_family_indices.graphics_queue_family,
      queue_family_indices.presentation_queue_family,
    ) {
      (Some(graphics), Some(presentation)) => (graphics, presentation),
      _ => return Err(PresenterError::NoSuitableQueueFamilies),
    };
    let indices = queue_family_indices
      .as_vec()
      .ok_or(PresenterError::NoSuitableQueueFamilies)?;

    let queue_prios = [1.0];
    let queue_cis: Vec<_> = indices
      .iter()
      .map(|&queue_index| {
        vk::DeviceQueueCreateInfo::builder()
          .queue_family_index(queue_index)
          .queue_priorities(&queue_prios) // One queue per family, single control thread.
          .build()
      })
      .collect();

    let device_features = vk::PhysicalDeviceFeatures::default();
    let enabled_extension_names = [Swapchain::name().as_ptr()];
    let device_ci = vk::DeviceCreateInfo::builder()
      .queue_create_infos(&queue_cis)
      .enabled_features(&device_features)
      .enabled_extension_names(&enabled_extension_names)
      .build();

    unsafe {
      let logical_device = instance.create_device(physical_device, &device_ci, None)?;
      let graphics_queue = logical_device.get_device_queue(graphics_queue_family, 0);
      let presentation_queue = logical_device.get_device_queue(presentation_queue_family, 0);

      info!(
        "Using queue family {} for graphics and {} for presentation",
        graphics_queue_family, presentation_queue_family
      );

      let queues = Queues::new(graphics_queue, presentation_queue);
      Ok((Arc::new(logical_device), queue_family_indices, queues))
    }
  }

  /// Command buffers are individually freed on every swapchain rebuild, so the
  /// pool allows resetting single buffers.
  fn create_command_pool(
    logical_device: &Device, queue_families: &QueueFamilyIndices,
  ) -> PresenterResult<vk::CommandPool> {
    let graphics_queue_family = queue_families
      .graphics_queue_family
      .ok_or(PresenterError::NoSuitableQueueFamilies)?;
    let command_pool_ci = vk::CommandPoolCreateInfo::builder()
      .queue_family_index(graphics_queue_family)
      .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
      .build();

    Ok(unsafe { logical_device.create_command_pool(&command_pool_ci, None)? })
  }

  /// Creates a [Vulkan Memory Allocator](https://github.com/gwihlidal/vk-mem-rs)
  fn create_memory_allocator(
    instance: Instance, physical_device: vk::PhysicalDevice, logical_device: Device,
    frames_in_flight: usize,
  ) -> PresenterResult<Arc<vk_mem::Allocator>> {
    let allocator_create_info = vk_mem::AllocatorCreateInfo {
      physical_device,
      device: logical_device,
      instance,
      flags: vk_mem::AllocatorCreateFlags::default(),
      preferred_large_heap_block_size: 0,
      frame_in_use_count: frames_in_flight.saturating_sub(1) as u32,
      heap_size_limits: None,
    };

    Ok(vk_mem::Allocator::new(&allocator_create_info).map(Arc::new)?)
  }
}
impl Drop for RenderContext {
  fn drop(&mut self) {
    unsafe {
      info!("Destroying command pool...");
      self
        .logical_device
        .destroy_command_pool(self.command_pool, None);

      info!("Destroying VMA...");
      match Arc::get_mut(&mut self.allocator) {
        Some(allocator) => allocator.destroy(),
        None => error!("Memory allocator still shared at teardown, leaking it"),
      }

      info!("Destroying logical device...");
      self.logical_device.destroy_device(None);

      info!("Destroying surface...");
      self.surface_functions.destroy_surface(self.surface, None);

      self.debug_utils_and_messenger = None;

      info!("Destroying instance...");
      self.instance.destroy_instance(None);
    }
  }
}

// ================================================================================
//  Partial Construction Guard
// ================================================================================
/// Destroys what has been created so far, newest first, when dropped.  Once
/// construction has succeeded the guard is disarmed and does nothing.
struct TeardownGuard {
  steps: Vec<(&'static str, Box<dyn FnOnce()>)>,
}
impl TeardownGuard {
  fn new() -> Self {
    Self { steps: Vec::new() }
  }

  fn push<F: FnOnce() + 'static>(&mut self, name: &'static str, destroy: F) {
    self.steps.push((name, Box::new(destroy)));
  }

  fn disarm(mut self) {
    self.steps.clear();
  }
}
impl Drop for TeardownGuard {
  fn drop(&mut self) {
    while let Some((name, destroy)) = self.steps.pop() {
      warn!("Context creation failed, destroying {}...", name);
      destroy();
    }
  }
}
