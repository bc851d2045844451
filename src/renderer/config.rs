use crate::error::{PresenterError, PresenterResult};

/// Presenter configuration.  Sane defaults provided (mailbox presentation, two
/// frames in flight, 800x600).
#[derive(Builder, Clone, Copy)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct Config {
  /// Window width used for the extent when the surface lets the application
  /// choose.
  pub requested_width: u32,
  /// Window height used for the extent when the surface lets the application
  /// choose.
  pub requested_height: u32,
  pub application_details: ApplicationDetails<'static>,
  pub engine_details: EngineDetails<'static>,
  /// Preferred present mode, falls back to the priority scan in
  /// [choose_present_mode](vulkan/capabilities/fn.choose_present_mode.html)
  /// when unsupported.
  pub present_mode: PresentMode,
  /// How many frames the CPU may record and submit ahead of the GPU.  Each
  /// slot owns a fence and a semaphore pair.  Must be at least 1.
  pub frames_in_flight: usize,
  /// Color the render pass clears each swapchain image to.
  pub clear_color: [f32; 4],
}
impl Config {
  pub fn builder() -> ConfigBuilder {
    ConfigBuilder::default()
  }

  /// Like builder().build() but converts the builder's error to a
  /// [PresenterError](../../error/enum.PresenterError.html).
  pub fn from_builder(builder: &ConfigBuilder) -> PresenterResult<Config> {
    builder.build().map_err(PresenterError::InvalidConfig)
  }
}
impl Default for Config {
  fn default() -> Self {
    Self {
      requested_width: 800,
      requested_height: 600,
      application_details: ApplicationDetails::default(),
      engine_details: EngineDetails::default(),
      present_mode: PresentMode::default(),
      frames_in_flight: 2,
      clear_color: [0.05f32, 0.05f32, 0.1f32, 1f32],
    }
  }
}
impl ConfigBuilder {
  fn validate(&self) -> Result<(), String> {
    if let Some(0) = self.frames_in_flight {
      return Err("frames_in_flight must be at least 1".to_owned());
    }
    Ok(())
  }
}

// ================================================================================
//  Version struct
// ================================================================================
/// A simple version with major, minor and patch fields for specifying
/// information about your application.
#[derive(Copy, Clone, Debug)]
pub struct Version {
  major: u32,
  minor: u32,
  patch: u32,
}
impl Version {
  pub fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self {
      major,
      minor,
      patch,
    }
  }

  /// Get Major Minor Patch in a single u32.
  pub fn as_u32(self) -> u32 {
    ash::vk::make_version(self.major, self.minor, self.patch)
  }
}
impl Default for Version {
  fn default() -> Self {
    Self {
      major: 0,
      minor: 1,
      patch: 0,
    }
  }
}

// ================================================================================
//  ApplicationDetails Struct
// ================================================================================
/// Application Details and version for your application.
#[derive(Copy, Clone, Debug)]
pub struct ApplicationDetails<'a> {
  pub name: &'a str,
  pub version: Version,
}
impl<'a> ApplicationDetails<'a> {
  pub fn new(name: &'a str, version: Version) -> Self {
    Self { name, version }
  }
}
impl<'a> Default for ApplicationDetails<'a> {
  fn default() -> Self {
    Self {
      name: "Nameless Application",
      version: Version::new(0, 1, 0),
    }
  }
}

// ================================================================================
//  EngineDetails Struct
// ================================================================================
/// Application Details and version for your engine.
#[derive(Copy, Clone, Debug)]
pub struct EngineDetails<'a> {
  pub name: &'a str,
  pub version: Version,
}
impl<'a> EngineDetails<'a> {
  pub fn new(name: &'a str, version: Version) -> Self {
    Self { name, version }
  }
}
impl<'a> Default for EngineDetails<'a> {
  fn default() -> Self {
    Self {
      name: "Nameless Engine",
      version: Version::new(0, 1, 0),
    }
  }
}

/// Determines Present mode, default is Mailbox if possible to allow for
/// framerate equal to screen refresh while continuing to draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentMode {
  Immediate,
  Mailbox,
  Fifo,
}
impl Default for PresentMode {
  fn default() -> PresentMode {
    PresentMode::Mailbox
  }
}
