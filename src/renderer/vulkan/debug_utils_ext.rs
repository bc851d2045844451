use crate::error::PresenterResult;
use ash::{extensions::ext::DebugUtils, vk, Entry, Instance};
use log::{debug, error, info, warn};
use static_assertions::assert_impl_all;
use std::{
  ffi::CStr,
  os::raw::c_void,
  pin::Pin,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
  },
};

/// The debug callbacks for vulkan that are enabled when in debug mode.  Called
/// by validation layers (mostly). Keeps track of errors etc for unit tests and logs all errors with [the log crate](https://www.crates.io/crate/log).
///
/// Must be dropped before the instance it was created from.
pub struct DebugUtilsAndMessenger {
  pub debug_utils: DebugUtils,
  pub messenger: vk::DebugUtilsMessengerEXT,
  pub debug_user_data: Pin<Arc<DebugUserData>>,
  /// The reference handed to the driver, reclaimed on drop.
  user_data_ptr: *const DebugUserData,
}
impl DebugUtilsAndMessenger {
  /// Creates a new Debug Extension for vulkan with the associated user data for
  /// the debug callback, if provided.
  ///
  /// This user data must be Sync, which is garunteed by Arc.
  pub fn new(
    entry: &Entry, instance: &Instance, severity_flags: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_flags: vk::DebugUtilsMessageTypeFlagsEXT,
    debug_user_data: Option<Pin<Arc<DebugUserData>>>,
  ) -> PresenterResult<Self> {
    let debug_user_data = debug_user_data.unwrap_or_else(|| Arc::pin(DebugUserData::new()));

    let user_data_ptr =
      unsafe { Arc::into_raw(Pin::into_inner_unchecked(debug_user_data.clone())) };

    let debug_utils = DebugUtils::new(entry, instance);
    let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::builder()
      .message_severity(severity_flags)
      .message_type(type_flags)
      .pfn_user_callback(Some(Self::debug_callback))
      .user_data(user_data_ptr as *mut c_void)
      .build();
    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&messenger_ci, None) };
    let messenger = match messenger {
      Ok(messenger) => messenger,
      Err(e) => {
        unsafe { drop(Arc::from_raw(user_data_ptr)) };
        return Err(e.into());
      }
    };

    Ok(DebugUtilsAndMessenger {
      debug_utils,
      messenger,
      debug_user_data,
      user_data_ptr,
    })
  }

  /// It is invariant in the vulkan presenter setup that p_user_data is of type
  /// DebugUserData, it is set up in new.  During instance creation it is null.
  pub unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT, p_user_data: *mut c_void,
  ) -> u32 {
    let user_data: Option<&DebugUserData> = if p_user_data.is_null() {
      None
    } else {
      Some(&*(p_user_data as *const DebugUserData))
    };

    if let Some(user_data) = user_data {
      user_data.record(message_severity);
    }

    let message = if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
      std::borrow::Cow::Borrowed("<no message>")
    } else {
      CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };
    match message_severity {
      vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
        error!("Validation Error! {}", message);
      }
      vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
        warn!("Validation Warning! {}", message);
      }
      vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
        debug!("Validation Info {}", message);
      }
      vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
        debug!("Validation Verbose {}", message);
      }
      _ => {}
    }

    vk::FALSE // Returning false indicates no error in callback.
  }
}

impl Drop for DebugUtilsAndMessenger {
  fn drop(&mut self) {
    info!("Destroying debug messenger...");
    unsafe {
      self
        .debug_utils
        .destroy_debug_utils_messenger(self.messenger, None);
      drop(Arc::from_raw(self.user_data_ptr));
    }
  }
}

assert_impl_all!(DebugUserData: Sync, Send);
pub struct DebugUserData {
  info_count: AtomicUsize,
  warning_count: AtomicUsize,
  error_count: AtomicUsize,
}
impl DebugUserData {
  pub fn new() -> Self {
    Self::default()
  }

  fn record(&self, message_severity: vk::DebugUtilsMessageSeverityFlagsEXT) {
    match message_severity {
      vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
        self.error_count.fetch_add(1, Ordering::SeqCst);
      }
      vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
        self.warning_count.fetch_add(1, Ordering::SeqCst);
      }
      vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
        self.info_count.fetch_add(1, Ordering::SeqCst);
      }
      _ => {}
    }
  }

  /// Returns the number of errors, warning, and info messages created by the
  /// debug layers.
  pub fn get_error_counts(&self) -> DebugUserDataCopy {
    DebugUserDataCopy {
      info_count: self.info_count.load(Ordering::SeqCst),
      warning_count: self.warning_count.load(Ordering::SeqCst),
      error_count: self.error_count.load(Ordering::SeqCst),
    }
  }
}
impl Default for DebugUserData {
  fn default() -> Self {
    Self {
      info_count: AtomicUsize::new(0),
      warning_count: AtomicUsize::new(0),
      error_count: AtomicUsize::new(0),
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DebugUserDataCopy {
  pub info_count: usize,
  pub warning_count: usize,
  pub error_count: usize,
}

#[cfg(test)]
mod tests {
  use super::{DebugUserData, DebugUserDataCopy, DebugUtilsAndMessenger};
  use ash::vk;
  use std::{ffi::CString, os::raw::c_void, ptr};

  #[test]
  fn callback_counts_by_severity_through_user_data() {
    let user_data = DebugUserData::new();
    let message = CString::new("test message").unwrap();
    let callback_data = vk::DebugUtilsMessengerCallbackDataEXT {
      p_message: message.as_ptr(),
      ..Default::default()
    };
    let user_data_ptr = &user_data as *const DebugUserData as *mut c_void;

    for severity in &[
      vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
      vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
      vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
      vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
    ] {
      let result = unsafe {
        DebugUtilsAndMessenger::debug_callback(
          *severity,
          vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
          &callback_data,
          user_data_ptr,
        )
      };
      assert_eq!(result, vk::FALSE);
    }

    assert_eq!(
      user_data.get_error_counts(),
      DebugUserDataCopy {
        info_count: 0,
        warning_count: 2,
        error_count: 1,
      }
    );
  }

  #[test]
  fn callback_without_user_data_only_logs() {
    let message = CString::new("instance creation message").unwrap();
    let callback_data = vk::DebugUtilsMessengerCallbackDataEXT {
      p_message: message.as_ptr(),
      ..Default::default()
    };

    let result = unsafe {
      DebugUtilsAndMessenger::debug_callback(
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
        &callback_data,
        ptr::null_mut(),
      )
    };

    assert_eq!(result, vk::FALSE);
  }
}
