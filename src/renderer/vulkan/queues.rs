use ash::vk;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct QueueFamilyIndices {
  pub graphics_queue_family: Option<u32>,
  pub presentation_queue_family: Option<u32>,
}
impl QueueFamilyIndices {
  pub fn is_complete(&self) -> bool {
    self.graphics_queue_family.is_some() && self.presentation_queue_family.is_some()
  }

  /// Returns all the queue indices as an array for easily handing over to
  /// Vulkan, duplicates removed.  Returns None if not complete
  pub fn as_vec(&self) -> Option<Vec<u32>> {
    match (self.graphics_queue_family, self.presentation_queue_family) {
      (Some(graphics), Some(presentation)) if graphics == presentation => Some(vec![graphics]),
      (Some(graphics), Some(presentation)) => Some(vec![graphics, presentation]),
      _ => None,
    }
  }

  /// How swapchain images must be shared between the graphics and presentation
  /// queues.  Distinct families need concurrent sharing across both indices,
  /// a single family uses exclusive sharing with no index list.
  pub fn sharing_mode(&self) -> (vk::SharingMode, Vec<u32>) {
    match self.as_vec() {
      Some(indices) if indices.len() > 1 => (vk::SharingMode::CONCURRENT, indices),
      _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
  }
}

/// The graphics and presentation queues, which may be the same queue.
#[derive(Debug, Copy, Clone)]
pub struct Queues {
  pub graphics_queue: vk::Queue,
  pub presentation_queue: vk::Queue,
}
impl Queues {
  pub fn new(graphics_queue: vk::Queue, presentation_queue: vk::Queue) -> Self {
    Queues {
      graphics_queue,
      presentation_queue,
    }
  }
}
