//! The Vulkan backend, built on [ash](https://crates.io/crates/ash).
pub mod capabilities;
pub mod command_buffers;
pub mod debug_utils_ext;
pub mod depth_buffer;
pub mod draw_synchronization;
pub mod frame_backend;
pub mod images;
pub mod pipeline_source;
pub mod queues;
pub mod render_context;
pub mod render_pass;
pub mod swap_chain;
pub mod vulkan_presenter;
