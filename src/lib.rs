//! Swapchain lifecycle and frame presentation for Vulkan renderers.
//!
//! This crate owns the part of a renderer that talks to the window surface:
//! negotiating presentation capabilities, creating and tearing down the chain
//! of presentable images along with their views, depth buffer, framebuffers and
//! command buffers, and driving the acquire -> submit -> present protocol with
//! one fence per frame in flight.  Pipelines, meshes and shaders are supplied
//! by the application through a
//! [PipelineSource](renderer/vulkan/pipeline_source/trait.PipelineSource.html).
//!
//! See the renderer module for how to use it.
#[macro_use]
extern crate derive_builder;

pub mod error;
pub mod renderer;
