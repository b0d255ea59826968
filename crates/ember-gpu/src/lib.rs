//! Vulkan resource-lifetime and pipeline-state layer for the Ember renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Memory allocation via gpu-allocator
//! - Handle-indexed buffer and texture ownership with staged uploads
//! - Command pool and queue wrappers with in-flight tracking
//! - A deduplicating pipeline and descriptor-layout builder

pub mod buffer;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod shader;
pub mod sync;
pub mod texture;

pub use buffer::{BufferManager, BufferRequest};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{
    Pipeline, PipelineConfig, PipelineLayout, PipelineManager, PipelineSetLayout, SetLayoutBinding,
};
pub use queue::{Queue, SubmitTask, Submission};
pub use shader::{
    Shader, ShaderBinding, ShaderInterface, ShaderInterfaceVariable, ShaderResources, ShaderStage,
};
pub use sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};
pub use texture::{Texture, TextureManager, TextureRequest};
