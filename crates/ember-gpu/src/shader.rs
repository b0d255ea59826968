//! Shader modules and their pre-computed reflection data.
//!
//! Reflection happens in an external shader-compilation step; this crate
//! consumes the result as plain data (interface variables, descriptor
//! bindings, push-constant block) alongside the SPIR-V module.

use crate::error::{GpuError, Result};
use ash::vk;

/// Shader stage a module was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// The corresponding Vulkan stage bit.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// One interface variable (input or output location).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderInterfaceVariable {
    /// Interface location.
    pub location: u32,
    /// Component count of the variable (2, 3, or 4 for vecN).
    pub vecsize: u32,
}

/// Stage interface: input and output locations in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ShaderInterface {
    pub inputs: Vec<ShaderInterfaceVariable>,
    pub outputs: Vec<ShaderInterfaceVariable>,
}

/// One descriptor binding a stage accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderBinding {
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// Descriptor type of the slot.
    pub descriptor_type: vk::DescriptorType,
    /// Array size of the slot.
    pub count: u32,
    /// Stages that access the slot.
    pub stages: vk::ShaderStageFlags,
}

/// Pre-computed reflection result for one shader module.
#[derive(Debug, Clone, Default)]
pub struct ShaderResources {
    /// Stage interface locations.
    pub interface: ShaderInterface,
    /// Descriptor bindings.
    pub bindings: Vec<ShaderBinding>,
    /// Push-constant block, when the stage declares one.
    pub push_constants: Option<vk::PushConstantRange>,
}

/// A compiled shader module plus its reflection data.
pub struct Shader {
    /// Stage the module was compiled for.
    pub stage: ShaderStage,
    /// The native module.
    pub module: vk::ShaderModule,
    /// Pre-computed reflection result.
    pub resources: ShaderResources,
}

impl Shader {
    /// Create a module from SPIR-V words and its reflection result.
    ///
    /// # Safety
    /// The device must be valid and the words must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        stage: ShaderStage,
        spirv: &[u32],
        resources: ShaderResources,
    ) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let module = device
            .create_shader_module(&create_info, None)
            .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;

        Ok(Self {
            stage,
            module,
            resources,
        })
    }

    /// Destroy the native module.
    ///
    /// # Safety
    /// The device must be valid and no pipeline using the module may be
    /// under construction.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_shader_module(self.module, None);
    }
}
