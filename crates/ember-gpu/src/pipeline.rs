//! Pipeline creation with descriptor-layout deduplication.
//!
//! [`PipelineManager`] memoizes built pipelines by shader-set identity and
//! shares pipeline layouts across unrelated shader sets whose binding
//! structure is compatible. Compatibility is purely structural (set index,
//! binding index, descriptor type, count, stage mask) and uses a prefix
//! rule: bindings beyond the shorter list's length are ignored. All caches
//! are linear scans; fine at the shader counts this renderer sees.

use crate::error::{GpuError, Result};
use crate::shader::{Shader, ShaderBinding, ShaderStage};
use ash::vk;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One slot of a descriptor-set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLayoutBinding {
    /// Binding index within the set.
    pub binding: u32,
    /// Descriptor type of the slot.
    pub descriptor_type: vk::DescriptorType,
    /// Array size of the slot.
    pub count: u32,
    /// Stages accessing the slot.
    pub stages: vk::ShaderStageFlags,
}

impl SetLayoutBinding {
    fn as_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
    }
}

impl From<ShaderBinding> for SetLayoutBinding {
    fn from(binding: ShaderBinding) -> Self {
        Self {
            binding: binding.binding,
            descriptor_type: binding.descriptor_type,
            count: binding.count,
            stages: binding.stages,
        }
    }
}

/// A descriptor-set layout and the bindings it was built from.
///
/// The bindings are recorded so later compatibility scans can resolve any
/// layout this manager produced.
pub struct PipelineSetLayout {
    pub layout: vk::DescriptorSetLayout,
    pub bindings: Vec<SetLayoutBinding>,
}

/// A pipeline layout and the ordered set layouts behind it.
pub struct PipelineLayout {
    pub layout: vk::PipelineLayout,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
}

/// A built pipeline, its layout, and the shader set that produced it.
#[derive(Clone)]
pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub shaders: Arc<Vec<Shader>>,
}

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct PipelineConfig {
    /// The shader set; pipelines are memoized by this `Arc`'s identity.
    pub shaders: Arc<Vec<Shader>>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
}

impl PipelineConfig {
    /// A configuration with renderer defaults for everything but the shaders.
    pub fn new(shaders: Arc<Vec<Shader>>) -> Self {
        Self {
            shaders,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_bindings: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            color_formats: vec![vk::Format::B8G8R8A8_SRGB],
            depth_format: Some(vk::Format::D32_SFLOAT),
        }
    }
}

/// Builds and memoizes pipelines, layouts, and descriptor-set layouts.
pub struct PipelineManager {
    device: Arc<ash::Device>,
    configs: Vec<PipelineConfig>,
    pipelines: Vec<Pipeline>,
    set_layouts: Vec<PipelineSetLayout>,
    layouts: Vec<PipelineLayout>,
}

impl PipelineManager {
    /// Create an empty manager.
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            configs: Vec::new(),
            pipelines: Vec::new(),
            set_layouts: Vec::new(),
            layouts: Vec::new(),
        }
    }

    /// Return the pipeline for this configuration, building it on a miss.
    ///
    /// Configurations are matched by shader-set identity: the same
    /// `Arc<Vec<Shader>>` yields the same pipeline, with no deeper
    /// structural comparison. Incompatible descriptor bindings across the
    /// set's stages are a hard failure.
    pub fn get_or_create_pipeline(&mut self, config: &PipelineConfig) -> Result<Pipeline> {
        for (i, cached) in self.configs.iter().enumerate() {
            if Arc::ptr_eq(&cached.shaders, &config.shaders) {
                return Ok(self.pipelines[i].clone());
            }
        }

        let pipeline = self.build_pipeline(config)?;
        self.configs.push(config.clone());
        self.pipelines.push(pipeline.clone());
        Ok(pipeline)
    }

    /// Look up the layout record behind a native pipeline layout.
    ///
    /// `None` when the layout was not produced by this manager.
    pub fn get_layout(&self, layout: vk::PipelineLayout) -> Option<&PipelineLayout> {
        self.layouts.iter().find(|pl| pl.layout == layout)
    }

    fn build_pipeline(&mut self, config: &PipelineConfig) -> Result<Pipeline> {
        let layout = self.find_or_build_pipeline_layout(config)?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = config
            .shaders
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage.to_vk())
                    .module(s.module)
                    .name(c"main")
            })
            .collect();

        let vertex_attributes = vertex_attributes(&config.shaders);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are expected to be dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<_> = config
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&config.dynamic_states);

        // Dynamic rendering (Vulkan 1.3)
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&config.color_formats);

        if let Some(depth_format) = config.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?
        };

        Ok(Pipeline {
            pipeline: pipelines[0],
            layout,
            shaders: Arc::clone(&config.shaders),
        })
    }

    /// Resolve a compatible existing pipeline layout or build a new one.
    ///
    /// A previous layout is reused whole when every set the shaders require
    /// finds a compatible set at the same index. Individually compatible
    /// per-set layouts found along the way are reused inside a newly built
    /// layout; set indices the shaders skip are padded with empty layouts.
    fn find_or_build_pipeline_layout(&mut self, config: &PipelineConfig) -> Result<vk::PipelineLayout> {
        let merged = merge_shader_bindings(&config.shaders)?;
        let sets = group_by_set(&merged);

        let mut matching: BTreeMap<u32, vk::DescriptorSetLayout> = BTreeMap::new();
        for pl in &self.layouts {
            let mut compatible = true;
            for (&set_idx, bindings) in &sets {
                let Some(&dsl) = pl.set_layouts.get(set_idx as usize) else {
                    compatible = false;
                    continue;
                };
                if dsl == vk::DescriptorSetLayout::null() {
                    compatible = false;
                    continue;
                }
                let Some(existing) = self.set_layout_bindings(dsl) else {
                    compatible = false;
                    continue;
                };
                if !sets_compatible(existing, bindings) {
                    compatible = false;
                    continue;
                }
                matching.insert(set_idx, dsl);
            }

            if compatible {
                return Ok(pl.layout);
            }
        }

        let push_constant_ranges = push_constant_ranges(&config.shaders);
        let max_set = sets.keys().next_back().copied().unwrap_or(0);
        let mut set_layout_handles =
            vec![vk::DescriptorSetLayout::null(); (max_set + 1) as usize];

        for (&set_idx, bindings) in &sets {
            if let Some(&dsl) = matching.get(&set_idx) {
                set_layout_handles[set_idx as usize] = dsl;
                continue;
            }
            set_layout_handles[set_idx as usize] = self.create_set_layout(bindings)?;
        }
        for slot in &mut set_layout_handles {
            if *slot == vk::DescriptorSetLayout::null() {
                *slot = self.create_set_layout(&[])?;
            }
        }

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layout_handles)
            .push_constant_ranges(&push_constant_ranges);

        let layout = unsafe {
            self.device
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| GpuError::PipelineCreation(e.to_string()))?
        };

        self.layouts.push(PipelineLayout {
            layout,
            set_layouts: set_layout_handles,
        });
        Ok(layout)
    }

    /// Create a descriptor-set layout and record its bindings.
    fn create_set_layout(
        &mut self,
        bindings: &[SetLayoutBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> =
            bindings.iter().map(|b| b.as_vk()).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None)? };

        self.set_layouts.push(PipelineSetLayout {
            layout,
            bindings: bindings.to_vec(),
        });
        Ok(layout)
    }

    /// The bindings a manager-produced set layout was built from.
    fn set_layout_bindings(&self, layout: vk::DescriptorSetLayout) -> Option<&[SetLayoutBinding]> {
        self.set_layouts
            .iter()
            .find(|sl| sl.layout == layout)
            .map(|sl| sl.bindings.as_slice())
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        unsafe {
            for pipeline in &self.pipelines {
                self.device.destroy_pipeline(pipeline.pipeline, None);
            }
            for layout in &self.layouts {
                self.device.destroy_pipeline_layout(layout.layout, None);
            }
            for set_layout in &self.set_layouts {
                self.device
                    .destroy_descriptor_set_layout(set_layout.layout, None);
            }
        }
    }
}

/// Merge every stage's descriptor bindings into one list keyed by
/// (set, binding).
///
/// A collision between stages is accepted only when descriptor type and
/// count match exactly; the stage masks OR together. A mismatch rejects the
/// whole shader set.
fn merge_shader_bindings(shaders: &[Shader]) -> Result<Vec<ShaderBinding>> {
    let mut merged: Vec<ShaderBinding> = Vec::new();
    for shader in shaders {
        for &binding in &shader.resources.bindings {
            if let Some(existing) = merged
                .iter_mut()
                .find(|m| m.set == binding.set && m.binding == binding.binding)
            {
                if existing.descriptor_type != binding.descriptor_type
                    || existing.count != binding.count
                {
                    return Err(GpuError::IncompatibleShaderBindings {
                        set: binding.set,
                        binding: binding.binding,
                    });
                }
                existing.stages |= binding.stages;
                continue;
            }
            merged.push(binding);
        }
    }

    merged.sort_by_key(|b| (b.set, b.binding));
    Ok(merged)
}

/// Group merged bindings per set index, each set sorted by binding index.
fn group_by_set(merged: &[ShaderBinding]) -> BTreeMap<u32, Vec<SetLayoutBinding>> {
    let mut sets: BTreeMap<u32, Vec<SetLayoutBinding>> = BTreeMap::new();
    for &binding in merged {
        sets.entry(binding.set)
            .or_default()
            .push(SetLayoutBinding::from(binding));
    }
    for bindings in sets.values_mut() {
        bindings.sort_by_key(|b| b.binding);
    }
    sets
}

/// Prefix compatibility: every index present in both lists must match on
/// binding, type, count, and stage mask; trailing extras are ignored.
fn sets_compatible(a: &[SetLayoutBinding], b: &[SetLayoutBinding]) -> bool {
    a.iter().zip(b).all(|(a, b)| a == b)
}

/// The push-constant ranges for a shader set.
///
/// The first stage with a declared block wins; additional stages' blocks are
/// not merged.
fn push_constant_ranges(shaders: &[Shader]) -> Vec<vk::PushConstantRange> {
    let mut declared = shaders
        .iter()
        .filter_map(|s| s.resources.push_constants.map(|range| (s.stage, range)));
    let Some((_, first)) = declared.next() else {
        return Vec::new();
    };
    for (stage, _) in declared {
        tracing::debug!(
            "Push constants of {stage:?} stage are not merged; first declaring stage wins"
        );
    }
    vec![first]
}

/// Derive vertex attributes from the vertex stage's interface inputs.
///
/// Attributes pack tightly into binding 0 in declaration order. Inputs with
/// a component count other than 2/3/4 are skipped with a warning.
fn vertex_attributes(shaders: &[Shader]) -> Vec<vk::VertexInputAttributeDescription> {
    let mut attributes = Vec::new();
    let mut offset = 0u32;

    for shader in shaders {
        if shader.stage != ShaderStage::Vertex {
            continue;
        }
        for input in &shader.resources.interface.inputs {
            let (format, size) = match input.vecsize {
                2 => (vk::Format::R32G32_SFLOAT, 8),
                3 => (vk::Format::R32G32B32_SFLOAT, 12),
                4 => (vk::Format::R32G32B32A32_SFLOAT, 16),
                other => {
                    tracing::warn!(
                        "Unrecognized vertex input of vecsize {other} at location {}",
                        input.location
                    );
                    continue;
                }
            };
            attributes.push(vk::VertexInputAttributeDescription {
                location: input.location,
                binding: 0,
                format,
                offset,
            });
            offset += size;
        }
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{ShaderInterface, ShaderInterfaceVariable, ShaderResources};

    fn shader(stage: ShaderStage, resources: ShaderResources) -> Shader {
        Shader {
            stage,
            module: vk::ShaderModule::null(),
            resources,
        }
    }

    fn binding(
        set: u32,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> ShaderBinding {
        ShaderBinding {
            set,
            binding,
            descriptor_type,
            count,
            stages,
        }
    }

    #[test]
    fn merge_ors_stages_on_matching_collision() {
        let shaders = vec![
            shader(
                ShaderStage::Vertex,
                ShaderResources {
                    bindings: vec![binding(
                        0,
                        0,
                        vk::DescriptorType::UNIFORM_BUFFER,
                        1,
                        vk::ShaderStageFlags::VERTEX,
                    )],
                    ..Default::default()
                },
            ),
            shader(
                ShaderStage::Fragment,
                ShaderResources {
                    bindings: vec![binding(
                        0,
                        0,
                        vk::DescriptorType::UNIFORM_BUFFER,
                        1,
                        vk::ShaderStageFlags::FRAGMENT,
                    )],
                    ..Default::default()
                },
            ),
        ];

        let merged = merge_shader_bindings(&shaders).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].stages,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn merge_rejects_type_mismatch() {
        let shaders = vec![
            shader(
                ShaderStage::Vertex,
                ShaderResources {
                    bindings: vec![binding(
                        0,
                        1,
                        vk::DescriptorType::UNIFORM_BUFFER,
                        1,
                        vk::ShaderStageFlags::VERTEX,
                    )],
                    ..Default::default()
                },
            ),
            shader(
                ShaderStage::Fragment,
                ShaderResources {
                    bindings: vec![binding(
                        0,
                        1,
                        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        1,
                        vk::ShaderStageFlags::FRAGMENT,
                    )],
                    ..Default::default()
                },
            ),
        ];

        let err = merge_shader_bindings(&shaders).unwrap_err();
        assert!(matches!(
            err,
            GpuError::IncompatibleShaderBindings { set: 0, binding: 1 }
        ));
    }

    #[test]
    fn merge_rejects_count_mismatch() {
        let shaders = vec![
            shader(
                ShaderStage::Vertex,
                ShaderResources {
                    bindings: vec![binding(
                        1,
                        2,
                        vk::DescriptorType::STORAGE_BUFFER,
                        1,
                        vk::ShaderStageFlags::VERTEX,
                    )],
                    ..Default::default()
                },
            ),
            shader(
                ShaderStage::Fragment,
                ShaderResources {
                    bindings: vec![binding(
                        1,
                        2,
                        vk::DescriptorType::STORAGE_BUFFER,
                        4,
                        vk::ShaderStageFlags::FRAGMENT,
                    )],
                    ..Default::default()
                },
            ),
        ];

        assert!(merge_shader_bindings(&shaders).is_err());
    }

    #[test]
    fn merge_sorts_by_set_then_binding() {
        let shaders = vec![shader(
            ShaderStage::Vertex,
            ShaderResources {
                bindings: vec![
                    binding(1, 0, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX),
                    binding(0, 1, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX),
                    binding(0, 0, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX),
                ],
                ..Default::default()
            },
        )];

        let merged = merge_shader_bindings(&shaders).unwrap();
        let order: Vec<(u32, u32)> = merged.iter().map(|b| (b.set, b.binding)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn prefix_compatibility() {
        let a = [SetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages: vk::ShaderStageFlags::VERTEX,
        }];
        let longer = [
            a[0],
            SetLayoutBinding {
                binding: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count: 1,
                stages: vk::ShaderStageFlags::FRAGMENT,
            },
        ];
        let mismatched = [SetLayoutBinding {
            stages: vk::ShaderStageFlags::FRAGMENT,
            ..a[0]
        }];

        // Extra bindings beyond the shorter list are ignored.
        assert!(sets_compatible(&a, &longer));
        assert!(sets_compatible(&longer, &a));
        assert!(sets_compatible(&a, &a));
        assert!(sets_compatible(&[], &a));

        // Any difference inside the shared prefix is incompatible.
        assert!(!sets_compatible(&a, &mismatched));
    }

    #[test]
    fn first_declared_push_constants_win() {
        let vertex_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: 64,
        };
        let fragment_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: 16,
        };

        let shaders = vec![
            shader(
                ShaderStage::Vertex,
                ShaderResources {
                    push_constants: Some(vertex_range),
                    ..Default::default()
                },
            ),
            shader(
                ShaderStage::Fragment,
                ShaderResources {
                    push_constants: Some(fragment_range),
                    ..Default::default()
                },
            ),
        ];

        let ranges = push_constant_ranges(&shaders);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(ranges[0].size, 64);

        assert!(push_constant_ranges(&[]).is_empty());
    }

    #[test]
    fn vertex_attributes_pack_tightly() {
        let shaders = vec![shader(
            ShaderStage::Vertex,
            ShaderResources {
                interface: ShaderInterface {
                    inputs: vec![
                        ShaderInterfaceVariable { location: 0, vecsize: 3 },
                        ShaderInterfaceVariable { location: 1, vecsize: 2 },
                        ShaderInterfaceVariable { location: 2, vecsize: 4 },
                    ],
                    outputs: Vec::new(),
                },
                ..Default::default()
            },
        )];

        let attributes = vertex_attributes(&shaders);
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attributes[2].offset, 20);
    }

    #[test]
    fn vertex_attributes_skip_unrecognized_vecsize() {
        let shaders = vec![shader(
            ShaderStage::Vertex,
            ShaderResources {
                interface: ShaderInterface {
                    inputs: vec![
                        ShaderInterfaceVariable { location: 0, vecsize: 3 },
                        ShaderInterfaceVariable { location: 1, vecsize: 7 },
                        ShaderInterfaceVariable { location: 2, vecsize: 2 },
                    ],
                    outputs: Vec::new(),
                },
                ..Default::default()
            },
        )];

        let attributes = vertex_attributes(&shaders);
        assert_eq!(attributes.len(), 2);
        // The skipped input contributes no offset.
        assert_eq!(attributes[1].offset, 12);
    }

    #[test]
    fn grouping_orders_bindings_within_sets() {
        let merged = vec![
            binding(0, 2, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX),
            binding(0, 0, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX),
            binding(2, 0, vk::DescriptorType::STORAGE_BUFFER, 1, vk::ShaderStageFlags::FRAGMENT),
        ];

        let sets = group_by_set(&merged);
        assert_eq!(sets.len(), 2);
        let set0: Vec<u32> = sets[&0].iter().map(|b| b.binding).collect();
        assert_eq!(set0, vec![0, 2]);
        assert!(sets.contains_key(&2));
    }
}
