//! Handle-indexed texture ownership and file loading.
//!
//! [`TextureManager`] owns every GPU image for a device, loads pixel data
//! from files through the buffer manager's staging path, performs the layout
//! transitions needed for transfer-then-sample usage, and deduplicates loads
//! by canonical file path. The manager is the sole writer of a texture's
//! `current_layout`.

use crate::buffer::{BufferManager, BufferRequest};
use crate::command;
use crate::context::GpuContext;
use crate::error::Result;
use crate::memory::GpuImage;
use crate::queue::{Queue, Submission};
use ash::vk;
use ember_core::{Handle, HandleGenerator};
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static TEXTURE_IDS: HandleGenerator<Texture> = HandleGenerator::new();

/// A GPU image with the bookkeeping the manager tracks for it.
pub struct Texture {
    /// The native image and its allocation.
    pub image: GpuImage,
    /// Layout the image was last transitioned to.
    pub current_layout: vk::ImageLayout,
    /// Queue families owning the image.
    pub owning_queue_families: Vec<u32>,
}

/// Parameters for creating a texture.
#[derive(Clone)]
pub struct TextureRequest {
    /// Pixel format of the image.
    pub format: vk::Format,
    /// Image usage flags; file loads require `TRANSFER_DST`.
    pub usage: vk::ImageUsageFlags,
    /// Layout to transition to after upload.
    pub layout: vk::ImageLayout,
    /// Owning queue families; empty defaults to the load queue's family.
    pub queue_families: Vec<u32>,
    /// Requested mip level count. Only a single level is uploaded; more is
    /// accepted but warned about (mip generation is unimplemented).
    pub mip_levels: u32,
    /// Allocation debug name.
    pub name: String,
}

impl TextureRequest {
    /// A single-mip request with no explicit owning families.
    pub fn new(format: vk::Format, usage: vk::ImageUsageFlags, layout: vk::ImageLayout) -> Self {
        Self {
            format,
            usage,
            layout,
            queue_families: Vec::new(),
            mip_levels: 1,
            name: String::new(),
        }
    }
}

/// Channel count for the supported pixel formats.
///
/// The whitelist is deliberately small; anything else fails fast with a
/// reported reason instead of producing an image the decoder can't fill.
fn format_channels(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R8G8B8A8_SRGB => Some(4),
        _ => None,
    }
}

/// Owns all GPU textures for a device behind opaque handles.
pub struct TextureManager {
    context: Arc<GpuContext>,
    textures: HashMap<Handle<Texture>, Texture>,
    by_path: HashMap<PathBuf, Handle<Texture>>,
}

impl TextureManager {
    /// Create an empty manager.
    pub fn new(context: Arc<GpuContext>) -> Self {
        Self {
            context,
            textures: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Load a texture from an image file, staging through `buffers`.
    ///
    /// A second load of the same path returns the existing handle without
    /// re-reading the file. Every failure rolls back whatever native
    /// resources were created before returning [`Handle::NONE`].
    pub fn load_from_file(
        &mut self,
        buffers: &mut BufferManager,
        queue: &Queue,
        cmd: vk::CommandBuffer,
        path: &Path,
        request: &TextureRequest,
    ) -> Handle<Texture> {
        if !path.is_file() {
            tracing::warn!("Texture path {:?} is not a regular file", path);
            return Handle::NONE;
        }

        if !request.usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
            tracing::warn!("Texture request needs TRANSFER_DST usage to be loadable");
            return Handle::NONE;
        }

        let Ok(canonical) = std::fs::canonicalize(path) else {
            tracing::warn!("Texture path {:?} could not be canonicalized", path);
            return Handle::NONE;
        };
        if let Some(&handle) = self.by_path.get(&canonical) {
            // Request differences are not compared; first load wins.
            return handle;
        }

        let families = if request.queue_families.is_empty() {
            vec![queue.family_index()]
        } else {
            if !request.queue_families.contains(&queue.family_index()) {
                tracing::warn!(
                    "Queue family {} is not in the owning family set {:?}",
                    queue.family_index(),
                    request.queue_families
                );
                return Handle::NONE;
            }
            request.queue_families.clone()
        };

        if format_channels(request.format).is_none() {
            tracing::warn!("Texture format {:?} is unsupported", request.format);
            return Handle::NONE;
        }

        let decoded = match image::open(path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(e) => {
                tracing::warn!("Image {:?} could not be decoded: {e}", path);
                return Handle::NONE;
            }
        };
        let (width, height) = decoded.dimensions();
        let pixels = decoded.into_raw();

        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };
        let mut image = match self.create_image(request, extent, &families) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Texture image creation failed: {e}");
                return Handle::NONE;
            }
        };

        let staging_request = BufferRequest {
            capacity: pixels.len() as u64,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
            queue_families: vec![queue.family_index()],
            name: "texture staging".to_string(),
        };
        let staging = buffers.allocate(&staging_request, Some(&pixels));
        if staging.is_null() {
            self.destroy_image(&mut image);
            return Handle::NONE;
        }
        let Some(staging_raw) = buffers.get(staging) else {
            self.destroy_image(&mut image);
            return Handle::NONE;
        };

        if let Err(e) = self.record_upload(cmd, staging_raw, image.image, extent, request.layout) {
            tracing::warn!("Recording texture upload failed: {e}");
            buffers.free(staging);
            self.destroy_image(&mut image);
            return Handle::NONE;
        }

        let (accepted, task) = queue.submit_async(vec![Submission::commands(vec![cmd])], None);
        if !accepted {
            buffers.free(staging);
            self.destroy_image(&mut image);
            return Handle::NONE;
        }
        task.wait();
        buffers.free(staging);

        if request.mip_levels > 1 {
            tracing::warn!("Mip generation is not implemented; only level 0 was uploaded");
        }

        let handle = TEXTURE_IDS.generate();
        self.textures.insert(
            handle,
            Texture {
                image,
                current_layout: request.layout,
                owning_queue_families: families,
            },
        );
        self.by_path.insert(canonical, handle);
        handle
    }

    /// Allocate an image without uploading pixels. Its layout stays
    /// `UNDEFINED` until a caller-recorded transition.
    pub fn allocate(&mut self, request: &TextureRequest, extent: vk::Extent3D) -> Handle<Texture> {
        let image = match self.create_image(request, extent, &request.queue_families) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Texture image creation failed: {e}");
                return Handle::NONE;
            }
        };

        let handle = TEXTURE_IDS.generate();
        self.textures.insert(
            handle,
            Texture {
                image,
                current_layout: vk::ImageLayout::UNDEFINED,
                owning_queue_families: request.queue_families.clone(),
            },
        );
        handle
    }

    /// Create an image view over a texture.
    ///
    /// The `image` field of `view_info` is filled in from the handle.
    pub fn make_view(
        &self,
        handle: Handle<Texture>,
        mut view_info: vk::ImageViewCreateInfo<'_>,
    ) -> Option<vk::ImageView> {
        let texture = self.textures.get(&handle)?;
        view_info.image = texture.image.image;

        match unsafe { self.context.device().create_image_view(&view_info, None) } {
            Ok(view) => Some(view),
            Err(e) => {
                tracing::warn!("Could not create image view: {e}");
                None
            }
        }
    }

    /// The native image behind `handle`.
    pub fn get(&self, handle: Handle<Texture>) -> Option<vk::Image> {
        self.textures.get(&handle).map(|t| t.image.image)
    }

    /// Layout the texture was last transitioned to.
    pub fn current_layout(&self, handle: Handle<Texture>) -> Option<vk::ImageLayout> {
        self.textures.get(&handle).map(|t| t.current_layout)
    }

    /// Destroy the native image and forget the handle.
    pub fn free(&mut self, handle: Handle<Texture>) {
        let Some(mut texture) = self.textures.remove(&handle) else {
            tracing::warn!(handle = handle.raw(), "free: unknown texture handle");
            return;
        };
        self.by_path.retain(|_, &mut h| h != handle);
        self.destroy_image(&mut texture.image);
    }

    fn create_image(
        &self,
        request: &TextureRequest,
        extent: vk::Extent3D,
        families: &[u32],
    ) -> Result<GpuImage> {
        let mut image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(request.format)
            .extent(extent)
            .mip_levels(request.mip_levels.max(1))
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(request.usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        image_info = if families.len() > 1 {
            image_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(families)
        } else {
            image_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        self.context
            .allocator()
            .lock()
            .create_image(&image_info, MemoryLocation::GpuOnly, &request.name)
    }

    fn destroy_image(&self, image: &mut GpuImage) {
        if let Err(e) = self.context.allocator().lock().free_image(image) {
            tracing::warn!("Releasing image allocation failed: {e}");
        }
    }

    fn record_upload(
        &self,
        cmd: vk::CommandBuffer,
        staging: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent3D,
        final_layout: vk::ImageLayout,
    ) -> Result<()> {
        let device = self.context.device();
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        unsafe {
            command::begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            layout_transition(
                device,
                cmd,
                image,
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
                range,
            );

            let copy = vk::BufferImageCopy {
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_extent: extent,
                ..Default::default()
            };
            device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );

            layout_transition(
                device,
                cmd,
                image,
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, final_layout),
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
                (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
                range,
            );

            command::end_command_buffer(device, cmd)?;
        }
        Ok(())
    }
}

impl Drop for TextureManager {
    fn drop(&mut self) {
        let mut allocator = self.context.allocator().lock();
        for (_, mut texture) in self.textures.drain() {
            if let Err(e) = allocator.free_image(&mut texture.image) {
                tracing::warn!("Releasing image on shutdown failed: {e}");
            }
        }
    }
}

/// Record an image layout transition barrier.
///
/// # Safety
/// The command buffer must be in recording state.
unsafe fn layout_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
    (src_stage, src_access): (vk::PipelineStageFlags, vk::AccessFlags),
    (dst_stage, dst_access): (vk::PipelineStageFlags, vk::AccessFlags),
    subresource: vk::ImageSubresourceRange,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .image(image)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(subresource);

    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_whitelist() {
        assert_eq!(format_channels(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(format_channels(vk::Format::R8G8B8A8_UNORM), None);
        assert_eq!(format_channels(vk::Format::B8G8R8A8_SRGB), None);
        assert_eq!(format_channels(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn single_mip_request_default() {
        let request = TextureRequest::new(
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(request.mip_levels, 1);
        assert!(request.queue_families.is_empty());
    }
}
