//! Handle-indexed buffer ownership and uploads.
//!
//! [`BufferManager`] owns every GPU buffer for a device. Allocation and
//! content upload are fail-soft: render-loop code gets a null handle or
//! `false` back instead of an error to propagate, and can recover per call.
//! Writes into non-host-visible memory go through a short-lived staging
//! buffer and a copy submitted on the manager's queue.

use crate::command::{self, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuBuffer;
use crate::queue::{Queue, Submission};
use ash::vk;
use ember_core::{Handle, HandleGenerator};
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use std::sync::Arc;

static BUFFER_IDS: HandleGenerator<GpuBuffer> = HandleGenerator::new();

/// Parameters for a buffer allocation.
#[derive(Clone)]
pub struct BufferRequest {
    /// Bytes to allocate; fixed for the buffer's lifetime.
    pub capacity: u64,
    /// Buffer usage flags.
    pub usage: vk::BufferUsageFlags,
    /// Where the allocation should live.
    pub location: MemoryLocation,
    /// Owning queue families; more than one implies concurrent sharing.
    pub queue_families: Vec<u32>,
    /// Allocation debug name.
    pub name: String,
}

impl BufferRequest {
    /// A request with no explicit owning families and no debug name.
    pub fn new(capacity: u64, usage: vk::BufferUsageFlags, location: MemoryLocation) -> Self {
        Self {
            capacity,
            usage,
            location,
            queue_families: Vec::new(),
            name: String::new(),
        }
    }
}

/// Owns all GPU buffers for a device behind opaque handles.
pub struct BufferManager {
    context: Arc<GpuContext>,
    queue: Arc<Queue>,
    // Pool and single primary command buffer reserved for staging copies.
    #[allow(dead_code)]
    pool: CommandPool,
    cmd: vk::CommandBuffer,
    buffers: HashMap<Handle<GpuBuffer>, GpuBuffer>,
}

impl BufferManager {
    /// Create a manager that stages its copies through `queue`.
    pub fn new(context: Arc<GpuContext>, queue: Arc<Queue>) -> Result<Self> {
        let pool = unsafe {
            CommandPool::new(
                context.device_arc(),
                queue.family_index(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
        }?;
        let cmd = pool
            .allocate(vk::CommandBufferLevel::PRIMARY, 1)
            .into_iter()
            .next()
            .ok_or_else(|| {
                GpuError::AllocationFailed("staging copy command buffer".to_string())
            })?;

        Ok(Self {
            context,
            queue,
            pool,
            cmd,
            buffers: HashMap::new(),
        })
    }

    /// Allocate a buffer, optionally seeded with initial data.
    ///
    /// Returns [`Handle::NONE`] when the seed exceeds the requested capacity,
    /// the native allocation fails, or the seed write fails — in the last
    /// case the fresh buffer is freed again, so no orphaned allocation
    /// survives a failed seed.
    pub fn allocate(&mut self, request: &BufferRequest, data: Option<&[u8]>) -> Handle<GpuBuffer> {
        let seed = data.unwrap_or(&[]);
        if seed.len() as u64 > request.capacity {
            tracing::warn!(
                "Initial data ({} bytes) exceeds requested capacity ({} bytes)",
                seed.len(),
                request.capacity
            );
            return Handle::NONE;
        }

        let buffer = match self.context.allocator().lock().create_buffer(
            request.capacity,
            request.usage,
            request.location,
            &request.queue_families,
            &request.name,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!("Buffer allocation failed: {e}");
                return Handle::NONE;
            }
        };

        let handle = BUFFER_IDS.generate();
        self.buffers.insert(handle, buffer);

        if !seed.is_empty() && !self.append(handle, seed) {
            self.free(handle);
            return Handle::NONE;
        }

        handle
    }

    /// Write `data` into `dst` at `offset`.
    ///
    /// Fails when `offset + data.len()` exceeds capacity. Host-visible
    /// buffers take a direct copy; otherwise the destination must carry
    /// `TRANSFER_DST` usage and the write is staged, submitted on the
    /// manager's queue, and waited on. On success the logical size becomes
    /// `max(size, offset + data.len())`.
    pub fn insert(&mut self, dst: Handle<GpuBuffer>, offset: u64, data: &[u8]) -> bool {
        let Some(buffer) = self.buffers.get(&dst) else {
            tracing::warn!(handle = dst.raw(), "insert: unknown buffer handle");
            return false;
        };
        let Some(end) = offset.checked_add(data.len() as u64) else {
            return false;
        };
        if end > buffer.capacity {
            return false;
        }

        // Fast path: host-visible memory.
        if buffer.mapped_ptr().is_some() {
            if let Err(e) = buffer.write_bytes(offset, data) {
                tracing::warn!("insert: mapped write failed: {e}");
                return false;
            }
            self.grow_size(dst, end);
            return true;
        }

        if !buffer.usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
            tracing::warn!(
                handle = dst.raw(),
                "insert: destination is neither host-visible nor TRANSFER_DST"
            );
            return false;
        }
        let dst_raw = buffer.buffer;

        // Slow path: stage and copy.
        let staging_request = BufferRequest {
            capacity: data.len() as u64,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
            queue_families: vec![self.queue.family_index()],
            name: "staging".to_string(),
        };
        let staging = self.allocate(&staging_request, Some(data));
        if staging.is_null() {
            return false;
        }
        let Some(staging_raw) = self.get(staging) else {
            return false;
        };

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: offset,
            size: data.len() as u64,
        };
        if let Err(e) = self.record_copy(staging_raw, dst_raw, region) {
            tracing::warn!("insert: recording staging copy failed: {e}");
            self.free(staging);
            return false;
        }

        let (accepted, task) = self
            .queue
            .submit_async(vec![Submission::commands(vec![self.cmd])], None);
        if !accepted {
            self.free(staging);
            return false;
        }
        task.wait();
        self.free(staging);

        self.grow_size(dst, end);
        true
    }

    /// Write `data` after the current logical end of `dst`.
    pub fn append(&mut self, dst: Handle<GpuBuffer>, data: &[u8]) -> bool {
        let Some(size) = self.size(dst) else {
            return false;
        };
        self.insert(dst, size, data)
    }

    /// [`append`](Self::append) for typed slices.
    pub fn append_slice<T: bytemuck::NoUninit>(
        &mut self,
        dst: Handle<GpuBuffer>,
        data: &[T],
    ) -> bool {
        self.append(dst, bytemuck::cast_slice(data))
    }

    /// Copy `size(src)` bytes from `src` into `dst`.
    ///
    /// No-op success when `src == dst`. Fails when `size(src)` exceeds
    /// `capacity(dst)`. Both buffers host-visible takes a direct copy;
    /// otherwise `src` needs `TRANSFER_SRC`, `dst` needs `TRANSFER_DST`, and
    /// the copy is submitted synchronously. On success `size(dst)` becomes
    /// `size(src)`.
    pub fn transfer(&mut self, src: Handle<GpuBuffer>, dst: Handle<GpuBuffer>) -> bool {
        if src == dst {
            return true;
        }
        let (Some(src_buf), Some(dst_buf)) = (self.buffers.get(&src), self.buffers.get(&dst))
        else {
            tracing::warn!("transfer: unknown buffer handle");
            return false;
        };

        let size = src_buf.size;
        if size > dst_buf.capacity {
            return false;
        }

        // Fast path: both sides host-visible.
        if let (Some(src_ptr), Some(dst_ptr)) = (src_buf.mapped_ptr(), dst_buf.mapped_ptr()) {
            // Distinct handles mean distinct native buffers, so the ranges
            // cannot overlap.
            unsafe {
                std::ptr::copy_nonoverlapping(src_ptr.cast_const(), dst_ptr, size as usize);
            }
            self.set_size(dst, size);
            return true;
        }

        if !src_buf.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC)
            || !dst_buf.usage.contains(vk::BufferUsageFlags::TRANSFER_DST)
        {
            return false;
        }
        let (src_raw, dst_raw) = (src_buf.buffer, dst_buf.buffer);

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        if let Err(e) = self.record_copy(src_raw, dst_raw, region) {
            tracing::warn!("transfer: recording copy failed: {e}");
            return false;
        }

        if !self
            .queue
            .submit(&[Submission::commands(vec![self.cmd])], None)
        {
            return false;
        }

        self.set_size(dst, size);
        true
    }

    /// [`transfer`](Self::transfer), freeing `src` on success.
    ///
    /// On failure `src` survives untouched.
    pub fn transfer_and_free(&mut self, src: Handle<GpuBuffer>, dst: Handle<GpuBuffer>) -> bool {
        if self.transfer(src, dst) {
            self.free(src);
            return true;
        }
        false
    }

    /// Destroy the native allocation and forget the handle.
    ///
    /// Subsequent accessor calls with `handle` miss with `None`.
    pub fn free(&mut self, handle: Handle<GpuBuffer>) {
        let Some(mut buffer) = self.buffers.remove(&handle) else {
            tracing::warn!(handle = handle.raw(), "free: unknown buffer handle");
            return;
        };
        if let Err(e) = self.context.allocator().lock().free_buffer(&mut buffer) {
            tracing::warn!("free: releasing buffer allocation failed: {e}");
        }
    }

    /// Reset the logical size to zero without touching allocated memory.
    pub fn clear(&mut self, handle: Handle<GpuBuffer>) {
        match self.buffers.get_mut(&handle) {
            Some(buffer) => buffer.size = 0,
            None => tracing::warn!(handle = handle.raw(), "clear: unknown buffer handle"),
        }
    }

    /// The native buffer behind `handle`.
    pub fn get(&self, handle: Handle<GpuBuffer>) -> Option<vk::Buffer> {
        self.buffers.get(&handle).map(|b| b.buffer)
    }

    /// Bytes logically written to the buffer.
    pub fn size(&self, handle: Handle<GpuBuffer>) -> Option<u64> {
        self.buffers.get(&handle).map(|b| b.size)
    }

    /// Bytes allocated for the buffer.
    pub fn capacity(&self, handle: Handle<GpuBuffer>) -> Option<u64> {
        self.buffers.get(&handle).map(|b| b.capacity)
    }

    /// Host pointer to the buffer's memory, when host-visible.
    pub fn mapped_ptr(&self, handle: Handle<GpuBuffer>) -> Option<*mut u8> {
        self.buffers.get(&handle).and_then(GpuBuffer::mapped_ptr)
    }

    fn record_copy(&self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy) -> Result<()> {
        let device = self.context.device();
        unsafe {
            command::begin_command_buffer(
                device,
                self.cmd,
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            )?;
            device.cmd_copy_buffer(self.cmd, src, dst, &[region]);
            command::end_command_buffer(device, self.cmd)?;
        }
        Ok(())
    }

    fn grow_size(&mut self, handle: Handle<GpuBuffer>, end: u64) {
        if let Some(buffer) = self.buffers.get_mut(&handle) {
            buffer.size = buffer.size.max(end);
        }
    }

    fn set_size(&mut self, handle: Handle<GpuBuffer>, size: u64) {
        if let Some(buffer) = self.buffers.get_mut(&handle) {
            buffer.size = size;
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        let mut allocator = self.context.allocator().lock();
        for (_, mut buffer) in self.buffers.drain() {
            if let Err(e) = allocator.free_buffer(&mut buffer) {
                tracing::warn!("Releasing buffer on shutdown failed: {e}");
            }
        }
    }
}
