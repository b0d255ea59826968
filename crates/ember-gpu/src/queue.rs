//! Queue wrapper with in-flight command buffer tracking.
//!
//! A [`Queue`] wraps one native execution queue and records which command
//! buffers are currently submitted but not yet known complete. Membership in
//! that pending set is the sole "do not reuse yet" signal; the set is guarded
//! by a mutex held only for the brief insert/remove operations, never across
//! a blocking wait.

use crate::error::Result;
use ash::vk;
use hashbrown::HashSet;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Owned description of one batch for queue submission.
///
/// `vk::SubmitInfo` borrows raw pointers and cannot cross a thread boundary;
/// this type owns its arrays and is lowered to `vk::SubmitInfo` at submit
/// time.
#[derive(Clone, Default)]
pub struct Submission {
    /// Semaphores to wait on before execution, paired with `wait_stages`.
    pub wait_semaphores: Vec<vk::Semaphore>,
    /// Pipeline stages at which each wait occurs.
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    /// Command buffers to execute.
    pub command_buffers: Vec<vk::CommandBuffer>,
    /// Semaphores to signal on completion.
    pub signal_semaphores: Vec<vk::Semaphore>,
}

impl Submission {
    /// A submission that only executes command buffers.
    pub fn commands(command_buffers: Vec<vk::CommandBuffer>) -> Self {
        Self {
            command_buffers,
            ..Self::default()
        }
    }
}

/// Completion handle for an asynchronous submission.
///
/// The caller must wait on this before depending on the submitted work's
/// effects. Dropping the task also joins the background thread, so there is
/// no fire-and-forget path. Cancellation is not supported: once submitted,
/// the work runs to completion or device-level failure.
pub struct SubmitTask {
    handle: Option<JoinHandle<()>>,
}

impl SubmitTask {
    /// Block until the background submit-and-wait finishes.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Submission task panicked");
            }
        }
    }
}

impl Drop for SubmitTask {
    fn drop(&mut self) {
        self.join();
    }
}

/// Wraps a native execution queue plus its family index.
pub struct Queue {
    device: Arc<ash::Device>,
    queue: vk::Queue,
    family_index: u32,
    pending: Arc<Mutex<HashSet<vk::CommandBuffer>>>,
}

impl Queue {
    /// Wrap a raw queue retrieved from the device.
    pub fn new(device: Arc<ash::Device>, queue: vk::Queue, family_index: u32) -> Self {
        Self {
            device,
            queue,
            family_index,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queue family index this queue belongs to.
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// The raw queue handle.
    pub fn raw(&self) -> vk::Queue {
        self.queue
    }

    /// Whether a command buffer is currently in flight on this queue.
    pub fn is_in_flight(&self, cmd: vk::CommandBuffer) -> bool {
        self.pending.lock().contains(&cmd)
    }

    /// Number of command buffers currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Submit synchronously. Does not wait for completion.
    ///
    /// Returns `false` when the native submit call fails; the error is
    /// logged, never propagated.
    pub fn submit(&self, submissions: &[Submission], fence: Option<vk::Fence>) -> bool {
        match unsafe {
            submit_raw(
                &self.device,
                self.queue,
                submissions,
                fence.unwrap_or(vk::Fence::null()),
            )
        } {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Queue submit failed: {e}");
                false
            }
        }
    }

    /// Submit and track completion on a background task.
    ///
    /// Every referenced command buffer enters the pending set before the
    /// submit and leaves it after the wait, regardless of outcome, so a
    /// caller awaiting the returned [`SubmitTask`] observes submission and
    /// completion as one unit. When no fence is supplied one is created (and
    /// destroyed) internally. Submit and wait errors are logged and
    /// swallowed; nothing crosses the thread boundary.
    pub fn submit_async(
        &self,
        submissions: Vec<Submission>,
        fence: Option<vk::Fence>,
    ) -> (bool, SubmitTask) {
        let device = Arc::clone(&self.device);
        let queue = self.queue;
        let pending = Arc::clone(&self.pending);

        let handle = std::thread::spawn(move || {
            let (fence, owns_fence) = match fence {
                Some(fence) => (fence, false),
                None => match unsafe { crate::sync::create_fence(&device, false) } {
                    Ok(fence) => (fence, true),
                    Err(e) => {
                        tracing::error!("Could not create submission fence: {e}");
                        return;
                    }
                },
            };

            let buffers: Vec<vk::CommandBuffer> = submissions
                .iter()
                .flat_map(|s| s.command_buffers.iter().copied())
                .collect();

            {
                let mut set = pending.lock();
                for &cmd in &buffers {
                    set.insert(cmd);
                }
            }

            let submitted = match unsafe { submit_raw(&device, queue, &submissions, fence) } {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Async queue submit failed: {e}");
                    false
                }
            };

            if submitted {
                // Timeout is effectively infinite; a benign timeout and a
                // device-loss both land here and are only logged.
                if let Err(e) = unsafe { crate::sync::wait_for_fence(&device, fence, u64::MAX) } {
                    tracing::error!("Wait for submission fence failed: {e}");
                }
            }

            if owns_fence {
                unsafe { device.destroy_fence(fence, None) };
            }

            {
                let mut set = pending.lock();
                for &cmd in &buffers {
                    set.remove(&cmd);
                }
            }
        });

        (
            true,
            SubmitTask {
                handle: Some(handle),
            },
        )
    }

    /// Wait for this queue to drain.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.queue_wait_idle(self.queue)?;
        }
        Ok(())
    }
}

/// Lower submissions to `vk::SubmitInfo` and submit.
///
/// # Safety
/// All handles must be valid.
unsafe fn submit_raw(
    device: &ash::Device,
    queue: vk::Queue,
    submissions: &[Submission],
    fence: vk::Fence,
) -> Result<()> {
    let infos: Vec<vk::SubmitInfo> = submissions
        .iter()
        .map(|s| {
            vk::SubmitInfo::default()
                .wait_semaphores(&s.wait_semaphores)
                .wait_dst_stage_mask(&s.wait_stages)
                .command_buffers(&s.command_buffers)
                .signal_semaphores(&s.signal_semaphores)
        })
        .collect();

    device.queue_submit(queue, &infos, fence)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_submission_shape() {
        let cmds = vec![vk::CommandBuffer::null()];
        let submission = Submission::commands(cmds.clone());

        assert_eq!(submission.command_buffers, cmds);
        assert!(submission.wait_semaphores.is_empty());
        assert!(submission.wait_stages.is_empty());
        assert!(submission.signal_semaphores.is_empty());
    }
}
