// Licensed under the Apache-2.0 license

//! Loopback virtio device
//!
//! Without a responder the device is driven by hand through
//! [`LoopbackDevice::answer_next`]. With one, `device_ready` starts a backend
//! thread that answers every command as it is kicked.

use crate::queue::{LoopbackQueue, DEFAULT_QUEUE_SIZE};
use crate::responder::Responder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use virtio_tpm_channel::{ChannelError, CompletionCallback, QueueChannel, TransactionId};
use virtio_tpm_driver::{DriverError, VirtioDevice, VirtioDeviceId, QUEUE_NAME, VIRTIO_ID_TPM};
use virtio_tpm_osal::{time, Duration, Mutex, ThreadBuilder, ThreadHandle};

/// PCI vendor id of virtio devices
pub const VIRTIO_PCI_VENDOR_ID: u32 = 0x1af4;

const BACKEND_POLL: Duration = Duration::from_millis(10);

/// Bus operations in the order the driver issued them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    FindVq,
    Ready,
    Reset,
    DelVqs,
}

struct Backend {
    stop: Arc<AtomicBool>,
    handle: ThreadHandle,
}

pub struct LoopbackDevice {
    id: VirtioDeviceId,
    queue_name: String,
    queue_size: u16,
    response_delay: Duration,
    responder: Option<Arc<dyn Responder>>,
    queue: Mutex<Option<Arc<LoopbackQueue>>>,
    backend: Mutex<Option<Backend>>,
    events: Mutex<Vec<DeviceEvent>>,
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self {
            id: VirtioDeviceId {
                device: VIRTIO_ID_TPM,
                vendor: VIRTIO_PCI_VENDOR_ID,
            },
            queue_name: QUEUE_NAME.to_string(),
            queue_size: DEFAULT_QUEUE_SIZE,
            response_delay: Duration::ZERO,
            responder: None,
            queue: Mutex::new(None),
            backend: Mutex::new(None),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder(mut self, responder: impl Responder + 'static) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    pub fn with_device_id(mut self, device: u32) -> Self {
        self.id.device = device;
        self
    }

    pub fn with_vendor_id(mut self, vendor: u32) -> Self {
        self.id.vendor = vendor;
        self
    }

    /// Expose the queue under a different name
    pub fn with_queue_name(mut self, name: &str) -> Self {
        self.queue_name = name.to_string();
        self
    }

    pub fn with_queue_size(mut self, size: u16) -> Self {
        self.queue_size = size;
        self
    }

    /// Delay the backend waits before answering each command
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn queue(&self) -> Option<Arc<LoopbackQueue>> {
        self.queue.lock().ok().and_then(|q| q.clone())
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn backend_running(&self) -> bool {
        self.backend
            .lock()
            .map(|b| b.as_ref().is_some_and(|b| !b.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Answer the next available command with `response` and raise the interrupt.
    pub fn answer_next(&self, response: &[u8]) -> Result<TransactionId, ChannelError> {
        let queue = self.queue().ok_or(ChannelError::Reset)?;
        let request = queue.take_available().ok_or(ChannelError::EmptyChain)?;
        queue.complete(request.head, response)?;
        queue.interrupt();
        Ok(request.id)
    }

    fn record(&self, event: DeviceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn start_backend(&self) {
        let (Some(responder), Some(queue)) = (self.responder.clone(), self.queue()) else {
            return;
        };
        let Ok(mut backend) = self.backend.lock() else {
            return;
        };
        if backend.is_some() {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let delay = self.response_delay;
        match ThreadBuilder::new()
            .name("vtpm-backend")
            .spawn(move || run_backend(queue, responder, thread_stop, delay))
        {
            Ok(handle) => *backend = Some(Backend { stop, handle }),
            Err(e) => log::error!("loopback: backend not started: {}", e),
        }
    }

    fn stop_backend(&self) {
        let backend = self.backend.lock().ok().and_then(|mut b| b.take());
        if let Some(backend) = backend {
            backend.stop.store(true, Ordering::SeqCst);
            if let Some(queue) = self.queue() {
                queue.reset();
            }
            if let Err(e) = backend.handle.join() {
                log::error!("loopback: backend exited abnormally: {}", e);
            }
        }
    }
}

fn run_backend(
    queue: Arc<LoopbackQueue>,
    responder: Arc<dyn Responder>,
    stop: Arc<AtomicBool>,
    delay: Duration,
) {
    log::debug!("loopback: backend serving {}", queue.name());
    while !stop.load(Ordering::SeqCst) {
        let Some(request) = queue.wait_available(BACKEND_POLL) else {
            if queue.is_reset() {
                break;
            }
            continue;
        };

        log::debug!(
            "loopback: command {} ({} bytes)",
            request.id,
            request.command.len()
        );
        if !delay.is_zero() {
            time::sleep(delay);
        }

        let Some(response) = responder.respond(&request.command) else {
            log::debug!("loopback: holding command {}", request.id);
            continue;
        };
        match queue.complete(request.head, &response) {
            Ok(_) => queue.interrupt(),
            Err(e) => log::warn!("loopback: command {} not completed: {}", request.id, e),
        }
    }
    log::debug!("loopback: backend stopped");
}

impl VirtioDevice for LoopbackDevice {
    fn device_id(&self) -> VirtioDeviceId {
        self.id
    }

    fn find_single_vq(
        &self,
        name: &str,
        callback: CompletionCallback,
    ) -> Result<Arc<dyn QueueChannel>, DriverError> {
        self.record(DeviceEvent::FindVq);
        if name != self.queue_name {
            return Err(DriverError::QueueNotFound(name.to_string()));
        }

        let queue = Arc::new(LoopbackQueue::new(name, self.queue_size, callback));
        if let Ok(mut slot) = self.queue.lock() {
            *slot = Some(queue.clone());
        }
        Ok(queue)
    }

    fn device_ready(&self) {
        self.record(DeviceEvent::Ready);
        self.start_backend();
    }

    fn reset_device(&self) {
        self.record(DeviceEvent::Reset);
        self.stop_backend();
        if let Some(queue) = self.queue() {
            queue.reset();
        }
    }

    fn del_vqs(&self) {
        self.record(DeviceEvent::DelVqs);
        if let Ok(mut slot) = self.queue.lock() {
            slot.take();
        }
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        self.stop_backend();
    }
}
