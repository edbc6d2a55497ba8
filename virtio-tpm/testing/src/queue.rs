// Licensed under the Apache-2.0 license

//! Split virtqueue held in process memory
//!
//! The driver half implements [`QueueChannel`]. The device half
//! ([`LoopbackQueue::take_available`], [`LoopbackQueue::complete`],
//! [`LoopbackQueue::interrupt`]) is driven by a backend thread or directly by
//! a test.

use std::sync::atomic::{AtomicU64, Ordering};
use virtio_tpm_channel::{
    Chain, ChannelError, CompletionCallback, QueueChannel, Rejected, TransactionId, UsedChain,
};
use virtio_tpm_osal::{Condvar, Deadline, Duration, Mutex};

/// Descriptor continues via `next`
pub const VIRTQ_DESC_F_NEXT: u16 = 1;
/// Device writes into this descriptor
pub const VIRTQ_DESC_F_WRITE: u16 = 2;

pub const DEFAULT_QUEUE_SIZE: u16 = 16;
/// Largest queue a split virtqueue allows
pub const MAX_QUEUE_SIZE: u16 = 32768;

/// Round `size` up to the power of two a split virtqueue requires.
///
/// Ring slots are free-running `u16` indices taken modulo the size, which
/// only stays consistent across the index wrap for powers of two.
pub fn ring_size(size: u16) -> u16 {
    size.clamp(1, MAX_QUEUE_SIZE).next_power_of_two()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtqDescriptor {
    /// Length of the buffer
    pub len: u32,
    /// 1: NEXT, 2: DEVICE WRITABLE
    pub flags: u16,
    /// Next field if flags contains NEXT
    pub next: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtqUsedElement {
    /// Index of start of used descriptor chain
    pub id: u32,
    /// Total bytes written into the chain
    pub len: u32,
}

/// Command as seen by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub head: u16,
    pub id: TransactionId,
    /// Device-readable bytes, concatenated
    pub command: Vec<u8>,
    /// Total size of the device-writable descriptors
    pub writable_len: usize,
}

struct Ring {
    size: u16,
    descriptors: Vec<VirtqDescriptor>,
    buffers: Vec<Option<Vec<u8>>>,
    ids: Vec<Option<TransactionId>>,
    free: Vec<u16>,
    avail_ring: Vec<u16>,
    avail_idx: u16,
    /// Next available entry the device has not looked at
    device_avail_idx: u16,
    used_ring: Vec<VirtqUsedElement>,
    used_idx: u16,
    last_used_idx: u16,
    /// Heads the device took but never returned
    in_device: Vec<u16>,
    next_id: u32,
    broken: bool,
    reset: bool,
}

impl Ring {
    fn new(size: u16) -> Self {
        let n = size as usize;
        Self {
            size,
            descriptors: vec![VirtqDescriptor::default(); n],
            buffers: vec![None; n],
            ids: vec![None; n],
            free: (0..size).rev().collect(),
            avail_ring: vec![0; n],
            avail_idx: 0,
            device_avail_idx: 0,
            used_ring: vec![VirtqUsedElement::default(); n],
            used_idx: 0,
            last_used_idx: 0,
            in_device: Vec::new(),
            next_id: 1,
            broken: false,
            reset: false,
        }
    }

    fn add_chain(&mut self, chain: Chain) -> Result<TransactionId, Rejected> {
        if self.broken {
            return Err(Rejected::new(ChannelError::Broken, chain));
        }
        if self.reset {
            return Err(Rejected::new(ChannelError::Reset, chain));
        }
        if chain.is_empty() {
            return Err(Rejected::new(ChannelError::EmptyChain, chain));
        }
        let needed = chain.descriptor_count();
        if needed > self.free.len() {
            let free = self.free.len();
            return Err(Rejected::new(ChannelError::QueueFull { needed, free }, chain));
        }

        let buffers = chain
            .readable
            .into_iter()
            .map(|buf| (buf, 0))
            .chain(chain.writable.into_iter().map(|buf| (buf, VIRTQ_DESC_F_WRITE)));

        let mut head = None;
        let mut prev: Option<u16> = None;
        for (buf, flags) in buffers {
            let Some(idx) = self.free.pop() else {
                break;
            };
            self.descriptors[idx as usize] = VirtqDescriptor {
                len: buf.len() as u32,
                flags,
                next: 0,
            };
            self.buffers[idx as usize] = Some(buf);
            if let Some(p) = prev {
                let desc = &mut self.descriptors[p as usize];
                desc.flags |= VIRTQ_DESC_F_NEXT;
                desc.next = idx;
            }
            head.get_or_insert(idx);
            prev = Some(idx);
        }

        let head = head.unwrap_or_default();
        let id = TransactionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.ids[head as usize] = Some(id);

        let slot = (self.avail_idx % self.size) as usize;
        self.avail_ring[slot] = head;
        self.avail_idx = self.avail_idx.wrapping_add(1);
        Ok(id)
    }

    /// Unlink the chain at `head`, returning its buffers to their owner.
    fn detach_chain(&mut self, head: u16) -> (Option<TransactionId>, Chain) {
        let mut chain = Chain::new();
        let mut idx = head;
        loop {
            let desc = self.descriptors[idx as usize];
            if let Some(buf) = self.buffers[idx as usize].take() {
                if desc.flags & VIRTQ_DESC_F_WRITE != 0 {
                    chain.writable.push(buf);
                } else {
                    chain.readable.push(buf);
                }
            }
            self.descriptors[idx as usize] = VirtqDescriptor::default();
            self.free.push(idx);
            if desc.flags & VIRTQ_DESC_F_NEXT == 0 {
                break;
            }
            idx = desc.next;
        }
        (self.ids[head as usize].take(), chain)
    }

    fn pending_avail(&self) -> bool {
        self.device_avail_idx != self.avail_idx
    }
}

pub struct LoopbackQueue {
    name: String,
    ring: Mutex<Ring>,
    avail_cv: Condvar,
    callback: CompletionCallback,
    kicks: AtomicU64,
    interrupts: AtomicU64,
}

impl LoopbackQueue {
    pub fn new(name: &str, size: u16, callback: CompletionCallback) -> Self {
        let ring_size = ring_size(size);
        if ring_size != size {
            log::warn!("{}: queue size {} rounded to {}", name, size, ring_size);
        }
        Self {
            name: name.to_string(),
            ring: Mutex::new(Ring::new(ring_size)),
            avail_cv: Condvar::new(),
            callback,
            kicks: AtomicU64::new(0),
            interrupts: AtomicU64::new(0),
        }
    }

    pub fn size(&self) -> u16 {
        self.ring.lock().map(|r| r.size).unwrap_or(0)
    }

    pub fn num_free(&self) -> usize {
        self.ring.lock().map(|r| r.free.len()).unwrap_or(0)
    }

    pub fn kick_count(&self) -> u64 {
        self.kicks.load(Ordering::SeqCst)
    }

    pub fn interrupt_count(&self) -> u64 {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Make every later submission and kick fail.
    pub fn set_broken(&self, broken: bool) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.broken = broken;
        }
    }

    pub fn is_reset(&self) -> bool {
        self.ring.lock().map(|r| r.reset).unwrap_or(true)
    }

    /// Chains submitted but not yet handed back to the driver
    pub fn outstanding(&self) -> usize {
        self.ring
            .lock()
            .map(|r| {
                r.in_device.len()
                    + r.avail_idx.wrapping_sub(r.device_avail_idx) as usize
                    + r.used_idx.wrapping_sub(r.last_used_idx) as usize
            })
            .unwrap_or(0)
    }

    /// Device side: take the next available chain.
    pub fn take_available(&self) -> Option<DeviceRequest> {
        let mut ring = self.ring.lock().ok()?;
        Self::take_locked(&mut ring)
    }

    /// Device side: wait up to `timeout` for an available chain.
    pub fn wait_available(&self, timeout: Duration) -> Option<DeviceRequest> {
        let deadline = Deadline::after(timeout);
        let mut ring = self.ring.lock().ok()?;
        loop {
            if ring.reset {
                return None;
            }
            if ring.pending_avail() {
                return Self::take_locked(&mut ring);
            }
            let left = deadline.remaining()?;
            let (guard, _) = self.avail_cv.wait_timeout(ring, left).ok()?;
            ring = guard;
        }
    }

    fn take_locked(ring: &mut Ring) -> Option<DeviceRequest> {
        if ring.reset || !ring.pending_avail() {
            return None;
        }
        let slot = (ring.device_avail_idx % ring.size) as usize;
        let head = ring.avail_ring[slot];
        ring.device_avail_idx = ring.device_avail_idx.wrapping_add(1);
        ring.in_device.push(head);

        let mut command = Vec::new();
        let mut writable_len = 0;
        let mut idx = head;
        loop {
            let desc = ring.descriptors[idx as usize];
            if desc.flags & VIRTQ_DESC_F_WRITE != 0 {
                writable_len += desc.len as usize;
            } else if let Some(buf) = ring.buffers[idx as usize].as_ref() {
                command.extend_from_slice(buf);
            }
            if desc.flags & VIRTQ_DESC_F_NEXT == 0 {
                break;
            }
            idx = desc.next;
        }

        let id = ring.ids[head as usize].unwrap_or(TransactionId(0));
        Some(DeviceRequest {
            head,
            id,
            command,
            writable_len,
        })
    }

    /// Device side: write `response` into the chain at `head` and mark it used.
    ///
    /// Bytes past the writable capacity are dropped. Returns the byte count
    /// recorded in the used ring.
    pub fn complete(&self, head: u16, response: &[u8]) -> Result<u32, ChannelError> {
        let mut guard = self.ring.lock().map_err(|_| ChannelError::Broken)?;
        let ring = &mut *guard;
        if ring.reset {
            return Err(ChannelError::Reset);
        }
        let Some(pos) = ring.in_device.iter().position(|&h| h == head) else {
            return Err(ChannelError::Broken);
        };
        ring.in_device.swap_remove(pos);

        let mut written = 0usize;
        let mut idx = head;
        loop {
            let desc = ring.descriptors[idx as usize];
            if desc.flags & VIRTQ_DESC_F_WRITE != 0 {
                if let Some(buf) = ring.buffers[idx as usize].as_mut() {
                    let n = buf.len().min(response.len() - written);
                    buf[..n].copy_from_slice(&response[written..written + n]);
                    written += n;
                }
            }
            if desc.flags & VIRTQ_DESC_F_NEXT == 0 {
                break;
            }
            idx = desc.next;
        }

        let slot = (ring.used_idx % ring.size) as usize;
        ring.used_ring[slot] = VirtqUsedElement {
            id: head as u32,
            len: written as u32,
        };
        ring.used_idx = ring.used_idx.wrapping_add(1);
        Ok(written as u32)
    }

    /// Device side: raise the queue interrupt, running the completion callback.
    pub fn interrupt(&self) {
        if self.is_reset() {
            return;
        }
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        (self.callback)(self);
    }
}

impl QueueChannel for LoopbackQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit_transaction(&self, chain: Chain) -> Result<TransactionId, Rejected> {
        let mut ring = match self.ring.lock() {
            Ok(ring) => ring,
            Err(_) => return Err(Rejected::new(ChannelError::Broken, chain)),
        };
        ring.add_chain(chain)
    }

    fn notify(&self) -> bool {
        match self.ring.lock() {
            Ok(ring) if !ring.broken && !ring.reset => {}
            _ => return false,
        }
        self.kicks.fetch_add(1, Ordering::SeqCst);
        self.avail_cv.notify_all();
        true
    }

    fn pop_completed(&self) -> Option<UsedChain> {
        let mut ring = self.ring.lock().ok()?;
        if ring.last_used_idx == ring.used_idx {
            return None;
        }
        let slot = (ring.last_used_idx % ring.size) as usize;
        let elem = ring.used_ring[slot];
        ring.last_used_idx = ring.last_used_idx.wrapping_add(1);

        let (id, chain) = ring.detach_chain(elem.id as u16);
        Some(UsedChain {
            id: id.unwrap_or(TransactionId(0)),
            chain,
            written: elem.len,
        })
    }

    fn reset(&self) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.reset = true;
        }
        self.avail_cv.notify_all();
        log::debug!("{}: queue reset", self.name);
    }

    fn reclaim_unconsumed(&self) -> Vec<Chain> {
        let Ok(mut guard) = self.ring.lock() else {
            return Vec::new();
        };
        let ring = &mut *guard;

        let mut heads = std::mem::take(&mut ring.in_device);
        while ring.device_avail_idx != ring.avail_idx {
            let slot = (ring.device_avail_idx % ring.size) as usize;
            heads.push(ring.avail_ring[slot]);
            ring.device_avail_idx = ring.device_avail_idx.wrapping_add(1);
        }

        heads
            .into_iter()
            .map(|head| ring.detach_chain(head).1)
            .collect()
    }
}
