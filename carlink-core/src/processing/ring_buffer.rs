use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::models::audio_format::AudioFormat;

/// Snapshot of ring buffer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RingBufferStats {
    pub capacity_ms: usize,
    pub capacity_bytes: usize,
    pub fill_level_ms: usize,
    pub fill_percent: u32,
    pub total_bytes_written: u64,
    pub total_bytes_read: u64,
    pub overflow_count: u64,
    pub underflow_count: u64,
    pub discarded_bytes: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Lock-free single-producer/single-consumer byte ring for PCM jitter
/// absorption.
///
/// The producer (USB read loop) never waits: when a write does not fit, the
/// oldest bytes are discarded by advancing the read cursor. The consumer
/// (audio output) never blocks; an empty read returns 0.
///
/// At most `capacity - 1` bytes are readable, so a full ring can be told
/// apart from an empty one. Cursors are monotonically increasing byte
/// positions; the storage index is `position % capacity`. Storage cells are
/// atomics, so an overwrite racing a read is never a data race; a consumer
/// whose region was reclaimed mid-copy notices the moved cursor and retries.
///
/// Share as `Arc<AudioRingBuffer>` between exactly one producer and one
/// consumer thread.
#[derive(Debug)]
pub struct AudioRingBuffer {
    buffer: Box<[AtomicU8]>,
    capacity: usize,
    capacity_ms: usize,
    bytes_per_ms: usize,
    sample_rate: u32,
    channels: u16,

    write_pos: AtomicU64,
    read_pos: AtomicU64,

    total_bytes_written: AtomicU64,
    total_bytes_read: AtomicU64,
    overflow_count: AtomicU64,
    underflow_count: AtomicU64,
    discarded_bytes: AtomicU64,
}

impl AudioRingBuffer {
    pub const MEDIA_CAPACITY_MS: usize = 250;
    pub const NAVIGATION_CAPACITY_MS: usize = 120;
    pub const DEFAULT_THRESHOLD_MS: usize = 50;

    /// Ring holding `capacity_ms` of 16-bit PCM at the given rate.
    pub fn new(capacity_ms: usize, sample_rate: u32, channels: u16) -> Self {
        let bytes_per_ms = AudioFormat::new(sample_rate, channels).bytes_per_ms();
        let capacity = (capacity_ms * bytes_per_ms).max(2);
        Self {
            buffer: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            capacity,
            capacity_ms,
            bytes_per_ms,
            sample_rate,
            channels,
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
            total_bytes_written: AtomicU64::new(0),
            total_bytes_read: AtomicU64::new(0),
            overflow_count: AtomicU64::new(0),
            underflow_count: AtomicU64::new(0),
            discarded_bytes: AtomicU64::new(0),
        }
    }

    pub fn for_format(capacity_ms: usize, format: AudioFormat) -> Self {
        Self::new(capacity_ms, format.sample_rate, format.channels)
    }

    /// Larger ring for media playback.
    pub fn for_media(sample_rate: u32, channels: u16) -> Self {
        Self::new(Self::MEDIA_CAPACITY_MS, sample_rate, channels)
    }

    /// Smaller, lower-latency ring for navigation prompts.
    pub fn for_navigation(sample_rate: u32, channels: u16) -> Self {
        Self::new(Self::NAVIGATION_CAPACITY_MS, sample_rate, channels)
    }

    fn usable(&self) -> u64 {
        self.capacity as u64 - 1
    }

    /// Append bytes, discarding the oldest data if needed.
    ///
    /// Always accepts the whole input. Input longer than `capacity - 1`
    /// keeps only its newest `capacity - 1` bytes. Returns the number of
    /// bytes stored. Producer thread only.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let usable = self.usable();
        let keep = (data.len() as u64).min(usable) as usize;
        let src = &data[data.len() - keep..];
        let truncated = (data.len() - keep) as u64;

        let w = self.write_pos.load(Ordering::SeqCst);
        let mut reclaimed = 0u64;
        loop {
            let r = self.read_pos.load(Ordering::SeqCst);
            let free = usable - (w - r);
            if keep as u64 <= free {
                break;
            }
            let shortfall = keep as u64 - free;
            if self
                .read_pos
                .compare_exchange(r, r + shortfall, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                reclaimed = shortfall;
                break;
            }
        }

        let discarded = reclaimed + truncated;
        if discarded > 0 {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            self.discarded_bytes.fetch_add(discarded, Ordering::Relaxed);
        }

        for (i, &byte) in src.iter().enumerate() {
            let idx = ((w + i as u64) % self.capacity as u64) as usize;
            self.buffer[idx].store(byte, Ordering::Relaxed);
        }
        self.write_pos.store(w + keep as u64, Ordering::SeqCst);
        self.total_bytes_written.fetch_add(keep as u64, Ordering::Relaxed);

        keep
    }

    /// Copy up to `out.len()` bytes out of the ring. Never blocks.
    ///
    /// Returns 0 and counts an underflow when the ring is empty. Consumer
    /// thread only.
    pub fn read(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }

        loop {
            let r = self.read_pos.load(Ordering::SeqCst);
            let w = self.write_pos.load(Ordering::SeqCst);
            let available = w - r;
            if available == 0 {
                self.underflow_count.fetch_add(1, Ordering::Relaxed);
                return 0;
            }

            let n = (available as usize).min(out.len());
            for (i, slot) in out[..n].iter_mut().enumerate() {
                let idx = ((r + i as u64) % self.capacity as u64) as usize;
                *slot = self.buffer[idx].load(Ordering::Relaxed);
            }

            // Fails only if the producer reclaimed bytes while we copied.
            if self
                .read_pos
                .compare_exchange(r, r + n as u64, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.total_bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                return n;
            }
        }
    }

    pub fn available_for_read(&self) -> usize {
        let r = self.read_pos.load(Ordering::SeqCst);
        let w = self.write_pos.load(Ordering::SeqCst);
        w.saturating_sub(r) as usize
    }

    pub fn available_for_write(&self) -> usize {
        self.usable() as usize - self.available_for_read()
    }

    /// Readable bytes as a fraction of total capacity.
    pub fn fill_level(&self) -> f32 {
        self.available_for_read() as f32 / self.capacity as f32
    }

    pub fn fill_level_ms(&self) -> usize {
        if self.bytes_per_ms == 0 {
            return 0;
        }
        self.available_for_read() / self.bytes_per_ms
    }

    pub fn has_enough_data(&self, threshold_ms: usize) -> bool {
        self.fill_level_ms() >= threshold_ms
    }

    /// Reset to empty. Requires exclusive access, i.e. both threads stopped.
    /// Cumulative counters are kept.
    pub fn clear(&mut self) {
        *self.write_pos.get_mut() = 0;
        *self.read_pos.get_mut() = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn capacity_ms(&self) -> usize {
        self.capacity_ms
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written.load(Ordering::Relaxed)
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read.load(Ordering::Relaxed)
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underflow_count(&self) -> u64 {
        self.underflow_count.load(Ordering::Relaxed)
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            capacity_ms: self.capacity_ms,
            capacity_bytes: self.capacity,
            fill_level_ms: self.fill_level_ms(),
            fill_percent: (self.fill_level() * 100.0) as u32,
            total_bytes_written: self.total_bytes_written(),
            total_bytes_read: self.total_bytes_read(),
            overflow_count: self.overflow_count(),
            underflow_count: self.underflow_count(),
            discarded_bytes: self.discarded_bytes(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}
