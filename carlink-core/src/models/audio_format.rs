/// PCM format of an AUDIO_DATA stream, selected by the adapter's decode type.
///
/// Samples are always signed 16-bit little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    /// Maps an adapter decode type to its PCM format.
    ///
    /// Unknown decode types fall back to 48 kHz stereo.
    pub fn from_decode_type(decode_type: u32) -> Self {
        match decode_type {
            1 | 2 | 4 => Self::new(48000, 2),
            3 => Self::new(8000, 1),
            5 => Self::new(16000, 1),
            6 => Self::new(24000, 1),
            7 => Self::new(16000, 2),
            _ => Self::default(),
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    pub fn bytes_per_ms(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame() / 1000
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(48000, 2)
    }
}
