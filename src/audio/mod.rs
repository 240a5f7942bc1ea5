//! WAV streaming, mixing and PWM output.
//!
//! [`AudioManager`] is the control side: it opens tracks into one of
//! [`MAX_TRACKS`] slots and stops them again. [`Streamer`] runs as its own
//! task, reads sample batches from every open slot, mixes them and feeds the
//! [`PwmAudio`] ring, which the sample clock interrupt drains one value per
//! tick.

use embassy_time::Duration;

mod manager;
pub mod mix;
mod pwm;
mod slots;
pub mod wav;

pub use manager::{
    AudioManager,
    Streamer,
};
pub use mix::Volume;
pub use pwm::{
    AlarmHandler,
    DutySink,
    PwmAudio,
    SampleClock,
    Status,
};
pub use wav::WavError;

use crate::fs::FsError;

/// Simultaneously open tracks.
pub const MAX_TRACKS: usize = 4;
/// Samples read per track and streaming iteration.
pub const SAMPLE_BATCH_SIZE: usize = 512;
/// Duty values buffered between the streaming task and the interrupt.
pub const RING_CAPACITY: usize = 2048;
pub const BITS_PER_SAMPLE: u32 = 16;
/// LEDC duty width in bits.
pub const DUTY_RESOLUTION: u32 = 14;

/// Output sample rate, between 8 kHz and 16 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct SampleRate(u32);

impl SampleRate {
    pub const HZ_8000: Self = Self(8_000);
    pub const HZ_11025: Self = Self(11_025);
    pub const HZ_16000: Self = Self(16_000);
    pub const MIN: Self = Self::HZ_8000;
    pub const MAX: Self = Self::HZ_16000;

    /// Clamps into `MIN..=MAX`.
    pub const fn from_hz(hz: u32) -> Self {
        if hz < Self::MIN.0 {
            Self::MIN
        } else if hz > Self::MAX.0 {
            Self::MAX
        } else {
            Self(hz)
        }
    }

    pub const fn as_hz(self) -> u32 {
        self.0
    }

    /// Alarm period in microseconds.
    pub const fn period_micros(self) -> u64 {
        1_000_000 / self.0 as u64
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::HZ_8000
    }
}

/// Audio settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    sample_rate: SampleRate,
    file_guard_timeout: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::default(),
            file_guard_timeout: Duration::from_millis(100),
        }
    }
}

impl AudioConfig {
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: SampleRate) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// How long the streaming task waits for a busy track slot before skipping it.
    #[must_use]
    pub const fn with_file_guard_timeout(mut self, timeout: Duration) -> Self {
        self.file_guard_timeout = timeout;
        self
    }

    pub const fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub const fn file_guard_timeout(&self) -> Duration {
        self.file_guard_timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum StartupError {
    /// The sample clock rejected its configuration.
    InvalidArguments,
    /// Streaming buffers could not be allocated.
    NotEnoughMemory,
}

impl core::fmt::Display for StartupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArguments => f.write_str("invalid audio configuration"),
            Self::NotEnoughMemory => f.write_str("not enough memory for audio buffers"),
        }
    }
}

impl core::error::Error for StartupError {}

/// Why a track did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum PlayError {
    NoFreeSlot,
    CannotOpen,
    TooShort,
    InvalidHeader,
    UnsupportedFormat,
}

impl core::fmt::Display for PlayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoFreeSlot => f.write_str("no free track slot"),
            Self::CannotOpen => f.write_str("cannot open track"),
            Self::TooShort => f.write_str("track shorter than a wav header"),
            Self::InvalidHeader => f.write_str("invalid wav header"),
            Self::UnsupportedFormat => f.write_str("track is not 16-bit pcm"),
        }
    }
}

impl core::error::Error for PlayError {}

impl From<WavError> for PlayError {
    fn from(err: WavError) -> Self {
        match err {
            WavError::TooShort => Self::TooShort,
            WavError::InvalidHeader => Self::InvalidHeader,
            WavError::UnsupportedFormat => Self::UnsupportedFormat,
            WavError::Io => Self::CannotOpen,
        }
    }
}

impl From<FsError> for PlayError {
    fn from(_: FsError) -> Self {
        Self::CannotOpen
    }
}

/// Handle of a playing track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct TrackId(u8);

impl TrackId {
    pub const fn new(index: usize) -> Option<Self> {
        if index < MAX_TRACKS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn bit(self) -> u8 {
        1 << self.0
    }

    pub(crate) fn all() -> impl Iterator<Item = Self> {
        (0..MAX_TRACKS as u8).map(Self)
    }
}

/// What to play and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfo<'a> {
    pub path: &'a str,
    /// `-16..=16`, clamped; 16 is full volume.
    pub volume: i8,
    pub looping: bool,
}

impl<'a> TrackInfo<'a> {
    pub const fn new(path: &'a str) -> Self {
        Self {
            path,
            volume: Volume::MAX_LEVEL,
            looping: false,
        }
    }

    #[must_use]
    pub const fn with_volume(mut self, volume: i8) -> Self {
        self.volume = volume;
        self
    }

    #[must_use]
    pub const fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}
