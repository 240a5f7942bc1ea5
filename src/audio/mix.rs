//! Sample arithmetic: volume quantization, N-way mixing and PWM duty conversion.

use super::{
    BITS_PER_SAMPLE,
    DUTY_RESOLUTION,
    SAMPLE_BATCH_SIZE,
};

/// Offset turning a signed sample into an unsigned duty value.
const DUTY_OFFSET: i32 = 0x7FFF;
const DUTY_SHIFT: u32 = BITS_PER_SAMPLE - DUTY_RESOLUTION;
/// `Volume::apply` divides by `1 << VOLUME_SHIFT`.
const VOLUME_SHIFT: u32 = 5;

/// Quantized track gain.
///
/// Levels run from `-16` (mute) through `0` (half) to `16` (unity); outside
/// values are clamped. Internally the level maps to a scale `0..=32` applied as
/// `sample * scale >> 5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct Volume(u8);

impl Volume {
    pub const MIN_LEVEL: i8 = -16;
    pub const MAX_LEVEL: i8 = 16;
    pub const MUTE: Self = Self::from_level(Self::MIN_LEVEL);
    pub const UNITY: Self = Self::from_level(Self::MAX_LEVEL);

    pub const fn from_level(level: i8) -> Self {
        let clamped = if level < Self::MIN_LEVEL {
            Self::MIN_LEVEL
        } else if level > Self::MAX_LEVEL {
            Self::MAX_LEVEL
        } else {
            level
        };
        Self((clamped - Self::MIN_LEVEL) as u8)
    }

    pub const fn level(self) -> i8 {
        self.0 as i8 + Self::MIN_LEVEL
    }

    /// Multiplier in `0..=32`.
    pub const fn scale(self) -> u8 {
        self.0
    }

    pub const fn apply(self, sample: i16) -> i16 {
        ((sample as i32 * self.0 as i32) >> VOLUME_SHIFT) as i16
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Signed PCM sample to a 14-bit LEDC duty value. Never negative.
pub const fn sample_to_duty(sample: i16) -> u16 {
    let offset = sample as i32 + DUTY_OFFSET;
    if offset < 0 {
        0
    } else {
        (offset >> DUTY_SHIFT) as u16
    }
}

/// One slot's samples for the current streaming iteration.
#[derive(Clone)]
pub struct Batch {
    samples: [i16; SAMPLE_BATCH_SIZE],
    len: usize,
    volume: Volume,
}

impl Batch {
    pub const EMPTY: Self = Self {
        samples: [0; SAMPLE_BATCH_SIZE],
        len: 0,
        volume: Volume::UNITY,
    };

    pub fn samples(&self) -> &[i16] {
        &self.samples[..self.len]
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn volume(&self) -> Volume {
        self.volume
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Storage to decode into; call [`fill`](Self::fill) with the count written.
    pub(crate) fn storage(&mut self) -> &mut [i16; SAMPLE_BATCH_SIZE] {
        &mut self.samples
    }

    pub(crate) fn fill(&mut self, len: usize, volume: Volume) {
        self.len = len.min(SAMPLE_BATCH_SIZE);
        self.volume = volume;
    }

    #[cfg(test)]
    pub(crate) fn from_samples(samples: &[i16], volume: Volume) -> Self {
        let mut batch = Self::EMPTY;
        batch.samples[..samples.len()].copy_from_slice(samples);
        batch.fill(samples.len(), volume);
        batch
    }
}

/// Mix sample `index` of every batch.
///
/// Each sample is divided by `active` before its volume is applied, then the
/// contributions are summed and clamped to `i16`. Batches shorter than
/// `index` contribute silence.
pub fn mix_at(batches: &[Batch], index: usize, active: usize) -> i16 {
    let divisor = active.max(1) as i32;
    let sum: i32 = batches
        .iter()
        .filter_map(|batch| {
            let sample = *batch.samples().get(index)?;
            let attenuated = (i32::from(sample) / divisor) as i16;
            Some(i32::from(batch.volume.apply(attenuated)))
        })
        .sum();
    sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_clamped() {
        assert_eq!(Volume::from_level(-100), Volume::MUTE);
        assert_eq!(Volume::from_level(100), Volume::UNITY);
        assert_eq!(Volume::from_level(5).level(), 5);
        assert_eq!(Volume::MUTE.scale(), 0);
        assert_eq!(Volume::UNITY.scale(), 32);
    }

    #[test]
    fn unity_and_mute() {
        assert_eq!(Volume::UNITY.apply(12345), 12345);
        assert_eq!(Volume::UNITY.apply(i16::MIN), i16::MIN);
        assert_eq!(Volume::MUTE.apply(i16::MAX), 0);
        assert_eq!(Volume::from_level(0).apply(1000), 500);
    }

    #[test]
    fn volume_is_monotonic() {
        for sample in [1, 77, 1000, i16::MAX, -1, -1000, i16::MIN] {
            let mut previous = 0i32;
            for level in Volume::MIN_LEVEL..=Volume::MAX_LEVEL {
                let magnitude = i32::from(Volume::from_level(level).apply(sample)).abs();
                assert!(magnitude >= previous, "sample {sample} level {level}");
                previous = magnitude;
            }
        }
    }

    #[test]
    fn duty_covers_the_14_bit_range() {
        assert_eq!(sample_to_duty(i16::MIN), 0);
        assert_eq!(sample_to_duty(-0x7FFF), 0);
        assert_eq!(sample_to_duty(0), 0x7FFF >> 2);
        assert_eq!(sample_to_duty(i16::MAX), (1 << 14) - 1);
    }

    #[test]
    fn two_tracks_are_attenuated_before_summing() {
        let level = 8;
        let volume = Volume::from_level(level);
        for s in [0i16, 1, 999, 20000, i16::MAX, -20000, i16::MIN] {
            let batches = [
                Batch::from_samples(&[s], volume),
                Batch::from_samples(&[s], volume),
            ];
            let expected = 2 * i32::from(volume.apply(s / 2));
            assert_eq!(i32::from(mix_at(&batches, 0, 2)), expected);
        }
    }

    #[test]
    fn mix_never_leaves_the_sample_range() {
        let batches = [
            Batch::from_samples(&[i16::MAX], Volume::UNITY),
            Batch::from_samples(&[i16::MAX], Volume::UNITY),
            Batch::from_samples(&[i16::MAX], Volume::UNITY),
        ];
        // Undercounted active tracks would overflow without the clamp.
        assert_eq!(mix_at(&batches, 0, 1), i16::MAX);
    }

    #[test]
    fn short_batches_contribute_silence() {
        let batches = [
            Batch::from_samples(&[1000, 1000, 1000], Volume::UNITY),
            Batch::from_samples(&[1000], Volume::UNITY),
        ];
        assert_eq!(mix_at(&batches, 0, 2), 1000);
        assert_eq!(mix_at(&batches, 2, 2), 500);
        assert_eq!(mix_at(&batches, 3, 2), 0);
    }
}
