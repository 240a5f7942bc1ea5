//! Timer-driven PWM audio output.
//!
//! A periodic hardware alarm ticks at the sample rate. Each tick the handler
//! takes one duty value from the ring and writes it to the PWM channel, or
//! writes silence when the ring is empty. The streaming task fills the ring
//! with [`PwmAudio::send_sample`] / [`PwmAudio::send_samples`] and is paced by
//! its capacity.

use core::{
    cell::RefCell,
    sync::atomic::{
        AtomicU8,
        Ordering,
    },
};

use embassy_sync::{
    blocking_mutex::{
        Mutex,
        raw::CriticalSectionRawMutex,
    },
    channel::Channel,
};

use super::{
    AudioConfig,
    RING_CAPACITY,
    SampleRate,
    StartupError,
    mix::{
        Batch,
        Volume,
        mix_at,
        sample_to_duty,
    },
};

/// The periodic alarm that clocks samples out.
pub trait SampleClock {
    type Error;

    /// Reprogram the alarm period to `1 / rate`. Only called while stopped.
    fn set_sample_rate(&mut self, rate: SampleRate) -> Result<(), Self::Error>;

    fn enable(&mut self);

    fn disable(&mut self);

    /// Clear the pending alarm interrupt.
    fn acknowledge(&mut self);
}

/// The PWM duty register.
pub trait DutySink {
    fn write_duty(&mut self, duty: u16);
}

/// Entry point for the alarm interrupt.
pub trait AlarmHandler: Sync {
    fn on_alarm(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Uninitialized = 0,
    Idle = 1,
    Busy = 2,
}

impl Status {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Idle,
            2 => Self::Busy,
            _ => Self::Uninitialized,
        }
    }
}

struct Output<C, S> {
    clock: C,
    sink: S,
}

/// Ring of duty values drained by the alarm interrupt.
pub struct PwmAudio<C, S> {
    ring: Channel<CriticalSectionRawMutex, u16, RING_CAPACITY>,
    status: AtomicU8,
    sample_rate: SampleRate,
    output: Mutex<CriticalSectionRawMutex, RefCell<Output<C, S>>>,
}

impl<C: SampleClock, S: DutySink> PwmAudio<C, S> {
    /// Program the clock, then start ticking.
    pub fn startup(clock: C, sink: S, config: AudioConfig) -> Result<Self, StartupError> {
        let mut output = Output { clock, sink };
        output.clock.disable();
        if output.clock.set_sample_rate(config.sample_rate()).is_err() {
            error!("audio clock rejected {} Hz", config.sample_rate().as_hz());
            return Err(StartupError::InvalidArguments);
        }
        output.sink.write_duty(0);

        let audio = Self {
            ring: Channel::new(),
            status: AtomicU8::new(Status::Idle as u8),
            sample_rate: config.sample_rate(),
            output: Mutex::new(RefCell::new(output)),
        };
        audio.start();
        info!("pwm audio running at {} Hz", config.sample_rate().as_hz());
        Ok(audio)
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub const fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Resume ticking. No-op unless idle.
    pub fn start(&self) {
        if self
            .status
            .compare_exchange(
                Status::Idle as u8,
                Status::Busy as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.with_output(|output| output.clock.enable());
        }
    }

    /// Stop ticking and drop everything queued, so a later start does not
    /// replay stale audio.
    pub fn stop(&self) {
        if self
            .status
            .compare_exchange(
                Status::Busy as u8,
                Status::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.with_output(|output| {
                output.clock.disable();
                output.sink.write_duty(0);
            });
            self.ring.clear();
            debug!("pwm audio stopped");
        }
    }

    /// Change the sample rate. Refused while busy.
    pub fn set_sample_rate(&mut self, rate: SampleRate) -> Result<(), StartupError> {
        if self.status() == Status::Busy {
            return Err(StartupError::InvalidArguments);
        }
        self.output
            .get_mut()
            .get_mut()
            .clock
            .set_sample_rate(rate)
            .map_err(|_| StartupError::InvalidArguments)?;
        self.sample_rate = rate;
        Ok(())
    }

    /// Tear down and hand the hardware back.
    pub fn shutdown(self) -> (C, S) {
        self.stop();
        self.status
            .store(Status::Uninitialized as u8, Ordering::Release);
        let Output { clock, sink } = self.output.into_inner().into_inner();
        (clock, sink)
    }

    /// Forward one track's samples, scaled by `volume`. Waits while the ring is
    /// full; gives up once the backend is stopped.
    pub async fn send_sample(&self, samples: &[i16], volume: Volume) {
        for &sample in samples {
            if self.status() != Status::Busy {
                return;
            }
            self.ring.send(sample_to_duty(volume.apply(sample))).await;
        }
    }

    /// Mix the first `len` samples of `batches` over `active` tracks and forward them.
    pub async fn send_samples(&self, batches: &[Batch], len: usize, active: usize) {
        for index in 0..len {
            if self.status() != Status::Busy {
                return;
            }
            self.ring
                .send(sample_to_duty(mix_at(batches, index, active)))
                .await;
        }
    }

    /// Duty values queued for output.
    pub fn queued(&self) -> usize {
        self.ring.len()
    }

    /// Next duty value for the PWM channel; silence on underrun.
    fn next_duty(&self) -> u16 {
        self.ring.try_receive().unwrap_or(0)
    }

    fn with_output<R>(&self, f: impl FnOnce(&mut Output<C, S>) -> R) -> R {
        self.output.lock(|output| f(&mut output.borrow_mut()))
    }
}

impl<C, S> AlarmHandler for PwmAudio<C, S>
where
    C: SampleClock + Send,
    S: DutySink + Send,
{
    fn on_alarm(&self) {
        let busy = self.status() == Status::Busy;
        let duty = if busy { self.next_duty() } else { 0 };
        self.with_output(|output| {
            output.clock.acknowledge();
            if busy {
                output.sink.write_duty(duty);
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Arc,
        Mutex,
    };

    use embassy_futures::block_on;

    use super::*;

    /// Sample clock that only records what it was told.
    #[derive(Default)]
    pub(crate) struct ManualClock {
        pub rate: Option<SampleRate>,
        pub enabled: bool,
        pub acknowledged: usize,
        pub reject: bool,
    }

    impl SampleClock for ManualClock {
        type Error = ();

        fn set_sample_rate(&mut self, rate: SampleRate) -> Result<(), ()> {
            if self.reject {
                return Err(());
            }
            self.rate = Some(rate);
            Ok(())
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn acknowledge(&mut self) {
            self.acknowledged += 1;
        }
    }

    /// Duty sink whose writes stay observable after it is moved into the backend.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink(pub Arc<Mutex<Vec<u16>>>);

    impl RecordingSink {
        pub(crate) fn writes(&self) -> Vec<u16> {
            self.0.lock().unwrap().clone()
        }
    }

    impl DutySink for RecordingSink {
        fn write_duty(&mut self, duty: u16) {
            self.0.lock().unwrap().push(duty);
        }
    }

    fn backend() -> (PwmAudio<ManualClock, RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        let audio =
            PwmAudio::startup(ManualClock::default(), sink.clone(), AudioConfig::default())
                .unwrap();
        sink.0.lock().unwrap().clear();
        (audio, sink)
    }

    #[test]
    fn startup_programs_the_clock_and_starts() {
        let (audio, _) = backend();
        assert_eq!(audio.status(), Status::Busy);
        let (clock, _) = audio.shutdown();
        assert_eq!(clock.rate, Some(SampleRate::HZ_8000));
        assert!(!clock.enabled);
    }

    #[test]
    fn rejected_rate_is_invalid_arguments() {
        let clock = ManualClock {
            reject: true,
            ..Default::default()
        };
        let result = PwmAudio::startup(clock, RecordingSink::default(), AudioConfig::default());
        assert_eq!(result.err(), Some(StartupError::InvalidArguments));
    }

    #[test]
    fn underrun_writes_silence() {
        let (audio, sink) = backend();
        block_on(audio.send_sample(&[i16::MAX], Volume::UNITY));

        audio.on_alarm();
        audio.on_alarm();

        assert_eq!(sink.writes(), vec![(1 << 14) - 1, 0]);
    }

    #[test]
    fn samples_leave_in_order() {
        let (audio, sink) = backend();
        let samples = [i16::MIN, -1, 0, 1, i16::MAX];
        block_on(audio.send_sample(&samples, Volume::UNITY));
        for _ in samples {
            audio.on_alarm();
        }
        let expected: Vec<u16> = samples.iter().map(|&s| sample_to_duty(s)).collect();
        assert_eq!(sink.writes(), expected);
    }

    #[test]
    fn stop_flushes_the_ring() {
        let (audio, sink) = backend();
        block_on(audio.send_sample(&[1000; 16], Volume::UNITY));
        assert_eq!(audio.queued(), 16);

        audio.stop();
        assert_eq!(audio.status(), Status::Idle);
        assert_eq!(audio.queued(), 0);

        audio.start();
        sink.0.lock().unwrap().clear();
        audio.on_alarm();
        assert_eq!(sink.writes(), vec![0]);
    }

    #[test]
    fn idle_alarm_only_acknowledges() {
        let (audio, sink) = backend();
        audio.stop();
        sink.0.lock().unwrap().clear();
        audio.on_alarm();
        assert!(sink.writes().is_empty());
        let (clock, _) = audio.shutdown();
        assert_eq!(clock.acknowledged, 1);
    }

    #[test]
    fn sample_rate_changes_only_while_idle() {
        let (mut audio, _) = backend();
        assert_eq!(
            audio.set_sample_rate(SampleRate::HZ_16000),
            Err(StartupError::InvalidArguments)
        );
        audio.stop();
        audio.set_sample_rate(SampleRate::HZ_16000).unwrap();
        assert_eq!(audio.sample_rate(), SampleRate::HZ_16000);
    }

    #[test]
    fn mixed_batches_are_converted_to_duty() {
        let (audio, sink) = backend();
        let batches = [
            Batch::from_samples(&[2000, 2000], Volume::UNITY),
            Batch::from_samples(&[2000], Volume::UNITY),
        ];
        block_on(audio.send_samples(&batches, 2, 2));
        audio.on_alarm();
        audio.on_alarm();
        assert_eq!(
            sink.writes(),
            vec![sample_to_duty(2000), sample_to_duty(1000)]
        );
    }
}
