//! Speaker on GPIO41: an LEDC channel used as a 14-bit DAC, clocked by a
//! TIMG1 alarm interrupt.
//!
//! ```rust,ignore
//! let Speaker { clock, duty } = resources.speaker.into();
//! let (audio, streamer) = AudioManager::initialize(fs, clock, duty, AudioConfig::default())?;
//! let audio = mk_static!(Manager, audio);
//! gzn::speaker::register(audio.backend());
//! ```

use core::{
    cell::{
        Cell,
        RefCell,
    },
    convert::Infallible,
};

use critical_section::Mutex;
use esp_hal::{
    Blocking,
    gpio::DriveMode,
    handler,
    ledc::{
        LSGlobalClkSource,
        Ledc,
        LowSpeed,
        channel::{
            self,
            ChannelHW,
            ChannelIFace,
        },
        timer::{
            self,
            TimerIFace,
        },
    },
    time::{
        Duration,
        Rate,
    },
    timer::{
        PeriodicTimer,
        timg::TimerGroup,
    },
};

use crate::{
    SpeakerResources,
    audio::{
        AlarmHandler,
        DutySink,
        SampleClock,
        SampleRate,
    },
    mk_static,
};

/// PWM carrier. 80 MHz APB over 14 bits allows at most ~4.9 kHz.
const PWM_FREQUENCY_KHZ: u32 = 4;

static ALARM_TIMER: Mutex<RefCell<Option<PeriodicTimer<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));
static ALARM_HANDLER: Mutex<Cell<Option<&'static dyn AlarmHandler>>> = Mutex::new(Cell::new(None));

/// Route the alarm interrupt to `audio`. Until then ticks are only acknowledged.
pub fn register(audio: &'static dyn AlarmHandler) {
    critical_section::with(|cs| ALARM_HANDLER.borrow(cs).set(Some(audio)));
    debug!("audio alarm handler registered");
}

#[handler]
fn audio_tick() {
    match critical_section::with(|cs| ALARM_HANDLER.borrow(cs).get()) {
        Some(audio) => audio.on_alarm(),
        None => acknowledge_alarm(),
    }
}

fn acknowledge_alarm() {
    critical_section::with(|cs| {
        if let Some(timer) = ALARM_TIMER.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
}

fn with_alarm_timer(f: impl FnOnce(&mut PeriodicTimer<'static, Blocking>)) {
    critical_section::with(|cs| {
        if let Some(timer) = ALARM_TIMER.borrow_ref_mut(cs).as_mut() {
            f(timer);
        }
    });
}

/// The TIMG1 alarm as the audio [`SampleClock`].
pub struct SpeakerClock {
    period: Duration,
}

impl SampleClock for SpeakerClock {
    type Error = Infallible;

    fn set_sample_rate(&mut self, rate: SampleRate) -> Result<(), Infallible> {
        self.period = Duration::from_micros(rate.period_micros());
        Ok(())
    }

    fn enable(&mut self) {
        let period = self.period;
        with_alarm_timer(|timer| {
            timer.listen();
            if timer.start(period).is_err() {
                error!("audio alarm period rejected");
            }
        });
    }

    fn disable(&mut self) {
        with_alarm_timer(|timer| {
            timer.unlisten();
            timer.stop();
        });
    }

    fn acknowledge(&mut self) {
        acknowledge_alarm();
    }
}

/// LEDC channel 0 duty register.
pub struct SpeakerDuty {
    channel: channel::Channel<'static, LowSpeed>,
}

// SAFETY: the channel's timer reference points into a `static` that is never
// mutated after configuration; the duty register is only written through
// `&mut self`.
unsafe impl Send for SpeakerDuty {}

impl DutySink for SpeakerDuty {
    fn write_duty(&mut self, duty: u16) {
        self.channel.set_duty_hw(u32::from(duty));
    }
}

/// The two halves the audio backend needs.
pub struct Speaker {
    pub clock: SpeakerClock,
    pub duty: SpeakerDuty,
}

impl From<SpeakerResources<'static>> for Speaker {
    fn from(res: SpeakerResources<'static>) -> Self {
        let ledc = mk_static!(Ledc<'static>, Ledc::new(res.ledc));
        ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);

        let pwm_timer = mk_static!(
            timer::Timer<'static, LowSpeed>,
            ledc.timer::<LowSpeed>(timer::Number::Timer0)
        );
        pwm_timer
            .configure(timer::config::Config {
                duty: timer::config::Duty::Duty14Bit,
                clock_source: timer::LSClockSource::APBClk,
                frequency: Rate::from_khz(PWM_FREQUENCY_KHZ),
            })
            .unwrap();

        let mut channel = ledc.channel(channel::Number::Channel0, res.pin);
        channel
            .configure(channel::config::Config {
                timer: &*pwm_timer,
                duty_pct: 0,
                drive_mode: DriveMode::PushPull,
            })
            .unwrap();

        let mut alarm = PeriodicTimer::new(TimerGroup::new(res.timg).timer0);
        alarm.set_interrupt_handler(audio_tick);
        critical_section::with(|cs| ALARM_TIMER.borrow_ref_mut(cs).replace(alarm));

        info!("speaker ready");
        Self {
            clock: SpeakerClock {
                period: Duration::from_micros(SampleRate::default().period_micros()),
            },
            duty: SpeakerDuty { channel },
        }
    }
}
