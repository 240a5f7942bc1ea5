//! # gzn
//!
//! Game runtime core for the Disobey 2026 badge (ESP32-S3):
//!
//! - **Renderer**: double-buffered, downscaled software frame buffers pushed to
//!   the 320×170 ST7789 by a dedicated render task ([`render`])
//! - **Audio**: up to four WAV tracks streamed from asset partitions, mixed and
//!   played through an LEDC PWM channel clocked by a timer interrupt ([`audio`])
//! - **Input**: keyboard and button reports folded into game actions ([`input`])
//! - **Assets**: read-only file partitions linked into the firmware ([`fs`])
//!
//! Everything except the board bring-up is target independent and unit-tested
//! on the host.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! let peripherals = gzn::init();
//! let resources = gzn::split_resources!(peripherals);
//!
//! let mut lcd: gzn::Lcd = resources.display.into();
//! let speaker: gzn::Speaker = resources.speaker.into();
//! let renderer = gzn::mk_static!(Renderer, Renderer::new(&lcd, RenderConfig::default())?);
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Must come first so the logging macros are visible in every module.
mod fmt;

pub mod audio;
pub mod fs;
pub mod input;
pub mod render;

#[cfg(target_os = "none")]
mod buttons;
#[cfg(target_os = "none")]
mod display;
#[cfg(target_os = "none")]
pub mod speaker;

#[cfg(target_os = "none")]
pub use buttons::Buttons;
#[cfg(target_os = "none")]
pub use display::{
    Display,
    Lcd,
};
#[cfg(target_os = "none")]
use esp_hal::{
    assign_resources,
    clock::{
        Clock,
        CpuClock,
    },
    rom,
};
#[cfg(target_os = "none")]
pub use speaker::Speaker;

/// StaticCell helper: allocates a value into a `static` exactly once.
#[macro_export]
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write($val);
        x
    }};
}

/// Bytes left on the heap; frame buffers must fit below this.
pub(crate) fn free_heap() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "none")] {
            esp_alloc::HEAP.free()
        } else {
            usize::MAX
        }
    }
}

// ── Pin / peripheral assignments ────────────────────────────────────────────

#[cfg(target_os = "none")]
assign_resources! {
    pub Resources<'d> {
        display: DisplayResources<'d> {
            dc: GPIO15,
            rst: GPIO7,
            sck: GPIO4,
            cs: GPIO6,
            miso: GPIO16,
            mosi: GPIO5,
            backlight: GPIO19,
            spi: SPI2,
            dma: DMA_CH0,
        },
        speaker: SpeakerResources<'d> {
            pin: GPIO41,
            ledc: LEDC,
            timg: TIMG1,
        },
        buttons: ButtonResources<'d> {
            up: GPIO11,
            down: GPIO1,
            left: GPIO21,
            right: GPIO2,
            stick: GPIO14,
            a: GPIO13,
            b: GPIO38,
            start: GPIO12,
            select: GPIO45,
        },
    }
}

// ── Board initialisation ────────────────────────────────────────────────────

/// Minimal CPU clock switcher for ESP32-S3.
///
/// Steps through an intermediate frequency before reaching the target,
/// which is required by the hardware.
#[cfg(target_os = "none")]
fn set_cpu_clock(cpu_clock_speed: CpuClock) {
    let _ = esp_hal::peripherals::SYSTEM::regs()
        .sysclk_conf()
        .modify(|_, w| unsafe { w.soc_clk_sel().bits(1) });
    let _ = esp_hal::peripherals::SYSTEM::regs()
        .cpu_per_conf()
        .modify(|_, w| unsafe {
            let _ = w.pll_freq_sel().set_bit();
            w.cpuperiod_sel().bits(match cpu_clock_speed {
                CpuClock::_80MHz => 0,
                CpuClock::_160MHz => 1,
                _ => 2,
            })
        });

    rom::ets_update_cpu_frequency_rom(cpu_clock_speed.frequency().as_mhz());
}

/// Initialise the badge at full clock speed and return the raw peripheral set.
///
/// Call this once at the top of `main`, then break the peripherals into
/// resource groups with [`split_resources!`].
#[cfg(target_os = "none")]
#[must_use]
pub fn init() -> esp_hal::peripherals::Peripherals {
    set_cpu_clock(CpuClock::_160MHz);
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    info!("badge initialised");
    peripherals
}

#[cfg(target_os = "none")]
impl From<esp_hal::peripherals::Peripherals> for Resources<'_> {
    fn from(peripherals: esp_hal::peripherals::Peripherals) -> Self {
        split_resources!(peripherals)
    }
}
