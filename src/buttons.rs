//! The badge's nine buttons as a [`ButtonPadTranslator`] report source.
//!
//! D-pad (up/down/left/right), A, B, Start, Select and the joystick click.
//! All are active low except Select, which is wired active high.

use embassy_time::{
    Duration,
    Timer,
};
use esp_hal::gpio::{
    Input,
    InputConfig,
    Pull,
};

use crate::{
    ButtonResources,
    input::PadButton,
};

/// All nine badge buttons.
pub struct Buttons {
    pub up: Input<'static>,
    pub down: Input<'static>,
    pub left: Input<'static>,
    pub right: Input<'static>,
    pub stick: Input<'static>,
    pub a: Input<'static>,
    pub b: Input<'static>,
    pub start: Input<'static>,
    pub select: Input<'static>,
}

const DEBOUNCE_MS: u64 = 20;

impl From<ButtonResources<'static>> for Buttons {
    fn from(res: ButtonResources<'static>) -> Self {
        let pull_up = InputConfig::default().with_pull(Pull::Up);
        Self {
            up: Input::new(res.up, pull_up),
            down: Input::new(res.down, pull_up),
            left: Input::new(res.left, pull_up),
            right: Input::new(res.right, pull_up),
            stick: Input::new(res.stick, pull_up),
            a: Input::new(res.a, pull_up),
            b: Input::new(res.b, pull_up),
            start: Input::new(res.start, pull_up),
            select: Input::new(res.select, InputConfig::default().with_pull(Pull::Down)),
        }
    }
}

impl Buttons {
    /// Sample every button into a two-byte [`ButtonPadTranslator`](crate::input::ButtonPadTranslator) report.
    pub fn report(&self) -> [u8; 2] {
        let held = [
            (PadButton::Up, self.up.is_low()),
            (PadButton::Down, self.down.is_low()),
            (PadButton::Left, self.left.is_low()),
            (PadButton::Right, self.right.is_low()),
            (PadButton::Stick, self.stick.is_low()),
            (PadButton::A, self.a.is_low()),
            (PadButton::B, self.b.is_low()),
            (PadButton::Start, self.start.is_low()),
            (PadButton::Select, self.select.is_high()),
        ];
        PadButton::report(
            held.into_iter()
                .filter_map(|(button, pressed)| pressed.then_some(button)),
        )
    }

    /// Wait for a full press-and-release cycle of an active-low button.
    pub async fn debounce_press_and_release(button: &mut Input<'_>) {
        Self::debounce_press(button).await;
        Self::debounce_release(button).await;
    }

    /// Wait for a debounced press (falling edge, active low).
    pub async fn debounce_press(button: &mut Input<'_>) {
        loop {
            button.wait_for_falling_edge().await;
            Timer::after(Duration::from_millis(DEBOUNCE_MS)).await;
            if button.is_low() {
                return;
            }
        }
    }

    /// Wait for a debounced release (rising edge).
    pub async fn debounce_release(button: &mut Input<'_>) {
        loop {
            button.wait_for_rising_edge().await;
            Timer::after(Duration::from_millis(DEBOUNCE_MS)).await;
            if button.is_high() {
                return;
            }
        }
    }
}
