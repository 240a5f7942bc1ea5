use super::{
    Controls,
    Translator,
};

/// Bit positions in a two-byte little-endian button report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum PadButton {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
    A = 4,
    B = 5,
    Start = 6,
    Select = 7,
    Stick = 8,
}

impl PadButton {
    pub const fn mask(self) -> u16 {
        1 << self as u8
    }

    /// Pack pressed buttons into a report.
    pub fn report(pressed: impl IntoIterator<Item = Self>) -> [u8; 2] {
        pressed
            .into_iter()
            .fold(0u16, |bits, button| bits | button.mask())
            .to_le_bytes()
    }
}

/// D-pad to move, A to attack, B or stick click to use, start or select to pause.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonPadTranslator;

impl Translator for ButtonPadTranslator {
    fn translate(&mut self, report: &[u8]) -> Option<Controls> {
        let &[low, high, ..] = report else {
            return None;
        };
        let bits = u16::from_le_bytes([low, high]);
        let held = |button: PadButton| bits & button.mask() != 0;
        Some(Controls {
            left: held(PadButton::Left),
            right: held(PadButton::Right),
            up: held(PadButton::Up),
            down: held(PadButton::Down),
            attack: held(PadButton::A),
            interact: held(PadButton::B) || held(PadButton::Stick),
            pause: held(PadButton::Start) || held(PadButton::Select),
        })
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;

    use super::*;
    use crate::input::{
        AXIS_POSITIVE,
        Action,
        Actions,
    };

    #[test]
    fn buttons_map_to_actions() {
        let mut pad = ButtonPadTranslator;
        let mut actions = Actions::new();
        let report = PadButton::report([PadButton::Right, PadButton::Stick, PadButton::A]);

        assert!(actions.update(&mut pad, &report, Instant::from_millis(1)));
        assert_eq!(actions.axis(Action::HorizontalMove), AXIS_POSITIVE);
        assert!(actions.is_pressed(Action::Use));
        assert!(actions.is_pressed(Action::Attack));
        assert!(!actions.is_pressed(Action::Pause));
    }

    #[test]
    fn one_byte_reports_are_rejected() {
        assert!(ButtonPadTranslator.translate(&[0xFF]).is_none());
    }
}
