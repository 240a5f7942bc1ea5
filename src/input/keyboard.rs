//! USB HID boot protocol keyboards.

use super::{
    Controls,
    Translator,
};

/// HID usage ids (keyboard page) used for game controls.
pub mod key {
    pub const A: u8 = 0x04;
    pub const D: u8 = 0x07;
    pub const E: u8 = 0x08;
    pub const J: u8 = 0x0D;
    pub const S: u8 = 0x16;
    pub const W: u8 = 0x1A;
    pub const ESCAPE: u8 = 0x29;
    pub const SPACE: u8 = 0x2C;
    pub const RIGHT: u8 = 0x4F;
    pub const LEFT: u8 = 0x50;
    pub const DOWN: u8 = 0x51;
    pub const UP: u8 = 0x52;

    /// Reported in every key slot on rollover.
    pub const ERROR_ROLL_OVER: u8 = 0x01;
}

const REPORT_LEN: usize = 8;

/// An 8-byte boot keyboard input report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardReport<'a>(&'a [u8; REPORT_LEN]);

impl<'a> KeyboardReport<'a> {
    pub const LEN: usize = REPORT_LEN;
    pub const MAX_KEYS: usize = 6;

    /// `None` when `report` is shorter than a boot report; extra bytes are ignored.
    pub fn parse(report: &'a [u8]) -> Option<Self> {
        report
            .get(..Self::LEN)
            .and_then(|bytes| bytes.try_into().ok())
            .map(Self)
    }

    /// Modifier bitmask (ctrl, shift, alt, gui; left then right).
    pub const fn modifier(&self) -> u8 {
        self.0[0]
    }

    /// Pressed key usage ids; unused slots are `0`.
    pub fn keys(&self) -> &'a [u8] {
        &self.0[2..]
    }

    pub fn is_rollover(&self) -> bool {
        self.keys().iter().all(|&k| k == key::ERROR_ROLL_OVER)
    }

    pub fn is_held(&self, usage: u8) -> bool {
        usage != 0 && self.keys().contains(&usage)
    }

    fn any_held(&self, usages: &[u8]) -> bool {
        usages.iter().any(|&usage| self.is_held(usage))
    }
}

/// WASD or arrows to move, J to attack, E or space to use, escape to pause.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyboardTranslator;

impl Translator for KeyboardTranslator {
    fn translate(&mut self, report: &[u8]) -> Option<Controls> {
        let report = KeyboardReport::parse(report)?;
        if report.is_rollover() {
            return None;
        }
        Some(Controls {
            left: report.any_held(&[key::A, key::LEFT]),
            right: report.any_held(&[key::D, key::RIGHT]),
            up: report.any_held(&[key::W, key::UP]),
            down: report.any_held(&[key::S, key::DOWN]),
            attack: report.is_held(key::J),
            interact: report.any_held(&[key::E, key::SPACE]),
            pause: report.is_held(key::ESCAPE),
        })
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;

    use super::*;
    use crate::input::{
        AXIS_NEGATIVE,
        AXIS_POSITIVE,
        Action,
        Actions,
    };

    fn report(keys: &[u8]) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[2..2 + keys.len()].copy_from_slice(keys);
        out
    }

    #[test]
    fn boot_report_fields() {
        let bytes = [0x02, 0, key::A, key::SPACE, 0, 0, 0, 0, 0xFF];
        let parsed = KeyboardReport::parse(&bytes).unwrap();
        assert_eq!(parsed.modifier(), 0x02);
        assert_eq!(parsed.keys(), &[key::A, key::SPACE, 0, 0, 0, 0]);
        assert!(parsed.is_held(key::SPACE));
        assert!(!parsed.is_held(0));
        assert!(KeyboardReport::parse(&bytes[..7]).is_none());
    }

    #[test]
    fn keys_drive_actions() {
        let mut translator = KeyboardTranslator;
        let mut actions = Actions::new();
        let now = Instant::from_millis(100);

        assert!(actions.update(&mut translator, &report(&[key::A, key::UP, key::J]), now));
        assert_eq!(actions.axis(Action::HorizontalMove), AXIS_NEGATIVE);
        assert_eq!(actions.axis(Action::VerticalMove), AXIS_NEGATIVE);
        assert!(actions.is_pressed(Action::Attack));

        actions.update(&mut translator, &report(&[key::RIGHT, key::S]), now);
        assert_eq!(actions.axis(Action::HorizontalMove), AXIS_POSITIVE);
        assert_eq!(actions.axis(Action::VerticalMove), AXIS_POSITIVE);
        assert!(!actions.is_pressed(Action::Attack));

        actions.update(&mut translator, &report(&[key::E, key::ESCAPE]), now);
        assert!(actions.is_pressed(Action::Use));
        assert!(actions.is_pressed(Action::Pause));
        assert!(!actions.is_pressed(Action::HorizontalMove));
    }

    #[test]
    fn rollover_and_short_reports_keep_state() {
        let mut translator = KeyboardTranslator;
        let mut actions = Actions::new();
        let now = Instant::from_millis(5);
        actions.update(&mut translator, &report(&[key::SPACE]), now);

        assert!(!actions.update(&mut translator, &[key::ERROR_ROLL_OVER; 8][..], now));
        assert!(!actions.update(&mut translator, &[0, 0, 0], now));
        assert!(actions.is_pressed(Action::Use));
    }
}
