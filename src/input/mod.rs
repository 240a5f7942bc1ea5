//! Game actions fed by raw input reports.
//!
//! A [`Translator`] turns one report (a HID boot keyboard report, the badge's
//! button bitmask, ...) into the set of [`Controls`] held right now.
//! [`Actions::apply`] folds that into per-action state and stamps every change,
//! so the game can ask for edges with [`Actions::just_pressed`].

use embassy_time::{
    Duration,
    Instant,
};

mod keyboard;
mod pad;

pub use keyboard::{
    KeyboardReport,
    KeyboardTranslator,
    key,
};
pub use pad::{
    ButtonPadTranslator,
    PadButton,
};

/// Default window for [`Actions::just_pressed`] and [`Actions::just_released`].
pub const JUST_THRESHOLD: Duration = Duration::from_millis(50);

/// Axis value for a full left/up deflection.
pub const AXIS_NEGATIVE: i8 = -128;
/// Axis value for a full right/down deflection.
pub const AXIS_POSITIVE: i8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Action {
    HorizontalMove,
    VerticalMove,
    Attack,
    Use,
    Pause,
}

impl Action {
    pub const COUNT: usize = 5;
    pub const ALL: [Self; Self::COUNT] = [
        Self::HorizontalMove,
        Self::VerticalMove,
        Self::Attack,
        Self::Use,
        Self::Pause,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Latest state of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionState {
    pub pressed: bool,
    /// Deflection for move actions, `0` for buttons.
    pub axis: i8,
    /// When `pressed` or `axis` last changed.
    pub timestamp: Instant,
}

impl ActionState {
    const IDLE: Self = Self {
        pressed: false,
        axis: 0,
        timestamp: Instant::from_ticks(0),
    };
}

/// What a single report says is held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub attack: bool,
    pub interact: bool,
    pub pause: bool,
}

impl Controls {
    fn axis(negative: bool, positive: bool) -> i8 {
        match (negative, positive) {
            (true, false) => AXIS_NEGATIVE,
            (false, true) => AXIS_POSITIVE,
            _ => 0,
        }
    }

    fn state_of(&self, action: Action) -> (bool, i8) {
        match action {
            Action::HorizontalMove => {
                let axis = Self::axis(self.left, self.right);
                (axis != 0, axis)
            }
            Action::VerticalMove => {
                let axis = Self::axis(self.up, self.down);
                (axis != 0, axis)
            }
            Action::Attack => (self.attack, 0),
            Action::Use => (self.interact, 0),
            Action::Pause => (self.pause, 0),
        }
    }
}

/// Parses one kind of input report.
pub trait Translator {
    /// `None` when the report is malformed; the previous state is kept then.
    fn translate(&mut self, report: &[u8]) -> Option<Controls>;
}

/// Per-action state table.
#[derive(Debug, Clone)]
pub struct Actions {
    states: [ActionState; Action::COUNT],
}

impl Default for Actions {
    fn default() -> Self {
        Self::new()
    }
}

impl Actions {
    pub const fn new() -> Self {
        Self {
            states: [ActionState::IDLE; Action::COUNT],
        }
    }

    pub fn get(&self, action: Action) -> &ActionState {
        &self.states[action.index()]
    }

    pub fn is_pressed(&self, action: Action) -> bool {
        self.get(action).pressed
    }

    pub fn axis(&self, action: Action) -> i8 {
        self.get(action).axis
    }

    pub fn just_pressed(&self, action: Action) -> bool {
        self.just_pressed_at(action, Instant::now(), JUST_THRESHOLD)
    }

    pub fn just_released(&self, action: Action) -> bool {
        self.just_released_at(action, Instant::now(), JUST_THRESHOLD)
    }

    /// Pressed, and the press happened no more than `threshold` before `now`.
    pub fn just_pressed_at(&self, action: Action, now: Instant, threshold: Duration) -> bool {
        let state = self.get(action);
        state.pressed && Self::within(state.timestamp, now, threshold)
    }

    pub fn just_released_at(&self, action: Action, now: Instant, threshold: Duration) -> bool {
        let state = self.get(action);
        !state.pressed
            && state.timestamp.as_ticks() != 0
            && Self::within(state.timestamp, now, threshold)
    }

    fn within(then: Instant, now: Instant, threshold: Duration) -> bool {
        now.checked_duration_since(then)
            .is_some_and(|elapsed| elapsed <= threshold)
    }

    /// Translate `report` and fold it in. Returns `false` for a rejected report.
    pub fn update<T: Translator + ?Sized>(
        &mut self,
        translator: &mut T,
        report: &[u8],
        now: Instant,
    ) -> bool {
        match translator.translate(report) {
            Some(controls) => {
                self.apply(controls, now);
                true
            }
            None => {
                trace!("input report of {} bytes rejected", report.len());
                false
            }
        }
    }

    /// Record the held controls, stamping every action whose state changed.
    pub fn apply(&mut self, controls: Controls, now: Instant) {
        for action in Action::ALL {
            let (pressed, axis) = controls.state_of(action);
            let state = &mut self.states[action.index()];
            if state.pressed != pressed || state.axis != axis {
                *state = ActionState {
                    pressed,
                    axis,
                    timestamp: now,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn edges_are_time_limited() {
        let mut actions = Actions::new();
        actions.apply(
            Controls {
                attack: true,
                ..Default::default()
            },
            at(1000),
        );

        assert!(actions.is_pressed(Action::Attack));
        assert!(actions.just_pressed_at(Action::Attack, at(1050), JUST_THRESHOLD));
        assert!(!actions.just_pressed_at(Action::Attack, at(1051), JUST_THRESHOLD));

        // Holding does not re-stamp.
        actions.apply(
            Controls {
                attack: true,
                ..Default::default()
            },
            at(2000),
        );
        assert_eq!(actions.get(Action::Attack).timestamp, at(1000));

        actions.apply(Controls::default(), at(3000));
        assert!(actions.just_released_at(Action::Attack, at(3010), JUST_THRESHOLD));
        assert!(!actions.just_pressed_at(Action::Attack, at(3010), JUST_THRESHOLD));
    }

    #[test]
    fn untouched_actions_were_never_released() {
        let actions = Actions::new();
        assert!(!actions.just_released_at(Action::Pause, at(0), JUST_THRESHOLD));
    }

    #[test]
    fn opposite_directions_cancel() {
        let mut actions = Actions::new();
        actions.apply(
            Controls {
                left: true,
                down: true,
                ..Default::default()
            },
            at(10),
        );
        assert_eq!(actions.axis(Action::HorizontalMove), AXIS_NEGATIVE);
        assert_eq!(actions.axis(Action::VerticalMove), AXIS_POSITIVE);

        actions.apply(
            Controls {
                left: true,
                right: true,
                ..Default::default()
            },
            at(20),
        );
        assert_eq!(actions.axis(Action::HorizontalMove), 0);
        assert!(!actions.is_pressed(Action::HorizontalMove));
        assert!(!actions.is_pressed(Action::VerticalMove));
    }
}
