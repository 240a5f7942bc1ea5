use core::sync::atomic::{
    AtomicU8,
    Ordering,
};

use super::{
    MAX_TRACKS,
    TrackId,
};

const ALL_BOOKED: u8 = (1 << MAX_TRACKS) - 1;

/// Which track slots are taken, one bit per slot.
///
/// Booking is a single atomic read-modify-write, so a slot can only be booked
/// by one caller at a time even when `play` races `update`.
pub(crate) struct TrackSlots(AtomicU8);

impl TrackSlots {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Returns `true` when the slot was free and is now booked by the caller.
    pub(crate) fn try_book(&self, id: TrackId) -> bool {
        let bit = id.bit();
        self.0.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Mark the slot booked whatever its previous state.
    pub(crate) fn book(&self, id: TrackId) {
        self.0.fetch_or(id.bit(), Ordering::AcqRel);
    }

    pub(crate) fn release(&self, id: TrackId) {
        self.0.fetch_and(!id.bit(), Ordering::AcqRel);
    }

    pub(crate) fn is_booked(&self, id: TrackId) -> bool {
        self.0.load(Ordering::Acquire) & id.bit() != 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.0.load(Ordering::Acquire) & ALL_BOOKED == ALL_BOOKED
    }

    pub(crate) fn booked(&self) -> impl Iterator<Item = TrackId> + '_ {
        TrackId::all().filter(|&id| self.is_booked(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_slot_is_booked_once() {
        let slots = TrackSlots::new();
        let id = TrackId::all().nth(2).unwrap();
        assert!(slots.try_book(id));
        assert!(!slots.try_book(id));
        assert!(slots.is_booked(id));

        slots.release(id);
        assert!(!slots.is_booked(id));
        assert!(slots.try_book(id));
    }

    #[test]
    fn full_after_every_slot_is_booked() {
        let slots = TrackSlots::new();
        for id in TrackId::all() {
            assert!(!slots.is_full());
            assert!(slots.try_book(id));
        }
        assert!(slots.is_full());
        assert_eq!(slots.booked().count(), MAX_TRACKS);
    }
}
