//! Fixed set of frame buffers in one contiguous allocation.

use alloc::{
    boxed::Box,
    vec::Vec,
};
use core::{
    ptr::NonNull,
    sync::atomic::{
        AtomicU8,
        Ordering,
    },
};

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::RgbColor,
};

use super::InitError;

/// `buffer_count` pixel buffers of `buffer_length` colours each.
///
/// The pool only tracks which buffer is *current* (owned by the display path);
/// the *next* buffer is always `(current + 1) % buffer_count`. Who may touch
/// which buffer at what time is decided by the fences in
/// [`Renderer`](super::Renderer), not here.
pub(crate) struct FramePool {
    pixels: NonNull<Rgb565>,
    buffer_length: usize,
    buffer_count: u8,
    current: AtomicU8,
}

// SAFETY: the storage is a plain heap allocation. Concurrent access is limited
// to disjoint buffers by the render fences; see `Renderer`.
unsafe impl Send for FramePool {}
unsafe impl Sync for FramePool {}

impl FramePool {
    /// Allocate the buffers, refusing when `required >= memory_limit`.
    pub(crate) fn new(
        buffer_count: u8,
        buffer_length: usize,
        memory_limit: usize,
    ) -> Result<Self, InitError> {
        let total = buffer_length
            .checked_mul(usize::from(buffer_count))
            .ok_or(InitError::NotEnoughMemory)?;
        let required = total
            .checked_mul(size_of::<Rgb565>())
            .ok_or(InitError::NotEnoughMemory)?;
        if required >= memory_limit {
            return Err(InitError::NotEnoughMemory);
        }

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(total)
            .map_err(|_| InitError::NotEnoughMemory)?;
        storage.resize(total, Rgb565::BLACK);

        let raw = Box::into_raw(storage.into_boxed_slice());
        // SAFETY: `Box::into_raw` never returns null.
        let pixels = unsafe { NonNull::new_unchecked(raw.cast::<Rgb565>()) };

        Ok(Self {
            pixels,
            buffer_length,
            buffer_count,
            current: AtomicU8::new(0),
        })
    }

    pub(crate) const fn buffer_count(&self) -> u8 {
        self.buffer_count
    }

    pub(crate) fn current_index(&self) -> u8 {
        self.current.load(Ordering::Acquire)
    }

    pub(crate) fn next_index(&self) -> u8 {
        (self.current_index() + 1) % self.buffer_count
    }

    /// Hand the next buffer over to the display path. Returns the new current index.
    pub(crate) fn advance(&self) -> u8 {
        let next = self.next_index();
        self.current.store(next, Ordering::Release);
        next
    }

    /// # Safety
    ///
    /// No mutable view of buffer `index` may be alive.
    pub(crate) unsafe fn buffer(&self, index: u8) -> &[Rgb565] {
        debug_assert!(index < self.buffer_count);
        // SAFETY: in bounds of the allocation; aliasing upheld by the caller.
        unsafe {
            core::slice::from_raw_parts(self.buffer_ptr(index), self.buffer_length)
        }
    }

    /// # Safety
    ///
    /// No other view of buffer `index` may be alive while the returned slice is.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn buffer_mut(&self, index: u8) -> &mut [Rgb565] {
        debug_assert!(index < self.buffer_count);
        // SAFETY: in bounds of the allocation; aliasing upheld by the caller.
        unsafe {
            core::slice::from_raw_parts_mut(self.buffer_ptr(index), self.buffer_length)
        }
    }

    fn buffer_ptr(&self, index: u8) -> *mut Rgb565 {
        // SAFETY: `index < buffer_count`, so the offset stays inside the allocation.
        unsafe {
            self.pixels
                .as_ptr()
                .add(self.buffer_length * usize::from(index))
        }
    }
}

impl Drop for FramePool {
    fn drop(&mut self) {
        let total = self.buffer_length * usize::from(self.buffer_count);
        // SAFETY: reconstructs exactly the boxed slice leaked in `new`.
        unsafe {
            drop(Box::from_raw(core::ptr::slice_from_raw_parts_mut(
                self.pixels.as_ptr(),
                total,
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_buffer_follows_current() {
        let pool = FramePool::new(3, 16, usize::MAX).unwrap();
        assert_eq!(pool.current_index(), 0);
        assert_eq!(pool.next_index(), 1);
        assert_eq!(pool.advance(), 1);
        assert_eq!(pool.advance(), 2);
        assert_eq!(pool.next_index(), 0);
        assert_eq!(pool.advance(), 0);
    }

    #[test]
    fn single_buffer_is_its_own_next() {
        let pool = FramePool::new(1, 4, usize::MAX).unwrap();
        assert_eq!(pool.next_index(), pool.current_index());
    }

    #[test]
    fn buffers_do_not_overlap() {
        let pool = FramePool::new(2, 8, usize::MAX).unwrap();
        unsafe {
            pool.buffer_mut(1).fill(Rgb565::RED);
            assert!(pool.buffer(0).iter().all(|&c| c == Rgb565::BLACK));
            assert!(pool.buffer(1).iter().all(|&c| c == Rgb565::RED));
        }
    }

    #[test]
    fn refuses_allocation_over_the_limit() {
        // 2 buffers * 10 pixels * 2 bytes = 40 bytes
        assert_eq!(
            FramePool::new(2, 10, 40).err(),
            Some(InitError::NotEnoughMemory)
        );
        assert!(FramePool::new(2, 10, 41).is_ok());
    }
}
