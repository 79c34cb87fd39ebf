//! # Stack Pool
//!
//! Thread stacks are carved out of one statically provisioned region with a
//! bump allocator that works downward from the top of the region. Every
//! thread gets exactly `STACK_SIZE` bytes; nothing is ever returned.
//!
//! ```text
//!  pool top ─► ┌──────────────┐ ◄─ cursor after init
//!              │  thread 0    │
//!              ├──────────────┤ ◄─ cursor after 1st allocation
//!              │  thread 1    │
//!              ├──────────────┤
//!              │     ...      │
//!  pool base ─►└──────────────┘
//! ```

use crate::config::{STACK_CANARY, STACK_POOL_SIZE, STACK_SIZE};
use crate::error::KernelError;
use crate::frame::Word;

/// Backing memory for the stack pool. Aligned to 8 bytes as required by
/// the ARM AAPCS for stack pointers at public interfaces.
#[repr(C, align(8))]
pub struct StackMemory(pub [u8; STACK_POOL_SIZE]);

impl StackMemory {
    pub const fn new() -> Self {
        Self([0u8; STACK_POOL_SIZE])
    }
}

impl Default for StackMemory {
    fn default() -> Self {
        Self::new()
    }
}

/// One thread's stack: `[bottom, top)`. The stack grows from `top` toward
/// `bottom`; the canary lives in the word at `bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    bottom: *mut Word,
    top: *mut Word,
}

impl StackRegion {
    /// Lowest address of the region.
    pub fn bottom(&self) -> *mut Word {
        self.bottom
    }

    /// One past the highest address of the region.
    pub fn top(&self) -> *mut Word {
        self.top
    }

    /// Whether a saved stack pointer still leaves the canary word untouched.
    pub fn contains(&self, sp: *const Word) -> bool {
        let sp = sp as usize;
        sp > self.bottom as usize && sp <= self.top as usize
    }

    /// Place the canary at the bottom of the region.
    ///
    /// # Safety
    /// The region must be valid, writable memory owned by the caller.
    pub unsafe fn write_canary(&self) {
        core::ptr::write_volatile(self.bottom, STACK_CANARY);
    }

    /// Check that the canary is intact.
    ///
    /// # Safety
    /// The region must be valid, readable memory.
    pub unsafe fn canary_intact(&self) -> bool {
        core::ptr::read_volatile(self.bottom) == STACK_CANARY
    }
}

/// Bump allocator over the stack memory.
pub struct StackPool {
    /// Next region ends here; decreases by `STACK_SIZE` per allocation.
    cursor: usize,
    /// Bytes still available below `cursor`.
    remaining: usize,
}

// Safety: the pool only holds addresses into memory it was given exclusive
// use of; all kernel access happens inside critical sections.
unsafe impl Send for StackPool {}

impl StackPool {
    /// Build a pool that hands out stacks from `memory`, highest first.
    pub fn new(memory: &'static mut StackMemory) -> Self {
        let base = memory.0.as_mut_ptr() as usize;
        Self {
            cursor: base + STACK_POOL_SIZE,
            remaining: STACK_POOL_SIZE,
        }
    }

    /// Whether another stack can be handed out.
    #[inline]
    pub fn can_allocate(&self) -> bool {
        self.remaining >= STACK_SIZE
    }

    /// Carve out one `STACK_SIZE` region below the cursor.
    ///
    /// # Returns
    /// - `Ok(region)`: the new stack
    /// - `Err(KernelError::NoStackSpace)`: the pool is exhausted; the
    ///   cursor and remaining capacity are left untouched
    pub fn allocate(&mut self) -> Result<StackRegion, KernelError> {
        if !self.can_allocate() {
            return Err(KernelError::NoStackSpace);
        }

        let top = self.cursor;
        self.cursor -= STACK_SIZE;
        self.remaining -= STACK_SIZE;

        Ok(StackRegion {
            bottom: self.cursor as *mut Word,
            top: top as *mut Word,
        })
    }

    /// Bytes still available for new stacks.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Address the next region will end at.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
