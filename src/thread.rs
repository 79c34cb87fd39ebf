//! # Thread Control Blocks
//!
//! Defines the per-thread record the scheduler works with and the
//! append-only table that stores them.
//!
//! Threads are never destroyed: an id handed out by the table stays valid
//! for the life of the kernel, and ids are dense (`0..count`).

use core::ffi::c_void;

use heapless::Vec;

use crate::config::MAX_THREADS;
use crate::error::KernelError;
use crate::frame::Word;
use crate::stack::StackRegion;

/// Signature of a thread body. Threads never return; the argument given at
/// creation arrives in `R0` on first dispatch.
pub type ThreadEntry = extern "C" fn(*mut c_void) -> !;

/// Index of a thread in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(u8);

impl ThreadId {
    pub(crate) const fn from_index(index: u8) -> Self {
        Self(index)
    }

    /// Position in the thread table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scheduling parameters of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadParams {
    /// Execution budget per scheduling quantum, in ticks.
    pub timeslice: u32,
    /// Absolute deadline; the EDF sort key.
    pub deadline: u32,
    /// Nominal recurrence interval. Recorded only.
    pub period: u32,
}

/// Thread Control Block (TCB).
pub struct Tcb {
    /// Configured budget per quantum.
    pub timeslice: u32,

    /// Remaining budget in the current quantum. Reset to `timeslice` on
    /// yield and on expiry.
    pub runtime: u32,

    /// Recurrence interval. Deadlines are static, so this is never consumed.
    pub period: u32,

    /// Absolute deadline used directly as the EDF key.
    pub deadline: u32,

    /// Saved stack pointer (PSP) of the last suspended context. Points at
    /// the software half of an `ExceptionFrame`.
    pub stack_pointer: *mut Word,

    /// Thread body invoked on first dispatch.
    pub entry: ThreadEntry,

    /// Argument passed to `entry`.
    pub argument: *mut c_void,

    /// Stack granted to this thread.
    pub stack: StackRegion,
}

// Safety: the raw pointers in a TCB refer to the thread's own stack region
// and the caller-supplied argument. TCBs are only touched inside critical
// sections.
unsafe impl Send for Tcb {}

impl Tcb {
    /// Build a TCB for a thread whose initial frame is already installed at
    /// `stack_pointer`.
    pub fn new(
        entry: ThreadEntry,
        argument: *mut c_void,
        params: ThreadParams,
        stack: StackRegion,
        stack_pointer: *mut Word,
    ) -> Self {
        Self {
            timeslice: params.timeslice,
            runtime: params.timeslice,
            period: params.period,
            deadline: params.deadline,
            stack_pointer,
            entry,
            argument,
            stack,
        }
    }

    /// Restore the full budget. Called on yield.
    pub fn reset_runtime(&mut self) {
        self.runtime = self.timeslice;
    }

    /// Consume one tick of budget. Returns `true` when the quantum is used
    /// up, in which case the budget is refilled.
    pub fn consume_tick(&mut self) -> bool {
        self.runtime = self.runtime.saturating_sub(1);
        if self.runtime == 0 {
            self.reset_runtime();
            true
        } else {
            false
        }
    }
}

/// Fixed-capacity, append-only table of TCBs plus the running index.
pub struct ThreadTable {
    threads: Vec<Tcb, MAX_THREADS>,
    running: Option<ThreadId>,
}

impl ThreadTable {
    /// An empty table with no running thread.
    pub const fn new() -> Self {
        Self {
            threads: Vec::new(),
            running: None,
        }
    }

    /// Number of threads created so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.threads.is_full()
    }

    /// Append a TCB and return its id.
    pub fn push(&mut self, tcb: Tcb) -> Result<ThreadId, KernelError> {
        let id = ThreadId(self.threads.len() as u8);
        self.threads
            .push(tcb)
            .map_err(|_| KernelError::TooManyThreads)?;
        Ok(id)
    }

    pub fn get(&self, id: ThreadId) -> Option<&Tcb> {
        self.threads.get(id.index())
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Tcb> {
        self.threads.get_mut(id.index())
    }

    /// Iterate over `(id, tcb)` in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &Tcb)> {
        self.threads
            .iter()
            .enumerate()
            .map(|(i, tcb)| (ThreadId(i as u8), tcb))
    }

    /// The thread owning the processor, if the kernel has started.
    #[inline]
    pub fn running(&self) -> Option<ThreadId> {
        self.running
    }

    /// Hand the processor to `id`. Ids not in the table are ignored.
    pub fn set_running(&mut self, id: ThreadId) {
        if id.index() < self.threads.len() {
            self.running = Some(id);
        }
    }

    /// The running thread's TCB.
    pub fn running_mut(&mut self) -> Option<&mut Tcb> {
        let id = self.running?;
        self.threads.get_mut(id.index())
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{StackMemory, StackPool};

    extern "C" fn idle(_: *mut c_void) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn tcb(deadline: u32) -> Tcb {
        let memory = Box::leak(Box::new(StackMemory::new()));
        let stack = StackPool::new(memory).allocate().unwrap();
        let params = ThreadParams {
            timeslice: 3,
            deadline,
            period: deadline,
        };
        Tcb::new(idle, core::ptr::null_mut(), params, stack, stack.top())
    }

    #[test]
    fn test_table_starts_empty() {
        let table = ThreadTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.running(), None);
    }

    #[test]
    fn test_ids_are_dense_and_monotonic() {
        let mut table = ThreadTable::new();
        for i in 0..4 {
            let id = table.push(tcb(10)).unwrap();
            assert_eq!(id.index(), i);
        }
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_full_table_rejects_push() {
        let mut table = ThreadTable::new();
        for _ in 0..MAX_THREADS {
            table.push(tcb(10)).unwrap();
        }
        assert!(table.is_full());
        assert_eq!(table.push(tcb(10)).err(), Some(KernelError::TooManyThreads));
        assert_eq!(table.len(), MAX_THREADS);
    }

    #[test]
    fn test_set_running_ignores_unknown_ids() {
        let mut table = ThreadTable::new();
        let id = table.push(tcb(10)).unwrap();
        table.set_running(ThreadId(7));
        assert_eq!(table.running(), None);
        table.set_running(id);
        assert_eq!(table.running(), Some(id));
    }

    #[test]
    fn test_runtime_budget() {
        let mut tcb = tcb(10);
        assert_eq!(tcb.runtime, 3);
        assert!(!tcb.consume_tick());
        assert!(!tcb.consume_tick());
        assert_eq!(tcb.runtime, 1);
        assert!(tcb.consume_tick());
        assert_eq!(tcb.runtime, 3);

        tcb.runtime = 1;
        tcb.reset_runtime();
        assert_eq!(tcb.runtime, 3);
    }
}
