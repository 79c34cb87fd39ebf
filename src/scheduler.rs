//! # Scheduler
//!
//! Earliest-Deadline-First scheduling over the thread table.
//!
//! ## Scheduling Algorithm
//!
//! Every scheduling point (first start, each PendSV) runs the same
//! selection:
//! 1. **Scan** all created threads in creation order
//! 2. **Pick** the one with the smallest `deadline`; on ties the first one
//!    seen wins
//!
//! Deadlines are static: nothing in the scheduler recomputes or advances
//! them, so the selection only changes when new threads are created.
//!
//! ## Context Switch
//!
//! `switch_context()` runs inside PendSV after the hardware has stacked the
//! upper half of the frame and the trampoline has pushed R4–R11 below PSP
//! (without writing PSP back). It records `PSP - 8 words` as the suspended
//! thread's stack pointer, selects the next thread and loads that thread's
//! stack pointer into PSP for the trampoline to restore from.
//!
//! ## Launch
//!
//! `start()` only chooses the first thread. Until `RunFirstThread` has
//! loaded that thread's frame into PSP there is no thread context to save,
//! so ticks, yields and switches are refused before then.

use core::ffi::c_void;

use crate::arch::ContextSwitch;
use crate::config::{DEFAULT_DEADLINE, DEFAULT_TIMESLICE, SOFTWARE_FRAME_WORDS};
use crate::error::KernelError;
use crate::frame::{ExceptionFrame, Word};
use crate::stack::{StackMemory, StackPool};
use crate::thread::{Tcb, ThreadEntry, ThreadId, ThreadParams, ThreadTable};

/// Return the thread with the earliest deadline, or `None` if the table is
/// empty. Among equal deadlines the lowest id wins.
pub fn earliest_deadline(table: &ThreadTable) -> Option<ThreadId> {
    let mut best: Option<(ThreadId, u32)> = None;

    for (id, tcb) in table.iter() {
        match best {
            Some((_, deadline)) if tcb.deadline >= deadline => {}
            _ => best = Some((id, tcb.deadline)),
        }
    }

    best.map(|(id, _)| id)
}

/// The kernel context: thread table, stack pool and the port they are
/// switched on. One instance owns all scheduling state for its lifetime.
pub struct Scheduler<P> {
    table: ThreadTable,
    pool: StackPool,
    port: P,
    /// Set once `RunFirstThread` has handed PSP to the first thread.
    launched: bool,
}

impl<P: ContextSwitch> Scheduler<P> {
    /// Create a scheduler whose thread stacks come from `memory`.
    ///
    /// Configures trap priorities on the port.
    pub fn new(mut port: P, memory: &'static mut StackMemory) -> Self {
        port.configure_priorities();
        Self {
            table: ThreadTable::new(),
            pool: StackPool::new(memory),
            port,
            launched: false,
        }
    }

    /// Create a thread with the default timeslice (5) and deadline/period (10).
    pub fn create_thread(
        &mut self,
        entry: ThreadEntry,
        argument: *mut c_void,
    ) -> Result<ThreadId, KernelError> {
        self.create_thread_with_deadline(entry, argument, DEFAULT_TIMESLICE, DEFAULT_DEADLINE)
    }

    /// Create a thread with an explicit timeslice and deadline. The period is
    /// set equal to the deadline.
    pub fn create_thread_with_deadline(
        &mut self,
        entry: ThreadEntry,
        argument: *mut c_void,
        timeslice: u32,
        deadline: u32,
    ) -> Result<ThreadId, KernelError> {
        let params = ThreadParams {
            timeslice,
            deadline,
            period: deadline,
        };
        self.spawn(entry, argument, params)
    }

    /// Allocate a stack, build the initial frame and register the TCB.
    ///
    /// On failure neither the table nor the pool is modified.
    pub fn spawn(
        &mut self,
        entry: ThreadEntry,
        argument: *mut c_void,
        params: ThreadParams,
    ) -> Result<ThreadId, KernelError> {
        if !self.pool.can_allocate() {
            log_warn!("no stack space for new thread");
            return Err(KernelError::NoStackSpace);
        }
        if self.table.is_full() {
            log_warn!("thread table full");
            return Err(KernelError::TooManyThreads);
        }

        let stack = self.pool.allocate()?;

        let frame = ExceptionFrame::initial(entry as Word, argument as Word);
        // Safety: the pool just handed out this region and never hands it
        // out again.
        let stack_pointer = unsafe {
            stack.write_canary();
            frame.install(&stack)
        };

        let id = self
            .table
            .push(Tcb::new(entry, argument, params, stack, stack_pointer))?;

        log_debug!(
            "thread {} created: timeslice={} deadline={}",
            id.index(),
            params.timeslice,
            params.deadline
        );
        Ok(id)
    }

    /// The thread EDF would run next.
    #[inline]
    pub fn select_next(&self) -> Option<ThreadId> {
        earliest_deadline(&self.table)
    }

    /// Choose the first thread to run. The caller then issues
    /// `RunFirstThread` to launch it.
    pub fn start(&mut self) -> Result<ThreadId, KernelError> {
        let first = self.select_next().ok_or(KernelError::NoThreads)?;
        self.table.set_running(first);
        log_debug!("starting with thread {}", first.index());
        Ok(first)
    }

    /// Save the suspended thread's stack pointer, pick the next thread and
    /// load its stack pointer. Must only run inside the context-switch trap.
    ///
    /// Fails with `StackOverflow` if the suspended thread's saved context
    /// reaches its canary word or the canary has been overwritten.
    pub fn switch_context(&mut self) -> Result<ThreadId, KernelError> {
        if !self.launched {
            return Err(KernelError::NotStarted);
        }
        let current = self.table.running().ok_or(KernelError::NotStarted)?;
        let sp = self
            .port
            .active_stack_pointer()
            .wrapping_sub(SOFTWARE_FRAME_WORDS);

        let tcb = self.table.get_mut(current).ok_or(KernelError::NoThreads)?;
        // Safety: the region belongs to this thread and stays mapped forever.
        if !tcb.stack.contains(sp) || !unsafe { tcb.stack.canary_intact() } {
            return Err(KernelError::StackOverflow(current));
        }
        tcb.stack_pointer = sp;

        let next = self.select_next().ok_or(KernelError::NoThreads)?;
        self.table.set_running(next);

        let next_sp = self
            .table
            .get(next)
            .map(|tcb| tcb.stack_pointer)
            .ok_or(KernelError::NoThreads)?;
        self.port.set_active_stack_pointer(next_sp);

        log_trace!("switch {} -> {}", current.index(), next.index());
        Ok(next)
    }

    /// Refill the running thread's budget and pend a context switch.
    pub fn yield_current(&mut self) -> Result<(), KernelError> {
        if !self.launched {
            return Err(KernelError::NotStarted);
        }
        let tcb = self.table.running_mut().ok_or(KernelError::NotStarted)?;
        tcb.reset_runtime();
        self.port.trigger_switch();
        Ok(())
    }

    /// Account one timeslice tick to the running thread. Pends a context
    /// switch and returns `true` when its quantum is used up. Does nothing
    /// before the first thread is launched.
    pub fn tick(&mut self) -> bool {
        if !self.launched {
            return false;
        }
        let expired = match self.table.running_mut() {
            Some(tcb) => tcb.consume_tick(),
            None => false,
        };
        if expired {
            self.port.trigger_switch();
        }
        expired
    }

    /// Load the running thread's stack pointer into PSP and mark the
    /// kernel launched. The port's startup primitive runs next.
    pub(crate) fn launch(&mut self) -> Result<ThreadId, KernelError> {
        let id = self.table.running().ok_or(KernelError::NotStarted)?;
        let sp = self
            .table
            .get(id)
            .map(|tcb| tcb.stack_pointer)
            .ok_or(KernelError::NoThreads)?;
        self.port.set_active_stack_pointer(sp);
        self.launched = true;
        Ok(id)
    }

    /// Whether the first thread has been handed the processor.
    pub fn is_launched(&self) -> bool {
        self.launched
    }

    pub fn table(&self) -> &ThreadTable {
        &self.table
    }

    #[cfg(test)]
    pub(crate) fn table_mut(&mut self) -> &mut ThreadTable {
        &mut self.table
    }

    pub fn pool(&self) -> &StackPool {
        &self.pool
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::HostPort;
    use crate::config::{MAX_THREADS, STACK_POOL_SIZE, STACK_SIZE};

    extern "C" fn worker(_: *mut c_void) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    extern "C" fn other_worker(_: *mut c_void) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn scheduler() -> Scheduler<HostPort> {
        Scheduler::new(HostPort::new(), Box::leak(Box::new(StackMemory::new())))
    }

    fn launched(sched: &mut Scheduler<HostPort>) -> ThreadId {
        sched.start().unwrap();
        sched.launch().unwrap()
    }

    fn with_deadlines(deadlines: &[u32]) -> Scheduler<HostPort> {
        let mut sched = scheduler();
        for &d in deadlines {
            sched
                .create_thread_with_deadline(worker, core::ptr::null_mut(), 5, d)
                .unwrap();
        }
        sched
    }

    #[test]
    fn test_fresh_scheduler() {
        let sched = scheduler();
        assert_eq!(sched.table().len(), 0);
        assert_eq!(sched.table().running(), None);
        assert_eq!(sched.pool().remaining(), 16384);
        assert!(sched.port().priorities_configured());
    }

    #[test]
    fn test_default_creation_parameters() {
        let mut sched = scheduler();
        let mut value = 7u32;
        let id = sched
            .create_thread(other_worker, &mut value as *mut u32 as *mut c_void)
            .unwrap();

        let tcb = sched.table().get(id).unwrap();
        assert_eq!(tcb.timeslice, 5);
        assert_eq!(tcb.runtime, 5);
        assert_eq!(tcb.deadline, 10);
        assert_eq!(tcb.period, 10);
        assert_eq!(tcb.entry as usize, other_worker as usize);
    }

    #[test]
    fn test_deadline_creation_parameters() {
        let mut sched = scheduler();
        let id = sched
            .create_thread_with_deadline(worker, core::ptr::null_mut(), 7, 42)
            .unwrap();

        let tcb = sched.table().get(id).unwrap();
        assert_eq!(tcb.timeslice, 7);
        assert_eq!(tcb.runtime, 7);
        assert_eq!(tcb.deadline, 42);
        assert_eq!(tcb.period, 42);
    }

    #[test]
    fn test_each_creation_consumes_one_stack() {
        let mut sched = scheduler();
        for k in 1..=3 {
            sched.create_thread(worker, core::ptr::null_mut()).unwrap();
            assert_eq!(sched.pool().remaining(), STACK_POOL_SIZE - STACK_SIZE * k);
        }
        sched
            .create_thread_with_deadline(worker, core::ptr::null_mut(), 100, 1000)
            .unwrap();
        assert_eq!(sched.pool().remaining(), STACK_POOL_SIZE - STACK_SIZE * 4);
    }

    #[test]
    fn test_creation_frame_contents() {
        let mut sched = scheduler();
        let argument = 0x1234usize as *mut c_void;
        let id = sched.create_thread(worker, argument).unwrap();

        let tcb = sched.table().get(id).unwrap();
        let frame = unsafe { ExceptionFrame::read_from(tcb.stack_pointer) };
        assert_eq!(frame, ExceptionFrame::initial(worker as Word, 0x1234));
        assert_eq!(
            tcb.stack_pointer as usize + core::mem::size_of::<ExceptionFrame>(),
            tcb.stack.top() as usize
        );
    }

    #[test]
    fn test_thirty_third_creation_fails_without_side_effects() {
        let mut sched = scheduler();
        for _ in 0..MAX_THREADS {
            sched.create_thread(worker, core::ptr::null_mut()).unwrap();
        }
        assert_eq!(sched.pool().remaining(), 0);
        let cursor = sched.pool().cursor();

        let result = sched.create_thread(worker, core::ptr::null_mut());
        assert_eq!(result, Err(KernelError::NoStackSpace));
        assert_eq!(sched.table().len(), MAX_THREADS);
        assert_eq!(sched.pool().cursor(), cursor);
        assert_eq!(sched.pool().remaining(), 0);
    }

    #[test]
    fn test_edf_picks_earliest_deadline() {
        let sched = with_deadlines(&[10, 5, 8]);
        assert_eq!(sched.select_next().map(ThreadId::index), Some(1));
    }

    #[test]
    fn test_edf_ties_go_to_lowest_index() {
        let sched = with_deadlines(&[9, 3, 7, 3, 3]);
        assert_eq!(sched.select_next().map(ThreadId::index), Some(1));

        let sched = with_deadlines(&[4, 4, 4]);
        assert_eq!(sched.select_next().map(ThreadId::index), Some(0));
    }

    #[test]
    fn test_edf_selection_is_minimal() {
        let deadlines = [17, 3, 250, 3, 99, 1_000_000, 2, 2, 40];
        let sched = with_deadlines(&deadlines);
        let chosen = sched.select_next().unwrap();
        let chosen_deadline = sched.table().get(chosen).unwrap().deadline;

        for (id, tcb) in sched.table().iter() {
            assert!(chosen_deadline <= tcb.deadline);
            if tcb.deadline == chosen_deadline {
                assert!(chosen <= id);
            }
        }
        assert_eq!(chosen.index(), 6);
    }

    #[test]
    fn test_edf_handles_large_deadlines() {
        let sched = with_deadlines(&[u32::MAX, 2_000_000]);
        assert_eq!(sched.select_next().map(ThreadId::index), Some(1));
    }

    #[test]
    fn test_start_selects_second_thread() {
        let mut sched = with_deadlines(&[10, 5, 8]);
        let first = sched.start().unwrap();
        assert_eq!(first.index(), 1);
        assert_eq!(sched.table().running(), Some(first));
    }

    #[test]
    fn test_start_without_threads_fails() {
        let mut sched = scheduler();
        assert_eq!(sched.select_next(), None);
        assert_eq!(sched.start(), Err(KernelError::NoThreads));
        assert_eq!(sched.table().running(), None);
    }

    #[test]
    fn test_yield_refills_runtime_and_pends_switch() {
        let mut sched = with_deadlines(&[10, 5, 8]);
        let running = launched(&mut sched);
        sched.table.get_mut(running).unwrap().runtime = 1;

        sched.yield_current().unwrap();

        let tcb = sched.table().get(running).unwrap();
        assert_eq!(tcb.runtime, tcb.timeslice);
        assert!(sched.port().switch_pending());

        let deadlines: Vec<u32> = sched.table().iter().map(|(_, t)| t.deadline).collect();
        assert_eq!(deadlines, [10, 5, 8]);
        assert_eq!(sched.select_next(), Some(running));
    }

    #[test]
    fn test_yield_before_start_fails() {
        let mut sched = with_deadlines(&[10]);
        assert_eq!(sched.yield_current(), Err(KernelError::NotStarted));
        assert!(!sched.port().switch_pending());
    }

    #[test]
    fn test_tick_pends_switch_when_quantum_expires() {
        let mut sched = scheduler();
        sched
            .create_thread_with_deadline(worker, core::ptr::null_mut(), 2, 10)
            .unwrap();
        assert!(!sched.tick());

        launched(&mut sched);
        assert!(!sched.tick());
        assert!(!sched.port().switch_pending());
        assert!(sched.tick());
        assert!(sched.port().switch_pending());
        assert_eq!(sched.table().get(ThreadId::from_index(0)).unwrap().runtime, 2);
    }

    #[test]
    fn test_switch_before_start_fails() {
        let mut sched = with_deadlines(&[10]);
        assert_eq!(sched.switch_context(), Err(KernelError::NotStarted));
    }

    #[test]
    fn test_selected_but_not_launched_thread_is_left_alone() {
        let mut sched = scheduler();
        let only = sched
            .create_thread_with_deadline(worker, core::ptr::null_mut(), 1, 10)
            .unwrap();
        assert_eq!(sched.start(), Ok(only));
        assert!(!sched.is_launched());

        // A tick between selection and launch must not pend a switch with
        // PSP still at its reset value.
        assert!(!sched.tick());
        assert!(!sched.port().switch_pending());
        assert_eq!(sched.table().get(only).unwrap().runtime, 1);
        assert_eq!(sched.yield_current(), Err(KernelError::NotStarted));
        assert!(!sched.port().switch_pending());
        assert_eq!(sched.switch_context(), Err(KernelError::NotStarted));

        assert_eq!(sched.launch(), Ok(only));
        assert!(sched.is_launched());
        assert_eq!(
            sched.port().active_stack_pointer(),
            sched.table().get(only).unwrap().stack_pointer
        );
        assert!(sched.tick());
        assert!(sched.port().switch_pending());
    }
}
