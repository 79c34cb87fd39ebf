//! # Kernel
//!
//! Top-level kernel initialization and public API for EDFOS.
//!
//! The kernel owns the single global scheduler instance, provides thread
//! creation, and coordinates system startup. The global instance lives in a
//! `critical_section::Mutex`, so it cannot be touched outside a critical
//! section.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::initialize()      ← priorities, stack pool, empty table
//!         ├─► kernel::create_thread*()  ← register threads (×N)
//!         └─► kernel::start()           ← pick earliest deadline (no return)
//!               └─► svc #3 ─► SVCall ─► RunFirstThread
//!                     └─► arch::cortex_m4::run_first_thread()
//! ```

use core::cell::RefCell;
use core::ffi::c_void;
use core::ptr::addr_of_mut;

use critical_section::Mutex;

use crate::arch::{self, Port};
use crate::error::{fatal, KernelError};
use crate::frame::HardwareFrame;
use crate::scheduler::Scheduler;
use crate::stack::StackMemory;
use crate::svc::{SupervisorCall, TrapExit};
use crate::sync;
use crate::thread::{ThreadEntry, ThreadId};

// ---------------------------------------------------------------------------
// Global kernel state
// ---------------------------------------------------------------------------

/// Memory all thread stacks are carved from.
static mut STACK_MEMORY: StackMemory = StackMemory::new();

/// The global scheduler. `None` until `initialize()`.
static SCHEDULER: Mutex<RefCell<Option<Scheduler<Port>>>> = Mutex::new(RefCell::new(None));

/// Run `f` on the global scheduler inside a critical section.
pub(crate) fn with_scheduler<R>(
    f: impl FnOnce(&mut Scheduler<Port>) -> Result<R, KernelError>,
) -> Result<R, KernelError> {
    sync::critical_section(|cs| {
        let mut slot = SCHEDULER.borrow_ref_mut(cs);
        let sched = slot.as_mut().ok_or(KernelError::NotInitialized)?;
        f(sched)
    })
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the EDFOS kernel.
///
/// Sets SVCall above PendSV in priority, resets the stack pool to its full
/// 16 KiB and empties the thread table. Must be called before any other
/// kernel function, from `main`, before `start()`.
pub fn initialize() {
    sync::critical_section(|cs| {
        // Safety: the only other holder of this memory is the previous
        // scheduler, which is replaced in this same critical section.
        let memory = unsafe { &mut *addr_of_mut!(STACK_MEMORY) };
        let sched = Scheduler::new(Port::new(), memory);
        SCHEDULER.borrow_ref_mut(cs).replace(sched);
    });
    log_debug!("kernel initialized");
}

/// Create a thread with timeslice 5 and deadline/period 10.
///
/// # Returns
/// - `Ok(id)`: the new thread's index
/// - `Err(KernelError::NoStackSpace)`: the stack pool is exhausted
pub fn create_thread(entry: ThreadEntry, argument: *mut c_void) -> Result<ThreadId, KernelError> {
    with_scheduler(|sched| sched.create_thread(entry, argument))
}

/// Create a thread with the given timeslice and deadline (period = deadline).
///
/// # Example
/// ```ignore
/// extern "C" fn sampler(arg: *mut c_void) -> ! { loop { /* ... */ } }
///
/// kernel::create_thread_with_deadline(sampler, core::ptr::null_mut(), 3, 20)?;
/// ```
pub fn create_thread_with_deadline(
    entry: ThreadEntry,
    argument: *mut c_void,
    timeslice: u32,
    deadline: u32,
) -> Result<ThreadId, KernelError> {
    with_scheduler(|sched| sched.create_thread_with_deadline(entry, argument, timeslice, deadline))
}

/// Start the EDFOS scheduler. **Does not return.**
///
/// Selects the earliest-deadline thread and traps into the kernel to launch
/// it. With no threads created this is a fatal `NoThreads` error.
pub fn start() -> ! {
    if let Err(err) = with_scheduler(|sched| sched.start()) {
        fatal(err);
    }

    arch::supervisor_call(SupervisorCall::RunFirstThread);

    loop {
        arch::idle();
    }
}

/// Voluntarily give up the CPU from the running thread.
///
/// Refills the thread's runtime budget and pends a context switch; EDF then
/// picks the next thread. Deadlines are not changed.
pub fn yield_thread() {
    arch::supervisor_call(SupervisorCall::Yield);
}

/// Enable timeslice preemption: SysTick at `TICK_HZ` charges the running
/// thread, and a switch is pended whenever its runtime runs out.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn enable_tick(syst: &mut cortex_m::peripheral::SYST) {
    arch::cortex_m4::configure_systick(syst);
}

/// The thread that currently owns the processor.
pub fn current_thread() -> Option<ThreadId> {
    with_scheduler(|sched| Ok(sched.table().running())).ok().flatten()
}

/// Number of threads created since `initialize()`.
pub fn thread_count() -> usize {
    with_scheduler(|sched| Ok(sched.table().len())).unwrap_or(0)
}

/// Bytes of stack pool still available for new threads.
pub fn remaining_stack() -> usize {
    with_scheduler(|sched| Ok(sched.pool().remaining())).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Trap entry points (called by the port)
// ---------------------------------------------------------------------------

/// SVCall body. The returned action is carried out by the port after the
/// critical section is released.
///
/// # Safety
/// `frame` must be the frame stacked by an `svc` instruction.
pub(crate) unsafe fn on_supervisor_call(frame: &HardwareFrame) -> TrapExit {
    with_scheduler(|sched| sched.supervisor_call(frame)).unwrap_or_else(|err| fatal(err))
}

/// PendSV body.
pub(crate) fn on_pend_switch() {
    if let Err(err) = with_scheduler(|sched| sched.switch_context()) {
        fatal(err);
    }
}

/// SysTick body. Off-target there is no timer, so only tests call it.
#[cfg_attr(not(all(target_arch = "arm", target_os = "none")), allow(dead_code))]
pub(crate) fn on_tick() {
    // Before `initialize` there is nothing to charge.
    let _ = with_scheduler(|sched| Ok(sched.tick()));
}
