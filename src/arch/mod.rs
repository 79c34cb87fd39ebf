//! # Architecture Abstraction Layer
//!
//! The scheduler never touches CPU registers directly; it goes through
//! [`ContextSwitch`]. The Cortex-M4 port drives the real hardware. On any
//! other target the host port simulates the same exception mechanics so
//! the kernel can be exercised in unit tests.

use crate::frame::Word;
use crate::svc::SupervisorCall;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod host;

/// The port the global kernel instance runs on.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub type Port = cortex_m4::CortexM4;

/// The port the global kernel instance runs on.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub type Port = host::HostPort;

/// CPU-specific primitives the scheduler plugs into.
///
/// Saving and restoring the software half of a frame (R4–R11) is not part
/// of this trait: it has to happen in the trap entry/exit sequences around
/// [`Scheduler::switch_context`](crate::scheduler::Scheduler::switch_context),
/// before any compiled code can clobber those registers.
pub trait ContextSwitch {
    /// Give the supervisor-call trap a strictly higher priority than the
    /// context-switch interrupt, and put the latter at the bottom.
    fn configure_priorities(&mut self);

    /// Current thread stack pointer (PSP).
    fn active_stack_pointer(&self) -> *mut Word;

    /// Replace the thread stack pointer (PSP).
    fn set_active_stack_pointer(&mut self, sp: *mut Word);

    /// Pend the context-switch interrupt and make the pend visible.
    fn trigger_switch(&mut self);

    /// Begin executing the thread whose frame the active stack pointer
    /// points at: restore the software half, then return from the exception
    /// into unprivileged thread mode. Does not return on hardware.
    fn start_first_thread(&mut self);
}

/// Issue a supervisor call from thread code.
#[inline]
pub fn supervisor_call(call: SupervisorCall) {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    cortex_m4::supervisor_call(call);

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    host::supervisor_call(call);
}

/// Wait for something to happen.
#[inline]
pub fn idle() {
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    cortex_m::asm::wfi();

    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    core::hint::spin_loop();
}
