//! # Synchronization
//!
//! Critical sections guarding the global kernel state against the SVCall,
//! PendSV and SysTick handlers.
//!
//! On the Cortex-M4 the `critical-section` implementation comes from the
//! `cortex-m` crate's `critical-section-single-core` feature (PRIMASK based).
//! Host builds supply their own implementation, e.g. `critical-section/std`
//! in tests.

pub use critical_section::CriticalSection;

/// Execute a closure within a critical section (interrupts disabled).
///
/// All access to the global scheduler goes through here. Interrupts are
/// disabled on entry and restored to their previous state on exit, so it is
/// safe to use from handler mode.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// Keep critical sections short: PendSV and SysTick are held off for their
/// whole duration.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
