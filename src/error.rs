//! # Kernel Errors
//!
//! Thread creation reports its failures through `Result`. Everything else
//! that can go wrong happens inside a trap handler where there is no caller
//! to report to; those conditions are fatal and end in [`fatal`].

use core::fmt;

use crate::thread::ThreadId;

/// Everything the kernel can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The stack pool cannot supply another thread stack.
    NoStackSpace,
    /// The thread table is full.
    TooManyThreads,
    /// A kernel call was made before `initialize`.
    NotInitialized,
    /// A scheduling decision was requested with no threads created.
    NoThreads,
    /// A trap that requires a running thread arrived before `start`.
    NotStarted,
    /// A supervisor call with an unassigned number was issued.
    UnknownSupervisorCall(u8),
    /// A thread ran past the bottom of its stack region.
    StackOverflow(ThreadId),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NoStackSpace => f.write_str("stack pool exhausted"),
            KernelError::TooManyThreads => f.write_str("thread table full"),
            KernelError::NotInitialized => f.write_str("kernel not initialized"),
            KernelError::NoThreads => f.write_str("no threads to schedule"),
            KernelError::NotStarted => f.write_str("kernel not started"),
            KernelError::UnknownSupervisorCall(n) => write!(f, "unknown supervisor call #{}", n),
            KernelError::StackOverflow(id) => write!(f, "stack overflow in thread {}", id.index()),
        }
    }
}

/// Stop the kernel on an unrecoverable error.
///
/// The firmware panic handler (`panic-halt`) parks the core; on the host
/// the panic surfaces in the test that caused it.
#[cold]
pub fn fatal(err: KernelError) -> ! {
    log_error!("fatal kernel error: {}", err);
    panic!("fatal kernel error: {}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_call_number() {
        let err = KernelError::UnknownSupervisorCall(42);
        assert_eq!(err.to_string(), "unknown supervisor call #42");
    }

    #[test]
    #[should_panic(expected = "stack pool exhausted")]
    fn test_fatal_panics_with_message() {
        fatal(KernelError::NoStackSpace);
    }
}
