//! # EDFOS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time; no dynamic allocation.

/// Maximum number of threads the thread table can hold.
pub const MAX_THREADS: usize = 32;

/// Total bytes in the stack pool that thread stacks are carved from.
/// `MAX_THREADS` stacks of `STACK_SIZE` bytes fit exactly.
pub const STACK_POOL_SIZE: usize = 0x4000;

/// Bytes handed out per thread stack, regardless of what the thread needs.
pub const STACK_SIZE: usize = 0x200;

/// Words in a full exception frame (software half + hardware half).
pub const FRAME_WORDS: usize = 16;

/// Words the kernel saves and restores in software (R4–R11).
pub const SOFTWARE_FRAME_WORDS: usize = 8;

/// Time slice given to threads created without explicit parameters.
pub const DEFAULT_TIMESLICE: u32 = 5;

/// Deadline (and period) given to threads created without explicit parameters.
pub const DEFAULT_DEADLINE: u32 = 10;

/// Value placed in every general-purpose slot of a fresh exception frame
/// that has no meaningful initial content.
pub const FRAME_SENTINEL: usize = 0xA;

/// xPSR with only the Thumb execution-state bit set.
pub const XPSR_THUMB: usize = 1 << 24;

/// Marker written at the lowest word of every thread stack.
pub const STACK_CANARY: usize = 0xC0DE_5AFE;

/// Priority bits the STM32F401 implements; the low nibble of every
/// priority byte reads back as zero.
pub const PRIORITY_MASK: u8 = 0xF0;

/// SVCall priority. Must be numerically lower (more urgent) than PendSV,
/// within the implemented bits, so that a supervisor call is never
/// preempted by a pending switch.
pub const SVCALL_PRIORITY: u8 = 0xE0;

/// SysTick priority. Shares the SVCall level so the tick and supervisor
/// calls never nest.
pub const SYSTICK_PRIORITY: u8 = 0xE0;

/// PendSV priority, the lowest used by the kernel.
pub const PENDSV_PRIORITY: u8 = 0xF0;

/// SysTick frequency in Hz when the timeslice tick is enabled.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI after reset).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_survive_truncation() {
        let svcall = SVCALL_PRIORITY & PRIORITY_MASK;
        let systick = SYSTICK_PRIORITY & PRIORITY_MASK;
        let pendsv = PENDSV_PRIORITY & PRIORITY_MASK;

        assert_eq!(svcall, SVCALL_PRIORITY);
        assert_eq!(pendsv, PENDSV_PRIORITY);
        assert!(svcall < pendsv);
        assert_eq!(systick, svcall);
    }
}
