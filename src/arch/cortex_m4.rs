//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, kernel entry via SVCall,
//! SysTick timer configuration, and interrupt priorities.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by `main` before `start` and by all
//!   exception handlers
//! - **PSP** (Process Stack Pointer): used by threads in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler saves and restores
//! R4–R11 around the scheduler call, which completes the full context
//! save/restore.
//!
//! ## Interrupt Priorities
//!
//! - SVCall: 0xE0, so a supervisor call is never preempted by PendSV
//! - SysTick: 0xE0, so it never nests with a supervisor call
//! - PendSV: 0xF0 (lowest), so it switches only once nothing else is active
//!
//! The STM32F401 implements 4 priority bits, so only the upper nibble of
//! each value counts.
//!
//! Soft-float targets only (`thumbv7em-none-eabi`): S16–S31 are not part of
//! the software-saved half of the frame.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::psp;

use crate::arch::ContextSwitch;
use crate::config::{
    PENDSV_PRIORITY, SVCALL_PRIORITY, SYSTEM_CLOCK_HZ, SYSTICK_PRIORITY, TICK_HZ,
};
use crate::frame::{HardwareFrame, Word};
use crate::kernel;
use crate::svc::{SupervisorCall, TrapExit};

/// Handle to the core registers the kernel drives. Zero-sized: all state
/// lives in the CPU.
pub struct CortexM4 {
    _private: (),
}

impl CortexM4 {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl ContextSwitch for CortexM4 {
    fn configure_priorities(&mut self) {
        // Safety: only the kernel writes the system handler priorities, and
        // only during `initialize`.
        unsafe {
            let mut cp = cortex_m::Peripherals::steal();
            cp.SCB.set_priority(SystemHandler::SVCall, SVCALL_PRIORITY);
            cp.SCB.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
            cp.SCB.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
        }
    }

    fn active_stack_pointer(&self) -> *mut Word {
        psp::read() as *mut Word
    }

    fn set_active_stack_pointer(&mut self, sp: *mut Word) {
        // Safety: called from handler mode, where the MSP is in use, so the
        // change only takes effect on exception return.
        unsafe { psp::write(sp as u32) }
    }

    /// Sets PENDSVSET in ICSR, then an `isb` so the pend is visible before
    /// the supervisor call returns.
    fn trigger_switch(&mut self) {
        SCB::set_pendsv();
        cortex_m::asm::isb();
    }

    fn start_first_thread(&mut self) {
        // Safety: only reached from the SVCall handler after
        // `RunFirstThread` loaded PSP with a kernel-built frame.
        unsafe { run_first_thread() }
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the timeslice tick.
///
/// Sets up SysTick to fire at `TICK_HZ` using the processor clock. Each tick
/// charges the running thread one unit of its runtime budget.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Supervisor calls
// ---------------------------------------------------------------------------

/// Trap into the kernel with `svc #n`.
#[inline]
pub fn supervisor_call(call: SupervisorCall) {
    // Safety: SVCall is handled by `SVCall` below; no registers are
    // clobbered from the caller's point of view.
    unsafe {
        match call {
            SupervisorCall::RunFirstThread => {
                asm!("svc {}", const SupervisorCall::RunFirstThread as u8)
            }
            SupervisorCall::Yield => asm!("svc {}", const SupervisorCall::Yield as u8),
        }
    }
}

/// SVCall exception handler.
///
/// Works out which stack the caller was using from `EXC_RETURN` bit 2 and
/// passes the address of the stacked frame to the dispatcher.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "tst lr, #4",
        "ite eq",
        "mrseq r0, msp",
        "mrsne r0, psp",
        "b {entry}",
        entry = sym svcall_entry,
    );
}

/// Rust half of the SVCall handler.
///
/// # Safety
/// `frame` is the frame the CPU stacked for the trapping `svc`.
unsafe extern "C" fn svcall_entry(frame: *const HardwareFrame) {
    match kernel::on_supervisor_call(&*frame) {
        TrapExit::Return => {}
        // The critical section is already released here; the thread starts
        // with interrupts enabled.
        TrapExit::StartFirstThread => CortexM4::new().start_first_thread(),
    }
}

// ---------------------------------------------------------------------------
// First thread launch
// ---------------------------------------------------------------------------

/// Start the thread whose frame PSP points at.
///
/// Pops R4–R11 off the software half, drops Thread mode to unprivileged and
/// performs an exception return onto the process stack, which lets the
/// hardware pop R0–R3, R12, LR, PC and xPSR.
///
/// # Safety
/// Must run in handler mode with PSP at a complete exception frame.
#[unsafe(naked)]
unsafe extern "C" fn run_first_thread() -> ! {
    naked_asm!(
        "mrs r0, psp",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        // CONTROL.nPRIV = 1; SPSEL is set by the exception return below
        "movs r0, #1",
        "msr control, r0",
        "isb",
        // EXC_RETURN: Thread mode, process stack, basic frame
        "mov lr, #0xFFFFFFFD",
        "bx lr",
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler. Performs the actual context switch.
///
/// ## Sequence
/// 1. Store R4–R11 just below the current PSP (PSP is not written back)
/// 2. Call the scheduler, which records `PSP - 32` for the suspended thread
///    and loads the next thread's saved stack pointer into PSP
/// 3. Pop R4–R11 from the new PSP and write the advanced value back
/// 4. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR)
///
/// # Safety
/// Naked handler entered directly by the NVIC.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0, {{r4-r11}}",
        // Keep EXC_RETURN; r4 rides along for 8-byte stack alignment.
        "push {{r4, lr}}",
        "bl {switch}",
        "pop {{r4, lr}}",
        "mrs r0, psp",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "bx lr",
        switch = sym pendsv_entry,
    );
}

extern "C" fn pendsv_entry() {
    kernel::on_pend_switch();
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: timeslice accounting.
///
/// Only fires once the application has called `kernel::enable_tick`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SysTick() {
    kernel::on_tick();
}
