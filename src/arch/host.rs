//! # Host Port
//!
//! A simulated Cortex-M register file for running the kernel off-target.
//! No thread code ever executes; instead the port reproduces what the CPU
//! and the trap trampolines do to the process stack:
//!
//! - exception entry stacks R0–R3, R12, LR, PC, xPSR below PSP
//! - the PendSV trampoline stores R4–R11 below that without moving PSP
//! - after `switch_context` the trampoline pops R4–R11 from the new PSP
//! - exception return unstacks the hardware half and resumes at PC
//!
//! That is enough to check that a frame built by the kernel, or left by a
//! suspended thread, resumes with exactly the registers it should.

use crate::arch::ContextSwitch;
use crate::error::{fatal, KernelError};
use crate::frame::{ExceptionFrame, HardwareFrame, SoftwareFrame, Word};
use crate::kernel;
use crate::scheduler::Scheduler;
use crate::svc::{SupervisorCall, TrapExit};
use crate::thread::ThreadId;

/// Execution mode of the simulated core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Thread mode on the main stack, as after reset.
    Privileged,
    /// Thread mode on the process stack, as threads run.
    Unprivileged,
}

/// The simulated core registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub software: SoftwareFrame,
    pub hardware: HardwareFrame,
}

impl Registers {
    const fn zeroed() -> Self {
        Self {
            software: SoftwareFrame {
                r4: 0,
                r5: 0,
                r6: 0,
                r7: 0,
                r8: 0,
                r9: 0,
                r10: 0,
                r11: 0,
            },
            hardware: HardwareFrame {
                r0: 0,
                r1: 0,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: 0,
                pc: 0,
                xpsr: 0,
            },
        }
    }
}

/// Simulated Cortex-M4 core.
pub struct HostPort {
    psp: *mut Word,
    registers: Registers,
    mode: Mode,
    switch_pending: bool,
    priorities_configured: bool,
}

// Safety: the simulated PSP points into the kernel's own stack pool, which
// is only touched inside critical sections.
unsafe impl Send for HostPort {}

impl HostPort {
    pub const fn new() -> Self {
        Self {
            psp: core::ptr::null_mut(),
            registers: Registers::zeroed(),
            mode: Mode::Privileged,
            switch_pending: false,
            priorities_configured: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Registers of the running thread, for tests to scribble on.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn switch_pending(&self) -> bool {
        self.switch_pending
    }

    pub fn priorities_configured(&self) -> bool {
        self.priorities_configured
    }

    /// Exception entry: push the hardware half onto the process stack.
    ///
    /// # Safety
    /// PSP must point into a thread stack with room for the frame.
    unsafe fn stack_hardware_frame(&mut self) {
        let frame = (self.psp as *mut HardwareFrame).sub(1);
        core::ptr::write(frame, self.registers.hardware);
        self.psp = frame as *mut Word;
    }

    /// Exception return: pop the hardware half and resume at its PC.
    ///
    /// # Safety
    /// PSP must point at a hardware frame.
    unsafe fn unstack_hardware_frame(&mut self) {
        let frame = self.psp as *const HardwareFrame;
        self.registers.hardware = core::ptr::read(frame);
        self.psp = frame.add(1) as *mut Word;
        self.mode = Mode::Unprivileged;
    }

    /// `stmdb r0, {r4-r11}` with `r0 = psp`; PSP itself is not written.
    ///
    /// # Safety
    /// PSP must point into a thread stack with room below it.
    unsafe fn save_software_registers(&mut self) {
        let frame = (self.psp as *mut SoftwareFrame).sub(1);
        core::ptr::write(frame, self.registers.software);
    }

    /// `ldmia r0!, {r4-r11}` with `r0 = psp`, then `msr psp, r0`.
    ///
    /// # Safety
    /// PSP must point at a software half.
    unsafe fn restore_software_registers(&mut self) {
        let frame = self.psp as *const SoftwareFrame;
        self.registers.software = core::ptr::read(frame);
        self.psp = frame.add(1) as *mut Word;
    }

    /// Context-switch trap entry: take the pending switch, stack the
    /// hardware half and store R4–R11 below it. Returns `false` when no
    /// switch was pending.
    ///
    /// # Safety
    /// PSP must point into the running thread's stack.
    unsafe fn enter_pend_switch(&mut self) -> bool {
        if !self.switch_pending {
            return false;
        }
        self.switch_pending = false;
        self.stack_hardware_frame();
        self.save_software_registers();
        true
    }

    /// Context-switch trap exit: pop R4–R11 from the new PSP, then return
    /// from the exception.
    ///
    /// # Safety
    /// PSP must point at a complete frame.
    unsafe fn exit_pend_switch(&mut self) {
        self.restore_software_registers();
        self.unstack_hardware_frame();
    }

    /// The hardware half exception entry stacks for an `svc` encoded as
    /// `code`: the current registers, with PC just past the instruction.
    fn svc_frame(&self, code: &[u8; 2]) -> HardwareFrame {
        let mut frame = self.registers.hardware;
        frame.pc = code.as_ptr() as Word + code.len();
        frame
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSwitch for HostPort {
    fn configure_priorities(&mut self) {
        self.priorities_configured = true;
    }

    fn active_stack_pointer(&self) -> *mut Word {
        self.psp
    }

    fn set_active_stack_pointer(&mut self, sp: *mut Word) {
        self.psp = sp;
    }

    fn trigger_switch(&mut self) {
        self.switch_pending = true;
    }

    fn start_first_thread(&mut self) {
        // Safety: `RunFirstThread` loaded PSP with a frame the kernel built.
        unsafe {
            self.restore_software_registers();
            self.unstack_hardware_frame();
        }
    }
}

impl Scheduler<HostPort> {
    /// Take the context-switch interrupt if one is pending, performing the
    /// same steps as the Cortex-M4 PendSV entry and exit. Returns the
    /// thread that now runs.
    pub fn service_pending_switch(&mut self) -> Result<Option<ThreadId>, KernelError> {
        if !self.port().switch_pending {
            return Ok(None);
        }
        if !self.is_launched() {
            return Err(KernelError::NotStarted);
        }

        // Safety: once launched, PSP points into the running thread's stack.
        unsafe { self.port_mut().enter_pend_switch() };
        let next = self.switch_context()?;
        // Safety: `switch_context` loaded PSP from a saved or initial frame.
        unsafe { self.port_mut().exit_pend_switch() };
        Ok(Some(next))
    }

    /// Execute `svc` for `call` as the simulated core would, including the
    /// first-thread launch.
    pub fn trap_supervisor_call(&mut self, call: SupervisorCall) -> Result<TrapExit, KernelError> {
        let code = call.instruction();
        let frame = self.port().svc_frame(&code);

        // Safety: `frame.pc` sits just past a real `svc` encoding.
        let exit = unsafe { self.supervisor_call(&frame)? };
        if exit == TrapExit::StartFirstThread {
            self.port_mut().start_first_thread();
        }
        Ok(exit)
    }

    /// The frame a suspended thread will resume from.
    pub fn saved_frame(&self, id: ThreadId) -> Option<ExceptionFrame> {
        let tcb = self.table().get(id)?;
        // Safety: every TCB's stack pointer refers to a complete frame.
        Some(unsafe { ExceptionFrame::read_from(tcb.stack_pointer) })
    }
}

/// Issue a supervisor call against the global kernel, then take a pended
/// context switch the way the CPU would tail-chain into PendSV.
///
/// Each step runs the same kernel trap body the Cortex-M4 handlers call;
/// only the register shuffling around them is simulated here.
pub fn supervisor_call(call: SupervisorCall) {
    let code = call.instruction();
    let frame = on_port(|port| port.svc_frame(&code));

    // Safety: `frame.pc` sits just past `code`, which outlives the call.
    if unsafe { kernel::on_supervisor_call(&frame) } == TrapExit::StartFirstThread {
        on_port(|port| port.start_first_thread());
    }

    // Safety: a switch is only ever pended once a thread owns PSP.
    if on_port(|port| unsafe { port.enter_pend_switch() }) {
        kernel::on_pend_switch();
        // Safety: the switch body loaded PSP from a complete frame.
        on_port(|port| unsafe { port.exit_pend_switch() });
    }
}

/// Run `f` on the global kernel's simulated core.
fn on_port<R>(f: impl FnOnce(&mut HostPort) -> R) -> R {
    kernel::with_scheduler(|sched| Ok(f(sched.port_mut()))).unwrap_or_else(|err| fatal(err))
}
