//! # Supervisor Calls
//!
//! Thread code asks the kernel for privileged work with `svc #n`. The SVCall
//! trap entry hands the dispatcher the frame the CPU stacked; the call
//! number is recovered from the trapping instruction itself.
//!
//! | number | call | effect |
//! |--------|------|--------|
//! | 3 | `RunFirstThread` | load the selected thread's PSP and launch it |
//! | 8 | `Yield` | refill the caller's runtime, pend a context switch |

use crate::arch::ContextSwitch;
use crate::error::KernelError;
use crate::frame::HardwareFrame;
use crate::scheduler::Scheduler;

/// Calls the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SupervisorCall {
    RunFirstThread = 3,
    Yield = 8,
}

impl SupervisorCall {
    /// Map an `svc` immediate to a call.
    pub fn decode(number: u8) -> Result<Self, KernelError> {
        match number {
            3 => Ok(SupervisorCall::RunFirstThread),
            8 => Ok(SupervisorCall::Yield),
            n => Err(KernelError::UnknownSupervisorCall(n)),
        }
    }

    /// The Thumb `svc` instruction for this call, as it appears in memory.
    pub const fn instruction(self) -> [u8; 2] {
        [self as u8, 0xDF]
    }
}

/// What the trap exit path must do after the dispatcher returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrapExit {
    /// Return to the caller normally.
    Return,
    /// The active stack pointer now holds the first thread's frame; call
    /// the port's startup primitive.
    StartFirstThread,
}

impl<P: ContextSwitch> Scheduler<P> {
    /// Handle a supervisor-call trap.
    ///
    /// # Safety
    /// `frame` must be the frame stacked by an `svc` instruction, so that
    /// its PC points just past that instruction.
    pub unsafe fn supervisor_call(&mut self, frame: &HardwareFrame) -> Result<TrapExit, KernelError> {
        let call = SupervisorCall::decode(frame.svc_number())?;
        self.dispatch(call)
    }

    /// Carry out a decoded supervisor call.
    pub fn dispatch(&mut self, call: SupervisorCall) -> Result<TrapExit, KernelError> {
        log_trace!("svc {}", call);
        match call {
            SupervisorCall::RunFirstThread => {
                self.launch()?;
                Ok(TrapExit::StartFirstThread)
            }
            SupervisorCall::Yield => {
                self.yield_current()?;
                Ok(TrapExit::Return)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::HostPort;
    use crate::frame::{ExceptionFrame, Word};
    use crate::stack::StackMemory;
    use core::ffi::c_void;

    extern "C" fn worker(_: *mut c_void) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn scheduler() -> Scheduler<HostPort> {
        Scheduler::new(HostPort::new(), Box::leak(Box::new(StackMemory::new())))
    }

    /// The frame an `svc` encoded as `code` would leave behind.
    fn trapped_at(code: &[u8; 2]) -> HardwareFrame {
        let mut frame = ExceptionFrame::initial(0, 0).hardware;
        frame.pc = code.as_ptr() as Word + code.len();
        frame
    }

    #[test]
    fn test_decode_known_calls() {
        assert_eq!(SupervisorCall::decode(3), Ok(SupervisorCall::RunFirstThread));
        assert_eq!(SupervisorCall::decode(8), Ok(SupervisorCall::Yield));
    }

    #[test]
    fn test_decode_rejects_unknown_numbers() {
        assert_eq!(
            SupervisorCall::decode(0),
            Err(KernelError::UnknownSupervisorCall(0))
        );
        assert_eq!(
            SupervisorCall::decode(0xFF),
            Err(KernelError::UnknownSupervisorCall(0xFF))
        );
    }

    #[test]
    fn test_instruction_encoding() {
        assert_eq!(SupervisorCall::RunFirstThread.instruction(), [0x03, 0xDF]);
        assert_eq!(SupervisorCall::Yield.instruction(), [0x08, 0xDF]);
    }

    #[test]
    fn test_unknown_call_is_rejected_without_side_effects() {
        let mut sched = scheduler();
        sched.create_thread(worker, core::ptr::null_mut()).unwrap();
        sched.start().unwrap();
        let remaining = sched.pool().remaining();

        let code = [0x42, 0xDF];
        let result = unsafe { sched.supervisor_call(&trapped_at(&code)) };

        assert_eq!(result, Err(KernelError::UnknownSupervisorCall(0x42)));
        assert_eq!(sched.table().len(), 1);
        assert_eq!(sched.pool().remaining(), remaining);
        assert!(!sched.is_launched());
        assert!(!sched.port().switch_pending());
        assert!(sched.port().active_stack_pointer().is_null());
    }

    #[test]
    fn test_run_first_thread_launches() {
        let mut sched = scheduler();
        let id = sched.create_thread(worker, core::ptr::null_mut()).unwrap();
        sched.start().unwrap();

        let code = SupervisorCall::RunFirstThread.instruction();
        let result = unsafe { sched.supervisor_call(&trapped_at(&code)) };

        assert_eq!(result, Ok(TrapExit::StartFirstThread));
        assert!(sched.is_launched());
        assert_eq!(
            sched.port().active_stack_pointer(),
            sched.table().get(id).unwrap().stack_pointer
        );
    }
}
