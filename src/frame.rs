//! # Exception Frame
//!
//! The register image a suspended thread leaves on its own stack. The
//! Cortex-M4 stacks the upper half automatically on exception entry; the
//! kernel's PendSV trampoline saves the lower half in software. A new thread
//! gets a hand-built frame so that its first dispatch looks exactly like
//! resuming from a context switch.
//!
//! ## Layout (low address first)
//!
//! ```text
//!  saved stack pointer ─► ┌───────┐
//!                         │  R4   │  software half
//!                         │  ...  │  (pushed/popped by the kernel)
//!                         │  R11  │
//!                         ├───────┤
//!                         │  R0   │  hardware half
//!                         │  R1   │  (stacked by the CPU on exception
//!                         │  R2   │   entry, popped on exception return)
//!                         │  R3   │
//!                         │  R12  │
//!                         │  LR   │
//!                         │  PC   │
//!                         │  xPSR │
//!  stack top ───────────► └───────┘
//! ```

use crate::config::{FRAME_SENTINEL, FRAME_WORDS, SOFTWARE_FRAME_WORDS, XPSR_THUMB};
use crate::stack::StackRegion;

/// One machine register. 32 bits on the Cortex-M4.
pub type Word = usize;

/// The registers the kernel saves and restores itself.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareFrame {
    pub r4: Word,
    pub r5: Word,
    pub r6: Word,
    pub r7: Word,
    pub r8: Word,
    pub r9: Word,
    pub r10: Word,
    pub r11: Word,
}

/// The registers the CPU stacks on exception entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareFrame {
    pub r0: Word,
    pub r1: Word,
    pub r2: Word,
    pub r3: Word,
    pub r12: Word,
    pub lr: Word,
    pub pc: Word,
    pub xpsr: Word,
}

impl HardwareFrame {
    /// Read the immediate operand of the `svc` instruction that trapped.
    ///
    /// `SVC #imm8` is the 16-bit Thumb encoding `0xDFxx`. The stacked PC is
    /// the address after the instruction, so the immediate is the byte two
    /// before it (little-endian).
    ///
    /// # Safety
    /// `pc` must be the return address stacked by an `svc` trap.
    pub unsafe fn svc_number(&self) -> u8 {
        core::ptr::read((self.pc as *const u8).sub(2))
    }
}

/// A complete suspended context.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub software: SoftwareFrame,
    pub hardware: HardwareFrame,
}

const _: () = assert!(core::mem::size_of::<SoftwareFrame>() == SOFTWARE_FRAME_WORDS * core::mem::size_of::<Word>());
const _: () = assert!(core::mem::size_of::<ExceptionFrame>() == FRAME_WORDS * core::mem::size_of::<Word>());

impl ExceptionFrame {
    /// The frame a thread starts from: `PC` at `entry`, `R0` carrying
    /// `argument`, Thumb state, and every other slot set to `FRAME_SENTINEL`.
    pub fn initial(entry: Word, argument: Word) -> Self {
        Self {
            software: SoftwareFrame {
                r4: FRAME_SENTINEL,
                r5: FRAME_SENTINEL,
                r6: FRAME_SENTINEL,
                r7: FRAME_SENTINEL,
                r8: FRAME_SENTINEL,
                r9: FRAME_SENTINEL,
                r10: FRAME_SENTINEL,
                r11: FRAME_SENTINEL,
            },
            hardware: HardwareFrame {
                r0: argument,
                r1: FRAME_SENTINEL,
                r2: FRAME_SENTINEL,
                r3: FRAME_SENTINEL,
                r12: FRAME_SENTINEL,
                lr: FRAME_SENTINEL,
                pc: entry,
                xpsr: XPSR_THUMB,
            },
        }
    }

    /// Write the frame at the top of `region` and return the stack pointer
    /// a context switch would save for it.
    ///
    /// # Safety
    /// `region` must be valid, writable memory not in use by anyone else.
    pub unsafe fn install(self, region: &StackRegion) -> *mut Word {
        let frame = (region.top() as *mut ExceptionFrame).sub(1);
        core::ptr::write(frame, self);
        frame as *mut Word
    }

    /// Read back the frame a stack pointer refers to.
    ///
    /// # Safety
    /// `sp` must point at a complete frame.
    pub unsafe fn read_from(sp: *const Word) -> Self {
        core::ptr::read(sp as *const ExceptionFrame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::STACK_SIZE;
    use crate::stack::{StackMemory, StackPool};

    #[test]
    fn test_initial_frame_slots() {
        let frame = ExceptionFrame::initial(0x0800_1235, 0x2000_0040);

        assert_eq!(frame.hardware.pc, 0x0800_1235);
        assert_eq!(frame.hardware.r0, 0x2000_0040);
        assert_eq!(frame.hardware.xpsr, 0x0100_0000);
        assert_eq!(frame.hardware.lr, FRAME_SENTINEL);
        assert_eq!(frame.hardware.r12, FRAME_SENTINEL);
        assert_eq!(frame.software.r4, FRAME_SENTINEL);
        assert_eq!(frame.software.r11, FRAME_SENTINEL);
    }

    #[test]
    fn test_install_places_frame_at_region_top() {
        let memory = Box::leak(Box::new(StackMemory::new()));
        let region = StackPool::new(memory).allocate().unwrap();
        let sp = unsafe { ExceptionFrame::initial(0x11, 0x22).install(&region) };

        assert_eq!(sp as usize, region.top() as usize - FRAME_WORDS * core::mem::size_of::<Word>());
        assert!(sp as usize >= region.top() as usize - STACK_SIZE);

        // Word order on the stack matches the CPU's unstacking order.
        let words = unsafe { core::slice::from_raw_parts(sp, FRAME_WORDS) };
        assert_eq!(&words[..8], &[FRAME_SENTINEL; 8]);
        assert_eq!(words[8], 0x22);
        assert_eq!(&words[9..14], &[FRAME_SENTINEL; 5]);
        assert_eq!(words[14], 0x11);
        assert_eq!(words[15], XPSR_THUMB);
    }

    #[test]
    fn test_svc_number_reads_instruction_immediate() {
        // `svc #8` little-endian, followed by whatever comes next.
        let code: [u8; 4] = [0x08, 0xDF, 0x00, 0xBF];
        let mut frame = ExceptionFrame::initial(0, 0).hardware;
        frame.pc = code.as_ptr() as Word + 2;

        assert_eq!(unsafe { frame.svc_number() }, 8);
    }
}
