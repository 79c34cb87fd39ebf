//! # EDFOS: Earliest Deadline First Operating System
//!
//! A minimal preemptive real-time kernel for single-core ARM Cortex-M4
//! microcontrollers. Threads get a fixed 512-byte stack and a deadline; the
//! scheduler always runs the thread with the earliest deadline.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   Application Threads                   │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   initialize() · create_thread*() · start() · yield()  │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │  Scheduler   │  Supervisor Calls │  Sync                │
//! │  scheduler.rs│  svc.rs           │  sync.rs             │
//! │  ─ spawn()   │  ─ decode()       │  ─ critical_section  │
//! │  ─ switch()  │  ─ dispatch()     │                      │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │   Threads (thread.rs) · Stacks (stack.rs) · Frames     │
//! │   TCB · ThreadTable · StackPool · ExceptionFrame        │
//! ├────────────────────────────────────────────────────────┤
//! │      Arch Port (arch/cortex_m4.rs · arch/host.rs)       │
//! │      SVCall · PendSV · SysTick · First-thread launch    │
//! ├────────────────────────────────────────────────────────┤
//! │            ARM Cortex-M4 Hardware (Thumb-2)             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **EDF**: the thread with the smallest `deadline` runs; ties go to the
//!   thread created first
//! - **Static deadlines**: deadlines are fixed at creation; `period` is
//!   recorded but never used to advance them
//! - **Switch points**: a voluntary `yield_thread()`, or SysTick expiry of
//!   the running thread's `runtime` once `enable_tick()` has been called
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed thread table**: at most `MAX_THREADS` (32) threads
//! - **Stack pool**: 16 KiB, carved into 512-byte stacks top-down
//! - **Create-only**: threads and stacks are never reclaimed
//! - **Critical sections**: `critical_section::with()` for shared state

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod macros;

pub mod arch;
pub mod config;
pub mod error;
pub mod frame;
pub mod kernel;
pub mod scheduler;
pub mod stack;
pub mod svc;
pub mod sync;
pub mod thread;

pub use error::KernelError;
pub use thread::{ThreadEntry, ThreadId};
