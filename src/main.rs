//! # EDFOS Example Firmware
//!
//! Demonstrates EDF selection with three threads created in deadline order
//! 10, 5, 8:
//!
//! | Thread | Timeslice | Deadline | Behavior |
//! |--------|-----------|----------|----------|
//! | `logger_thread` | 5 | 10 | Counts, then yields |
//! | `control_thread` | 2 | 5 | Short control step, then yields |
//! | `sensor_thread` | 3 | 8 | Samples into its argument, then yields |
//!
//! `kernel::start()` launches `control_thread` first (deadline 5). Since
//! deadlines are static, EDF keeps choosing it at every switch point; the
//! other two threads only run if it is ever removed from contention, which
//! this kernel does not do. The demo therefore shows the strict behavior of
//! static-deadline EDF.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::ffi::c_void;
    use core::ptr::addr_of_mut;

    use cortex_m_rt::entry;
    use panic_halt as _;

    use edfos::kernel;

    static mut SAMPLES: u32 = 0;

    /// Low-urgency bookkeeping (deadline 10).
    extern "C" fn logger_thread(_: *mut c_void) -> ! {
        let mut lines: u32 = 0;
        loop {
            lines = lines.wrapping_add(1);
            kernel::yield_thread();
        }
    }

    /// Most urgent thread (deadline 5): a short control step per quantum.
    extern "C" fn control_thread(_: *mut c_void) -> ! {
        let mut output: u32 = 0;
        loop {
            for _ in 0..1000 {
                output = output.wrapping_add(3);
            }
            kernel::yield_thread();
        }
    }

    /// Sampling thread (deadline 8). Its argument points at the sample counter.
    extern "C" fn sensor_thread(arg: *mut c_void) -> ! {
        let samples = arg as *mut u32;
        loop {
            // Safety: `SAMPLES` is only written by this thread.
            unsafe { samples.write_volatile(samples.read_volatile().wrapping_add(1)) };
            kernel::yield_thread();
        }
    }

    /// Firmware entry point. Initializes the kernel, creates threads, and
    /// starts the EDF scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        let mut cp = cortex_m::Peripherals::take().unwrap();

        kernel::initialize();

        kernel::create_thread_with_deadline(logger_thread, core::ptr::null_mut(), 5, 10)
            .expect("Failed to create logger_thread");
        kernel::create_thread_with_deadline(control_thread, core::ptr::null_mut(), 2, 5)
            .expect("Failed to create control_thread");
        // Only `sensor_thread` ever touches `SAMPLES`.
        let samples = addr_of_mut!(SAMPLES) as *mut c_void;
        kernel::create_thread_with_deadline(sensor_thread, samples, 3, 8)
            .expect("Failed to create sensor_thread");

        // Timeslice preemption on top of voluntary yields
        kernel::enable_tick(&mut cp.SYST);

        kernel::start()
    }
}

/// Host builds have no hardware to run on; the kernel is exercised through
/// its unit tests there.
#[cfg(not(target_os = "none"))]
fn main() {}
