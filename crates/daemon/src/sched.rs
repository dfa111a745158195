//! Scheduling control module for convertd
//!
//! Single source of truth for the suspend flag and the CPU/IO scheduling
//! settings applied to running encoder processes. The supervising loop polls
//! this object every tick and re-applies settings to its own child when the
//! generation counter moves, so there is no locking beyond atomic reads on
//! the hot path.

use convertd_config::{CpuPriority, IoPriority, SchedulingConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared scheduling control handle
pub type SharedScheduling = Arc<SchedulingControl>;

/// Live scheduling state: suspend flag plus priority/affinity settings with
/// a generation counter that bumps on every change.
#[derive(Debug)]
pub struct SchedulingControl {
    suspended: AtomicBool,
    generation: AtomicU64,
    config: Mutex<SchedulingConfig>,
}

impl SchedulingControl {
    pub fn new(config: SchedulingConfig) -> SharedScheduling {
        Arc::new(Self {
            suspended: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            config: Mutex::new(config),
        })
    }

    /// Request suspension of all supervised encoder processes.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    /// Resume all supervised encoder processes.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Replace the scheduling settings; supervisors re-apply on their next
    /// tick.
    pub fn update_config(&self, config: SchedulingConfig) {
        let mut guard = self.config.lock().expect("scheduling lock poisoned");
        *guard = config;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Monotonic counter incremented on every settings change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> SchedulingConfig {
        self.config.lock().expect("scheduling lock poisoned").clone()
    }
}

/// Maps a CPU priority class to a Unix nice value.
pub fn nice_value(priority: CpuPriority) -> i32 {
    match priority {
        CpuPriority::Idle => 19,
        CpuPriority::BelowNormal => 10,
        CpuPriority::Normal => 0,
        CpuPriority::AboveNormal => -5,
        CpuPriority::High => -10,
    }
}

/// Maps an IO priority class to a Linux ioprio value (class in bits 13-15,
/// level in the low bits).
pub fn ioprio_value(priority: IoPriority) -> i32 {
    const CLASS_SHIFT: i32 = 13;
    const CLASS_BE: i32 = 2;
    const CLASS_IDLE: i32 = 3;
    match priority {
        IoPriority::Idle => CLASS_IDLE << CLASS_SHIFT,
        IoPriority::Low => (CLASS_BE << CLASS_SHIFT) | 7,
        IoPriority::Normal => (CLASS_BE << CLASS_SHIFT) | 4,
    }
}

/// Suspends an OS process and all its threads.
#[cfg(unix)]
pub fn suspend_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGSTOP);
    }
}

/// Resumes a previously suspended OS process.
#[cfg(unix)]
pub fn resume_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGCONT);
    }
}

/// Applies CPU priority, IO priority, and CPU affinity to a process.
///
/// Failures are ignored: the child may have exited between the tick and the
/// call, and priority changes are advisory.
#[cfg(unix)]
pub fn apply_to_process(pid: u32, config: &SchedulingConfig) {
    unsafe {
        libc::setpriority(
            libc::PRIO_PROCESS,
            pid as libc::id_t,
            nice_value(config.cpu_priority),
        );
    }

    #[cfg(target_os = "linux")]
    {
        const IOPRIO_WHO_PROCESS: libc::c_int = 1;
        unsafe {
            libc::syscall(
                libc::SYS_ioprio_set,
                IOPRIO_WHO_PROCESS,
                pid as libc::c_int,
                ioprio_value(config.io_priority),
            );
        }

        if !config.affinity.is_empty() {
            let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            let cores = num_cpus::get() as u32;
            for &cpu in &config.affinity {
                if cpu < cores {
                    unsafe { libc::CPU_SET(cpu as usize, &mut set) };
                }
            }
            unsafe {
                libc::sched_setaffinity(
                    pid as libc::pid_t,
                    std::mem::size_of::<libc::cpu_set_t>(),
                    &set,
                );
            }
        }
    }
}

#[cfg(not(unix))]
pub fn suspend_process(_pid: u32) {}

#[cfg(not(unix))]
pub fn resume_process(_pid: u32) {}

#[cfg(not(unix))]
pub fn apply_to_process(_pid: u32, _config: &SchedulingConfig) {}
