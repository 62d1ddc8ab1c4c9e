//! Best-effort scheduling tweaks for dedicated worker threads.
//!
//! Both calls act on the calling thread and fail with `Unsupported` off
//! Linux. Callers log failures and carry on.

use std::io;

/// Pins the calling thread to `cpu`.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) -> io::Result<()> {
    if cpu >= libc::CPU_SETSIZE as usize {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }
    // SAFETY: cpu_set_t is plain data and `cpu` is within its bounds.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Sets the nice value of the calling thread. Negative values usually need
/// `CAP_SYS_NICE`.
#[cfg(target_os = "linux")]
pub fn set_current_thread_nice(nice: i32) -> io::Result<()> {
    // SAFETY: plain syscalls on the calling thread.
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, nice)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_cpu: usize) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_nice(_nice: i32) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Applies the optional pin and the nice value, logging what could not be
/// applied.
pub fn elevate_current_thread(cpu: Option<usize>, nice: i32) {
    if let Some(cpu) = cpu {
        match pin_current_thread(cpu) {
            Ok(()) => tracing::debug!(cpu, "worker pinned"),
            Err(e) => tracing::warn!(cpu, error = %e, "failed to pin worker thread"),
        }
    }
    if nice != 0 {
        match set_current_thread_nice(nice) {
            Ok(()) => tracing::debug!(nice, "worker priority raised"),
            Err(e) => tracing::warn!(nice, error = %e, "failed to raise worker priority"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_priority_is_allowed() {
        // Raising the nice value never needs privileges.
        std::thread::spawn(|| {
            let result = set_current_thread_nice(5);
            if cfg!(target_os = "linux") {
                assert!(result.is_ok());
            } else {
                assert!(result.is_err());
            }
        })
        .join()
        .unwrap();
    }

    #[test]
    fn out_of_range_cpu_fails() {
        std::thread::spawn(|| assert!(pin_current_thread(100_000).is_err()))
            .join()
            .unwrap();
    }
}
