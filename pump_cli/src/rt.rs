//! Real-time scheduling for the control loop (Linux SCHED_FIFO / affinity / mlockall).
//!
//! Every step is best effort: a failure is logged and the loop runs with
//! normal scheduling.

use crate::cli::RtLock;

/// What `--rt` asked for.
#[derive(Debug, Clone, Copy)]
pub struct RtRequest {
    pub prio: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(target_os = "linux")]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    RT_ONCE.get_or_init(|| {
        match linux::lock_memory(req.lock) {
            Ok(()) => tracing::info!(lock = ?req.lock, "rt: memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "rt: mlockall failed"),
        }
        match linux::fifo_priority(req.prio) {
            Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO applied"),
            Err(err) => tracing::warn!(error = %err, requested = ?req.prio, "rt: SCHED_FIFO not applied"),
        }
        match linux::pin_cpu(req.cpu.unwrap_or(0)) {
            Ok(cpu) => tracing::info!(cpu, "rt: affinity applied"),
            Err(err) => tracing::warn!(error = %err, "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    tracing::warn!(?req, "rt: real-time scheduling is only supported on Linux; ignoring --rt");
}

#[cfg(target_os = "linux")]
mod linux {
    use crate::cli::RtLock;
    use libc::{
        CPU_ISSET, CPU_SET, CPU_ZERO, MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, cpu_set_t, mlockall,
        sched_get_priority_max, sched_get_priority_min, sched_param, sched_setscheduler,
    };
    use std::io;

    /// Capacity of cpu_set_t in CPU indices (bits).
    const MAX_CPUSET_BITS: usize = std::mem::size_of::<cpu_set_t>() * 8;
    /// CAP_SYS_NICE bit in the capability masks of /proc/self/status.
    const CAP_SYS_NICE: u64 = 1 << 23;

    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn is_retryable_memlock_error(err: &io::Error) -> bool {
        matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
    }

    fn memlock_limit_hint() -> Option<String> {
        let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
        // SAFETY: getrlimit only writes into the provided struct.
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        // SAFETY: rc == 0 means the struct was initialised.
        let cur = unsafe { rlim.assume_init() }.rlim_cur;
        if cur == libc::RLIM_INFINITY {
            Some("memlock limit: unlimited".to_string())
        } else {
            Some(format!("memlock limit: {} KiB", cur / 1024))
        }
    }

    /// Lock the address space; `All` falls back to `Current` on EPERM/ENOMEM.
    pub fn lock_memory(lock: RtLock) -> eyre::Result<()> {
        // SAFETY: mlockall takes flags only.
        let current = || check(unsafe { mlockall(MCL_CURRENT) });
        let err = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => match current() {
                Ok(()) => return Ok(()),
                Err(e) => e,
            },
            // SAFETY: mlockall takes flags only.
            RtLock::All => match check(unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) }) {
                Ok(()) => return Ok(()),
                Err(e) if is_retryable_memlock_error(&e) => match current() {
                    Ok(()) => {
                        tracing::warn!(error = %e, "rt: mlockall(all) refused, locked current pages only");
                        return Ok(());
                    }
                    Err(_) => e,
                },
                Err(e) => e,
            },
        };
        let mut msg = format!("mlockall({lock:?}) failed: {err}");
        if is_retryable_memlock_error(&err) {
            if let Some(h) = memlock_limit_hint() {
                msg.push_str(&format!("; {h}"));
            }
            msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        }
        Err(eyre::eyre!(msg))
    }

    fn has_sys_nice() -> bool {
        let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
            return false;
        };
        status
            .lines()
            .filter(|l| l.starts_with("CapEff:"))
            .filter_map(|l| l.split_whitespace().nth(1))
            .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
            .any(|caps| caps & CAP_SYS_NICE != 0)
    }

    /// Switch to SCHED_FIFO; the priority is clamped to the system range.
    pub fn fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 && !has_sys_nice() {
            eyre::bail!(
                "needs CAP_SYS_NICE or root (euid {euid}); hint: 'sudo setcap cap_sys_nice=ep /path/to/pump'"
            );
        }
        // SAFETY: plain queries on a valid policy constant.
        let (min, max) = unsafe {
            (
                sched_get_priority_min(SCHED_FIFO),
                sched_get_priority_max(SCHED_FIFO),
            )
        };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let wanted = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: wanted,
        };
        // SAFETY: pid 0 is the calling process; param outlives the call.
        check(unsafe { sched_setscheduler(0, SCHED_FIFO, &param) })?;
        Ok(wanted)
    }

    /// Pin the process to `cpu` if the current affinity mask allows it.
    pub fn pin_cpu(cpu: usize) -> eyre::Result<usize> {
        if cpu >= MAX_CPUSET_BITS {
            eyre::bail!("requested CPU {cpu} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        // SAFETY: sysconf has no preconditions.
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online < 1 {
            eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
        }
        if cpu as libc::c_long >= online {
            eyre::bail!("requested CPU {cpu} >= online {online}");
        }
        // SAFETY: cpu_set_t is plain data; the CPU_* helpers stay inside it.
        unsafe {
            let mut allowed: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut allowed);
            check(libc::sched_getaffinity(
                0,
                std::mem::size_of::<cpu_set_t>(),
                &mut allowed,
            ))?;
            if !CPU_ISSET(cpu, &allowed) {
                eyre::bail!("CPU {cpu} not permitted by current affinity mask");
            }
            let mut desired: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut desired);
            CPU_SET(cpu, &mut desired);
            check(libc::sched_setaffinity(
                0,
                std::mem::size_of::<cpu_set_t>(),
                &desired,
            ))?;
        }
        Ok(cpu)
    }
}
