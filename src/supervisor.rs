use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::ignore_errno;
use crate::report::Report;
use crate::{cgroup, Error};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls `child` until it exits or breaches a limit, killing it on breach.
///
/// Time is measured from the caller's `started_at` (taken once the child has
/// signaled `finalize`, i.e. only the payload's own runtime counts against
/// `time_limit`). Memory is sampled from the cgroup's `memory.current` each
/// iteration; the reported peak only ever increases, since `memory.current`
/// is a point-in-time sample that can drop between polls as the child frees
/// memory. A `memory.current` read/parse failure is fatal, not tolerated:
/// unlike `ESRCH` on `kill` or `EINTR` on `waitpid`, it signals a
/// misconfigured or unreadable cgroup, not a benign race.
pub(crate) fn supervise(
    child: Pid,
    cgroup_path: &std::path::Path,
    time_limit: Duration,
    memory_limit: u64,
    started_at: Instant,
) -> Result<Report, Error> {
    let mut peak_memory = 0u64;
    loop {
        let current = cgroup::read_memory_current(cgroup_path)?;
        peak_memory = peak_memory.max(current);

        let elapsed = started_at.elapsed();
        let breached_time = elapsed > time_limit;
        let breached_memory = peak_memory > memory_limit;
        if breached_time || breached_memory {
            tracing::info!(
                ?child,
                breached_time,
                breached_memory,
                elapsed_ms = elapsed.as_millis() as u64,
                peak_memory,
                "killing child after limit breach"
            );
            ignore_errno(kill(child, Signal::SIGKILL), nix::errno::Errno::ESRCH)
                .map_err(|v| format!("cannot kill child: {v}"))?;
        }

        let status = loop {
            match waitpid(
                child,
                Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::__WALL),
            ) {
                Ok(status) => break status,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(v) => return Err(format!("cannot wait for child: {v}").into()),
            }
        };

        match status {
            WaitStatus::StillAlive | WaitStatus::Stopped(..) | WaitStatus::Continued(..) | WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(..) => {
                tracing::trace!(?child, elapsed_ms = elapsed.as_millis() as u64, peak_memory, "poll");
                sleep(POLL_INTERVAL);
            }
            status => {
                let elapsed = started_at.elapsed();
                let current = cgroup::read_memory_current(cgroup_path)?;
                peak_memory = peak_memory.max(current);
                tracing::info!(?child, ?status, elapsed_ms = elapsed.as_millis() as u64, "child exited");
                return Ok(Report {
                    time_ms: elapsed.as_millis() as u64,
                    memory_bytes: peak_memory,
                    exit_code: exit_code_of(status),
                });
            }
        }
    }
}

fn exit_code_of(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        _ => -1,
    }
}
