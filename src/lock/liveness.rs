//! Process liveness probing for lock holders.

use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::warn;

/// Slack allowed between a holder's process start and its lock timestamp.
const START_TIME_SLACK_SECS: i64 = 2;

/// Whether the process recorded in a lock still owns it.
///
/// A lock is live only if `pid` exists, is not a zombie, and was started
/// no later than `acquired_at` (plus a small clock slack). A process that
/// started after the lock was taken is an unrelated process reusing the pid.
#[must_use]
pub fn holder_alive(pid: u32, acquired_at: DateTime<Utc>) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    if !signal_probe(pid) {
        return false;
    }

    let mut sys = System::new();
    let sys_pid = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

    let Some(process) = sys.process(sys_pid) else {
        return false;
    };

    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return false;
    }

    let started = i64::try_from(process.start_time()).unwrap_or(i64::MAX);
    started <= acquired_at.timestamp() + START_TIME_SLACK_SECS
}

/// [`holder_alive`] off the async runtime; process table reads block.
///
/// A probe that cannot complete reports the holder as alive, so a lock is
/// never reclaimed on an unverified guess.
pub async fn is_alive(pid: u32, acquired_at: DateTime<Utc>) -> bool {
    match tokio::task::spawn_blocking(move || holder_alive(pid, acquired_at)).await {
        Ok(alive) => alive,
        Err(err) => {
            warn!(pid, %err, "liveness probe failed; treating holder as alive");
            true
        }
    }
}

/// Signal 0 existence check. `EPERM` means the process exists under
/// another user.
#[cfg(unix)]
fn signal_probe(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(NixPid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
