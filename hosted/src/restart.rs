//! The restart escape hatch.
//!
//! When the running node can no longer be trusted (its code changed on disk,
//! or a reload was armed to restart) the process signals itself with
//! increasingly forceful signals and waits to be replaced by the supervisor.

use log::{error, warn};
use std::time::Duration;

/// Pause between two escalation steps.
pub const ESCALATION_PAUSE: Duration = Duration::from_secs(2);

/// Signals raised against the own process, in order.
#[cfg(unix)]
pub const ESCALATION: [(libc::c_int, &str); 3] = [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM"), (libc::SIGKILL, "SIGKILL")];

/// Ask the supervisor to restart us by terminating the current process.
///
/// Never returns. Each signal is given [`ESCALATION_PAUSE`] to take effect
/// before the next, stronger one is sent; after the last one the calling
/// thread blocks until the process is gone.
pub fn abort_service(reason: &str) -> ! {
    warn!("restarting service ({reason})");

    #[cfg(unix)]
    {
        let pid = std::process::id() as libc::pid_t;
        for (signal, signal_name) in ESCALATION {
            warn!("sending {signal_name} to {pid}");
            // SAFETY: kill(2) has no memory safety preconditions.
            if unsafe { libc::kill(pid, signal) } != 0 {
                error!("failed to send {signal_name}: {}", std::io::Error::last_os_error());
            }
            std::thread::sleep(ESCALATION_PAUSE);
        }
    }

    #[cfg(not(unix))]
    {
        std::thread::sleep(ESCALATION_PAUSE);
        std::process::abort();
    }

    loop {
        std::thread::park();
    }
}

/// Where restart requests end up.
///
/// Production code uses [`AbortService`]. Implementations used in tests may
/// return normally; callers must then behave as if nothing after the restart
/// request had happened.
pub trait RestartHook: Send + Sync {
    fn restart(&self, reason: &str);
}

/// Restarts by terminating the process, see [`abort_service`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortService;

impl RestartHook for AbortService {
    fn restart(&self, reason: &str) {
        abort_service(reason)
    }
}

impl<F> RestartHook for F
where
    F: Fn(&str) + Send + Sync,
{
    fn restart(&self, reason: &str) {
        self(reason)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::RestartHook;
    use std::sync::Mutex;

    /// Records restart reasons instead of terminating the process.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingHook {
        reasons: Mutex<Vec<String>>,
    }

    impl RecordingHook {
        pub(crate) fn reasons(&self) -> Vec<String> {
            self.reasons.lock().unwrap().clone()
        }
    }

    impl RestartHook for RecordingHook {
        fn restart(&self, reason: &str) {
            self.reasons.lock().unwrap().push(reason.to_string());
        }
    }
}
