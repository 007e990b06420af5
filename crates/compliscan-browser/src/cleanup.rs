//! The graduated process cleanup protocol: graceful CDP close, SIGTERM,
//! a liveness probe, SIGKILL, a final probe, and a loud log if the process
//! still refuses to die.

use crate::pool::BrowserInstance;
use compliscan_core::config::BrowserPoolConfig;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{error, warn};

pub async fn cleanup_instance(mut instance: BrowserInstance, config: &BrowserPoolConfig) {
    use futures::FutureExt;

    let pid = instance.pid;
    let outcome = std::panic::AssertUnwindSafe(cleanup_instance_inner(&mut instance, config))
        .catch_unwind()
        .await;

    if let Err(panicked) = outcome {
        error!(pid, panic = ?panicked, "browser cleanup task panicked, instance abandoned");
    }
}

async fn cleanup_instance_inner(instance: &mut BrowserInstance, config: &BrowserPoolConfig) {
    let pid = instance.pid;

    match tokio::time::timeout(config.close_grace(), instance.browser.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(pid, error = %e, "graceful browser close returned an error"),
        Err(_) => warn!(pid, "graceful browser close timed out"),
    }
    instance.handler.abort();

    let nix_pid = Pid::from_raw(pid as i32);
    if signal::kill(nix_pid, Signal::SIGTERM).is_err() {
        // Already gone; nothing further to do.
        let _ = instance.child.try_wait();
        return;
    }
    tokio::time::sleep(config.sigterm_grace()).await;

    if !is_alive(nix_pid) {
        let _ = instance.child.try_wait();
        return;
    }

    warn!(pid, "browser process survived SIGTERM, sending SIGKILL");
    let _ = signal::kill(nix_pid, Signal::SIGKILL);
    tokio::time::sleep(config.sigkill_grace()).await;

    if is_alive(nix_pid) {
        error!(pid, "zombie process detected: browser survived SIGKILL");
    }
    let _ = instance.child.try_wait();
}

fn is_alive(pid: Pid) -> bool {
    // Signal 0 performs no delivery but checks whether the target process
    // (or permission to signal it) still exists.
    signal::kill(pid, None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_alive_true_for_current_process() {
        assert!(is_alive(Pid::this()));
    }

    #[test]
    fn is_alive_false_for_bogus_pid() {
        // A pid that is exceedingly unlikely to exist.
        assert!(!is_alive(Pid::from_raw(i32::MAX - 1)));
    }
}
