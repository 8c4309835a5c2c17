use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Raised by SIGINT/SIGTERM; the monitor checks it once per frame.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Only uses atomic operations (async-signal-safe).
extern "C" fn handle_stop_signal(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

pub(crate) fn install_stop_handlers() -> Result<()> {
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        unsafe {
            // SAFETY: handle_stop_signal only stores to an atomic flag, which is
            // async-signal-safe.
            let handler = handle_stop_signal as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                return Err(anyhow!("failed to install {name} handler"));
            }
        }
        debug!(signal = name, "stop handler installed");
    }
    Ok(())
}

pub(crate) fn stop_flag() -> &'static AtomicBool {
    &STOP_REQUESTED
}
