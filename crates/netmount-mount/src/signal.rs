//! Termination signals for the daemon loop.
//!
//! SIGINT, SIGTERM and SIGHUP request a shutdown; a second signal exits the
//! process at once. The loop sleeps in [`wait_for_shutdown_timeout`] between
//! ticks, so a signal cuts the sleep short but never interrupts a tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

static REQUESTED: Mutex<bool> = Mutex::new(false);
static WAKE: Condvar = Condvar::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Start listening for termination signals. Later calls do nothing.
pub fn install_signal_handler() -> std::io::Result<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    std::thread::Builder::new()
        .name("netmount-signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                if request_shutdown() {
                    warn!(signal, "Second termination signal, exiting now");
                    std::process::exit(128 + signal);
                }
                info!(signal, "Shutdown requested");
            }
        })?;
    Ok(())
}

/// Flag a shutdown and wake any waiter. Returns whether one was already
/// requested.
pub fn request_shutdown() -> bool {
    let mut requested = REQUESTED.lock();
    let before = *requested;
    *requested = true;
    WAKE.notify_all();
    before
}

/// Whether a shutdown has been requested.
pub fn shutdown_requested() -> bool {
    *REQUESTED.lock()
}

/// Sleep up to `timeout`; returns `true` as soon as a shutdown is requested.
pub fn wait_for_shutdown_timeout(timeout: Duration) -> bool {
    let mut requested = REQUESTED.lock();
    if !*requested {
        WAKE.wait_while_for(&mut requested, |r| !*r, timeout);
    }
    *requested
}

/// Forget a previous request.
pub fn clear_shutdown() {
    *REQUESTED.lock() = false;
}
