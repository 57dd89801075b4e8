//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static FLAG: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Global shutdown flag, set by SIGTERM/SIGINT
pub fn shutdown_flag() -> &'static AtomicBool {
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (signal handlers, tests)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Register SIGINT/SIGTERM handlers.
///
/// The first signal sets the shutdown flag so workers stop claiming keys and
/// the controller persists what already finished. A second signal exits
/// immediately with status 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    for sig in [SIGINT, SIGTERM] {
        // Order matters: the conditional exit must see the flag before it is set.
        flag::register_conditional_shutdown(sig, 130, Arc::clone(&FLAG))?;
        flag::register(sig, Arc::clone(&FLAG))?;
    }
    Ok(())
}
