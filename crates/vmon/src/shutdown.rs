//! Ctrl+C handling: first signal requests a graceful stop (let in-flight
//! work finish), a second signal exits immediately. Ported from the
//! teacher's `AtomicU8`-counted forced-shutdown pattern onto the `ctrlc`
//! crate and a plain `mpsc` channel, since this daemon has no async runtime.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Tracks how many times Ctrl+C has fired.
#[derive(Debug, Default)]
pub struct ShutdownController {
    forced: AtomicU8,
}

/// An event delivered to the main loop.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownEvent {
    /// First Ctrl+C: finish in-flight work, then stop.
    Graceful,
    /// Second Ctrl+C: stop now.
    Immediate,
    /// The stdin request reader hit EOF.
    ReaderDone,
}

impl ShutdownController {
    /// A controller that has not yet observed any signal.
    pub fn new() -> Self {
        ShutdownController {
            forced: AtomicU8::new(0),
        }
    }

    /// Records one more signal and returns the new count.
    pub fn bump_forced(&self) -> u8 {
        self.forced.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Installs the process-wide Ctrl+C handler. Only one may be installed per
/// process; returns an error if `ctrlc` rejects a second registration.
pub fn install_ctrlc_handler(
    shutdown: Arc<ShutdownController>,
    events: Sender<ShutdownEvent>,
) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        let n = shutdown.bump_forced();
        let event = if n == 1 {
            ShutdownEvent::Graceful
        } else {
            ShutdownEvent::Immediate
        };
        let _ = events.send(event);
    })
    .map_err(|e| anyhow::anyhow!("failed to install ctrl+c handler: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_is_graceful_second_is_immediate() {
        let shutdown = ShutdownController::new();
        assert_eq!(shutdown.bump_forced(), 1);
        assert_eq!(shutdown.bump_forced(), 2);
    }
}
