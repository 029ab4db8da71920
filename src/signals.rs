//! Signal-driven flags for the event loop. Each handled signal ORs its own
//! bit into a single `AtomicU8`; the loop drains the whole mask with one
//! atomic swap per iteration so a handler firing mid-drain can't be lost or
//! double-counted (§5). Built on `signal_hook::flag`, which registers an
//! async-signal-safe store into an `Arc<AtomicBool>` — simpler to compose
//! into one bitmask here than `signal_hook::iterator`'s channel-based API,
//! since the loop already polls on its own schedule via `recvfrom`'s
//! read-timeout.
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGPIPE, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::flag;

use crate::error::DNSResult;

pub const RELOAD: u8 = 1 << 0; // SIGHUP: force log reopen + reload
pub const STATS_DUMP: u8 = 1 << 1; // SIGUSR1: dump statistics
pub const STATS_RESET: u8 = 1 << 2; // SIGUSR2: dump and reset statistics
pub const SHUTDOWN: u8 = 1 << 3; // SIGTERM/SIGINT: shut down

/// Registers one `signal_hook::flag` handler per signal of interest, each
/// writing into its own `AtomicBool`, and exposes a single drained mask to
/// the event loop. SIGPIPE is registered to be ignored outright (writes to
/// a closed UDP socket should surface as an `EPIPE` error, not a process
/// kill) rather than tracked in the mask.
pub struct SignalState {
    hup: Arc<std::sync::atomic::AtomicBool>,
    usr1: Arc<std::sync::atomic::AtomicBool>,
    usr2: Arc<std::sync::atomic::AtomicBool>,
    term: Arc<std::sync::atomic::AtomicBool>,
    int: Arc<std::sync::atomic::AtomicBool>,
    pending: AtomicU8,
}

impl SignalState {
    pub fn install() -> DNSResult<Self> {
        let hup = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let usr1 = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let usr2 = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let term = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let int = Arc::new(std::sync::atomic::AtomicBool::new(false));

        flag::register(SIGHUP, Arc::clone(&hup))?;
        flag::register(SIGUSR1, Arc::clone(&usr1))?;
        flag::register(SIGUSR2, Arc::clone(&usr2))?;
        flag::register(SIGTERM, Arc::clone(&term))?;
        flag::register(SIGINT, Arc::clone(&int))?;
        unsafe {
            signal_hook::low_level::register(SIGPIPE, || {})?;
        }

        Ok(SignalState {
            hup,
            usr1,
            usr2,
            term,
            int,
            pending: AtomicU8::new(0),
        })
    }

    /// Folds each signal's flag into the pending mask, clearing the flags it
    /// consumed. Call once per loop iteration before draining.
    fn collect(&self) {
        let mut bits = 0u8;
        if self.hup.swap(false, Ordering::Relaxed) {
            bits |= RELOAD;
        }
        if self.usr1.swap(false, Ordering::Relaxed) {
            bits |= STATS_DUMP;
        }
        if self.usr2.swap(false, Ordering::Relaxed) {
            bits |= STATS_RESET;
        }
        if self.term.swap(false, Ordering::Relaxed) || self.int.swap(false, Ordering::Relaxed) {
            bits |= SHUTDOWN;
        }
        if bits != 0 {
            self.pending.fetch_or(bits, Ordering::AcqRel);
        }
    }

    /// Collects any newly-fired signals, then atomically takes and clears
    /// the whole pending mask.
    pub fn drain(&self) -> u8 {
        self.collect();
        self.pending.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_clears_the_mask() {
        let state = SignalState {
            hup: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            usr1: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            usr2: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            term: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            int: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            pending: AtomicU8::new(0),
        };

        assert_eq!(state.drain(), RELOAD);
        assert_eq!(state.drain(), 0);
    }

    #[test]
    fn term_and_int_both_set_shutdown() {
        let state = SignalState {
            hup: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            usr1: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            usr2: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            term: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            int: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            pending: AtomicU8::new(0),
        };

        assert_eq!(state.drain(), SHUTDOWN);
    }
}
