//! Process signal presets.
//!
//! The installed handler does a single atomic store into the abort flag of
//! the context that started the library. Everything else about the context
//! is left alone while a signal is being handled.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use isoctl_types::config::SignalBehavior;

#[cfg(unix)]
mod unix {
    use std::ptr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

    use isoctl_types::config::SignalBehavior;

    /// Signals that request an abort under `SignalBehavior::Handler`.
    const ABORT_SIGNALS: &[libc::c_int] = &[libc::SIGHUP, libc::SIGINT, libc::SIGQUIT, libc::SIGTERM];

    /// Signals touched by the OS-default and ignore presets.
    const PRESET_SIGNALS: &[libc::c_int] = &[
        libc::SIGHUP,
        libc::SIGINT,
        libc::SIGQUIT,
        libc::SIGTERM,
        libc::SIGPIPE,
        libc::SIGUSR1,
        libc::SIGUSR2,
        libc::SIGALRM,
        libc::SIGXFSZ,
    ];

    /// Flag raised by the handler. Stored pointers come from `Arc::into_raw`
    /// and are never released, since a handler may still be reading one.
    static SIGNAL_TARGET: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

    pub(super) extern "C" fn raise_abort(_signum: libc::c_int) {
        let target = SIGNAL_TARGET.load(Ordering::SeqCst);
        if !target.is_null() {
            // SAFETY: non-null values are leaked `Arc<AtomicBool>` pointers
            // that stay valid for the rest of the process.
            unsafe { (*target).store(true, Ordering::SeqCst) };
        }
    }

    pub(super) fn bind(flag: Arc<AtomicBool>) {
        let raw = Arc::into_raw(flag).cast_mut();
        SIGNAL_TARGET.store(raw, Ordering::SeqCst);
    }

    pub(super) fn unbind() {
        SIGNAL_TARGET.store(ptr::null_mut(), Ordering::SeqCst);
    }

    fn set_disposition(signals: &[libc::c_int], action: libc::sighandler_t) {
        for &sig in signals {
            // SAFETY: `action` is SIG_DFL, SIG_IGN, or `raise_abort`, which
            // only performs an atomic load and store.
            let previous = unsafe { libc::signal(sig, action) };
            if previous == libc::SIG_ERR {
                log::warn!("Cannot set disposition of signal {sig}");
            }
        }
    }

    pub(super) fn apply(mode: SignalBehavior) {
        match mode {
            SignalBehavior::NoHandling => {},
            SignalBehavior::Handler => {
                let handler = raise_abort as extern "C" fn(libc::c_int);
                set_disposition(ABORT_SIGNALS, handler as libc::sighandler_t);
            },
            SignalBehavior::OsDefault => set_disposition(PRESET_SIGNALS, libc::SIG_DFL),
            SignalBehavior::IgnoreMost => set_disposition(PRESET_SIGNALS, libc::SIG_IGN),
        }
    }

    pub(super) fn restore() {
        set_disposition(ABORT_SIGNALS, libc::SIG_DFL);
    }
}

/// Apply `mode`, directing handled signals at `abort_flag`.
pub(crate) fn apply(mode: SignalBehavior, abort_flag: Arc<AtomicBool>) {
    log::debug!("Signal handling: {mode}");
    #[cfg(unix)]
    {
        if mode == SignalBehavior::Handler {
            unix::bind(abort_flag);
        }
        unix::apply(mode);
    }
    #[cfg(not(unix))]
    {
        let _ = abort_flag;
        log::debug!("Signal presets are not supported on this platform");
    }
}

/// Undo an installed abort handler at global shutdown.
pub(crate) fn release(mode: SignalBehavior) {
    if mode != SignalBehavior::Handler {
        return;
    }
    #[cfg(unix)]
    {
        unix::restore();
        unix::unbind();
    }
}
