//! Process-wide library initialization.
//!
//! Collaborator subsystems are initialized once per generation, by the first
//! context that performs startup, and shut down when the last context of the
//! generation is destroyed with a shutdown request. A new generation may
//! start after that.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use isoctl_types::config::SignalBehavior;
use isoctl_types::error::{IsoctlError, Result};

use crate::signals;

/// Global initialization and teardown of collaborator subsystems.
pub trait LibraryHooks: Send + Sync {
    fn startup(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default)]
pub struct NoHooks;

impl LibraryHooks for NoHooks {}

#[derive(Debug, Default)]
struct GuardState {
    initialized: bool,
    live: usize,
    generation: u64,
    signal_preset: Option<SignalBehavior>,
    /// Mode applied by the running generation.
    signal_mode: Option<SignalBehavior>,
}

/// Init-once / teardown-once guard shared by all contexts.
pub struct LibraryGuard {
    state: Mutex<GuardState>,
    hooks: Box<dyn LibraryHooks>,
}

static GLOBAL: OnceLock<Arc<LibraryGuard>> = OnceLock::new();

impl LibraryGuard {
    pub fn new(hooks: Box<dyn LibraryHooks>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GuardState::default()),
            hooks,
        })
    }

    /// The guard of this process.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Self::new(Box::new(NoHooks))))
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Choose the signal behavior for contexts created from now on.
    ///
    /// Only allowed while the library is not initialized.
    pub fn preset_signal_behavior(&self, mode: SignalBehavior) -> Result<()> {
        let mut state = self.lock();
        if state.initialized {
            return Err(IsoctlError::AlreadyStarted);
        }
        state.signal_preset = Some(mode);
        Ok(())
    }

    pub fn signal_preset(&self) -> Option<SignalBehavior> {
        self.lock().signal_preset
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Number of generations started so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn live_contexts(&self) -> usize {
        self.lock().live
    }

    pub(crate) fn attach(&self) {
        self.lock().live += 1;
    }

    /// Initialize the library unless the current generation already did.
    ///
    /// Returns whether this call performed the initialization.
    pub(crate) fn start(&self, mode: SignalBehavior, abort_flag: Arc<AtomicBool>) -> Result<bool> {
        let mut state = self.lock();
        if state.initialized {
            return Ok(false);
        }
        self.hooks.startup()?;
        signals::apply(mode, abort_flag);
        state.initialized = true;
        state.signal_mode = Some(mode);
        state.generation += 1;
        log::info!("Library started (generation {})", state.generation);
        Ok(true)
    }

    /// Release one context, shutting the library down if asked.
    ///
    /// Shutdown is refused while other contexts are alive; the context is
    /// released either way.
    pub(crate) fn detach(&self, shutdown: bool) -> Result<()> {
        let mut state = self.lock();
        state.live = state.live.saturating_sub(1);
        if !shutdown {
            return Ok(());
        }
        if state.live > 0 {
            log::warn!("Shutdown skipped: {} context(s) still alive", state.live);
            return Err(IsoctlError::ShutdownWithLiveContexts(state.live));
        }
        if state.initialized {
            self.hooks.shutdown();
            if let Some(mode) = state.signal_mode.take() {
                signals::release(mode);
            }
            state.initialized = false;
            log::info!("Library shut down (generation {})", state.generation);
        }
        Ok(())
    }
}
