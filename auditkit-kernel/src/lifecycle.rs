//! Global lifecycle state machine (spec.md §4.E), replacing the source's
//! `global_state` singleton with an explicit `Engine` object (spec.md §9,
//! "Replacing global state").
//!
//! ```text
//!  ─── init ──► STATE_INITED ── context_init + start ──► AUDITING
//!  ◄── deinit ──                       ◄── stop ──
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

/// A distinguishable "already in this state" result, per spec.md §7
/// (`AlreadyInState`): surfaced to callers, never logged as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlreadyInState {
    AlreadyInitialized,
    AlreadyDeinitialized,
    AuditingAlreadyStarted,
    AuditingAlreadyStopped,
}

impl std::fmt::Display for AlreadyInState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            AlreadyInState::AlreadyInitialized => "already initialized",
            AlreadyInState::AlreadyDeinitialized => "already deinitialized",
            AlreadyInState::AuditingAlreadyStarted => "auditing already started",
            AlreadyInState::AuditingAlreadyStopped => "auditing already stopped",
        };
        f.write_str(msg)
    }
}
impl std::error::Error for AlreadyInState {}

/// Fatal startup failures (spec.md §7): any of these abort `start` and
/// revert `auditing_started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    SlotTableAllocationFailed,
    SymbolResolutionFailed,
    HookInstallFailed,
}

impl std::fmt::Display for StartFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            StartFailure::SlotTableAllocationFailed => "slot table allocation failed",
            StartFailure::SymbolResolutionFailed => "kallsyms resolution failed",
            StartFailure::HookInstallFailed => "hook install failed",
        };
        f.write_str(msg)
    }
}
impl std::error::Error for StartFailure {}

/// Two atomic flags gate the init -> auditing-start transitions. `dry_run`
/// lets state initialize without redirecting kernel control flow (spec.md
/// §4.E, used by tests).
pub struct Engine {
    initialized: AtomicBool,
    auditing_started: AtomicBool,
    dry_run: bool,
}

impl Engine {
    pub fn new(dry_run: bool) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            auditing_started: AtomicBool::new(false),
            dry_run,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_auditing_started(&self) -> bool {
        self.auditing_started.load(Ordering::SeqCst)
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// `cmpxchg(initialized, false -> true)`. On the caller's state-init step
    /// failing, the flag must be reverted by calling [`revert_init`].
    pub fn init(&self) -> Result<(), AlreadyInState> {
        self.initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| AlreadyInState::AlreadyInitialized)
    }

    /// Revert a failed state-init step after [`init`] succeeded.
    pub fn revert_init(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Requires `initialized`; `cmpxchg(auditing_started, false -> true)`.
    /// invariant (b): auditing-started implies both state-initialized and
    /// context-initialized, so this call fails fast if not yet initialized.
    pub fn auditing_start(&self) -> Result<(), AlreadyInState> {
        if !self.is_initialized() {
            return Err(AlreadyInState::AlreadyDeinitialized);
        }
        self.auditing_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| AlreadyInState::AuditingAlreadyStarted)
    }

    /// Abort a `start` attempt: context-init (or hook install) failed after
    /// `auditing_start` flipped the flag, so revert it (spec.md §7, fatal
    /// conditions "abort start and revert the auditing_started flag").
    pub fn abort_start(&self, _reason: StartFailure) {
        self.auditing_started.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) -> Result<(), AlreadyInState> {
        self.auditing_started
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| AlreadyInState::AuditingAlreadyStopped)
    }

    pub fn deinit(&self) -> Result<(), AlreadyInState> {
        self.initialized
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| AlreadyInState::AlreadyDeinitialized)
    }
}
