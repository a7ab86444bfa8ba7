//! Ambient "current process" access abstracted behind a trait so the filter
//! evaluator can remain pure (spec.md §9, "Replacing global state").

/// A snapshot of the invoking process/thread's identity, as the filter
/// evaluator and the hook runtime need it. Implementations source this from
/// wherever the host actually tracks "current task" (out of scope here,
/// stated at the contract level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentProcess {
    pub pid: i64,
    pub ppid: i64,
    pub uid: u32,
    pub tgid: i64,
}

/// Abstracts the host's notion of "the currently running task" so that pure
/// decision logic (the filter evaluator, the hardening check) never reaches
/// into global/ambient state directly.
pub trait CurrentProcessProvider {
    fn current(&self) -> CurrentProcess;
}

/// A fixed snapshot, useful for tests and for `dry_run` mode where no real
/// host integration exists yet.
#[derive(Debug, Clone, Copy)]
pub struct StaticProcess(pub CurrentProcess);

impl CurrentProcessProvider for StaticProcess {
    fn current(&self) -> CurrentProcess {
        self.0
    }
}

/// `list` in the filter context is bounded to 64 entries (spec.md §3); loading
/// more truncates with a logged warning rather than growing unbounded.
pub const MAX_ID_LIST: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdList {
    ids: Vec<i64>,
}

impl IdList {
    pub fn new(mut ids: Vec<i64>) -> Self {
        if ids.len() > MAX_ID_LIST {
            log::warn!(
                "id list truncated from {} to {} entries (bound is {MAX_ID_LIST})",
                ids.len(),
                MAX_ID_LIST
            );
            ids.truncate(MAX_ID_LIST);
        }
        Self { ids }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for IdList {
    fn default() -> Self {
        Self { ids: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Capture,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMonitor {
    pub mode: MonitorMode,
    pub list: IdList,
}

impl IdMonitor {
    pub fn is_actionable(&self, id: i64) -> bool {
        match self.mode {
            MonitorMode::Capture => self.list.contains(id),
            MonitorMode::Ignore => !self.list.contains(id),
        }
    }
}

impl Default for IdMonitor {
    fn default() -> Self {
        Self {
            mode: MonitorMode::Ignore,
            list: IdList::default(),
        }
    }
}
