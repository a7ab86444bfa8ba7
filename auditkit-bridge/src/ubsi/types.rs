//! Identity types for the UBSI unit-analysis engine (spec.md GLOSSARY,
//! "Replacing pointer graphs"): `ThreadKey` and `UnitKey` as plain hashable
//! values rather than a pointer graph.

/// Thread creation time, parsed once from the record that first observes a
/// tid and carried for the thread's lifetime. `(0, 0)` is never produced by
/// a real audit timestamp and is used internally as "not yet known".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadTime {
    pub seconds: i64,
    pub millis: i64,
}

impl ThreadTime {
    pub const UNKNOWN: ThreadTime = ThreadTime {
        seconds: 0,
        millis: 0,
    };

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl std::fmt::Display for ThreadTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.seconds, self.millis)
    }
}

/// A record timestamp, represented as fixed-point milliseconds rather than
/// `f64`. The source format always carries exactly three fractional digits,
/// so this is lossless and gives `UnitKey` a derivable `Eq`/`Hash` without
/// the usual floating-point equality hazards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_parts(seconds: i64, millis: i64) -> Self {
        Timestamp(seconds * 1000 + millis)
    }

    pub fn seconds_part(self) -> i64 {
        self.0.div_euclid(1000)
    }

    pub fn millis_part(self) -> i64 {
        self.0.rem_euclid(1000)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.seconds_part(), self.millis_part())
    }
}

/// Canonical identity of a thread: `(tid, thread_create_time)`. Survives pid
/// reuse because a reused tid carries a different creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub tid: i64,
    pub thread_time: ThreadTime,
}

/// Canonical identity of a unit: `ThreadKey` + `(loopid, iteration,
/// timestamp, count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitKey {
    pub tid: i64,
    pub thread_time: ThreadTime,
    pub loopid: i64,
    pub iteration: i64,
    pub timestamp: Timestamp,
    pub count: i64,
}

impl UnitKey {
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey {
            tid: self.tid,
            thread_time: self.thread_time,
        }
    }

    /// Renders the `(pid=... thread_time=... unitid=... iteration=...
    /// time=... count=...)` tuple shared by `UBSI_ENTRY`/`UBSI_DEP` output,
    /// under the caller-supplied label (`"unit"` or `"dep"`).
    pub fn render(&self, label: &str) -> String {
        format!(
            "{label}=(pid={} thread_time={} unitid={} iteration={} time={} count={})",
            self.tid, self.thread_time, self.loopid, self.iteration, self.timestamp, self.count
        )
    }
}
