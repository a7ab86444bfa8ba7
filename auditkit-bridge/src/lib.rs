//! Userspace bridge (spec.md §2): line framing over a raw byte source,
//! event-id reordering, and UBSI unit/provenance reconstruction, wired
//! together into a single [`Pipeline`].

pub mod framing;
pub mod parse;
pub mod reorder;
pub mod ubsi;

use std::io::{self, Read};

use framing::{FrameTurn, LineFramer};
use reorder::EventReorderer;
use ubsi::UbsiEngine;

pub use framing::DirectorySource;

/// Result of one [`Pipeline::next_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineTurn {
    /// Lines ready for output this turn (possibly empty).
    Lines(Vec<String>),
    /// The source reached end-of-stream; these lines are the final flush
    /// (buffered reorderer entries plus any EOE-salvaged trailing line).
    Eof(Vec<String>),
}

/// Wires line framing, event-id reordering and (optionally) the UBSI
/// engine into the single pipeline the bridge CLI drives (spec.md §4.F/G/H).
pub struct Pipeline<R> {
    framer: LineFramer<R>,
    reorderer: EventReorderer,
    engine: Option<UbsiEngine>,
}

impl<R: Read> Pipeline<R> {
    /// `merge_unit <= 0` disables merge-unit coalescing. `ubsi_enabled`
    /// mirrors the CLI's `-u/--unit` flag: when `false`, `SYSCALL` and
    /// `ubsi_intercepted=` records still reorder but pass through
    /// unmodified rather than being fed to the UBSI engine.
    pub fn new(source: R, merge_unit: i64, ubsi_enabled: bool) -> Self {
        Self {
            framer: LineFramer::new(source),
            reorderer: EventReorderer::new(),
            engine: ubsi_enabled.then(|| UbsiEngine::new(merge_unit)),
        }
    }

    pub fn next_turn(&mut self) -> io::Result<PipelineTurn> {
        match self.framer.next_turn()? {
            FrameTurn::Lines(raw_lines) => {
                let mut out = Vec::new();
                for raw in &raw_lines {
                    for ready in self.reorderer.feed(raw) {
                        out.extend(self.dispatch(&ready));
                    }
                }
                Ok(PipelineTurn::Lines(out))
            }
            FrameTurn::Eof { salvaged } => {
                let mut out = Vec::new();
                if let Some(line) = salvaged {
                    for ready in self.reorderer.feed(&line) {
                        out.extend(self.dispatch(&ready));
                    }
                }
                out.extend(self.flush());
                Ok(PipelineTurn::Eof(out))
            }
        }
    }

    /// Drains any buffered reorderer entries (end-of-stream or
    /// `DAEMON_START`, surfaced to callers that want to flush early).
    pub fn flush(&mut self) -> Vec<String> {
        let ready = self.reorderer.flush_all();
        let mut out = Vec::new();
        for line in ready {
            out.extend(self.dispatch(&line));
        }
        out
    }

    fn dispatch(&mut self, line: &str) -> Vec<String> {
        if !parse::is_syscall_candidate(line) {
            return vec![line.to_string()];
        }
        let Some(engine) = self.engine.as_mut() else {
            return vec![line.to_string()];
        };
        match parse::rewrite_ubsi_intercepted(line) {
            Some(rewritten) => engine.handle(&rewritten),
            None => engine.handle(line),
        }
    }
}
