//! Line framing over a byte source (spec.md §4.F), grounded on
//! `spadeAuditBridge.c`'s `UBSI_buffer`/`read_log_online`/`dir_read`/
//! `find_next_file`/`open_inode`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Bytes read from the source per turn. The source's own buffer is sized
/// the same in the original.
pub const READ_CHUNK: usize = 65_536;

/// Result of one framing turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTurn {
    /// Complete lines produced by this turn's read (possibly empty).
    Lines(Vec<String>),
    /// The source returned a zero-byte read. `salvaged` carries a
    /// partial trailing line that looked like a closed record (contained
    /// `type=EOE`); any other partial trailing content is discarded.
    Eof { salvaged: Option<String> },
}

/// Splits a byte stream into complete lines, carrying incomplete trailing
/// content across reads. Construct over any [`Read`] implementation:
/// a stream socket, a plain file, or [`DirectorySource`] for directory mode.
pub struct LineFramer<R> {
    source: R,
    carry: Vec<u8>,
    scratch: Vec<u8>,
}

impl<R: Read> LineFramer<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            carry: Vec::new(),
            scratch: vec![0u8; READ_CHUNK],
        }
    }

    /// Performs one read and returns the lines it completed. An `Eof` turn
    /// means the loop should terminate; it is returned at most once per
    /// exhausted source (a source that never yields more data should not
    /// be polled again after `Eof`).
    pub fn next_turn(&mut self) -> io::Result<FrameTurn> {
        let n = self.source.read(&mut self.scratch)?;
        if n == 0 {
            return Ok(FrameTurn::Eof {
                salvaged: self.drain_trailing(),
            });
        }
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(&self.scratch[..n]);
        let mut lines = Vec::new();
        let mut start = 0;
        for i in 0..data.len() {
            if data[i] == b'\n' {
                lines.push(String::from_utf8_lossy(&data[start..i]).into_owned());
                start = i + 1;
            }
        }
        self.carry = data[start..].to_vec();
        Ok(FrameTurn::Lines(lines))
    }

    fn drain_trailing(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let trailing = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        if trailing.contains("type=EOE") {
            Some(trailing)
        } else {
            log::debug!(
                "discarding {} bytes of partial trailing content at EOF",
                trailing.len()
            );
            None
        }
    }
}

/// A directory-watching [`Read`] source (spec.md §4.F directory mode):
/// follows the currently open file, and when it has no new content,
/// rotates to the next file whose mtime is strictly greater than the
/// reference time and whose inode differs from the one just closed.
pub struct DirectorySource {
    dir: PathBuf,
    current: Option<(fs::File, u64)>,
    reference_mtime: SystemTime,
    poll_interval: Duration,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
            reference_mtime: SystemTime::UNIX_EPOCH,
            poll_interval: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Only files with mtime strictly greater than `reference` are
    /// considered (the CLI's `-t/--time` flag).
    pub fn with_reference_time(mut self, reference: SystemTime) -> Self {
        self.reference_mtime = reference;
        self
    }

    fn current_inode(&self) -> Option<u64> {
        self.current.as_ref().map(|(_, inode)| inode).copied()
    }

    /// Scans `dir` for the file with the earliest mtime that is strictly
    /// newer than `reference_mtime` and whose inode differs from the
    /// currently open one.
    fn find_next_file(&self) -> io::Result<Option<(PathBuf, SystemTime, u64)>> {
        use std::os::unix::fs::MetadataExt;

        let mut best: Option<(PathBuf, SystemTime, u64)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let mtime = metadata.modified()?;
            let inode = metadata.ino();
            if mtime <= self.reference_mtime {
                continue;
            }
            if Some(inode) == self.current_inode() {
                continue;
            }
            if best.as_ref().map(|(_, m, _)| mtime < *m).unwrap_or(true) {
                best = Some((entry.path(), mtime, inode));
            }
        }
        Ok(best)
    }

    fn open(&mut self, path: &Path, mtime: SystemTime, inode: u64) -> io::Result<()> {
        let file = fs::File::open(path)?;
        self.current = Some((file, inode));
        self.reference_mtime = mtime;
        Ok(())
    }
}

impl Read for DirectorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.current.is_none() {
                match self.find_next_file()? {
                    Some((path, mtime, inode)) => self.open(&path, mtime, inode)?,
                    None => {
                        std::thread::sleep(self.poll_interval);
                        continue;
                    }
                }
            }
            let n = {
                let (file, _) = self.current.as_mut().expect("checked above");
                file.read(buf)?
            };
            if n > 0 {
                return Ok(n);
            }
            match self.find_next_file()? {
                Some((path, mtime, inode)) => {
                    self.current = None;
                    self.open(&path, mtime, inode)?;
                }
                None => {
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_complete_lines_across_one_read() {
        let mut framer = LineFramer::new(Cursor::new(b"a\nb\nc\n".to_vec()));
        let FrameTurn::Lines(lines) = framer.next_turn().unwrap() else {
            panic!("expected lines");
        };
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn carries_partial_trailing_content_across_reads() {
        struct TwoReads(bool);
        impl Read for TwoReads {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.0 {
                    self.0 = true;
                    buf[..6].copy_from_slice(b"ab\ncd");
                    Ok(6)
                } else {
                    Ok(0)
                }
            }
        }
        let mut framer = LineFramer::new(TwoReads(false));
        let FrameTurn::Lines(lines) = framer.next_turn().unwrap() else {
            panic!()
        };
        assert_eq!(lines, vec!["ab"]);
        // second read returns 0 bytes (EOF); "cd" has no newline and
        // doesn't look like a closed EOE record, so it is discarded.
        let FrameTurn::Eof { salvaged } = framer.next_turn().unwrap() else {
            panic!()
        };
        assert_eq!(salvaged, None);
    }

    #[test]
    fn salvages_trailing_content_closed_by_eoe() {
        struct OneRead(bool);
        impl Read for OneRead {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.0 {
                    self.0 = true;
                    let data = b"type=EOE msg=audit(1.0:1):";
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                } else {
                    Ok(0)
                }
            }
        }
        let mut framer = LineFramer::new(OneRead(false));
        assert_eq!(framer.next_turn().unwrap(), FrameTurn::Lines(vec![]));
        let FrameTurn::Eof { salvaged } = framer.next_turn().unwrap() else {
            panic!()
        };
        assert_eq!(salvaged, Some("type=EOE msg=audit(1.0:1):".to_string()));
    }

    #[test]
    fn directory_source_rotates_to_newer_file() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("a.log");
        fs::write(&old, "first\n").unwrap();

        let mut source = DirectorySource::new(dir.path()).with_poll_interval(Duration::from_millis(5));
        let mut framer = LineFramer::new_for_test(&mut source);
        let lines = framer.drain_available();
        assert_eq!(lines, vec!["first"]);

        // a newer file appears; the source should rotate to it once the
        // first file stops producing data.
        std::thread::sleep(Duration::from_millis(10));
        let newer = dir.path().join("b.log");
        fs::write(&newer, "second\n").unwrap();
        let lines = framer.drain_available();
        assert_eq!(lines, vec!["second"]);
    }

    impl<'a> LineFramer<&'a mut DirectorySource> {
        fn new_for_test(source: &'a mut DirectorySource) -> Self {
            LineFramer::new(source)
        }

        /// Test helper: performs turns until at least one line is produced
        /// (the directory source blocks internally rather than returning
        /// `Eof`, so a bounded retry loop stands in for a real follow
        /// loop's outer iteration).
        fn drain_available(&mut self) -> Vec<String> {
            for _ in 0..50 {
                if let FrameTurn::Lines(lines) = self.next_turn().unwrap() {
                    if !lines.is_empty() {
                        return lines;
                    }
                }
            }
            Vec::new()
        }
    }
}
