//! `auditkit-bridge` binary: reads audit records from a socket, a single
//! file, a list of files, or a watched directory, and writes reordered
//! (optionally UBSI-annotated) records to stdout. Grounded on
//! `spadeAuditBridge.c`'s `main`/`socket_read`/`read_log`/`dir_read`.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use auditkit_bridge::{DirectorySource, Pipeline, PipelineTurn};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "auditkit-bridge", about = "Userspace audit bridge: framing, reordering and UBSI unit reconstruction")]
struct Cli {
    /// Enable UBSI analysis (otherwise passthrough + reorder only).
    #[arg(short = 'u', long = "unit")]
    unit: bool,

    /// Connect to a Unix stream socket and read records.
    #[arg(short = 's', long = "socket", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Read a file whose lines each name a log file to process in order.
    #[arg(short = 'f', long = "files", value_name = "PATH")]
    files: Option<PathBuf>,

    /// Process a single log file.
    #[arg(short = 'F', long = "file", value_name = "PATH")]
    file: Option<PathBuf>,

    /// Watch a directory; advance through rotated files by mtime.
    #[arg(short = 'd', long = "dir", value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Only consider files with mtime strictly greater than this instant
    /// (directory mode). Format: YYYY-MM-DD:HH:MM:SS.
    #[arg(short = 't', long = "time", value_name = "YYYY-MM-DD:HH:MM:SS")]
    time: Option<String>,

    /// Coalesce up to N consecutive UENTRYs per thread into one reported unit.
    #[arg(short = 'm', long = "merge-unit", default_value_t = 0)]
    merge_unit: i64,

    /// Ignore INT/KILL/TERM and continue to EOF.
    #[arg(short = 'w', long = "wait-for-end")]
    wait_for_end: bool,
}

/// Chains a sequence of files named one-per-line in `list_path`, end to end,
/// as a single [`Read`] (the `-f/--files` mode).
struct FileList {
    remaining: std::vec::IntoIter<PathBuf>,
    current: Option<File>,
}

impl FileList {
    fn open(list_path: &PathBuf) -> io::Result<Self> {
        let list = File::open(list_path)?;
        let paths: Vec<PathBuf> = BufReader::new(list)
            .lines()
            .collect::<io::Result<Vec<String>>>()?
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect();
        Ok(Self {
            remaining: paths.into_iter(),
            current: None,
        })
    }
}

impl Read for FileList {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.current.is_none() {
                match self.remaining.next() {
                    Some(path) => self.current = Some(File::open(path)?),
                    None => return Ok(0),
                }
            }
            let file = self.current.as_mut().expect("checked above");
            let n = file.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.current = None;
        }
    }
}

fn parse_reference_time(time: &str) -> anyhow::Result<SystemTime> {
    let parsed = chrono::NaiveDateTime::parse_from_str(time, "%Y-%m-%d:%H:%M:%S")?;
    let secs = parsed.and_utc().timestamp();
    Ok(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs.max(0) as u64))
}

fn build_source(cli: &Cli) -> anyhow::Result<Box<dyn Read + Send>> {
    if let Some(socket) = &cli.socket {
        let stream = UnixStream::connect(socket)?;
        return Ok(Box::new(stream));
    }
    if let Some(file) = &cli.file {
        return Ok(Box::new(File::open(file)?));
    }
    if let Some(list) = &cli.files {
        return Ok(Box::new(FileList::open(list)?));
    }
    if let Some(dir) = &cli.dir {
        let mut source = DirectorySource::new(dir.clone());
        if let Some(time) = &cli.time {
            source = source.with_reference_time(parse_reference_time(time)?);
        }
        return Ok(Box::new(source));
    }
    anyhow::bail!("one of -s/--socket, -F/--file, -f/--files or -d/--dir is required")
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let source = match build_source(&cli) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("auditkit-bridge: {err}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("#CONTROL_MSG#pid={}", std::process::id());

    let wait_for_end = cli.wait_for_end;
    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupted.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if !wait_for_end {
            handler_flag.store(true, Ordering::SeqCst);
        }
    }) {
        log::warn!("failed to install signal handler: {err}");
    }

    let mut pipeline = Pipeline::new(source, cli.merge_unit, cli.unit);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    loop {
        if interrupted.load(Ordering::SeqCst) {
            let lines = pipeline.flush();
            if let Err(err) = write_lines(&mut out, &lines) {
                eprintln!("auditkit-bridge: write error: {err}");
                return ExitCode::FAILURE;
            }
            break;
        }
        match pipeline.next_turn() {
            Ok(PipelineTurn::Lines(lines)) => {
                if let Err(err) = write_lines(&mut out, &lines) {
                    eprintln!("auditkit-bridge: write error: {err}");
                    return ExitCode::FAILURE;
                }
            }
            Ok(PipelineTurn::Eof(lines)) => {
                if let Err(err) = write_lines(&mut out, &lines) {
                    eprintln!("auditkit-bridge: write error: {err}");
                    return ExitCode::FAILURE;
                }
                break;
            }
            Err(err) => {
                eprintln!("auditkit-bridge: unrecoverable input error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn write_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn parses_reference_time_in_expected_format() {
        let t = parse_reference_time("2024-01-02:03:04:05").unwrap();
        let secs = t.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 1704164645);
    }

    #[test]
    fn rejects_malformed_reference_time() {
        assert!(parse_reference_time("not-a-time").is_err());
    }

    #[test]
    fn file_list_chains_files_in_listed_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        std::fs::write(&a, "first\n").unwrap();
        std::fs::write(&b, "second\n").unwrap();

        let list_path = dir.path().join("list.txt");
        let mut list = File::create(&list_path).unwrap();
        writeln!(list, "{}", a.display()).unwrap();
        writeln!(list, "{}", b.display()).unwrap();
        drop(list);

        let mut source = FileList::open(&list_path).unwrap();
        let mut collected = Vec::new();
        source.read_to_end(&mut collected).unwrap();
        assert_eq!(collected, b"first\nsecond\n");
    }
}
