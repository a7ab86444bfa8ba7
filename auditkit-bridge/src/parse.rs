//! Audit-line grammar: header extraction, the `ubsi_intercepted=` wrapper
//! rewrite, and `SYSCALL` field extraction. Grounded on
//! `spadeAuditBridge.c`'s `get_time_and_eventid`, `ubsi_intercepted_handler`
//! and `syscall_handler`.

/// `type=T msg={audit,ubsi}(seconds.millis:event_id): ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub record_type: String,
    pub seconds: i64,
    pub millis: i64,
    pub event_id: u64,
}

/// Parses the `type=` / `msg=audit(...)` (or `msg=ubsi(...)`) header common
/// to every record. Returns `None` if either piece is missing or malformed;
/// such lines are not audit records and are dropped by the caller.
pub fn parse_header(line: &str) -> Option<RecordHeader> {
    let rest = line.strip_prefix("type=")?;
    let (record_type, rest) = rest.split_once(' ')?;
    let rest = rest
        .strip_prefix("msg=audit(")
        .or_else(|| rest.strip_prefix("msg=ubsi("))?;
    let (stamp, _) = rest.split_once(')')?;
    let (secmsec, event_id) = stamp.split_once(':')?;
    let (seconds, millis) = secmsec.split_once('.')?;
    Some(RecordHeader {
        record_type: record_type.to_string(),
        seconds: seconds.parse().ok()?,
        millis: millis.parse().ok()?,
        event_id: event_id.parse().ok()?,
    })
}

/// Record types that the reorderer discards outright rather than buffering
/// (spec.md §4.G).
pub fn is_discarded_type(record_type: &str) -> bool {
    record_type == "EOE" || record_type == "PROCTILE" || record_type.starts_with("UNKNOWN[")
}

/// Whether an emitted (already reordered) record should be routed into the
/// UBSI engine rather than passed through verbatim (spec.md §4.G).
pub fn is_syscall_candidate(line: &str) -> bool {
    line.contains("type=SYSCALL") || line.contains("ubsi_intercepted=")
}

/// Rewrites a `ubsi_intercepted="syscall=... ppid=... pid=... ..."` wrapper
/// into a synthetic `type=SYSCALL` line carrying just the unwrapped fields,
/// preserving the original header. Returns `None` if the line carries no
/// such wrapper, or the wrapper's content is malformed.
pub fn rewrite_ubsi_intercepted(line: &str) -> Option<String> {
    let marker = "ubsi_intercepted=";
    let marker_at = line.find(marker)?;
    let prefix = &line[..marker_at];
    let after_marker = &line[marker_at + marker.len()..];
    let quote_start = after_marker.find('"')? + 1;
    let quoted = &after_marker[quote_start..];
    let quote_end = quoted.rfind('"')?;
    let inner = &quoted[..quote_end];
    if !inner.contains("syscall=") {
        return None;
    }
    let syscall_at = inner.find("syscall=")?;
    Some(format!("{prefix}{}\n", &inner[syscall_at..]))
}

/// Fields parsed out of a `type=SYSCALL` record's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallFields {
    pub sysno: i32,
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub ppid: i64,
    pub pid: i64,
    pub success: bool,
    pub exit: i64,
}

fn find_kv<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!(" {key}=");
    let at = line.find(&needle)?;
    let rest = &line[at + needle.len()..];
    Some(rest.split(' ').next().unwrap_or(rest))
}

fn parse_hex(line: &str, key: &str) -> Option<u64> {
    u64::from_str_radix(find_kv(line, key)?, 16).ok()
}

fn parse_dec<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    find_kv(line, key)?.parse().ok()
}

/// `sysno == 60` (exit) or `sysno == 231` (exit_group) carry no `success=`
/// field and are always treated as successful (`get_succ` in the source).
fn has_implicit_success(sysno: i32) -> bool {
    sysno == 60 || sysno == 231
}

pub fn parse_syscall_fields(line: &str) -> Option<SyscallFields> {
    let sysno: i32 = parse_dec(line, "syscall")?;
    let success = if has_implicit_success(sysno) {
        true
    } else {
        find_kv(line, "success").map(|s| s == "yes").unwrap_or(false)
    };
    Some(SyscallFields {
        sysno,
        a0: parse_hex(line, "a0").unwrap_or(0),
        a1: parse_hex(line, "a1").unwrap_or(0),
        a2: parse_hex(line, "a2").unwrap_or(0),
        a3: parse_hex(line, "a3").unwrap_or(0),
        ppid: parse_dec(line, "ppid")?,
        pid: parse_dec(line, "pid")?,
        success,
        exit: parse_dec(line, "exit").unwrap_or(0),
    })
}

/// The `ppid=...` tail of a record, used as the captured `proc=` snippet for
/// `UBSI_ENTRY`/`UBSI_EXIT` output (spec.md §4.H). Mirrors the source's
/// pointer arithmetic: the snippet begins at `ppid=`, not at the space
/// before it, and runs to end of line with any trailing newline trimmed.
pub fn proc_tail(line: &str) -> String {
    match line.find(" ppid=") {
        Some(at) => line[at + 1..].trim_end_matches('\n').to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audit_header() {
        let h = parse_header("type=SYSCALL msg=audit(1234.567:890): syscall=62").unwrap();
        assert_eq!(h.record_type, "SYSCALL");
        assert_eq!(h.seconds, 1234);
        assert_eq!(h.millis, 567);
        assert_eq!(h.event_id, 890);
    }

    #[test]
    fn parses_ubsi_header() {
        let h = parse_header("type=UBSI_ENTRY msg=ubsi(10.050:5): unit=(...)").unwrap();
        assert_eq!(h.record_type, "UBSI_ENTRY");
        assert_eq!(h.event_id, 5);
    }

    #[test]
    fn discarded_types() {
        assert!(is_discarded_type("EOE"));
        assert!(is_discarded_type("PROCTILE"));
        assert!(is_discarded_type("UNKNOWN[1234]"));
        assert!(!is_discarded_type("SYSCALL"));
    }

    #[test]
    fn rewrites_ubsi_wrapper_into_synthetic_syscall_line() {
        let line = r#"type=SYSCALL msg=audit(10.050:5): ubsi_intercepted="syscall=62 success=yes exit=0 a0=ffffff9c a1=7 a2=0 a3=0 items=0 ppid=100 pid=200 comm="worker"""#;
        let rewritten = rewrite_ubsi_intercepted(line).unwrap();
        assert!(rewritten.starts_with("type=SYSCALL msg=audit(10.050:5): syscall=62"));
        assert!(rewritten.ends_with('\n'));
        let fields = parse_syscall_fields(&rewritten).unwrap();
        assert_eq!(fields.sysno, 62);
        assert_eq!(fields.a0, 0xffffff9c);
        assert_eq!(fields.pid, 200);
        assert_eq!(fields.ppid, 100);
    }

    #[test]
    fn non_wrapper_line_is_not_rewritten() {
        assert!(rewrite_ubsi_intercepted("type=SYSCALL msg=audit(10.050:5): syscall=62").is_none());
    }

    #[test]
    fn parses_syscall_fields_with_implicit_success() {
        let fields =
            parse_syscall_fields("type=SYSCALL msg=audit(1.0:1): syscall=60 a0=0 ppid=1 pid=2")
                .unwrap();
        assert!(fields.success);
    }

    #[test]
    fn proc_tail_starts_at_ppid_not_the_leading_space() {
        let line = "type=SYSCALL msg=audit(1.0:1): syscall=62 ppid=100 pid=200 comm=\"x\"\n";
        assert_eq!(proc_tail(line), "ppid=100 pid=200 comm=\"x\"");
    }

    #[test]
    fn proc_tail_empty_when_absent() {
        assert_eq!(proc_tail("type=SYSCALL msg=audit(1.0:1): syscall=62"), "");
    }

    #[test]
    fn syscall_candidate_detection() {
        assert!(is_syscall_candidate("type=SYSCALL msg=audit(1.0:1): syscall=62"));
        assert!(is_syscall_candidate(
            r#"type=SYSCALL msg=audit(1.0:1): ubsi_intercepted="syscall=62""#
        ));
        assert!(!is_syscall_candidate("type=CWD msg=audit(1.0:1): cwd=\"/\""));
    }
}
