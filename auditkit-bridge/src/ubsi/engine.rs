//! UBSI unit-analysis engine (spec.md §4.H), grounded on
//! `spadeAuditBridge.c`'s `UBSI_event`/`non_UBSI_event`/`unit_entry`/
//! `loop_entry`/`loop_exit`/`mem_read`/`mem_write`/`UBSI_dep`/`set_pid`/
//! `proc_end`/`proc_group_end`.

use std::collections::{HashMap, HashSet};

use crate::parse::{self, SyscallFields};

use super::iteration::IterationCounter;
use super::types::{ThreadKey, ThreadTime, Timestamp, UnitKey};

const MAX_SIGNO: usize = 50;

const SIGINT: i64 = 2;
const SIGKILL: i64 = 9;
const SIGTERM: i64 = 15;

const SYS_RT_SIGACTION: i32 = 13;
const SYS_CLONE: i32 = 56;
const SYS_FORK: i32 = 57;
const SYS_VFORK: i32 = 58;
const SYS_EXECVE: i32 = 59;
const SYS_EXIT: i32 = 60;
const SYS_KILL: i32 = 62;
const SYS_EXIT_GROUP: i32 = 231;
const SYS_UBSI_MARKER: i32 = 322;

const UENTRY: u64 = 0xffffff9c;
const UENTRY_ID: u64 = 0xffffff9a;
const UEXIT: u64 = 0xffffff9b;
const MREAD1: u64 = 0xffffff38;
const MREAD2: u64 = 0xffffff37;
const MWRITE1: u64 = 0xfffffed4;
const MWRITE2: u64 = 0xfffffed3;
const UDEP: u64 = 0xfffffe70;

fn is_ubsi_sentinel(a0: u64) -> bool {
    matches!(
        a0,
        UENTRY | UENTRY_ID | UEXIT | MREAD1 | MREAD2 | MWRITE1 | MWRITE2 | UDEP
    )
}

struct UnitTableEntry {
    key: ThreadKey,
    valid: bool,
    cur_unit: UnitKey,
    r_addr: u64,
    w_addr: u64,
    link_unit: HashSet<UnitKey>,
    mem_unit: HashSet<u64>,
    /// Leader-only: last unit that wrote each address.
    mem_proc: HashMap<u64, UnitKey>,
    /// Leader-only: external unit id -> unit, installed by `UENTRY_ID`.
    unit_id_map: HashMap<i64, UnitKey>,
    merge_count: i64,
    proc_snippet: String,
    signal_handler_installed: [bool; MAX_SIGNO],
}

impl UnitTableEntry {
    fn new(key: ThreadKey) -> Self {
        Self {
            key,
            valid: false,
            cur_unit: UnitKey {
                tid: key.tid,
                thread_time: key.thread_time,
                loopid: 0,
                iteration: 0,
                timestamp: Timestamp(0),
                count: 0,
            },
            r_addr: 0,
            w_addr: 0,
            link_unit: HashSet::new(),
            mem_unit: HashSet::new(),
            mem_proc: HashMap::new(),
            unit_id_map: HashMap::new(),
            merge_count: 0,
            proc_snippet: String::new(),
            signal_handler_installed: [false; MAX_SIGNO],
        }
    }

    /// Clears per-unit state without touching the leader-only maps or the
    /// merge-unit counter. Used on every loop transition (spec.md §4.H,
    /// "finalize it").
    fn finalize_unit_state(&mut self) {
        self.link_unit.clear();
        self.mem_unit.clear();
        self.r_addr = 0;
        self.w_addr = 0;
    }
}

/// Reconstructs loop units, memory-provenance dependencies and
/// thread/process lifecycle from a stream of (already reordered) syscall
/// records. One instance per bridge run.
pub struct UbsiEngine {
    unit_table: HashMap<ThreadKey, UnitTableEntry>,
    thread_group: HashMap<ThreadKey, HashSet<ThreadKey>>,
    thread_group_leader: HashMap<ThreadKey, ThreadKey>,
    thread_create_time: HashMap<i64, ThreadTime>,
    iteration_counter: IterationCounter,
    merge_unit: i64,
}

impl UbsiEngine {
    /// `merge_unit <= 0` disables merge-unit coalescing: every `UENTRY` is
    /// reported.
    pub fn new(merge_unit: i64) -> Self {
        Self {
            unit_table: HashMap::new(),
            thread_group: HashMap::new(),
            thread_group_leader: HashMap::new(),
            thread_create_time: HashMap::new(),
            iteration_counter: IterationCounter::new(),
            merge_unit,
        }
    }

    fn thread_key_for(&self, tid: i64) -> ThreadKey {
        ThreadKey {
            tid,
            thread_time: self
                .thread_create_time
                .get(&tid)
                .copied()
                .unwrap_or(ThreadTime::UNKNOWN),
        }
    }

    fn leader_of(&self, key: ThreadKey) -> ThreadKey {
        self.thread_group_leader.get(&key).copied().unwrap_or(key)
    }

    fn entry_mut(&mut self, tid: i64) -> &mut UnitTableEntry {
        let key = self.thread_key_for(tid);
        self.unit_table
            .entry(key)
            .or_insert_with(|| UnitTableEntry::new(key))
    }

    /// Lazily seeds a thread's creation time from the first record
    /// observed for it, unless already set. Skips the sentinel timestamp
    /// `0.0` ("unknown"), per spec.md §9.
    fn note_thread_seen(&mut self, tid: i64, at: Timestamp) {
        if at.0 == 0 {
            return;
        }
        self.thread_create_time.entry(tid).or_insert(ThreadTime {
            seconds: at.seconds_part(),
            millis: at.millis_part(),
        });
    }

    /// Consumes one (already reordered, already unwrapped if it was a
    /// `ubsi_intercepted=` wrapper) `type=SYSCALL` record. Returns the
    /// lines this record produces, in order: for UBSI sentinel `kill`
    /// calls, zero or more synthesized `UBSI_*` records; otherwise the
    /// record itself, passed through verbatim.
    pub fn handle(&mut self, line: &str) -> Vec<String> {
        let Some(header) = parse::parse_header(line) else {
            log::warn!("ubsi engine received a line with no parseable header");
            return vec![line.to_string()];
        };
        let Some(fields) = parse::parse_syscall_fields(line) else {
            log::warn!("ubsi engine could not parse syscall fields, passing through raw");
            return vec![line.to_string()];
        };
        let timestamp = Timestamp::from_parts(header.seconds, header.millis);
        let tid = fields.pid;
        self.note_thread_seen(tid, timestamp);

        if fields.sysno == SYS_KILL && is_ubsi_sentinel(fields.a0) {
            self.handle_ubsi_event(tid, fields.a0, fields.a1, line, timestamp, header.event_id)
        } else {
            self.handle_non_ubsi_event(tid, &fields, header.seconds, header.millis);
            vec![line.to_string()]
        }
    }

    fn handle_ubsi_event(
        &mut self,
        tid: i64,
        a0: u64,
        a1: u64,
        line: &str,
        timestamp: Timestamp,
        event_id: u64,
    ) -> Vec<String> {
        match a0 {
            UENTRY => self
                .unit_entry(tid, a1 as i64, line, timestamp, event_id)
                .into_iter()
                .collect(),
            UENTRY_ID => {
                self.unit_entry_map_uid(tid, a1 as i64);
                Vec::new()
            }
            UEXIT => self.unit_exit(tid, line, timestamp, event_id).into_iter().collect(),
            MREAD1 => {
                self.entry_mut(tid).r_addr = a1 << 32;
                Vec::new()
            }
            MREAD2 => {
                let addr = {
                    let entry = self.entry_mut(tid);
                    entry.r_addr = (entry.r_addr & 0xffff_ffff_0000_0000) | (a1 & 0xffff_ffff);
                    entry.r_addr
                };
                self.mem_read(tid, addr, timestamp, event_id)
                    .into_iter()
                    .collect()
            }
            MWRITE1 => {
                self.entry_mut(tid).w_addr = a1 << 32;
                Vec::new()
            }
            MWRITE2 => {
                let addr = {
                    let entry = self.entry_mut(tid);
                    entry.w_addr = (entry.w_addr & 0xffff_ffff_0000_0000) | (a1 & 0xffff_ffff);
                    entry.w_addr
                };
                self.mem_write(tid, addr);
                Vec::new()
            }
            UDEP => self
                .ubsi_dep(tid, a1 as i64, timestamp, event_id)
                .into_iter()
                .collect(),
            _ => unreachable!("is_ubsi_sentinel gates this dispatch"),
        }
    }

    fn unit_entry(
        &mut self,
        tid: i64,
        loopid: i64,
        line: &str,
        timestamp: Timestamp,
        event_id: u64,
    ) -> Option<String> {
        if self.merge_unit > 0 {
            let entry = self.entry_mut(tid);
            entry.merge_count += 1;
            let materialize = entry.merge_count == 1 || entry.merge_count > self.merge_unit;
            if entry.merge_count > self.merge_unit {
                entry.merge_count = 1;
            }
            if !materialize {
                return None;
            }
        }

        let key = self.thread_key_for(tid);
        let proc_tail = parse::proc_tail(line);
        let entry = self.entry_mut(tid);
        if !entry.valid {
            entry.finalize_unit_state();
            entry.cur_unit = UnitKey {
                tid,
                thread_time: key.thread_time,
                loopid,
                iteration: 0,
                timestamp,
                count: 0,
            };
            entry.proc_snippet = proc_tail;
        } else if entry.cur_unit.loopid == loopid {
            entry.finalize_unit_state();
            entry.cur_unit.iteration += 1;
            entry.cur_unit.timestamp = timestamp;
        } else {
            entry.finalize_unit_state();
            entry.cur_unit = UnitKey {
                tid,
                thread_time: key.thread_time,
                loopid,
                iteration: 0,
                timestamp,
                count: 0,
            };
            entry.proc_snippet = proc_tail;
        }
        entry.valid = true;

        let count = self
            .iteration_counter
            .get(tid, loopid, entry.cur_unit.iteration, timestamp);
        let entry = self.entry_mut(tid);
        entry.cur_unit.count = count;

        if entry.proc_snippet.is_empty() {
            return None;
        }
        Some(format!(
            "type=UBSI_ENTRY msg=ubsi({timestamp}:{event_id}): {} {}",
            entry.cur_unit.render("unit"),
            entry.proc_snippet
        ))
    }

    fn unit_entry_map_uid(&mut self, tid: i64, ext_id: i64) {
        let key = self.thread_key_for(tid);
        let cur_unit = self.unit_table.get(&key).map(|e| e.cur_unit);
        let Some(cur_unit) = cur_unit else { return };
        let leader = self.leader_of(key);
        self.unit_table
            .entry(leader)
            .or_insert_with(|| UnitTableEntry::new(leader))
            .unit_id_map
            .insert(ext_id, cur_unit);
    }

    fn unit_exit(
        &mut self,
        tid: i64,
        _line: &str,
        timestamp: Timestamp,
        event_id: u64,
    ) -> Option<String> {
        let entry = self.entry_mut(tid);
        if !entry.valid {
            entry.valid = false;
            return None;
        }
        entry.finalize_unit_state();
        let proc_snippet = entry.proc_snippet.clone();
        entry.valid = false;
        if proc_snippet.is_empty() {
            return None;
        }
        Some(format!(
            "type=UBSI_EXIT  msg=ubsi({timestamp}:{event_id}): {proc_snippet}"
        ))
    }

    fn mem_write(&mut self, tid: i64, addr: u64) {
        let key = self.thread_key_for(tid);
        let Some(entry) = self.unit_table.get(&key) else {
            return;
        };
        if entry.cur_unit.loopid == 0 || entry.cur_unit.timestamp.0 == 0 {
            return;
        }
        if entry.mem_unit.contains(&addr) {
            return;
        }
        let cur_unit = entry.cur_unit;
        self.unit_table.get_mut(&key).unwrap().mem_unit.insert(addr);
        let leader = self.leader_of(key);
        self.unit_table
            .entry(leader)
            .or_insert_with(|| UnitTableEntry::new(leader))
            .mem_proc
            .insert(addr, cur_unit);
    }

    fn mem_read(&mut self, tid: i64, addr: u64, timestamp: Timestamp, event_id: u64) -> Option<String> {
        let key = self.thread_key_for(tid);
        let entry = self.unit_table.get(&key)?;
        if entry.cur_unit.loopid == 0 || entry.cur_unit.timestamp.0 == 0 {
            return None;
        }
        let cur_unit = entry.cur_unit;
        let leader = self.leader_of(key);
        let last_written = *self.unit_table.get(&leader)?.mem_proc.get(&addr)?;
        if last_written.timestamp.0 == 0 || last_written == cur_unit {
            return None;
        }
        let entry = self.unit_table.get_mut(&key)?;
        if entry.link_unit.contains(&last_written) {
            return None;
        }
        entry.link_unit.insert(last_written);
        let proc_snippet = entry.proc_snippet.clone();
        if proc_snippet.is_empty() {
            return None;
        }
        Some(format!(
            "type=UBSI_DEP msg=ubsi({timestamp}:{event_id}): {}, {} {proc_snippet}",
            last_written.render("dep"),
            cur_unit.render("unit"),
        ))
    }

    fn ubsi_dep(&mut self, tid: i64, ext_id: i64, timestamp: Timestamp, event_id: u64) -> Option<String> {
        let key = self.thread_key_for(tid);
        let leader = self.leader_of(key);
        let mapped = self.unit_table.get(&leader)?.unit_id_map.get(&ext_id).copied();
        let Some(mapped) = mapped else {
            log::debug!("UBSI_DEP referenced unknown external unit id {ext_id}");
            return None;
        };
        let cur_unit = self.unit_table.get(&key)?.cur_unit;
        if mapped == cur_unit {
            return None;
        }
        let entry = self.unit_table.get_mut(&key)?;
        if entry.link_unit.contains(&mapped) {
            return None;
        }
        entry.link_unit.insert(mapped);
        let proc_snippet = entry.proc_snippet.clone();
        if proc_snippet.is_empty() {
            return None;
        }
        Some(format!(
            "type=UBSI_DEP msg=ubsi({timestamp}:{event_id}): {}, {} {proc_snippet}",
            mapped.render("dep"),
            cur_unit.render("unit"),
        ))
    }

    fn handle_non_ubsi_event(&mut self, tid: i64, fields: &SyscallFields, seconds: i64, millis: i64) {
        let record_time = ThreadTime { seconds, millis };
        match fields.sysno {
            s if s == SYS_CLONE || s == SYS_FORK || s == SYS_VFORK => {
                if fields.success {
                    let child_tid = fields.exit;
                    self.proc_end(child_tid);
                    self.thread_create_time.insert(child_tid, record_time);
                    if fields.sysno == SYS_CLONE && fields.a2 > 0 {
                        self.set_pid(child_tid, tid);
                    }
                }
            }
            s if s == SYS_EXECVE || s == SYS_UBSI_MARKER => {
                self.proc_end(tid);
                if fields.sysno == SYS_EXECVE {
                    self.thread_create_time.insert(tid, record_time);
                }
            }
            SYS_EXIT => {
                self.proc_end(tid);
                self.thread_create_time.remove(&tid);
            }
            SYS_EXIT_GROUP => {
                self.proc_group_end(tid);
                self.thread_create_time.remove(&tid);
            }
            SYS_KILL => {
                let sig = fields.a1 as i64;
                if sig == SIGINT || sig == SIGKILL || sig == SIGTERM {
                    let target_tid = fields.a0 as i64;
                    let target_key = self.thread_key_for(target_tid);
                    // Mirrors the original's `if (target_ut == NULL) return;`:
                    // a target with no unit_table row of its own is left
                    // untouched, even if it's a thread-group leader with
                    // members (spadeAuditBridge.c's NULL check short-circuits
                    // before the thread_group_leader_hash lookup).
                    let Some(entry) = self.unit_table.get(&target_key) else {
                        return;
                    };
                    let handled =
                        (sig as usize) < MAX_SIGNO && entry.signal_handler_installed[sig as usize];
                    if !handled {
                        if self.thread_group.contains_key(&target_key) {
                            self.proc_group_end(target_tid);
                        } else {
                            self.proc_end(target_tid);
                        }
                    }
                }
            }
            SYS_RT_SIGACTION => {
                if fields.success {
                    let signo = fields.a0 as i64;
                    if (0..MAX_SIGNO as i64).contains(&signo) {
                        self.entry_mut(tid).signal_handler_installed[signo as usize] = true;
                    }
                }
            }
            _ => {}
        }
    }

    fn set_pid(&mut self, child_tid: i64, parent_tid: i64) {
        let parent_key = self.thread_key_for(parent_tid);
        let child_key = self.thread_key_for(child_tid);
        let leader = self.leader_of(parent_key);
        self.set_thread_group_leader(child_key, leader);
    }

    fn set_thread_group_leader(&mut self, member: ThreadKey, leader: ThreadKey) {
        if member == leader {
            return;
        }
        self.thread_group_leader.insert(member, leader);
        self.thread_group.entry(leader).or_default().insert(member);
    }

    fn proc_end(&mut self, tid: i64) {
        let key = self.thread_key_for(tid);
        self.proc_end_key(key);
    }

    fn proc_end_key(&mut self, key: ThreadKey) {
        if let Some(leader) = self.thread_group_leader.remove(&key) {
            if let Some(members) = self.thread_group.get_mut(&leader) {
                members.remove(&key);
            }
        }
        if let Some(entry) = self.unit_table.get_mut(&key) {
            entry.finalize_unit_state();
            entry.merge_count = 0;
            entry.mem_proc.clear();
            entry.unit_id_map.clear();
        }
        self.thread_group.remove(&key);
        self.unit_table.remove(&key);
    }

    fn proc_group_end(&mut self, tid: i64) {
        let leader_key = self.thread_key_for(tid);
        let members: Vec<ThreadKey> = self
            .thread_group
            .get(&leader_key)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for member in members {
            self.proc_end_key(member);
        }
        self.proc_end_key(leader_key);
    }
}
