//! Pure filter-evaluator decision logic (spec.md §4.B). Every function here
//! is a total, side-effect-free function over a [`FilterContext`] snapshot —
//! no ambient state is read, so tests can exercise every branch directly.

use crate::process::IdMonitor;
use auditkit_common::ConntrackInfo;

/// The intercepted function numbers the filter evaluator discriminates on.
/// Not every hooked syscall needs a dedicated variant; only those the
/// evaluator branches on by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionNumber {
    SendTo,
    SendMsg,
    RecvFrom,
    RecvMsg,
    Clone,
    Fork,
    VFork,
    SetNs,
    Unshare,
    Connect,
    Kill,
    RtSigAction,
    Execve,
    Exit,
    ExitGroup,
    Other(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorFunctionResult {
    All,
    OnlyFailed,
    OnlySuccessful,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConntrackMonitor {
    All,
    OnlyNew,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetfilterFilterConfig {
    pub hooks_on: bool,
    pub use_user: bool,
    pub monitor_ct: Option<ConntrackMonitor>,
    pub m_user: IdMonitor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardenConfig {
    pub tgids: Vec<i64>,
    pub authorized_uids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterContext {
    pub network_io: bool,
    pub include_ns_info: bool,
    pub monitor_function_result: Option<MonitorFunctionResult>,
    pub m_pids: IdMonitor,
    pub m_ppids: IdMonitor,
    pub m_uids: IdMonitor,
    pub netfilter: NetfilterFilterConfig,
    pub harden: HardenConfig,
    /// Short-circuits every decision to `false` when auditing has not been
    /// started yet (spec.md §4.B, "if auditing not started, all return false").
    pub auditing_started: bool,
}

impl Default for MonitorFunctionResult {
    fn default() -> Self {
        MonitorFunctionResult::All
    }
}

pub fn function_number_is_actionable(ctx: &FilterContext, f: FunctionNumber) -> bool {
    use FunctionNumber::*;
    if matches!(f, SendTo | SendMsg | RecvFrom | RecvMsg) && !ctx.network_io {
        return false;
    }
    if matches!(f, Clone | Fork | VFork | SetNs | Unshare) && !ctx.include_ns_info {
        return false;
    }
    true
}

pub fn success_is_actionable(ctx: &FilterContext, success: bool) -> bool {
    match ctx.monitor_function_result.unwrap_or(MonitorFunctionResult::All) {
        MonitorFunctionResult::All => true,
        MonitorFunctionResult::OnlyFailed => !success,
        MonitorFunctionResult::OnlySuccessful => success,
    }
}

pub fn pid_is_actionable(m: &IdMonitor, pid: i64) -> bool {
    m.is_actionable(pid)
}

pub fn ppid_is_actionable(m: &IdMonitor, ppid: i64) -> bool {
    m.is_actionable(ppid)
}

pub fn uid_is_actionable(m: &IdMonitor, uid: i64) -> bool {
    m.is_actionable(uid)
}

pub fn pre_execution_is_actionable(
    ctx: &FilterContext,
    f: FunctionNumber,
    pid: i64,
    ppid: i64,
    uid: i64,
) -> bool {
    function_number_is_actionable(ctx, f)
        && pid_is_actionable(&ctx.m_pids, pid)
        && ppid_is_actionable(&ctx.m_ppids, ppid)
        && uid_is_actionable(&ctx.m_uids, uid)
}

pub fn post_execution_is_actionable(
    ctx: &FilterContext,
    f: FunctionNumber,
    pid: i64,
    ppid: i64,
    uid: i64,
    success: bool,
) -> bool {
    pre_execution_is_actionable(ctx, f, pid, ppid, uid) && success_is_actionable(ctx, success)
}

pub fn user_is_actionable(ctx: &FilterContext, uid: i64) -> bool {
    if !ctx.auditing_started {
        return false;
    }
    if !ctx.netfilter.use_user {
        return true;
    }
    ctx.netfilter.m_user.is_actionable(uid)
}

pub fn conntrack_is_actionable(ctx: &FilterContext, ct: ConntrackInfo) -> bool {
    if !ctx.auditing_started {
        return false;
    }
    match ctx.netfilter.monitor_ct {
        None => true,
        Some(ConntrackMonitor::All) => true,
        Some(ConntrackMonitor::OnlyNew) => matches!(ct, ConntrackInfo::New),
    }
}
