//! Hardening policy: veto `kill` on protected thread-group-ids except from
//! authorized uids (spec.md §3 invariant (d), §8 scenario S5).

/// *PolicyDeny*: the harden check vetoed a `kill`. Synthesized as `-EACCES`
/// by the hook runtime; produces no state change (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDeny {
    pub target_tgid: i64,
    pub caller_uid: u32,
}

impl std::fmt::Display for PolicyDeny {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "denied kill on protected tgid {} by unauthorized uid {}",
            self.target_tgid, self.caller_uid
        )
    }
}
impl std::error::Error for PolicyDeny {}

/// Invariant (d): harden-protected tgids may be killed only by authorized
/// uids; violations produce `-EACCES` and no state change. Unprotected
/// targets and authorized callers are always permitted.
pub fn check_kill(
    protected_tgids: &[i64],
    authorized_uids: &[u32],
    target_tgid: i64,
    caller_uid: u32,
) -> Result<(), PolicyDeny> {
    if !protected_tgids.contains(&target_tgid) {
        return Ok(());
    }
    if authorized_uids.contains(&caller_uid) {
        return Ok(());
    }
    Err(PolicyDeny {
        target_tgid,
        caller_uid,
    })
}
