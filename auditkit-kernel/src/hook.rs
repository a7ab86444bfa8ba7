//! Function hook runtime (spec.md §4.D) and the install/uninstall protocol
//! (spec.md §9, "Replacing goto-based cleanup") modeled as an RAII guard
//! that rolls back on drop unless explicitly committed.
//!
//! The actual platform hook mechanism (ftrace-style trampoline or
//! syscall-table rewrite) is out of scope at the contract level named in
//! spec.md §1; [`HookInstaller`] is the trait a real integration would
//! implement.

use crate::action_chain::{ActionChain, ActionResultFlags};
use crate::filter::FunctionNumber;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolves and redirects a kernel symbol, and restores it on uninstall.
/// Stated at the contract level: a real implementation resolves the symbol
/// address (via kallsyms or a registered kprobe) and performs the redirect
/// using whichever platform mechanism is configured.
pub trait HookInstaller {
    /// Redirect `symbol_name` to the hook trampoline, returning the previous
    /// address so it can be restored later.
    fn install(&self, symbol_name: &str) -> Result<usize, LookupMiss>;
    /// Restore `symbol_name` to `orig_addr`.
    fn uninstall(&self, symbol_name: &str, orig_addr: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupMiss;

impl std::fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("kernel symbol resolution failed")
    }
}
impl std::error::Error for LookupMiss {}

/// Static description of one intercepted function.
pub struct HookDescriptor {
    pub function_number: FunctionNumber,
    pub symbol_name: &'static str,
    orig_ptr_slot: AtomicUsize,
}

impl HookDescriptor {
    pub const fn new(function_number: FunctionNumber, symbol_name: &'static str) -> Self {
        Self {
            function_number,
            symbol_name,
            orig_ptr_slot: AtomicUsize::new(0),
        }
    }
}

/// An installed hook. Dropping this without calling [`commit`](Self::commit)
/// rolls the redirect back — the RAII analog of the source's goto-cleanup
/// chain (install A, install B, on B's failure roll back A).
pub struct InstalledHook<'a, I: HookInstaller> {
    installer: &'a I,
    descriptor: &'a HookDescriptor,
    committed: bool,
}

impl<'a, I: HookInstaller> InstalledHook<'a, I> {
    pub fn install(installer: &'a I, descriptor: &'a HookDescriptor) -> Result<Self, LookupMiss> {
        let orig = installer.install(descriptor.symbol_name)?;
        descriptor.orig_ptr_slot.store(orig, Ordering::SeqCst);
        Ok(Self {
            installer,
            descriptor,
            committed: false,
        })
    }

    /// Mark this hook as intentionally kept installed; `Drop` becomes a
    /// no-op once committed.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<'a, I: HookInstaller> Drop for InstalledHook<'a, I> {
    fn drop(&mut self) {
        if !self.committed {
            let orig = self.descriptor.orig_ptr_slot.load(Ordering::SeqCst);
            self.installer.uninstall(self.descriptor.symbol_name, orig);
        }
    }
}

/// Immutable per-call pre-invocation context.
#[derive(Debug, Clone)]
pub struct PreContext {
    pub function_number: FunctionNumber,
    pub args: Vec<i64>,
    pub pid: i64,
    pub ppid: i64,
    pub uid: i64,
}

/// Post-invocation context: the pre context plus the captured result.
#[derive(Debug, Clone)]
pub struct PostContext {
    pub pre: PreContext,
    pub ret: i64,
    pub success: bool,
}

const EACCES: i64 = -13;

/// Per-function success predicate (spec.md §4.D): networking receive/send
/// succeed on `ret >= 0`; `connect` additionally treats `-EINPROGRESS` as
/// success; UBSI sentinel `kill` calls (handled upstream by the bridge, not
/// here) are always reported successful by the caller before this predicate
/// runs. Everything else defaults to `ret >= 0`.
pub fn default_success_predicate(function_number: FunctionNumber, ret: i64) -> bool {
    const EINPROGRESS: i64 = -115;
    match function_number {
        FunctionNumber::Connect => ret >= 0 || ret == EINPROGRESS,
        _ => ret >= 0,
    }
}

/// Runs one intercepted call through `pre actions -> (orig or -EACCES) ->
/// post actions`, per spec.md §4.D/§5 ("for any single call, this is a total
/// order"). `orig` is only invoked when no pre action set
/// `DISALLOW_FUNCTION`.
pub fn run_hook<Ctx>(
    chain: &ActionChain<Ctx>,
    ctx: &mut Ctx,
    pre: PreContext,
    orig: impl FnOnce(&PreContext) -> i64,
    success_predicate: impl FnOnce(FunctionNumber, i64) -> bool,
) -> (i64, ActionResultFlags) {
    let function_number = pre.function_number;
    let pre_flags = chain.run_pre(ctx);

    let ret = if pre_flags.contains(ActionResultFlags::DISALLOW_FUNCTION) {
        EACCES
    } else {
        orig(&pre)
    };

    let success = if pre_flags.contains(ActionResultFlags::DISALLOW_FUNCTION) {
        false
    } else {
        success_predicate(function_number, ret)
    };

    let _post = PostContext { pre, ret, success };
    let post_flags = chain.run_post(ctx, pre_flags);

    (ret, post_flags)
}
