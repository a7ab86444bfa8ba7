//! Per-function ordered pre/post action chains (spec.md §4.C).

use bitflags::bitflags;

bitflags! {
    /// Flags produced by actions during a single call. Monotonic for the
    /// duration of that call: once set, a flag is never cleared (spec.md §3,
    /// "once set it is monotonic for the current call").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActionResultFlags: u8 {
        const SKIP_PRE_ACTIONS   = 0b0001;
        const SKIP_POST_ACTIONS  = 0b0010;
        const SKIP_ALL           = 0b0100;
        const DISALLOW_FUNCTION  = 0b1000;
    }
}

/// Outcome of a single action invocation. `Continue` lets the chain proceed;
/// any other variant still lets the chain observe accumulated flags, but a
/// non-success return aborts the remainder of the chain for this call
/// without propagating past the wrapper (spec.md §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Continue,
    Abort,
}

/// A single pre- or post-action. Receives the accumulated flags and returns
/// the (possibly updated) flags plus whether the chain should keep going.
pub trait Action<Ctx> {
    fn run(&self, ctx: &mut Ctx, flags: ActionResultFlags) -> (ActionResultFlags, ActionOutcome);
}

impl<Ctx, F> Action<Ctx> for F
where
    F: Fn(&mut Ctx, ActionResultFlags) -> (ActionResultFlags, ActionOutcome),
{
    fn run(&self, ctx: &mut Ctx, flags: ActionResultFlags) -> (ActionResultFlags, ActionOutcome) {
        self(ctx, flags)
    }
}

/// The static ordered pre/post action lists registered for one function
/// number.
pub struct ActionChain<Ctx> {
    pre: Vec<Box<dyn Action<Ctx>>>,
    post: Vec<Box<dyn Action<Ctx>>>,
}

impl<Ctx> Default for ActionChain<Ctx> {
    fn default() -> Self {
        Self {
            pre: Vec::new(),
            post: Vec::new(),
        }
    }
}

impl<Ctx> ActionChain<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pre(&mut self, action: impl Action<Ctx> + 'static) -> &mut Self {
        self.pre.push(Box::new(action));
        self
    }

    pub fn push_post(&mut self, action: impl Action<Ctx> + 'static) -> &mut Self {
        self.post.push(Box::new(action));
        self
    }

    /// Run the pre chain in order; stop early once `SKIP_PRE_ACTIONS` (or
    /// `SKIP_ALL`) is set.
    pub fn run_pre(&self, ctx: &mut Ctx) -> ActionResultFlags {
        let mut flags = ActionResultFlags::empty();
        for action in &self.pre {
            let (next_flags, outcome) = action.run(ctx, flags);
            flags |= next_flags;
            if flags.intersects(ActionResultFlags::SKIP_PRE_ACTIONS | ActionResultFlags::SKIP_ALL)
            {
                break;
            }
            if outcome == ActionOutcome::Abort {
                break;
            }
        }
        flags
    }

    /// Run the post chain, honoring `SKIP_POST_ACTIONS`/`SKIP_ALL` set either
    /// by the pre chain (checked before the first post action) or by an
    /// earlier post action.
    pub fn run_post(&self, ctx: &mut Ctx, mut flags: ActionResultFlags) -> ActionResultFlags {
        if flags.intersects(ActionResultFlags::SKIP_POST_ACTIONS | ActionResultFlags::SKIP_ALL) {
            return flags;
        }
        for action in &self.post {
            let (next_flags, outcome) = action.run(ctx, flags);
            flags |= next_flags;
            if flags.intersects(ActionResultFlags::SKIP_POST_ACTIONS | ActionResultFlags::SKIP_ALL)
            {
                break;
            }
            if outcome == ActionOutcome::Abort {
                break;
            }
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_chain_stops_on_skip_pre_flag() {
        let mut chain: ActionChain<u32> = ActionChain::new();
        chain.push_pre(|_ctx: &mut u32, _flags| {
            (ActionResultFlags::SKIP_PRE_ACTIONS, ActionOutcome::Continue)
        });
        chain.push_pre(|ctx: &mut u32, _flags| {
            *ctx += 1;
            (ActionResultFlags::empty(), ActionOutcome::Continue)
        });
        let mut counter = 0u32;
        let flags = chain.run_pre(&mut counter);
        assert_eq!(counter, 0, "second pre action must not run");
        assert!(flags.contains(ActionResultFlags::SKIP_PRE_ACTIONS));
    }

    #[test]
    fn disallow_function_flag_is_monotonic_through_the_chain() {
        let mut chain: ActionChain<u32> = ActionChain::new();
        chain.push_pre(|_ctx: &mut u32, _flags| {
            (ActionResultFlags::DISALLOW_FUNCTION, ActionOutcome::Continue)
        });
        chain.push_pre(|_ctx: &mut u32, flags| {
            assert!(flags.contains(ActionResultFlags::DISALLOW_FUNCTION));
            (ActionResultFlags::empty(), ActionOutcome::Continue)
        });
        let mut ctx = 0u32;
        let flags = chain.run_pre(&mut ctx);
        assert!(flags.contains(ActionResultFlags::DISALLOW_FUNCTION));
    }

    #[test]
    fn post_chain_skipped_entirely_when_flagged_before_first_action() {
        let mut chain: ActionChain<u32> = ActionChain::new();
        chain.push_post(|ctx: &mut u32, _flags| {
            *ctx += 1;
            (ActionResultFlags::empty(), ActionOutcome::Continue)
        });
        let mut ctx = 0u32;
        chain.run_post(&mut ctx, ActionResultFlags::SKIP_POST_ACTIONS);
        assert_eq!(ctx, 0);
    }
}
