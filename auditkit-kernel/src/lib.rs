//! Kernel interception and filtering core, stated at the contract level
//! (spec.md §1): the hook state machine, the filter evaluator, the
//! action-chain iterator, netfilter packet classification and the
//! hardening policy. The syscall-table/ftrace install-and-restore protocol
//! is abstracted behind [`hook::HookInstaller`].

pub mod action_chain;
pub mod config;
pub mod filter;
pub mod harden;
pub mod hook;
pub mod lifecycle;
pub mod netfilter;
pub mod process;

pub use action_chain::{Action, ActionChain, ActionOutcome, ActionResultFlags};
pub use config::KernelConfig;
pub use filter::{FilterContext, FunctionNumber, HardenConfig as FilterHardenConfig};
pub use harden::PolicyDeny;
pub use hook::{HookDescriptor, HookInstaller, InstalledHook, PostContext, PreContext};
pub use lifecycle::{AlreadyInState, Engine, StartFailure};
pub use netfilter::{NetfilterClassifier, NetfilterObservation};
pub use process::{CurrentProcess, CurrentProcessProvider, IdList, IdMonitor, MonitorMode};
