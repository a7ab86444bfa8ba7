//! Shared wire model for the audit kernel core and the userspace bridge:
//! the tagged message variants, their `key=value` serializer, and the small
//! encoding helpers both sides agree on.

pub mod hex;
pub mod message;
pub mod seqbuf;

pub use message::{
    ConntrackInfo, IpAddr, IpVersion, Message, MessageType, NamespaceMessage, NamespaceOp,
    NetfilterHook, NetfilterMessage, NetfilterPriority, NetworkIoMessage, ProcessInfo, Transport,
    UbsiSentinelMessage, Version, TASK_COMM_LEN,
};
pub use seqbuf::{Overflow, SeqBuf};
