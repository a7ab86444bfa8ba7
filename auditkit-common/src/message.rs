//! The tagged message model: one record type per kernel-core event source,
//! each exposing `{allocate, init, serialize}` over the shared [`SeqBuf`].
//!
//! This replaces the source's runtime `msg_type` + function-table dispatch
//! with a closed enum over per-variant structs. `serialize` never truncates:
//! on overflow the caller gets [`Overflow`] and must drop the whole record.

use crate::hex;
use crate::seqbuf::{Overflow, SeqBuf};

/// `TASK_COMM_LEN` on Linux; `comm` fields are hex-encoded at this fixed
/// width regardless of the actual string length.
pub const TASK_COMM_LEN: usize = 16;

/// Semantic version carried in the header. Suppressed from audit output
/// (spec.md 4.A): present on the wire struct, never written by `serialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Common process-info block attached to every message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessInfo {
    pub pid: i64,
    pub ppid: i64,
    pub uid: u32,
    pub euid: u32,
    pub suid: u32,
    pub fsuid: u32,
    pub gid: u32,
    pub egid: u32,
    pub sgid: u32,
    pub fsgid: u32,
    pub comm: [u8; TASK_COMM_LEN],
}

impl ProcessInfo {
    /// The zeroed process-info block produced by `allocate()` before `init`
    /// fills in real values.
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            ppid: 0,
            uid: 0,
            euid: 0,
            suid: 0,
            fsuid: 0,
            gid: 0,
            egid: 0,
            sgid: 0,
            fsgid: 0,
            comm: [0; TASK_COMM_LEN],
        }
    }

}

/// Every variant's message type tag, and the envelope `type=<T>` string used
/// when assembling a full audit line (spec.md does not name the envelope
/// type for the Namespace/Netfilter variants; see DESIGN.md's Open Question
/// log for the chosen values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Namespace,
    Netfilter,
    NetworkIo,
    Ubsi,
}

impl MessageType {
    pub fn envelope_type(self) -> &'static str {
        match self {
            MessageType::Namespace => "NS_EVENT",
            MessageType::Netfilter => "NETFILTER_PKT",
            MessageType::NetworkIo => "SYSCALL",
            MessageType::Ubsi => "SYSCALL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceOp {
    NewProcess,
    Setns,
}

impl NamespaceOp {
    fn token(self) -> &'static str {
        match self {
            NamespaceOp::NewProcess => "ns_NEWPROCESS",
            NamespaceOp::Setns => "ns_SETNS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMessage {
    pub op: NamespaceOp,
    pub syscall_number: i64,
    pub ns_pid: i64,
    pub host_pid: i64,
    pub inum_mnt: u64,
    pub inum_net: u64,
    pub inum_pid: u64,
    pub inum_pid_children: u64,
    pub inum_usr: u64,
    pub inum_ipc: u64,
    pub inum_cgroup: u64,
}

impl NamespaceMessage {
    pub fn serialize(&self, buf: &mut SeqBuf) -> Result<(), Overflow> {
        buf.push_kv("ns_syscall", self.syscall_number)?;
        buf.push_token("ns_subtype=ns_namespaces")?;
        buf.push_token(&format!("ns_operation={}", self.op.token()))?;
        buf.push_kv("ns_ns_pid", self.ns_pid)?;
        buf.push_kv("ns_host_pid", self.host_pid)?;
        buf.push_kv("ns_inum_mnt", self.inum_mnt)?;
        buf.push_kv("ns_inum_net", self.inum_net)?;
        buf.push_kv("ns_inum_pid", self.inum_pid)?;
        buf.push_kv("ns_inum_pid_children", self.inum_pid_children)?;
        buf.push_kv("ns_inum_usr", self.inum_usr)?;
        buf.push_kv("ns_inum_ipc", self.inum_ipc)?;
        buf.push_kv("ns_inum_cgroup", self.inum_cgroup)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetfilterHook {
    PreRouting,
    LocalIn,
    Forward,
    LocalOut,
    PostRouting,
}

impl NetfilterHook {
    fn token(self) -> &'static str {
        match self {
            NetfilterHook::PreRouting => "NF_INET_PRE_ROUTING",
            NetfilterHook::LocalIn => "NF_INET_LOCAL_IN",
            NetfilterHook::Forward => "NF_INET_FORWARD",
            NetfilterHook::LocalOut => "NF_INET_LOCAL_OUT",
            NetfilterHook::PostRouting => "NF_INET_POST_ROUTING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetfilterPriority {
    First,
    Last,
}

impl NetfilterPriority {
    fn token(self) -> &'static str {
        match self {
            NetfilterPriority::First => "NF_IP_PRI_FIRST",
            NetfilterPriority::Last => "NF_IP_PRI_LAST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    fn token(self) -> &'static str {
        match self {
            IpVersion::V4 => "IPV4",
            IpVersion::V6 => "IPV6",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    fn token(self) -> &'static str {
        match self {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        }
    }
}

/// Connection-tracking classification of a netfilter-observed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConntrackInfo {
    New,
    Established,
    Related,
    ReplyNew,
    ReplyEstablished,
    ReplyRelated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpAddr {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl std::fmt::Display for IpAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpAddr::V4(o) => f.write_str(&hex::ipv4_dotted(*o)),
            IpAddr::V6(o) => f.write_str(&hex::ipv6_grouped(*o)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetfilterMessage {
    pub hook: NetfilterHook,
    pub priority: NetfilterPriority,
    pub ip_version: IpVersion,
    pub transport: Transport,
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
    pub net_ns_inum: u64,
    pub skb_id: u64,
}

impl NetfilterMessage {
    pub fn serialize(&self, buf: &mut SeqBuf) -> Result<(), Overflow> {
        buf.push_token("nf_subtype=nf_netfilter")?;
        buf.push_token(&format!("nf_hook={}", self.hook.token()))?;
        buf.push_token(&format!("nf_priority={}", self.priority.token()))?;
        buf.push_kv("nf_id", format!("{:016x}", self.skb_id))?;
        buf.push_kv("nf_src_ip", &self.src_addr)?;
        buf.push_kv("nf_src_port", self.src_port)?;
        buf.push_kv("nf_dst_ip", &self.dst_addr)?;
        buf.push_kv("nf_dst_port", self.dst_port)?;
        buf.push_token(&format!("nf_protocol={}", self.transport.token()))?;
        buf.push_token(&format!("nf_ip_version={}", self.ip_version.token()))?;
        buf.push_kv("nf_net_ns", self.net_ns_inum)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIoMessage {
    pub syscall_number: i64,
    pub exit: i64,
    pub success: bool,
    pub fd: i64,
    pub sock_type: i32,
    pub local_saddr: Vec<u8>,
    pub remote_saddr: Vec<u8>,
    pub remote_saddr_size: u32,
    pub net_ns_inum: u64,
    pub process: ProcessInfo,
}

impl NetworkIoMessage {
    pub fn serialize(&self, buf: &mut SeqBuf) -> Result<(), Overflow> {
        let mut inner = SeqBuf::with_capacity(buf_capacity_hint());
        inner.push_kv("syscall", self.syscall_number)?;
        inner.push_kv("exit", self.exit)?;
        inner.push_kv("success", if self.success { 1 } else { 0 })?;
        inner.push_kv("fd", self.fd)?;
        inner.push_kv("pid", self.process.pid)?;
        inner.push_kv("ppid", self.process.ppid)?;
        inner.push_kv("gid", self.process.gid)?;
        inner.push_kv("egid", self.process.egid)?;
        inner.push_kv("sgid", self.process.sgid)?;
        inner.push_kv("fsgid", self.process.fsgid)?;
        inner.push_kv("uid", self.process.uid)?;
        inner.push_kv("euid", self.process.euid)?;
        inner.push_kv("suid", self.process.suid)?;
        inner.push_kv("fsuid", self.process.fsuid)?;
        inner.push_kv(
            "comm",
            hex::encode_fixed_width(&self.process.comm, TASK_COMM_LEN),
        )?;
        inner.push_kv("sock_type", self.sock_type)?;
        inner.push_kv("local_saddr", hex::encode(&self.local_saddr))?;
        inner.push_kv("remote_saddr", hex::encode(&self.remote_saddr))?;
        inner.push_kv("remote_saddr_size", self.remote_saddr_size)?;
        inner.push_kv("net_ns_inum", self.net_ns_inum)?;
        buf.push_kv_quoted("netio_intercepted", inner.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbsiSentinelMessage {
    pub syscall_number: i64,
    pub exit: i64,
    pub success: bool,
    pub signal: i64,
    pub target_pid: i64,
    pub process: ProcessInfo,
}

impl UbsiSentinelMessage {
    pub fn serialize(&self, buf: &mut SeqBuf) -> Result<(), Overflow> {
        let mut inner = SeqBuf::with_capacity(buf_capacity_hint());
        inner.push_kv("syscall", self.syscall_number)?;
        inner.push_token(&format!(
            "success={}",
            if self.success { "yes" } else { "no" }
        ))?;
        inner.push_kv("exit", self.exit)?;
        inner.push_kv("a0", format!("{:x}", self.signal as i32 as u32))?;
        inner.push_kv("a1", format!("{:x}", self.target_pid as i32 as u32))?;
        inner.push_token("a2=0")?;
        inner.push_token("a3=0")?;
        inner.push_token("items=0")?;
        inner.push_kv("pid", self.process.pid)?;
        inner.push_kv("ppid", self.process.ppid)?;
        inner.push_kv(
            "comm",
            hex::encode_fixed_width(&self.process.comm, TASK_COMM_LEN),
        )?;
        buf.push_kv_quoted("ubsi_intercepted", inner.as_str())
    }
}

fn buf_capacity_hint() -> usize {
    512
}

/// The closed tagged variant over the four message kinds, each exposing
/// `allocate()`/`init()`/`serialize()` uniformly via this enum. `allocate()`
/// yields a zeroed record; `init()` is simply constructing the variant with
/// real field values (Rust's move semantics make a separate two-step
/// allocate/init dance unnecessary beyond this enum boundary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Namespace(NamespaceMessage),
    Netfilter(NetfilterMessage),
    NetworkIo(NetworkIoMessage),
    UbsiSentinel(UbsiSentinelMessage),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Namespace(_) => MessageType::Namespace,
            Message::Netfilter(_) => MessageType::Netfilter,
            Message::NetworkIo(_) => MessageType::NetworkIo,
            Message::UbsiSentinel(_) => MessageType::Ubsi,
        }
    }

    /// Serialize the record body (without the `type=... msg=audit(...):`
    /// envelope) into a fresh, appropriately sized buffer.
    pub fn serialize(&self, capacity: usize) -> Result<String, Overflow> {
        let mut buf = SeqBuf::with_capacity(capacity);
        match self {
            Message::Namespace(m) => m.serialize(&mut buf)?,
            Message::Netfilter(m) => m.serialize(&mut buf)?,
            Message::NetworkIo(m) => m.serialize(&mut buf)?,
            Message::UbsiSentinel(m) => m.serialize(&mut buf)?,
        }
        Ok(buf.finish())
    }

    /// Assemble a full audit line: `type=<T> msg=audit(<sec>.<msec>:<eid>): <body>\n`.
    pub fn to_audit_line(
        &self,
        seconds: u64,
        millis: u32,
        event_id: u64,
        capacity: usize,
    ) -> Result<String, Overflow> {
        let body = self.serialize(capacity)?;
        Ok(format!(
            "type={} msg=audit({}.{:03}:{}): {}\n",
            self.message_type().envelope_type(),
            seconds,
            millis,
            event_id,
            body
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_process() -> ProcessInfo {
        ProcessInfo {
            pid: 200,
            ppid: 100,
            uid: 0,
            euid: 0,
            suid: 0,
            fsuid: 0,
            gid: 0,
            egid: 0,
            sgid: 0,
            fsgid: 0,
            comm: *b"bash\0\0\0\0\0\0\0\0\0\0\0\0",
        }
    }

    #[test]
    fn netio_message_quotes_inner_kv_list() {
        let msg = NetworkIoMessage {
            syscall_number: 44,
            exit: 0,
            success: true,
            fd: 3,
            sock_type: 1,
            local_saddr: vec![0x02, 0x00],
            remote_saddr: vec![0x02, 0x00],
            remote_saddr_size: 16,
            net_ns_inum: 4026531840,
            process: sample_process(),
        };
        let mut buf = SeqBuf::with_capacity(1024);
        msg.serialize(&mut buf).unwrap();
        let out = buf.finish();
        assert!(out.starts_with("netio_intercepted=\""));
        assert!(out.contains("syscall=44"));
        assert!(out.contains("success=1"));
        assert!(out.contains("comm=62617368"));
    }

    #[test]
    fn ubsi_sentinel_message_round_trips_hex_args() {
        let msg = UbsiSentinelMessage {
            syscall_number: 62,
            exit: 0,
            success: true,
            signal: -100,
            target_pid: 7,
            process: sample_process(),
        };
        let mut buf = SeqBuf::with_capacity(512);
        msg.serialize(&mut buf).unwrap();
        let out = buf.finish();
        assert!(out.contains("a0=ffffff9c"));
        assert!(out.contains("a1=7"));
    }

    #[test]
    fn namespace_message_emits_flat_kv() {
        let msg = NamespaceMessage {
            op: NamespaceOp::NewProcess,
            syscall_number: 56,
            ns_pid: 10,
            host_pid: 10000,
            inum_mnt: 1,
            inum_net: 2,
            inum_pid: 3,
            inum_pid_children: 4,
            inum_usr: 5,
            inum_ipc: 6,
            inum_cgroup: 7,
        };
        let mut buf = SeqBuf::with_capacity(512);
        msg.serialize(&mut buf).unwrap();
        assert_eq!(
            buf.finish(),
            "ns_syscall=56 ns_subtype=ns_namespaces ns_operation=ns_NEWPROCESS ns_ns_pid=10 \
             ns_host_pid=10000 ns_inum_mnt=1 ns_inum_net=2 ns_inum_pid=3 ns_inum_pid_children=4 \
             ns_inum_usr=5 ns_inum_ipc=6 ns_inum_cgroup=7"
        );
    }

    #[test]
    fn overflow_drops_whole_record() {
        let msg = NamespaceMessage {
            op: NamespaceOp::Setns,
            syscall_number: 1,
            ns_pid: 1,
            host_pid: 1,
            inum_mnt: 1,
            inum_net: 1,
            inum_pid: 1,
            inum_pid_children: 1,
            inum_usr: 1,
            inum_ipc: 1,
            inum_cgroup: 1,
        };
        let mut buf = SeqBuf::with_capacity(8);
        assert!(msg.serialize(&mut buf).is_err());
    }
}
