//! Netfilter packet classification (spec.md §4.B/§8, invariant (c) and S6).

use auditkit_common::{ConntrackInfo, IpVersion, NetfilterHook, NetfilterMessage, NetfilterPriority, Transport};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::filter::{conntrack_is_actionable, FilterContext};

/// A raw netfilter observation before classification. `ip_version` and
/// `transport` are `Option` because the source packet may not carry enough
/// information to classify it (e.g. a non-IP or non-TCP/UDP packet); such
/// observations are discarded.
#[derive(Debug, Clone)]
pub struct NetfilterObservation {
    pub hook: NetfilterHook,
    pub priority: NetfilterPriority,
    pub ip_version: Option<IpVersion>,
    pub transport: Option<Transport>,
    pub src_addr: auditkit_common::IpAddr,
    pub src_port: u16,
    pub dst_addr: auditkit_common::IpAddr,
    pub dst_port: u16,
    pub net_ns_inum: u64,
    pub skb_id: u64,
}

/// Classifies observations into emittable [`NetfilterMessage`]s, counting
/// discards. Invariant (c): "A netfilter message carries a well-defined IP
/// version and transport; otherwise it is dropped and a discard counter
/// increments."
#[derive(Default)]
pub struct NetfilterClassifier {
    discarded: AtomicU64,
}

impl NetfilterClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn classify(&self, obs: NetfilterObservation) -> Option<NetfilterMessage> {
        let (Some(ip_version), Some(transport)) = (obs.ip_version, obs.transport) else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            log::debug!("netfilter observation dropped: missing ip_version/transport");
            return None;
        };
        Some(NetfilterMessage {
            hook: obs.hook,
            priority: obs.priority,
            ip_version,
            transport,
            src_addr: obs.src_addr,
            src_port: obs.src_port,
            dst_addr: obs.dst_addr,
            dst_port: obs.dst_port,
            net_ns_inum: obs.net_ns_inum,
            skb_id: obs.skb_id,
        })
    }

    /// Applies the conntrack monitor policy (spec.md §4.B `conntrack_is_actionable`,
    /// §8 scenario S6) before classification: a packet whose connection-tracking
    /// state the policy rejects (e.g. `monitor_ct=ONLY_NEW` against an
    /// `ESTABLISHED` packet) is dropped and counted here, without ever reaching
    /// [`classify`](Self::classify).
    pub fn classify_with_policy(
        &self,
        ctx: &FilterContext,
        ct: ConntrackInfo,
        obs: NetfilterObservation,
    ) -> Option<NetfilterMessage> {
        if !conntrack_is_actionable(ctx, ct) {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            log::debug!("netfilter observation dropped: conntrack policy rejected {ct:?}");
            return None;
        }
        self.classify(obs)
    }
}
