//! Naming constants and identifier derivation.
//!
//! These values are a compatibility contract: the cleanup logic of this and
//! future agent versions keys off them, so changing any of them is a breaking
//! change.

use nw_ipsets::bounded_name;
use nw_proto::{HostEndpointId, PolicyId, ProfileId, WorkloadEndpointId};

pub const CHAIN_NAME_PREFIX: &str = "cali";
pub const IP_SET_NAME_PREFIX: &str = "cali";

pub const CHAIN_FILTER_INPUT: &str = "cali-INPUT";
pub const CHAIN_FILTER_FORWARD: &str = "cali-FORWARD";
pub const CHAIN_FILTER_OUTPUT: &str = "cali-OUTPUT";

pub const CHAIN_NAT_PREROUTING: &str = "cali-PREROUTING";
pub const CHAIN_NAT_POSTROUTING: &str = "cali-POSTROUTING";
pub const CHAIN_NAT_OUTGOING: &str = "cali-nat-outgoing";

pub const IP_SET_ID_NAT_OUTGOING_ALL_POOLS: &str = "all-ipam-pools";
pub const IP_SET_ID_NAT_OUTGOING_MASQ_POOLS: &str = "masq-ipam-pools";
pub const IP_SET_ID_ALL_HOST_IPS: &str = "all-hosts";

pub const CHAIN_WORKLOAD_TO_HOST: &str = "cali-wl-to-host";
pub const CHAIN_FROM_WORKLOAD_DISPATCH: &str = "cali-from-wl-dispatch";
pub const CHAIN_TO_WORKLOAD_DISPATCH: &str = "cali-to-wl-dispatch";

pub const CHAIN_DISPATCH_TO_HOST_ENDPOINT: &str = "cali-to-host-endpoint";
pub const CHAIN_DISPATCH_FROM_HOST_ENDPOINT: &str = "cali-from-host-endpoint";

/// Per-entity chain name prefixes. Each entity kind and direction gets its
/// own prefix so chains built from the same raw ID can never collide.
pub const POLICY_INBOUND_PFX: &str = "calipi-";
pub const POLICY_OUTBOUND_PFX: &str = "calipo-";
pub const PROFILE_INBOUND_PFX: &str = "calipri-";
pub const PROFILE_OUTBOUND_PFX: &str = "calipro-";
pub const WORKLOAD_TO_ENDPOINT_PFX: &str = "calitw-";
pub const WORKLOAD_FROM_ENDPOINT_PFX: &str = "califw-";
pub const HOST_TO_ENDPOINT_PFX: &str = "calith-";
pub const HOST_FROM_ENDPOINT_PFX: &str = "califh-";

/// Prefix of the hash tag comment the apply layer writes on every rule.
pub const RULE_HASH_PREFIX: &str = "cali:";

/// Log prefix attached when dropped packets are configured to be logged.
pub const LOG_PREFIX_DROP: &str = "calico-drop";

/// Log prefix used by explicit log rules in policies and profiles.
pub const LOG_PREFIX_PACKET: &str = "calico-packet";

/// Kernel limit on iptables chain names.
pub const MAX_CHAIN_NAME_LENGTH: usize = 28;

fn chain_name(prefix: &str, raw_id: &str) -> String {
    bounded_name(prefix, raw_id, MAX_CHAIN_NAME_LENGTH)
}

pub fn policy_inbound_chain_name(id: &PolicyId) -> String {
    chain_name(POLICY_INBOUND_PFX, id.as_str())
}

pub fn policy_outbound_chain_name(id: &PolicyId) -> String {
    chain_name(POLICY_OUTBOUND_PFX, id.as_str())
}

pub fn profile_inbound_chain_name(id: &ProfileId) -> String {
    chain_name(PROFILE_INBOUND_PFX, id.as_str())
}

pub fn profile_outbound_chain_name(id: &ProfileId) -> String {
    chain_name(PROFILE_OUTBOUND_PFX, id.as_str())
}

pub fn workload_to_endpoint_chain_name(id: &WorkloadEndpointId) -> String {
    chain_name(WORKLOAD_TO_ENDPOINT_PFX, id.as_str())
}

pub fn workload_from_endpoint_chain_name(id: &WorkloadEndpointId) -> String {
    chain_name(WORKLOAD_FROM_ENDPOINT_PFX, id.as_str())
}

pub fn host_to_endpoint_chain_name(id: &HostEndpointId) -> String {
    chain_name(HOST_TO_ENDPOINT_PFX, id.as_str())
}

pub fn host_from_endpoint_chain_name(id: &HostEndpointId) -> String {
    chain_name(HOST_FROM_ENDPOINT_PFX, id.as_str())
}
