//! Model types delivered by the datastore sync layer.
//!
//! Everything here is plain data: the renderer derives chain and rule output
//! from these values but never stores or mutates them.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

id_type!(
    /// Opaque key of a policy object.
    PolicyId
);
id_type!(
    /// Opaque key of a profile object.
    ProfileId
);
id_type!(
    /// Opaque key of a workload endpoint.
    WorkloadEndpointId
);
id_type!(
    /// Opaque key of a host endpoint.
    HostEndpointId
);

/// A policy's rules, split by direction as the datastore delivers them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub inbound_rules: Vec<Rule>,
    #[serde(default)]
    pub outbound_rules: Vec<Rule>,
}

/// A profile applies after all policies and carries the same rule shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub inbound_rules: Vec<Rule>,
    #[serde(default)]
    pub outbound_rules: Vec<Rule>,
}

/// A workload attached to the host via a per-workload interface.
///
/// Policies and profiles apply in the order listed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadEndpoint {
    pub interface_name: String,
    #[serde(default)]
    pub policy_ids: Vec<PolicyId>,
    #[serde(default)]
    pub profile_ids: Vec<ProfileId>,
    #[serde(default)]
    pub ipv4_nets: Vec<Ipv4Net>,
    #[serde(default)]
    pub ipv6_nets: Vec<Ipv6Net>,
}

/// A host-owned interface under policy. The interface name is carried by the
/// dispatch input map rather than the endpoint itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostEndpoint {
    #[serde(default)]
    pub policy_ids: Vec<PolicyId>,
    #[serde(default)]
    pub profile_ids: Vec<ProfileId>,
}

/// One abstract policy rule. Fields that are absent simply don't constrain
/// the match; the renderer expands whatever is present into concrete rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub ip_version: Option<u8>,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub src_net: Option<IpNet>,
    #[serde(default)]
    pub dst_net: Option<IpNet>,
    #[serde(default)]
    pub src_ports: Vec<PortRange>,
    #[serde(default)]
    pub dst_ports: Vec<PortRange>,
    #[serde(default)]
    pub src_ip_set_ids: Vec<String>,
    #[serde(default)]
    pub dst_ip_set_ids: Vec<String>,
    #[serde(default)]
    pub not_src_ip_set_ids: Vec<String>,
    #[serde(default)]
    pub not_dst_ip_set_ids: Vec<String>,
    #[serde(default)]
    pub icmp_type: Option<u8>,
    #[serde(default)]
    pub icmp_code: Option<u8>,
    #[serde(default)]
    pub action: RuleAction,
}

/// Protocol selector: by IANA name or by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Protocol {
    Name(String),
    Number(u8),
}

/// What to do with a packet matched by a [`Rule`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Allow,
    Deny,
    Log,
    /// Fall through to the next policy or profile in the endpoint's order.
    Pass,
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub first: u16,
    pub last: u16,
}

impl PortRange {
    pub fn new(first: u16, last: u16) -> Self {
        Self { first, last }
    }

    pub fn single(port: u16) -> Self {
        Self { first: port, last: port }
    }

    pub fn is_single(&self) -> bool {
        self.first == self.last
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}:{}", self.first, self.last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_key_maps_and_display_raw() {
        let a = PolicyId::from("default.allow-dns");
        let b = PolicyId::new("default.allow-dns");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "default.allow-dns");

        let mut map = std::collections::HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn rule_deserializes_with_sparse_fields() {
        let rule: Rule = serde_yaml::from_str("protocol: tcp\naction: deny\n").unwrap();
        assert_eq!(rule.protocol, Some(Protocol::Name("tcp".to_string())));
        assert_eq!(rule.action, RuleAction::Deny);
        assert!(rule.src_net.is_none());
        assert!(rule.icmp_type.is_none());
    }

    #[test]
    fn protocol_accepts_name_or_number() {
        let by_name: Protocol = serde_yaml::from_str("udp").unwrap();
        assert_eq!(by_name, Protocol::Name("udp".to_string()));
        let by_number: Protocol = serde_yaml::from_str("132").unwrap();
        assert_eq!(by_number, Protocol::Number(132));
    }

    #[test]
    fn port_range_formatting() {
        assert_eq!(PortRange::single(53).to_string(), "53");
        assert_eq!(PortRange::new(8080, 8089).to_string(), "8080:8089");
    }
}
