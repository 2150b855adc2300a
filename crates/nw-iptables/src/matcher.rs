use ipnet::IpNet;
use nw_proto::PortRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address classes understood by the `addrtype` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AddrType {
    Local,
}

impl AddrType {
    fn keyword(&self) -> &'static str {
        match self {
            AddrType::Local => "LOCAL",
        }
    }
}

/// Ordered conjunction of iptables match fragments.
///
/// Fragments render in insertion order, so callers control predicate order
/// and identical input always renders identically (the diff layer depends on
/// that).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchCriteria(Vec<String>);

impl MatchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn render(&self) -> String {
        self.0.join(" ")
    }

    fn push(mut self, fragment: String) -> Self {
        self.0.push(fragment);
        self
    }

    pub fn protocol(self, name: &str) -> Self {
        self.push(format!("-p {name}"))
    }

    pub fn protocol_num(self, number: u8) -> Self {
        self.push(format!("-p {number}"))
    }

    pub fn in_interface(self, iface: &str) -> Self {
        self.push(format!("-i {iface}"))
    }

    pub fn out_interface(self, iface: &str) -> Self {
        self.push(format!("-o {iface}"))
    }

    pub fn source_net(self, net: &IpNet) -> Self {
        self.push(format!("-s {net}"))
    }

    pub fn dest_net(self, net: &IpNet) -> Self {
        self.push(format!("-d {net}"))
    }

    pub fn source_ip_set(self, set_name: &str) -> Self {
        self.push(format!("-m set --match-set {set_name} src"))
    }

    pub fn dest_ip_set(self, set_name: &str) -> Self {
        self.push(format!("-m set --match-set {set_name} dst"))
    }

    pub fn not_source_ip_set(self, set_name: &str) -> Self {
        self.push(format!("-m set ! --match-set {set_name} src"))
    }

    pub fn not_dest_ip_set(self, set_name: &str) -> Self {
        self.push(format!("-m set ! --match-set {set_name} dst"))
    }

    pub fn source_ports(self, ports: &[PortRange]) -> Self {
        self.push(format!("-m multiport --source-ports {}", format_ports(ports)))
    }

    pub fn dest_ports(self, ports: &[PortRange]) -> Self {
        self.push(format!(
            "-m multiport --destination-ports {}",
            format_ports(ports)
        ))
    }

    pub fn icmp_type_code(self, icmp_type: u8, icmp_code: Option<u8>) -> Self {
        match icmp_code {
            Some(code) => self.push(format!("-m icmp --icmp-type {icmp_type}/{code}")),
            None => self.push(format!("-m icmp --icmp-type {icmp_type}")),
        }
    }

    pub fn icmp_v6_type_code(self, icmp_type: u8, icmp_code: Option<u8>) -> Self {
        match icmp_code {
            Some(code) => self.push(format!("-m icmp6 --icmpv6-type {icmp_type}/{code}")),
            None => self.push(format!("-m icmp6 --icmpv6-type {icmp_type}")),
        }
    }

    pub fn conntrack_state(self, state: &str) -> Self {
        self.push(format!("-m conntrack --ctstate {state}"))
    }

    pub fn mark_matches(self, mark: u32) -> Self {
        self.push(format!("-m mark --mark {mark:#x}/{mark:#x}"))
    }

    pub fn src_addr_type(self, addr_type: AddrType) -> Self {
        self.push(format!("-m addrtype --src-type {}", addr_type.keyword()))
    }

    pub fn not_src_addr_type(self, addr_type: AddrType, limit_iface_out: bool) -> Self {
        if limit_iface_out {
            self.push(format!(
                "-m addrtype ! --src-type {} --limit-iface-out",
                addr_type.keyword()
            ))
        } else {
            self.push(format!("-m addrtype ! --src-type {}", addr_type.keyword()))
        }
    }
}

impl fmt::Display for MatchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn format_ports(ports: &[PortRange]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
