//! The always-present top-level chains, rendered once per IP version.

use crate::defs::*;
use crate::error::Result;
use crate::renderer::Renderer;
use ipnet::IpNet;
use nw_iptables::{Action, AddrType, Chain, MatchCriteria, Rule, Table};
use nw_proto::PortRange;
use std::net::{IpAddr, Ipv4Addr};

/// Well-known link-local address workloads use to reach the metadata server.
const METADATA_WELL_KNOWN_ADDR: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// ICMPv6 types workloads must be able to send for neighbour discovery and
/// multicast listener reports to work at all.
const ALLOWED_ICMP_V6_TYPES: [u8; 6] = [130, 131, 132, 133, 135, 136];

/// Name of the IPIP tunnel device.
const IPIP_INTERFACE: &str = "tunl0";

impl Renderer {
    /// The filter-table chains that exist regardless of the dynamic model.
    pub fn static_filter_table_chains(&self, ip_version: u8) -> Result<Vec<Chain>> {
        // Resolve up front so an unsupported version aborts before any chain
        // for it can be produced.
        self.ip_set_config(ip_version)?;
        Ok(vec![
            self.filter_input_chain(ip_version)?,
            self.filter_workload_to_host_chain(ip_version),
            self.filter_forward_chain(ip_version),
            self.filter_output_chain(ip_version),
        ])
    }

    /// The NAT-table chains that exist regardless of the dynamic model.
    pub fn static_nat_table_chains(&self, ip_version: u8) -> Result<Vec<Chain>> {
        self.ip_set_config(ip_version)?;
        Ok(vec![
            self.nat_prerouting_chain(ip_version),
            self.nat_postrouting_chain(ip_version),
        ])
    }

    fn filter_input_chain(&self, ip_version: u8) -> Result<Chain> {
        let mut rules = Vec::new();

        if self.config.iptables_mark_accept != 0 {
            rules.push(Rule::commented(
                MatchCriteria::new().mark_matches(self.config.iptables_mark_accept),
                Action::Accept,
                "Accept packets already marked as allowed",
            ));
        }

        if ip_version == 4 && self.config.ipip_enabled {
            // Only fellow hosts may send us tunnelled traffic; anything else
            // claiming protocol 4 is spoofed.
            let all_hosts = self
                .ip_set_config(4)?
                .name_for_main_ip_set(IP_SET_ID_ALL_HOST_IPS);
            rules.push(Rule::commented(
                MatchCriteria::new().protocol_num(4).source_ip_set(&all_hosts),
                Action::Accept,
                "Allow IPIP packets from known hosts",
            ));
            rules.push(Rule::commented(
                MatchCriteria::new().protocol_num(4),
                Action::Drop,
                "Drop IPIP packets from unknown hosts",
            ));
        }

        for prefix in &self.config.workload_iface_prefixes {
            rules.push(Rule::new(
                MatchCriteria::new().in_interface(&format!("{prefix}+")),
                Action::jump(CHAIN_WORKLOAD_TO_HOST),
            ));
        }

        rules.push(Rule::new(
            MatchCriteria::new(),
            Action::jump(CHAIN_DISPATCH_FROM_HOST_ENDPOINT),
        ));

        Ok(Chain::new(CHAIN_FILTER_INPUT, Table::Filter, ip_version, rules))
    }

    fn filter_workload_to_host_chain(&self, ip_version: u8) -> Chain {
        let mut rules = Vec::new();

        if ip_version == 6 {
            for icmp_type in ALLOWED_ICMP_V6_TYPES {
                rules.push(Rule::new(
                    MatchCriteria::new()
                        .protocol("ipv6-icmp")
                        .icmp_v6_type_code(icmp_type, None),
                    Action::Accept,
                ));
            }
        }

        if ip_version == 4 {
            if let Some(metadata_addr) = self.config.metadata_addr {
                rules.push(Rule::commented(
                    MatchCriteria::new()
                        .protocol("udp")
                        .source_ports(&[PortRange::single(68)])
                        .dest_ports(&[PortRange::single(67)]),
                    Action::Accept,
                    "Allow DHCP discovery from workloads",
                ));
                rules.push(Rule::commented(
                    MatchCriteria::new()
                        .protocol("tcp")
                        .dest_net(&IpNet::from(IpAddr::V4(metadata_addr)))
                        .dest_ports(&[PortRange::single(self.config.metadata_port)]),
                    Action::Accept,
                    "Allow access to the metadata server",
                ));
            }
        }

        for prefix in &self.config.workload_iface_prefixes {
            rules.push(Rule::new(
                MatchCriteria::new().in_interface(&format!("{prefix}+")),
                Action::jump(CHAIN_FROM_WORKLOAD_DISPATCH),
            ));
        }

        for action in &self.input_accept_actions {
            rules.push(Rule::commented(
                MatchCriteria::new(),
                action.clone(),
                "Configured default for workload to host traffic",
            ));
        }

        Chain::new(CHAIN_WORKLOAD_TO_HOST, Table::Filter, ip_version, rules)
    }

    fn filter_forward_chain(&self, ip_version: u8) -> Chain {
        let mut rules = Vec::new();

        if self.config.iptables_mark_accept != 0 {
            rules.push(Rule::commented(
                MatchCriteria::new().mark_matches(self.config.iptables_mark_accept),
                Action::Accept,
                "Accept packets already marked as allowed",
            ));
        }

        rules.push(Rule::new(
            MatchCriteria::new(),
            Action::jump(CHAIN_DISPATCH_FROM_HOST_ENDPOINT),
        ));

        for prefix in &self.config.workload_iface_prefixes {
            rules.push(Rule::new(
                MatchCriteria::new().in_interface(&format!("{prefix}+")),
                Action::jump(CHAIN_FROM_WORKLOAD_DISPATCH),
            ));
        }
        for prefix in &self.config.workload_iface_prefixes {
            rules.push(Rule::new(
                MatchCriteria::new().out_interface(&format!("{prefix}+")),
                Action::jump(CHAIN_TO_WORKLOAD_DISPATCH),
            ));
        }

        rules.push(Rule::new(
            MatchCriteria::new(),
            Action::jump(CHAIN_DISPATCH_TO_HOST_ENDPOINT),
        ));

        Chain::new(CHAIN_FILTER_FORWARD, Table::Filter, ip_version, rules)
    }

    fn filter_output_chain(&self, ip_version: u8) -> Chain {
        let mut rules = Vec::new();

        // Host to local workload traffic is policed on the workload side;
        // host endpoint policy must not see it.
        for prefix in &self.config.workload_iface_prefixes {
            rules.push(Rule::new(
                MatchCriteria::new().out_interface(&format!("{prefix}+")),
                Action::Return,
            ));
        }

        rules.push(Rule::new(
            MatchCriteria::new(),
            Action::jump(CHAIN_DISPATCH_TO_HOST_ENDPOINT),
        ));

        Chain::new(CHAIN_FILTER_OUTPUT, Table::Filter, ip_version, rules)
    }

    fn nat_prerouting_chain(&self, ip_version: u8) -> Chain {
        let mut rules = Vec::new();

        if ip_version == 4 {
            if let Some(metadata_addr) = self.config.metadata_addr {
                rules.push(Rule::commented(
                    MatchCriteria::new()
                        .protocol("tcp")
                        .dest_net(&IpNet::from(IpAddr::V4(METADATA_WELL_KNOWN_ADDR)))
                        .dest_ports(&[PortRange::single(80)]),
                    Action::Dnat {
                        addr: IpAddr::V4(metadata_addr),
                        port: self.config.metadata_port,
                    },
                    "Divert metadata requests to the metadata server",
                ));
            }
        }

        Chain::new(CHAIN_NAT_PREROUTING, Table::Nat, ip_version, rules)
    }

    fn nat_postrouting_chain(&self, ip_version: u8) -> Chain {
        let mut rules = vec![Rule::new(
            MatchCriteria::new(),
            Action::jump(CHAIN_NAT_OUTGOING),
        )];

        if ip_version == 4 && self.config.ipip_enabled && self.config.ipip_tunnel_addr.is_some() {
            // Host-sourced traffic routed out over the tunnel leaves with the
            // tunnel address unless we masquerade it here.
            rules.push(Rule::new(
                MatchCriteria::new()
                    .out_interface(IPIP_INTERFACE)
                    .not_src_addr_type(AddrType::Local, true)
                    .src_addr_type(AddrType::Local),
                Action::Masquerade,
            ));
        }

        Chain::new(CHAIN_NAT_POSTROUTING, Table::Nat, ip_version, rules)
    }
}
