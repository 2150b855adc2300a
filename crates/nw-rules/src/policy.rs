//! Policy and profile chains, and the translation of one abstract rule into
//! concrete iptables rules.

use crate::defs::*;
use crate::error::Result;
use crate::renderer::Renderer;
use ipnet::IpNet;
use nw_ipsets::IpVersionConfig;
use nw_iptables::{Action, Chain, MatchCriteria, Table};
use nw_proto::{Policy, PolicyId, PortRange, Profile, ProfileId, Protocol, RuleAction};

/// A multiport match holds at most 15 slots; a range burns two.
const MAX_MULTIPORT_SLOTS: usize = 15;

impl Renderer {
    /// One chain per direction for a policy, for one IP version.
    pub fn policy_chains(&self, id: &PolicyId, policy: &Policy, ip_version: u8) -> Result<Vec<Chain>> {
        Ok(vec![
            Chain::new(
                policy_inbound_chain_name(id),
                Table::Filter,
                ip_version,
                self.translate_rules(&policy.inbound_rules, ip_version)?,
            ),
            Chain::new(
                policy_outbound_chain_name(id),
                Table::Filter,
                ip_version,
                self.translate_rules(&policy.outbound_rules, ip_version)?,
            ),
        ])
    }

    /// One chain per direction for a profile, for one IP version.
    pub fn profile_chains(
        &self,
        id: &ProfileId,
        profile: &Profile,
        ip_version: u8,
    ) -> Result<Vec<Chain>> {
        Ok(vec![
            Chain::new(
                profile_inbound_chain_name(id),
                Table::Filter,
                ip_version,
                self.translate_rules(&profile.inbound_rules, ip_version)?,
            ),
            Chain::new(
                profile_outbound_chain_name(id),
                Table::Filter,
                ip_version,
                self.translate_rules(&profile.outbound_rules, ip_version)?,
            ),
        ])
    }

    fn translate_rules(
        &self,
        rules: &[nw_proto::Rule],
        ip_version: u8,
    ) -> Result<Vec<nw_iptables::Rule>> {
        let mut out = Vec::new();
        for rule in rules {
            out.extend(self.rule_to_iptables_rules(rule, ip_version)?);
        }
        Ok(out)
    }

    /// Expand one abstract rule for one IP version.
    ///
    /// Rules whose address family doesn't apply expand to nothing; everything
    /// that is present expands to the conjunction of all its predicates. Long
    /// port lists split across several concrete rules, each carrying the full
    /// remaining conjunction.
    pub fn rule_to_iptables_rules(
        &self,
        rule: &nw_proto::Rule,
        ip_version: u8,
    ) -> Result<Vec<nw_iptables::Rule>> {
        let ip_set_config = self.ip_set_config(ip_version)?;
        if !applies_to_version(rule, ip_version) {
            return Ok(Vec::new());
        }

        let actions = self.rule_actions(rule.action);
        let mut out = Vec::new();
        for src_chunk in split_port_list(&rule.src_ports) {
            for dst_chunk in split_port_list(&rule.dst_ports) {
                let criteria = rule_match(rule, ip_version, ip_set_config, &src_chunk, &dst_chunk);
                for action in &actions {
                    out.push(nw_iptables::Rule::new(criteria.clone(), action.clone()));
                }
            }
        }
        Ok(out)
    }

    fn rule_actions(&self, action: RuleAction) -> Vec<Action> {
        match action {
            RuleAction::Allow => vec![Action::Accept],
            RuleAction::Deny => self.drop_actions.clone(),
            RuleAction::Log => vec![Action::log(LOG_PREFIX_PACKET)],
            RuleAction::Pass => vec![Action::Return],
        }
    }
}

/// Predicate order is fixed: protocol and inline CIDRs first (cheap header
/// compares), then ports, then set lookups, then ICMP details. Identical
/// input must render identically for the diff layer.
fn rule_match(
    rule: &nw_proto::Rule,
    ip_version: u8,
    ip_set_config: &IpVersionConfig,
    src_ports: &[PortRange],
    dst_ports: &[PortRange],
) -> MatchCriteria {
    let mut m = MatchCriteria::new();

    match &rule.protocol {
        Some(Protocol::Name(name)) => {
            m = m.protocol(protocol_name_for_version(name, ip_version));
        }
        Some(Protocol::Number(number)) => m = m.protocol_num(*number),
        None => {
            if rule.icmp_type.is_some() {
                m = m.protocol(icmp_protocol_name(ip_version));
            }
        }
    }

    if let Some(net) = &rule.src_net {
        m = m.source_net(net);
    }
    if let Some(net) = &rule.dst_net {
        m = m.dest_net(net);
    }

    if !src_ports.is_empty() {
        m = m.source_ports(src_ports);
    }
    if !dst_ports.is_empty() {
        m = m.dest_ports(dst_ports);
    }

    for set_id in &rule.src_ip_set_ids {
        m = m.source_ip_set(&ip_set_config.name_for_main_ip_set(set_id));
    }
    for set_id in &rule.dst_ip_set_ids {
        m = m.dest_ip_set(&ip_set_config.name_for_main_ip_set(set_id));
    }
    for set_id in &rule.not_src_ip_set_ids {
        m = m.not_source_ip_set(&ip_set_config.name_for_main_ip_set(set_id));
    }
    for set_id in &rule.not_dst_ip_set_ids {
        m = m.not_dest_ip_set(&ip_set_config.name_for_main_ip_set(set_id));
    }

    if let Some(icmp_type) = rule.icmp_type {
        m = if ip_version == 6 {
            m.icmp_v6_type_code(icmp_type, rule.icmp_code)
        } else {
            m.icmp_type_code(icmp_type, rule.icmp_code)
        };
    }

    m
}

fn applies_to_version(rule: &nw_proto::Rule, ip_version: u8) -> bool {
    if let Some(version) = rule.ip_version {
        if version != ip_version {
            return false;
        }
    }
    for net in [&rule.src_net, &rule.dst_net].into_iter().flatten() {
        let family = match net {
            IpNet::V4(_) => 4,
            IpNet::V6(_) => 6,
        };
        if family != ip_version {
            return false;
        }
    }
    true
}

fn protocol_name_for_version(name: &str, ip_version: u8) -> &str {
    if ip_version == 6 && name == "icmp" {
        "ipv6-icmp"
    } else {
        name
    }
}

fn icmp_protocol_name(ip_version: u8) -> &'static str {
    if ip_version == 6 { "ipv6-icmp" } else { "icmp" }
}

/// Split a port list into multiport-sized chunks. An empty list yields one
/// empty chunk so the caller's cross product still emits a rule.
fn split_port_list(ports: &[PortRange]) -> Vec<Vec<PortRange>> {
    if ports.is_empty() {
        return vec![Vec::new()];
    }
    let mut chunks = Vec::new();
    let mut current: Vec<PortRange> = Vec::new();
    let mut used_slots = 0;
    for port in ports {
        let needed = if port.is_single() { 1 } else { 2 };
        if used_slots + needed > MAX_MULTIPORT_SLOTS {
            chunks.push(std::mem::take(&mut current));
            used_slots = 0;
        }
        current.push(*port);
        used_slots += needed;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::RenderError;

    fn renderer() -> Renderer {
        Renderer::new(Config::new("cali"))
    }

    fn allow_tcp() -> nw_proto::Rule {
        nw_proto::Rule {
            protocol: Some(Protocol::Name("tcp".to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn version_mismatch_renders_nothing() {
        let r = renderer();

        let mut explicit = allow_tcp();
        explicit.ip_version = Some(4);
        assert!(r.rule_to_iptables_rules(&explicit, 6).unwrap().is_empty());

        let mut v4_net = allow_tcp();
        v4_net.src_net = Some("10.0.0.0/8".parse().unwrap());
        assert!(r.rule_to_iptables_rules(&v4_net, 6).unwrap().is_empty());
        assert_eq!(r.rule_to_iptables_rules(&v4_net, 4).unwrap().len(), 1);
    }

    #[test]
    fn unsupported_version_aborts_translation() {
        assert_eq!(
            renderer().rule_to_iptables_rules(&allow_tcp(), 9).unwrap_err(),
            RenderError::UnsupportedIpVersion(9)
        );
    }

    #[test]
    fn ip_set_and_inline_cidr_render_as_a_conjunction() {
        let mut rule = allow_tcp();
        rule.src_net = Some("10.1.0.0/16".parse().unwrap());
        rule.src_ip_set_ids = vec!["allowed-clients".to_string()];
        let rules = renderer().rule_to_iptables_rules(&rule, 4).unwrap();
        assert_eq!(rules.len(), 1);
        let rendered = rules[0].render_append("calipi-x");
        assert!(rendered.contains("-s 10.1.0.0/16"));
        assert!(rendered.contains("-m set --match-set cali4-allowed-clients src"));
    }

    #[test]
    fn predicate_order_is_stable() {
        let mut rule = allow_tcp();
        rule.dst_net = Some("10.2.0.0/16".parse().unwrap());
        rule.dst_ports = vec![PortRange::single(443)];
        rule.dst_ip_set_ids = vec!["servers".to_string()];
        let rules = renderer().rule_to_iptables_rules(&rule, 4).unwrap();
        assert_eq!(
            rules[0].render_append("calipi-x"),
            "-A calipi-x -p tcp -d 10.2.0.0/16 -m multiport --destination-ports 443 \
             -m set --match-set cali4-servers dst -j ACCEPT"
        );
    }

    #[test]
    fn icmp_rules_expand_per_version() {
        let rule = nw_proto::Rule {
            icmp_type: Some(8),
            ..Default::default()
        };
        let r = renderer();
        let v4 = r.rule_to_iptables_rules(&rule, 4).unwrap();
        assert_eq!(
            v4[0].render_append("calipi-x"),
            "-A calipi-x -p icmp -m icmp --icmp-type 8 -j ACCEPT"
        );
        let v6 = r.rule_to_iptables_rules(&rule, 6).unwrap();
        assert_eq!(
            v6[0].render_append("calipi-x"),
            "-A calipi-x -p ipv6-icmp -m icmp6 --icmpv6-type 8 -j ACCEPT"
        );
    }

    #[test]
    fn named_icmp_protocol_follows_the_version() {
        let mut rule = nw_proto::Rule {
            protocol: Some(Protocol::Name("icmp".to_string())),
            icmp_type: Some(128),
            ..Default::default()
        };
        rule.icmp_code = Some(0);
        let v6 = renderer().rule_to_iptables_rules(&rule, 6).unwrap();
        assert!(v6[0]
            .render_append("calipi-x")
            .contains("-p ipv6-icmp -m icmp6 --icmpv6-type 128/0"));
    }

    #[test]
    fn long_port_lists_split_at_fifteen_slots() {
        let mut rule = allow_tcp();
        rule.dst_ports = (1..=20).map(PortRange::single).collect();
        let rules = renderer().rule_to_iptables_rules(&rule, 4).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[0]
            .render_append("c")
            .contains("--destination-ports 1,2,3,4,5,6,7,8,9,10,11,12,13,14,15 "));
        assert!(rules[1].render_append("c").contains("--destination-ports 16,17,18,19,20 "));
    }

    #[test]
    fn ranges_count_as_two_multiport_slots() {
        let ports: Vec<PortRange> = (0..8).map(|i| PortRange::new(i * 10, i * 10 + 1)).collect();
        let chunks = split_port_list(&ports);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 7);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn port_splits_cross_multiply_with_actions() {
        let mut config = Config::new("cali");
        config.action_on_drop = "LOG-DROP".to_string();
        let r = Renderer::new(config);
        let mut rule = allow_tcp();
        rule.action = RuleAction::Deny;
        rule.dst_ports = (1..=16).map(PortRange::single).collect();
        let rules = r.rule_to_iptables_rules(&rule, 4).unwrap();
        // Two port chunks, each expanded to the log and drop steps.
        assert_eq!(rules.len(), 4);
        assert!(matches!(rules[0].action, Action::Log { .. }));
        assert_eq!(rules[1].action, Action::Drop);
        assert_eq!(rules[0].match_criteria, rules[1].match_criteria);
    }

    #[test]
    fn pass_and_log_actions_translate() {
        let r = renderer();
        let mut pass = allow_tcp();
        pass.action = RuleAction::Pass;
        assert_eq!(
            r.rule_to_iptables_rules(&pass, 4).unwrap()[0].action,
            Action::Return
        );

        let mut log = allow_tcp();
        log.action = RuleAction::Log;
        assert_eq!(
            r.rule_to_iptables_rules(&log, 4).unwrap()[0].action,
            Action::log(LOG_PREFIX_PACKET)
        );
    }

    #[test]
    fn policy_chains_render_both_directions_per_version() {
        let policy = Policy {
            inbound_rules: vec![allow_tcp()],
            outbound_rules: vec![],
        };
        let id = PolicyId::from("default.web");
        let chains = renderer().policy_chains(&id, &policy, 4).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].name, "calipi-default.web");
        assert_eq!(chains[0].ip_version, Some(4));
        assert_eq!(chains[0].rules.len(), 1);
        assert_eq!(chains[1].name, "calipo-default.web");
        assert!(chains[1].rules.is_empty());
    }

    #[test]
    fn profile_chains_use_profile_prefixes() {
        let profile = Profile {
            inbound_rules: vec![],
            outbound_rules: vec![allow_tcp()],
        };
        let id = ProfileId::from("open");
        let chains = renderer().profile_chains(&id, &profile, 6).unwrap();
        assert_eq!(chains[0].name, "calipri-open");
        assert_eq!(chains[1].name, "calipro-open");
        assert_eq!(chains[1].rules.len(), 1);
    }
}
