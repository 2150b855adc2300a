//! Recognition of artifacts left behind by earlier agent generations.
//!
//! Nothing here generates chains; these patterns let the reconciliation loop
//! classify what it finds in the kernel so stale objects can be removed
//! without touching current ones.

use regex::Regex;
use std::sync::LazyLock;

/// Every chain name prefix any generation of the agent has used. A chain
/// starting with one of these is ours to manage and, if it is not part of
/// the desired state, ours to clean up.
pub const ALL_HISTORIC_CHAIN_NAME_PREFIXES: &[&str] = &["felix-", "cali"];

/// Every IP-set name prefix any generation has used.
pub const ALL_HISTORIC_IP_SET_NAME_PREFIXES: &[&str] = &["felix-", "cali"];

/// IP sets from before the versioned naming scheme; they don't match the
/// current pattern and are listed explicitly.
pub const LEGACY_V4_IP_SET_NAMES: &[&str] = &["felix-masq-ipam-pools", "felix-all-ipam-pools"];

/// Matches the masquerade rules a much older agent generation inserted
/// directly into the top-level POSTROUTING chain, bypassing the dispatch
/// scheme entirely.
///
/// The pattern anchors on tokens that survive `iptables-save` formatting
/// drift (the legacy set name, the fixed tunnel-device insert) rather than
/// exact whitespace.
pub static HISTORIC_INSERTED_NAT_RULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        "-A POSTROUTING .* felix-masq-ipam-pools .*|\
         -A POSTROUTING -o tunl0 -m addrtype ! --src-type LOCAL --limit-iface-out \
         -m addrtype --src-type LOCAL -j MASQUERADE",
    )
    .expect("historic NAT rule pattern must compile")
});

/// Whether a chain name belongs to any generation of the agent.
pub fn is_agent_chain_name(name: &str) -> bool {
    ALL_HISTORIC_CHAIN_NAME_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Whether an IP-set name belongs to any generation of the agent.
pub fn is_agent_ip_set_name(name: &str) -> bool {
    ALL_HISTORIC_IP_SET_NAME_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Whether an IP-set name is one of the fixed pre-versioned legacy sets.
pub fn is_legacy_ip_set_name(name: &str) -> bool {
    LEGACY_V4_IP_SET_NAMES.contains(&name)
}

/// Whether an `iptables-save` line is a NAT rule inserted by the old agent.
pub fn is_historic_inserted_nat_rule(line: &str) -> bool {
    HISTORIC_INSERTED_NAT_RULE_REGEX.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_and_historic_prefixes_both_classify_as_ours() {
        assert!(is_agent_chain_name("cali-INPUT"));
        assert!(is_agent_chain_name("calitw-abcdef"));
        assert!(is_agent_chain_name("felix-INPUT"));
        assert!(!is_agent_chain_name("KUBE-SERVICES"));
        assert!(!is_agent_chain_name("DOCKER"));
    }

    #[test]
    fn legacy_set_names_are_the_fixed_list() {
        assert!(is_legacy_ip_set_name("felix-masq-ipam-pools"));
        assert!(is_legacy_ip_set_name("felix-all-ipam-pools"));
        assert!(!is_legacy_ip_set_name("cali4-masq-ipam-pools"));
        assert!(is_agent_ip_set_name("felix-masq-ipam-pools"));
        assert!(is_agent_ip_set_name("cali4-all-hosts"));
    }

    #[test]
    fn matches_the_legacy_masquerade_by_set_name_token() {
        let line = "-A POSTROUTING -m set --match-set felix-masq-ipam-pools src \
                    -m set ! --match-set felix-all-ipam-pools dst -j MASQUERADE";
        assert!(is_historic_inserted_nat_rule(line));
    }

    #[test]
    fn tolerates_formatting_drift_around_the_set_token() {
        let line = "-A POSTROUTING   -m set   --match-set felix-masq-ipam-pools src -j MASQUERADE";
        assert!(is_historic_inserted_nat_rule(line));
    }

    #[test]
    fn matches_the_fixed_tunnel_insert() {
        let line = "-A POSTROUTING -o tunl0 -m addrtype ! --src-type LOCAL --limit-iface-out \
                    -m addrtype --src-type LOCAL -j MASQUERADE";
        assert!(is_historic_inserted_nat_rule(line));
    }

    #[test]
    fn ignores_current_generation_rules() {
        assert!(!is_historic_inserted_nat_rule(
            "-A cali-POSTROUTING -j cali-nat-outgoing"
        ));
        assert!(!is_historic_inserted_nat_rule(
            "-A POSTROUTING -m set --match-set cali4-masq-ipam-pools src -j MASQUERADE"
        ));
        assert!(!is_historic_inserted_nat_rule("-A POSTROUTING -j MASQUERADE"));
    }
}
