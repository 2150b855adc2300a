use crate::defs::LOG_PREFIX_DROP;
use nw_ipsets::{IpFamily, IpVersionConfig};
use nw_iptables::Action;
use std::net::Ipv4Addr;
use tracing::{info, warn};

/// Operator-chosen rendering options.
///
/// A `Config` is an immutable snapshot: the renderer derives its action
/// lists from it once at construction and there is no partial update path.
#[derive(Debug, Clone)]
pub struct Config {
    pub ip_set_config_v4: IpVersionConfig,
    pub ip_set_config_v6: IpVersionConfig,

    /// Interface name prefixes that identify workload interfaces.
    pub workload_iface_prefixes: Vec<String>,

    /// Packets carrying this fwmark bypass policy; 0 disables the check.
    pub iptables_mark_accept: u32,

    /// Metadata server workloads may reach; enables the DHCP and metadata
    /// allowances and the metadata DNAT.
    pub metadata_addr: Option<Ipv4Addr>,
    pub metadata_port: u16,

    pub ipip_enabled: bool,
    pub ipip_tunnel_addr: Option<Ipv4Addr>,

    pub action_on_drop: String,
    pub endpoint_to_host_action: String,
}

impl Config {
    pub fn new(name_prefix: &str) -> Self {
        Self {
            ip_set_config_v4: IpVersionConfig::new(IpFamily::V4, name_prefix),
            ip_set_config_v6: IpVersionConfig::new(IpFamily::V6, name_prefix),
            workload_iface_prefixes: vec!["cali".to_string()],
            iptables_mark_accept: 0,
            metadata_addr: None,
            metadata_port: 8775,
            ipip_enabled: false,
            ipip_tunnel_addr: None,
            action_on_drop: "DROP".to_string(),
            endpoint_to_host_action: String::new(),
        }
    }
}

/// What to do where policy says "drop".
///
/// `LOG-` prefixes a log step, an `ACCEPT` suffix substitutes accept for the
/// final drop (sandbox mode). Anything unrecognized lands on the plain-drop
/// branch: the safe reading of an ambiguous option, not an error.
pub(crate) fn resolve_drop_actions(action_on_drop: &str) -> Vec<Action> {
    let mut actions = Vec::new();
    if action_on_drop.starts_with("LOG-") {
        warn!("Action on drop includes LOG, all dropped packets will be logged");
        actions.push(Action::log(LOG_PREFIX_DROP));
    }
    if action_on_drop.ends_with("ACCEPT") {
        warn!("Action on drop set to ACCEPT, policy enforcement is disabled");
        actions.push(Action::Accept);
    } else {
        actions.push(Action::Drop);
    }
    actions
}

/// What to do with traffic a workload sends at the host itself.
pub(crate) fn resolve_input_accept_actions(
    endpoint_to_host_action: &str,
    drop_actions: &[Action],
) -> Vec<Action> {
    match endpoint_to_host_action {
        "DROP" => {
            info!("Workload to host packets will be dropped");
            drop_actions.to_vec()
        }
        "ACCEPT" => {
            warn!("Workload to host packets will be accepted");
            vec![Action::Accept]
        }
        _ => {
            info!("Workload to host packets will return to the host's INPUT chain");
            vec![Action::Return]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_is_the_default_terminal() {
        assert_eq!(resolve_drop_actions("DROP"), vec![Action::Drop]);
    }

    #[test]
    fn accept_suffix_substitutes_accept() {
        assert_eq!(resolve_drop_actions("ACCEPT"), vec![Action::Accept]);
    }

    #[test]
    fn log_prefix_prepends_a_log_step() {
        assert_eq!(
            resolve_drop_actions("LOG-DROP"),
            vec![Action::log(LOG_PREFIX_DROP), Action::Drop]
        );
        assert_eq!(
            resolve_drop_actions("LOG-ACCEPT"),
            vec![Action::log(LOG_PREFIX_DROP), Action::Accept]
        );
    }

    #[test]
    fn unrecognized_values_fall_back_to_drop() {
        assert_eq!(resolve_drop_actions(""), vec![Action::Drop]);
        assert_eq!(resolve_drop_actions("REJECT"), vec![Action::Drop]);
    }

    #[test]
    fn endpoint_to_host_drop_reuses_the_drop_path() {
        let drop_path = resolve_drop_actions("LOG-ACCEPT");
        let input = resolve_input_accept_actions("DROP", &drop_path);
        assert_eq!(input, drop_path);
    }

    #[test]
    fn endpoint_to_host_accept_is_a_single_accept() {
        let input = resolve_input_accept_actions("ACCEPT", &[Action::Drop]);
        assert_eq!(input, vec![Action::Accept]);
    }

    #[test]
    fn endpoint_to_host_defaults_to_return() {
        for value in ["", "RETURN", "bogus"] {
            let input = resolve_input_accept_actions(value, &[Action::Drop]);
            assert_eq!(input, vec![Action::Return], "value: {value:?}");
        }
    }
}
