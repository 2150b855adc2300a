use crate::config::{resolve_drop_actions, resolve_input_accept_actions, Config};
use crate::error::{RenderError, Result};
use nw_ipsets::IpVersionConfig;
use nw_iptables::{Action, Chain, MatchCriteria, Rule};
use nw_proto::{
    HostEndpoint, HostEndpointId, Policy, PolicyId, Profile, ProfileId, WorkloadEndpoint,
    WorkloadEndpointId,
};
use std::collections::HashMap;
use tracing::error;

/// The renderer contract the reconciliation loop programs against.
///
/// Every method is a pure function of its arguments and the configuration
/// fixed at construction; implementations hold no mutable state, so a single
/// instance can serve any number of callers concurrently.
pub trait RuleRenderer: Send + Sync {
    fn static_filter_table_chains(&self, ip_version: u8) -> Result<Vec<Chain>>;
    fn static_nat_table_chains(&self, ip_version: u8) -> Result<Vec<Chain>>;

    fn workload_dispatch_chains(
        &self,
        endpoints: &HashMap<WorkloadEndpointId, WorkloadEndpoint>,
    ) -> Vec<Chain>;
    fn workload_endpoint_chains(
        &self,
        id: &WorkloadEndpointId,
        endpoint: &WorkloadEndpoint,
    ) -> Vec<Chain>;

    fn host_dispatch_chains(&self, endpoints: &HashMap<String, HostEndpointId>) -> Vec<Chain>;
    fn host_endpoint_chains(&self, id: &HostEndpointId, endpoint: &HostEndpoint) -> Vec<Chain>;

    fn policy_chains(&self, id: &PolicyId, policy: &Policy, ip_version: u8) -> Result<Vec<Chain>>;
    fn profile_chains(
        &self,
        id: &ProfileId,
        profile: &Profile,
        ip_version: u8,
    ) -> Result<Vec<Chain>>;
    fn rule_to_iptables_rules(&self, rule: &nw_proto::Rule, ip_version: u8) -> Result<Vec<Rule>>;

    fn nat_outgoing_chain(&self, active: bool, ip_version: u8) -> Result<Chain>;
}

/// The production renderer.
pub struct Renderer {
    pub(crate) config: Config,
    pub(crate) drop_actions: Vec<Action>,
    pub(crate) input_accept_actions: Vec<Action>,
}

impl Renderer {
    /// Build a renderer for one configuration snapshot, resolving the
    /// configured default actions once. Security-relaxing choices are logged
    /// here and nowhere else.
    pub fn new(config: Config) -> Self {
        let drop_actions = resolve_drop_actions(&config.action_on_drop);
        let input_accept_actions =
            resolve_input_accept_actions(&config.endpoint_to_host_action, &drop_actions);
        Self {
            config,
            drop_actions,
            input_accept_actions,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Actions applied where policy calls for a drop.
    pub fn drop_actions(&self) -> &[Action] {
        &self.drop_actions
    }

    /// Actions applied to workload traffic addressed to the host itself.
    pub fn input_accept_actions(&self) -> &[Action] {
        &self.input_accept_actions
    }

    /// Resolve the IP-set naming configuration for one IP version.
    ///
    /// Any other version is a caller bug; the render call aborts rather than
    /// guessing, since the wrong guess would mix v4 and v6 set names.
    pub(crate) fn ip_set_config(&self, ip_version: u8) -> Result<&IpVersionConfig> {
        match ip_version {
            4 => Ok(&self.config.ip_set_config_v4),
            6 => Ok(&self.config.ip_set_config_v6),
            other => {
                error!(ip_version = other, "unsupported IP version in render call");
                Err(RenderError::UnsupportedIpVersion(other))
            }
        }
    }

    /// One rule per configured drop-path action, sharing the given match.
    pub(crate) fn drop_rules(&self, match_criteria: MatchCriteria, comment: &str) -> Vec<Rule> {
        self.drop_actions
            .iter()
            .map(|action| Rule::commented(match_criteria.clone(), action.clone(), comment))
            .collect()
    }
}

impl RuleRenderer for Renderer {
    fn static_filter_table_chains(&self, ip_version: u8) -> Result<Vec<Chain>> {
        Renderer::static_filter_table_chains(self, ip_version)
    }

    fn static_nat_table_chains(&self, ip_version: u8) -> Result<Vec<Chain>> {
        Renderer::static_nat_table_chains(self, ip_version)
    }

    fn workload_dispatch_chains(
        &self,
        endpoints: &HashMap<WorkloadEndpointId, WorkloadEndpoint>,
    ) -> Vec<Chain> {
        Renderer::workload_dispatch_chains(self, endpoints)
    }

    fn workload_endpoint_chains(
        &self,
        id: &WorkloadEndpointId,
        endpoint: &WorkloadEndpoint,
    ) -> Vec<Chain> {
        Renderer::workload_endpoint_chains(self, id, endpoint)
    }

    fn host_dispatch_chains(&self, endpoints: &HashMap<String, HostEndpointId>) -> Vec<Chain> {
        Renderer::host_dispatch_chains(self, endpoints)
    }

    fn host_endpoint_chains(&self, id: &HostEndpointId, endpoint: &HostEndpoint) -> Vec<Chain> {
        Renderer::host_endpoint_chains(self, id, endpoint)
    }

    fn policy_chains(&self, id: &PolicyId, policy: &Policy, ip_version: u8) -> Result<Vec<Chain>> {
        Renderer::policy_chains(self, id, policy, ip_version)
    }

    fn profile_chains(
        &self,
        id: &ProfileId,
        profile: &Profile,
        ip_version: u8,
    ) -> Result<Vec<Chain>> {
        Renderer::profile_chains(self, id, profile, ip_version)
    }

    fn rule_to_iptables_rules(&self, rule: &nw_proto::Rule, ip_version: u8) -> Result<Vec<Rule>> {
        Renderer::rule_to_iptables_rules(self, rule, ip_version)
    }

    fn nat_outgoing_chain(&self, active: bool, ip_version: u8) -> Result<Chain> {
        Renderer::nat_outgoing_chain(self, active, ip_version)
    }
}
