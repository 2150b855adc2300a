//! Interface-name dispatch chains.
//!
//! Dispatch is always recomputed from the complete endpoint map: a partial
//! update could leave a jump to a chain that no longer exists, so the whole
//! structure is derived fresh and the diff layer reconciles it.

use crate::defs::*;
use crate::renderer::Renderer;
use nw_iptables::{Action, Chain, MatchCriteria, Rule, Table};
use nw_proto::{HostEndpointId, WorkloadEndpoint, WorkloadEndpointId};
use std::collections::HashMap;

impl Renderer {
    /// Route workload interface traffic to the per-endpoint chains.
    ///
    /// A workload interface that matches no endpoint has lost its endpoint;
    /// such traffic falls into the configured drop path.
    pub fn workload_dispatch_chains(
        &self,
        endpoints: &HashMap<WorkloadEndpointId, WorkloadEndpoint>,
    ) -> Vec<Chain> {
        // Sort for reproducible output; the dispatch order itself is
        // irrelevant because interface names are disjoint.
        let mut ordered: Vec<(&WorkloadEndpointId, &WorkloadEndpoint)> =
            endpoints.iter().collect();
        ordered.sort_by(|a, b| a.1.interface_name.cmp(&b.1.interface_name));

        let mut from_rules = Vec::new();
        let mut to_rules = Vec::new();
        for (id, endpoint) in ordered {
            from_rules.push(Rule::new(
                MatchCriteria::new().in_interface(&endpoint.interface_name),
                Action::jump(&workload_from_endpoint_chain_name(id)),
            ));
            to_rules.push(Rule::new(
                MatchCriteria::new().out_interface(&endpoint.interface_name),
                Action::jump(&workload_to_endpoint_chain_name(id)),
            ));
        }
        from_rules.extend(self.drop_rules(MatchCriteria::new(), "Unknown interface"));
        to_rules.extend(self.drop_rules(MatchCriteria::new(), "Unknown interface"));

        vec![
            Chain::new(CHAIN_FROM_WORKLOAD_DISPATCH, Table::Filter, None, from_rules),
            Chain::new(CHAIN_TO_WORKLOAD_DISPATCH, Table::Filter, None, to_rules),
        ]
    }

    /// Route host interface traffic to the per-endpoint chains.
    ///
    /// Unlike workloads, hosts legitimately have interfaces with no endpoint
    /// configured, so unmatched traffic falls through to the host's own
    /// rules instead of being dropped.
    pub fn host_dispatch_chains(&self, endpoints: &HashMap<String, HostEndpointId>) -> Vec<Chain> {
        let mut ordered: Vec<(&String, &HostEndpointId)> = endpoints.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));

        let mut from_rules = Vec::new();
        let mut to_rules = Vec::new();
        for (iface, id) in ordered {
            from_rules.push(Rule::new(
                MatchCriteria::new().in_interface(iface),
                Action::jump(&host_from_endpoint_chain_name(id)),
            ));
            to_rules.push(Rule::new(
                MatchCriteria::new().out_interface(iface),
                Action::jump(&host_to_endpoint_chain_name(id)),
            ));
        }

        vec![
            Chain::new(CHAIN_DISPATCH_FROM_HOST_ENDPOINT, Table::Filter, None, from_rules),
            Chain::new(CHAIN_DISPATCH_TO_HOST_ENDPOINT, Table::Filter, None, to_rules),
        ]
    }
}
