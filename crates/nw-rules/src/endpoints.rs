//! Per-endpoint chains: the ordered application of policies then profiles.

use crate::defs::*;
use crate::renderer::Renderer;
use nw_iptables::{Action, Chain, MatchCriteria, Rule, Table};
use nw_proto::{HostEndpoint, HostEndpointId, PolicyId, ProfileId, WorkloadEndpoint, WorkloadEndpointId};

enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn policy_chain_name(&self, id: &PolicyId) -> String {
        match self {
            Direction::Inbound => policy_inbound_chain_name(id),
            Direction::Outbound => policy_outbound_chain_name(id),
        }
    }

    fn profile_chain_name(&self, id: &ProfileId) -> String {
        match self {
            Direction::Inbound => profile_inbound_chain_name(id),
            Direction::Outbound => profile_outbound_chain_name(id),
        }
    }
}

impl Renderer {
    /// The two chains for one workload endpoint: traffic to the workload
    /// (its ingress) and traffic from it.
    pub fn workload_endpoint_chains(
        &self,
        id: &WorkloadEndpointId,
        endpoint: &WorkloadEndpoint,
    ) -> Vec<Chain> {
        vec![
            self.endpoint_chain(
                workload_to_endpoint_chain_name(id),
                &endpoint.policy_ids,
                &endpoint.profile_ids,
                Direction::Inbound,
            ),
            self.endpoint_chain(
                workload_from_endpoint_chain_name(id),
                &endpoint.policy_ids,
                &endpoint.profile_ids,
                Direction::Outbound,
            ),
        ]
    }

    /// The two chains for one host endpoint. Traffic arriving on the
    /// interface is the endpoint's inbound direction.
    pub fn host_endpoint_chains(&self, id: &HostEndpointId, endpoint: &HostEndpoint) -> Vec<Chain> {
        vec![
            self.endpoint_chain(
                host_to_endpoint_chain_name(id),
                &endpoint.policy_ids,
                &endpoint.profile_ids,
                Direction::Outbound,
            ),
            self.endpoint_chain(
                host_from_endpoint_chain_name(id),
                &endpoint.policy_ids,
                &endpoint.profile_ids,
                Direction::Inbound,
            ),
        ]
    }

    fn endpoint_chain(
        &self,
        name: String,
        policy_ids: &[PolicyId],
        profile_ids: &[ProfileId],
        direction: Direction,
    ) -> Chain {
        let mut rules = vec![Rule::commented(
            MatchCriteria::new().conntrack_state("RELATED,ESTABLISHED"),
            Action::Accept,
            "Allow established flows",
        )];
        rules.extend(self.drop_rules(
            MatchCriteria::new().conntrack_state("INVALID"),
            "Drop invalid packets",
        ));

        for policy_id in policy_ids {
            rules.push(Rule::new(
                MatchCriteria::new(),
                Action::jump(&direction.policy_chain_name(policy_id)),
            ));
        }
        for profile_id in profile_ids {
            rules.push(Rule::new(
                MatchCriteria::new(),
                Action::jump(&direction.profile_chain_name(profile_id)),
            ));
        }

        rules.extend(self.drop_rules(MatchCriteria::new(), "Drop if no profiles matched"));

        Chain::new(name, Table::Filter, None, rules)
    }
}
