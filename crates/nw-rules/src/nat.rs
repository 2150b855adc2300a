//! Outbound NAT for traffic leaving the managed address pools.

use crate::defs::*;
use crate::error::Result;
use crate::renderer::Renderer;
use nw_iptables::{Action, Chain, MatchCriteria, Rule, Table};

impl Renderer {
    /// The chain jumped to from POSTROUTING.
    ///
    /// When inactive the chain renders empty rather than disappearing, so
    /// the static chains keep a stable shape either way.
    pub fn nat_outgoing_chain(&self, active: bool, ip_version: u8) -> Result<Chain> {
        let ip_set_config = self.ip_set_config(ip_version)?;
        let rules = if active {
            let masq_pools =
                ip_set_config.name_for_main_ip_set(IP_SET_ID_NAT_OUTGOING_MASQ_POOLS);
            let all_pools = ip_set_config.name_for_main_ip_set(IP_SET_ID_NAT_OUTGOING_ALL_POOLS);
            vec![Rule::commented(
                MatchCriteria::new()
                    .source_ip_set(&masq_pools)
                    .not_dest_ip_set(&all_pools),
                Action::Masquerade,
                "Masquerade traffic leaving the managed pools",
            )]
        } else {
            Vec::new()
        };
        Ok(Chain::new(CHAIN_NAT_OUTGOING, Table::Nat, ip_version, rules))
    }
}
