use crate::action::Action;
use crate::matcher::MatchCriteria;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kernel table a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Filter,
    Nat,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Filter => "filter",
            Table::Nat => "nat",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One match plus one action, with an optional human-readable comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub match_criteria: MatchCriteria,
    pub action: Action,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Rule {
    pub fn new(match_criteria: MatchCriteria, action: Action) -> Self {
        Self {
            match_criteria,
            action,
            comment: None,
        }
    }

    pub fn commented(match_criteria: MatchCriteria, action: Action, comment: &str) -> Self {
        Self {
            match_criteria,
            action,
            comment: Some(comment.to_string()),
        }
    }

    /// The `iptables-save`-style append fragment for this rule.
    pub fn render_append(&self, chain_name: &str) -> String {
        let mut parts = vec![format!("-A {chain_name}")];
        if !self.match_criteria.is_empty() {
            parts.push(self.match_criteria.render());
        }
        if let Some(comment) = &self.comment {
            parts.push(format!("-m comment --comment \"{comment}\""));
        }
        parts.push(self.action.render_fragment());
        parts.join(" ")
    }
}

/// A named, ordered rule list scoped to one table and one IP version.
///
/// `ip_version` is `None` for chains whose content is identical on both
/// stacks (dispatch and per-endpoint chains reference no addresses or sets).
///
/// Chains are produced fresh on every render call and are immutable once
/// returned; the apply layer consumes them and nothing retains them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    pub table: Table,
    #[serde(default)]
    pub ip_version: Option<u8>,
    pub rules: Vec<Rule>,
}

impl Chain {
    pub fn new(
        name: impl Into<String>,
        table: Table,
        ip_version: impl Into<Option<u8>>,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            ip_version: ip_version.into(),
            rules,
        }
    }

    /// Render every rule as an append line, in order.
    pub fn render_append_lines(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|rule| rule.render_append(&self.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_line_orders_match_comment_action() {
        let rule = Rule::commented(
            MatchCriteria::new().in_interface("cali+"),
            Action::jump("cali-wl-to-host"),
            "Workload to host",
        );
        assert_eq!(
            rule.render_append("cali-INPUT"),
            "-A cali-INPUT -i cali+ -m comment --comment \"Workload to host\" -j cali-wl-to-host"
        );
    }

    #[test]
    fn empty_match_omits_fragment() {
        let rule = Rule::new(MatchCriteria::new(), Action::Drop);
        assert_eq!(rule.render_append("calitw-abcd"), "-A calitw-abcd -j DROP");
    }

    #[test]
    fn chain_renders_rules_in_order() {
        let chain = Chain::new(
            "cali-POSTROUTING",
            Table::Nat,
            Some(4),
            vec![
                Rule::new(MatchCriteria::new(), Action::jump("cali-nat-outgoing")),
                Rule::new(MatchCriteria::new().out_interface("tunl0"), Action::Masquerade),
            ],
        );
        let lines = chain.render_append_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "-A cali-POSTROUTING -j cali-nat-outgoing");
        assert_eq!(lines[1], "-A cali-POSTROUTING -o tunl0 -j MASQUERADE");
    }
}
