use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// The closed set of rule verdicts the renderer emits.
///
/// Exactly one terminating action ends a logical step; [`Action::Log`] is the
/// only non-terminating variant and may precede a terminating one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Accept,
    Drop,
    Return,
    Log { prefix: String },
    Jump { target: String },
    Masquerade,
    Dnat { addr: IpAddr, port: u16 },
    Snat { addr: IpAddr },
}

impl Action {
    pub fn log(prefix: &str) -> Self {
        Action::Log {
            prefix: prefix.to_string(),
        }
    }

    pub fn jump(target: &str) -> Self {
        Action::Jump {
            target: target.to_string(),
        }
    }

    /// Whether evaluation stops at this action.
    pub fn is_terminating(&self) -> bool {
        !matches!(self, Action::Log { .. })
    }

    /// The `-j` fragment of the rendered rule.
    pub fn render_fragment(&self) -> String {
        match self {
            Action::Accept => "-j ACCEPT".to_string(),
            Action::Drop => "-j DROP".to_string(),
            Action::Return => "-j RETURN".to_string(),
            Action::Log { prefix } => {
                format!("-j LOG --log-prefix \"{prefix}: \" --log-level 5")
            }
            Action::Jump { target } => format!("-j {target}"),
            Action::Masquerade => "-j MASQUERADE".to_string(),
            Action::Dnat { addr, port } => {
                format!("-j DNAT --to-destination {addr}:{port}")
            }
            Action::Snat { addr } => format!("-j SNAT --to-source {addr}"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments() {
        assert_eq!(Action::Accept.render_fragment(), "-j ACCEPT");
        assert_eq!(Action::jump("cali-wl-to-host").render_fragment(), "-j cali-wl-to-host");
        assert_eq!(
            Action::log("calico-drop").render_fragment(),
            "-j LOG --log-prefix \"calico-drop: \" --log-level 5"
        );
        assert_eq!(
            Action::Dnat { addr: "10.0.0.1".parse().unwrap(), port: 8775 }.render_fragment(),
            "-j DNAT --to-destination 10.0.0.1:8775"
        );
    }

    #[test]
    fn only_log_is_non_terminating() {
        assert!(!Action::log("x").is_terminating());
        assert!(Action::Accept.is_terminating());
        assert!(Action::Drop.is_terminating());
        assert!(Action::Return.is_terminating());
        assert!(Action::Masquerade.is_terminating());
    }
}
