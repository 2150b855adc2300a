//! IP-set naming configuration.
//!
//! The set-management layer owns IP-set contents; this crate is the naming
//! contract shared between it and the rule renderer. Names are scoped to one
//! IP family so v4 and v6 membership can never mix, and they are derived
//! deterministically so the same set ID always maps to the same kernel name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kernel limit on ipset names.
pub const MAX_IPSET_NAME_LENGTH: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn version(&self) -> u8 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        }
    }
}

/// Naming configuration for one IP family.
#[derive(Debug, Clone)]
pub struct IpVersionConfig {
    family: IpFamily,
    name_prefix: String,
}

impl IpVersionConfig {
    pub fn new(family: IpFamily, name_prefix: &str) -> Self {
        Self {
            family,
            name_prefix: name_prefix.to_string(),
        }
    }

    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Prefix carried by every set of this family, e.g. `cali4-`.
    pub fn versioned_prefix(&self) -> String {
        format!("{}{}-", self.name_prefix, self.family.version())
    }

    fn temp_prefix(&self) -> String {
        format!("{}{}t-", self.name_prefix, self.family.version())
    }

    /// Kernel name of the main set for the given set ID.
    pub fn name_for_main_ip_set(&self, set_id: &str) -> String {
        bounded_name(&self.versioned_prefix(), set_id, MAX_IPSET_NAME_LENGTH)
    }

    /// Kernel name of the scratch set the set manager swaps through when
    /// rewriting membership atomically. Never collides with a main name.
    pub fn name_for_temp_ip_set(&self, set_id: &str) -> String {
        bounded_name(&self.temp_prefix(), set_id, MAX_IPSET_NAME_LENGTH)
    }
}

/// Concatenate prefix and raw ID, truncating deterministically when the
/// result would exceed `max_len`. The truncated form keeps as much of the
/// raw ID as fits and appends an 8-hex-char digest of the full ID, so the
/// same input always yields the same name and distinct inputs stay distinct.
pub fn bounded_name(prefix: &str, raw_id: &str, max_len: usize) -> String {
    let full = format!("{prefix}{raw_id}");
    if full.chars().count() <= max_len {
        return full;
    }
    let digest = shortened_digest(raw_id);
    let keep = max_len - prefix.chars().count() - digest.len() - 1;
    let head: String = raw_id.chars().take(keep).collect();
    format!("{prefix}{head}_{digest}")
}

fn shortened_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}
