use crate::rule::Chain;
use sha2::{Digest, Sha256};

/// Length of the per-rule hash tag embedded in rule comments.
pub const RULE_HASH_LENGTH: usize = 16;

/// One stable hash tag per rule in the chain.
///
/// Each tag digests the chain name, the preceding rule's tag, and the rule's
/// rendered content, so a tag is a pure function of the rule's semantic
/// content and its position. The apply layer compares tags against the
/// comments found in the kernel to detect no-op updates.
pub fn rule_hashes(chain: &Chain) -> Vec<String> {
    let mut hashes = Vec::with_capacity(chain.rules.len());
    let mut previous = chain.name.clone();
    for rule in &chain.rules {
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        hasher.update(b"\n");
        hasher.update(rule.render_append(&chain.name).as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let tag = digest[..RULE_HASH_LENGTH].to_string();
        previous = tag.clone();
        hashes.push(tag);
    }
    hashes
}

/// Append lines with the hash tag comment attached, as written to the kernel.
pub fn render_with_hashes(chain: &Chain, hash_prefix: &str) -> Vec<String> {
    rule_hashes(chain)
        .iter()
        .zip(&chain.rules)
        .map(|(hash, rule)| {
            let mut tagged = rule.clone();
            tagged.comment = Some(match &rule.comment {
                Some(comment) => format!("{hash_prefix}{hash}; {comment}"),
                None => format!("{hash_prefix}{hash}"),
            });
            tagged.render_append(&chain.name)
        })
        .collect()
}
