use thiserror::Error;

/// Failures a render call can report.
///
/// There is exactly one: a caller passing an IP version we have no IP-set
/// configuration for. Guessing would risk leaking one family's addresses
/// into the other's filter, so the call aborts instead; the failure is
/// scoped to the offending entity and the process carries on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unsupported IP version {0}, expected 4 or 6")]
    UnsupportedIpVersion(u8),
}

pub type Result<T> = std::result::Result<T, RenderError>;
