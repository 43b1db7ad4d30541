//! Capability-level error type.

use thiserror::Error;

/// Errors returned by [`crate::CapabilityInvoker::invoke`].
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable`         — the step may be attempted again after a back-off.
/// - `Fatal`             — the step fails immediately.
/// - `UnknownCapability` — nothing is registered under that name; never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Transient failure (transport hiccup, provider overloaded, …).
    #[error("{0}")]
    Retryable(String),

    /// Permanent failure reported by the provider.
    #[error("{0}")]
    Fatal(String),

    /// No provider answers to this capability name.
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),
}

impl CapabilityError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retryable_variant_is_retryable() {
        assert!(CapabilityError::Retryable("x".into()).is_retryable());
        assert!(!CapabilityError::Fatal("x".into()).is_retryable());
        assert!(!CapabilityError::UnknownCapability("x".into()).is_retryable());
    }

    #[test]
    fn messages_are_not_prefixed() {
        assert_eq!(CapabilityError::Fatal("quota exceeded".into()).to_string(), "quota exceeded");
        assert_eq!(
            CapabilityError::UnknownCapability("ocr".into()).to_string(),
            "unknown capability 'ocr'"
        );
    }
}
