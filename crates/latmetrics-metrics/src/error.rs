//! Per-key failure type for the aggregation engine

use std::time::Duration;

use crate::record::Level;

/// Failure computing one aggregation key.
///
/// The key's partial output is discarded; sibling keys are unaffected.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyError {
    /// Key absent from the record store
    UnknownKey { level: Level, key: String },
    /// A computed record broke a cross-field invariant
    Invariant {
        key: String,
        window: String,
        detail: String,
    },
    /// Wall-clock budget exceeded
    Timeout {
        key: String,
        window: String,
        budget: Duration,
    },
    /// The computation panicked
    Panic { key: String, message: String },
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKey { level, key } => write!(f, "{key}: unknown {level} key"),
            Self::Invariant {
                key,
                window,
                detail,
            } => write!(f, "{key} [{window}]: {detail}"),
            Self::Timeout {
                key,
                window,
                budget,
            } => write!(
                f,
                "{key} [{window}]: exceeded {:.1}s budget",
                budget.as_secs_f64()
            ),
            Self::Panic { key, message } => write!(f, "{key}: panicked: {message}"),
        }
    }
}

impl std::error::Error for KeyError {}

impl KeyError {
    pub fn key(&self) -> &str {
        match self {
            Self::UnknownKey { key, .. }
            | Self::Invariant { key, .. }
            | Self::Timeout { key, .. }
            | Self::Panic { key, .. } => key,
        }
    }

    /// Timeouts and panics may be transient (load, memory pressure);
    /// unknown keys and invariant violations repeat deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Panic { .. })
    }

    /// Short variant name for reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownKey { .. } => "unknown_key",
            Self::Invariant { .. } => "invariant",
            Self::Timeout { .. } => "timeout",
            Self::Panic { .. } => "panic",
        }
    }
}

/// Extract a message from a `catch_unwind` payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_variants() {
        let timeout = KeyError::Timeout {
            key: "BR".into(),
            window: "2001".into(),
            budget: Duration::from_secs(5),
        };
        let panic = KeyError::Panic {
            key: "BR".into(),
            message: "boom".into(),
        };
        assert!(timeout.is_retryable());
        assert!(panic.is_retryable());

        let unknown = KeyError::UnknownKey {
            level: Level::Country,
            key: "XX".into(),
        };
        let invariant = KeyError::Invariant {
            key: "S1".into(),
            window: "2001-2005".into(),
            detail: "bad".into(),
        };
        assert!(!unknown.is_retryable());
        assert!(!invariant.is_retryable());
    }

    #[test]
    fn display_carries_key_and_window() {
        let e = KeyError::Timeout {
            key: "S42".into(),
            window: "2010".into(),
            budget: Duration::from_millis(1500),
        };
        assert_eq!(e.to_string(), "S42 [2010]: exceeded 1.5s budget");
        assert_eq!(e.key(), "S42");
        assert_eq!(e.kind(), "timeout");

        let e = KeyError::UnknownKey {
            level: Level::Journal,
            key: "S9".into(),
        };
        assert_eq!(e.to_string(), "S9: unknown journal key");
    }

    #[test]
    fn panic_payloads() {
        let r = std::panic::catch_unwind(|| panic!("static msg"));
        assert_eq!(panic_message(r.unwrap_err().as_ref()), "static msg");

        let r = std::panic::catch_unwind(|| panic!("formatted {}", 7));
        assert_eq!(panic_message(r.unwrap_err().as_ref()), "formatted 7");
    }
}
