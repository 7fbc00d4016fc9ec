//! Per-worker key derivation.
//!
//! Keys are `<prefix><worker>:revoked` and `<prefix><worker>:clock`.
//! Derivation is pure; the prefix is the only thing that separates
//! applications sharing one store instance.

use super::WorkerIdentity;
use crate::core::error::{StateDbError, StateDbResult};

/// Default key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "celery:worker:state:";

const REVOKED_SUFFIX: &str = ":revoked";
const CLOCK_SUFFIX: &str = ":clock";

/// The keys used by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerKeys {
    pub revoked_key: String,
    pub clock_key: String,
}

/// Maps worker identities to their keys under a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    /// Create a namespace. The prefix must be non-empty.
    pub fn new(prefix: impl Into<String>) -> StateDbResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(StateDbError::invalid_argument("key prefix must not be empty"));
        }
        Ok(Self { prefix })
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Keys for a worker. The worker identity must be non-empty.
    pub fn keys_for(&self, worker: &WorkerIdentity) -> StateDbResult<WorkerKeys> {
        keys_for(&self.prefix, worker)
    }

    /// SCAN pattern matching every revoked-set key under this prefix.
    ///
    /// Glob metacharacters in the prefix are escaped.
    pub fn revoked_scan_pattern(&self) -> String {
        format!("{}*{}", escape_glob(&self.prefix), REVOKED_SUFFIX)
    }

    /// Recover the worker identity from a revoked-set key.
    ///
    /// Returns `None` for keys outside this namespace.
    pub fn worker_from_revoked_key(&self, key: &str) -> Option<WorkerIdentity> {
        let worker = key
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(REVOKED_SUFFIX)?;
        if worker.is_empty() {
            return None;
        }
        Some(WorkerIdentity::new(worker))
    }
}

impl Default for KeyNamespace {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// Derive the keys for `(prefix, worker)`.
pub fn keys_for(prefix: &str, worker: &WorkerIdentity) -> StateDbResult<WorkerKeys> {
    if prefix.is_empty() {
        return Err(StateDbError::invalid_argument("key prefix must not be empty"));
    }
    if worker.as_str().is_empty() {
        return Err(StateDbError::invalid_argument(
            "worker identity must not be empty",
        ));
    }
    Ok(WorkerKeys {
        revoked_key: format!("{}{}{}", prefix, worker.as_str(), REVOKED_SUFFIX),
        clock_key: format!("{}{}{}", prefix, worker.as_str(), CLOCK_SUFFIX),
    })
}

fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_use_prefix_and_worker() {
        let keys = keys_for("app:", &WorkerIdentity::new("w1@host")).unwrap();
        assert_eq!(keys.revoked_key, "app:w1@host:revoked");
        assert_eq!(keys.clock_key, "app:w1@host:clock");
    }

    #[test]
    fn default_prefix_matches_wire_contract() {
        let ns = KeyNamespace::default();
        let keys = ns.keys_for(&WorkerIdentity::new("celery@a")).unwrap();
        assert_eq!(keys.revoked_key, "celery:worker:state:celery@a:revoked");
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(keys_for("", &WorkerIdentity::new("w")).is_err());
        assert!(keys_for("p:", &WorkerIdentity::new("")).is_err());
        assert!(KeyNamespace::new("").is_err());
    }

    #[test]
    fn worker_recovered_from_key() {
        let ns = KeyNamespace::new("p:").unwrap();
        let keys = ns.keys_for(&WorkerIdentity::new("a:b@c")).unwrap();
        assert_eq!(
            ns.worker_from_revoked_key(&keys.revoked_key),
            Some(WorkerIdentity::new("a:b@c"))
        );
        assert_eq!(ns.worker_from_revoked_key(&keys.clock_key), None);
        assert_eq!(ns.worker_from_revoked_key("other:w:revoked"), None);
        assert_eq!(ns.worker_from_revoked_key("p::revoked"), None);
    }

    #[test]
    fn scan_pattern_escapes_prefix() {
        let ns = KeyNamespace::new("a*b:").unwrap();
        assert_eq!(ns.revoked_scan_pattern(), "a\\*b:*:revoked");
    }
}
