//! Backing key-value store abstraction.
//!
//! [`KvBackend`] is the narrow operation set the revocation store needs:
//! sorted-set upsert, read and range delete, scalar get/set/incr, and a
//! keyspace scan for administrative sweeps. Scores are fractional seconds.
//!
//! Backends never retry. Connectivity problems surface as
//! [`StateDbError::StoreUnavailable`] and the caller decides what to do.

use crate::core::error::{StateDbError, StateDbResult};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Operations required from a backing store.
pub trait KvBackend: Send + Sync {
    /// Upsert members into a sorted set. Returns the number of new members.
    fn zadd(&self, key: &str, members: &[(String, f64)]) -> StateDbResult<u64>;

    /// All members with their scores. A missing key yields an empty vector.
    fn zrange_with_scores(&self, key: &str) -> StateDbResult<Vec<(String, f64)>>;

    /// Score of one member.
    fn zscore(&self, key: &str, member: &str) -> StateDbResult<Option<f64>>;

    /// Remove members with `score < max_exclusive`. Returns the removed count.
    fn zremrange_below(&self, key: &str, max_exclusive: f64) -> StateDbResult<u64>;

    /// Get a scalar value.
    fn get(&self, key: &str) -> StateDbResult<Option<Bytes>>;

    /// Overwrite a scalar value.
    fn set(&self, key: &str, value: &[u8]) -> StateDbResult<()>;

    /// Atomically increment an integer value, creating it at zero.
    fn incr(&self, key: &str) -> StateDbResult<i64>;

    /// Delete a key. Returns whether it existed.
    fn del(&self, key: &str) -> StateDbResult<bool>;

    /// Every key matching a glob pattern.
    fn scan_keys(&self, pattern: &str) -> StateDbResult<Vec<String>>;

    /// Liveness check.
    fn ping(&self) -> StateDbResult<()>;
}

impl<B: KvBackend + ?Sized> KvBackend for std::sync::Arc<B> {
    fn zadd(&self, key: &str, members: &[(String, f64)]) -> StateDbResult<u64> {
        (**self).zadd(key, members)
    }
    fn zrange_with_scores(&self, key: &str) -> StateDbResult<Vec<(String, f64)>> {
        (**self).zrange_with_scores(key)
    }
    fn zscore(&self, key: &str, member: &str) -> StateDbResult<Option<f64>> {
        (**self).zscore(key, member)
    }
    fn zremrange_below(&self, key: &str, max_exclusive: f64) -> StateDbResult<u64> {
        (**self).zremrange_below(key, max_exclusive)
    }
    fn get(&self, key: &str) -> StateDbResult<Option<Bytes>> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &[u8]) -> StateDbResult<()> {
        (**self).set(key, value)
    }
    fn incr(&self, key: &str) -> StateDbResult<i64> {
        (**self).incr(key)
    }
    fn del(&self, key: &str) -> StateDbResult<bool> {
        (**self).del(key)
    }
    fn scan_keys(&self, pattern: &str) -> StateDbResult<Vec<String>> {
        (**self).scan_keys(pattern)
    }
    fn ping(&self) -> StateDbResult<()> {
        (**self).ping()
    }
}

// ============================================================================
// In-process backend
// ============================================================================

#[derive(Debug, Clone)]
enum MemoryValue {
    String(Bytes),
    SortedSet(HashMap<String, f64>),
}

/// In-process backend with Redis semantics.
///
/// Supports fault injection: [`MemoryBackend::set_available`] takes the
/// whole store offline, [`MemoryBackend::fail_writes_after`] lets a fixed
/// number of writes through before going offline.
#[derive(Debug)]
pub struct MemoryBackend {
    data: parking_lot::RwLock<HashMap<String, MemoryValue>>,
    available: AtomicBool,
    /// Writes allowed before the store goes offline; negative means unlimited.
    write_budget: AtomicI64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            data: parking_lot::RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            write_budget: AtomicI64::new(-1),
        }
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the store online or take it offline.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            self.write_budget.store(-1, Ordering::SeqCst);
        }
    }

    /// Allow `writes` more write operations, then go offline.
    pub fn fail_writes_after(&self, writes: u32) {
        self.write_budget.store(i64::from(writes), Ordering::SeqCst);
    }

    /// Number of keys held.
    pub fn key_count(&self) -> usize {
        self.data.read().len()
    }

    fn check_available(&self) -> StateDbResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StateDbError::unavailable("memory backend offline"))
        }
    }

    fn check_write(&self) -> StateDbResult<()> {
        self.check_available()?;
        let budget = self.write_budget.load(Ordering::SeqCst);
        if budget == 0 {
            self.available.store(false, Ordering::SeqCst);
            return Err(StateDbError::unavailable("memory backend offline"));
        }
        if budget > 0 {
            self.write_budget.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn wrong_type() -> StateDbError {
    StateDbError::StoreRejected {
        kind: "WRONGTYPE".to_string(),
        message: "Operation against a key holding the wrong kind of value".to_string(),
    }
}

impl KvBackend for MemoryBackend {
    fn zadd(&self, key: &str, members: &[(String, f64)]) -> StateDbResult<u64> {
        self.check_write()?;
        let mut data = self.data.write();
        let entry = data
            .entry(key.to_string())
            .or_insert_with(|| MemoryValue::SortedSet(HashMap::new()));
        let MemoryValue::SortedSet(set) = entry else {
            return Err(wrong_type());
        };
        let mut added = 0;
        for (member, score) in members {
            if set.insert(member.clone(), *score).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    fn zrange_with_scores(&self, key: &str) -> StateDbResult<Vec<(String, f64)>> {
        self.check_available()?;
        let data = self.data.read();
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(MemoryValue::SortedSet(set)) => {
                let mut members: Vec<(String, f64)> =
                    set.iter().map(|(m, s)| (m.clone(), *s)).collect();
                members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                Ok(members)
            }
            Some(MemoryValue::String(_)) => Err(wrong_type()),
        }
    }

    fn zscore(&self, key: &str, member: &str) -> StateDbResult<Option<f64>> {
        self.check_available()?;
        let data = self.data.read();
        match data.get(key) {
            None => Ok(None),
            Some(MemoryValue::SortedSet(set)) => Ok(set.get(member).copied()),
            Some(MemoryValue::String(_)) => Err(wrong_type()),
        }
    }

    fn zremrange_below(&self, key: &str, max_exclusive: f64) -> StateDbResult<u64> {
        self.check_write()?;
        let mut data = self.data.write();
        let removed = match data.get_mut(key) {
            None => return Ok(0),
            Some(MemoryValue::SortedSet(set)) => {
                let before = set.len();
                set.retain(|_, score| *score >= max_exclusive);
                (before - set.len()) as u64
            }
            Some(MemoryValue::String(_)) => return Err(wrong_type()),
        };
        // Redis drops empty sorted sets.
        if matches!(data.get(key), Some(MemoryValue::SortedSet(set)) if set.is_empty()) {
            data.remove(key);
        }
        Ok(removed)
    }

    fn get(&self, key: &str) -> StateDbResult<Option<Bytes>> {
        self.check_available()?;
        let data = self.data.read();
        match data.get(key) {
            None => Ok(None),
            Some(MemoryValue::String(value)) => Ok(Some(value.clone())),
            Some(MemoryValue::SortedSet(_)) => Err(wrong_type()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StateDbResult<()> {
        self.check_write()?;
        self.data.write().insert(
            key.to_string(),
            MemoryValue::String(Bytes::copy_from_slice(value)),
        );
        Ok(())
    }

    fn incr(&self, key: &str) -> StateDbResult<i64> {
        self.check_write()?;
        let mut data = self.data.write();
        let current = match data.get(key) {
            None => 0,
            Some(MemoryValue::String(value)) => std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| StateDbError::StoreRejected {
                    kind: "ERR".to_string(),
                    message: "value is not an integer or out of range".to_string(),
                })?,
            Some(MemoryValue::SortedSet(_)) => return Err(wrong_type()),
        };
        let next = current.checked_add(1).ok_or_else(|| StateDbError::StoreRejected {
            kind: "ERR".to_string(),
            message: "increment or decrement would overflow".to_string(),
        })?;
        data.insert(
            key.to_string(),
            MemoryValue::String(Bytes::from(next.to_string())),
        );
        Ok(next)
    }

    fn del(&self, key: &str) -> StateDbResult<bool> {
        self.check_write()?;
        Ok(self.data.write().remove(key).is_some())
    }

    fn scan_keys(&self, pattern: &str) -> StateDbResult<Vec<String>> {
        self.check_available()?;
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| glob_matches(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn ping(&self) -> StateDbResult<()> {
        self.check_available()
    }
}

/// Redis-style glob matching: `*`, `?`, `[...]` classes and `\` escapes.
pub fn glob_matches(pattern: &str, s: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = s.chars().collect();
    glob_match_at(&pattern, &s)
}

fn glob_match_at(pattern: &[char], s: &[char]) -> bool {
    let Some((&p, rest)) = pattern.split_first() else {
        return s.is_empty();
    };
    match p {
        '*' => (0..=s.len()).any(|skip| glob_match_at(rest, &s[skip..])),
        '?' => !s.is_empty() && glob_match_at(rest, &s[1..]),
        '\\' => match rest.split_first() {
            Some((&literal, rest)) => {
                s.first() == Some(&literal) && glob_match_at(rest, &s[1..])
            }
            None => s.first() == Some(&'\\') && s.len() == 1,
        },
        '[' => {
            let Some(&c) = s.first() else {
                return false;
            };
            let Some(close) = rest.iter().position(|&ch| ch == ']') else {
                // Unterminated class matches a literal '['.
                return c == '[' && glob_match_at(rest, &s[1..]);
            };
            let (class, after) = (&rest[..close], &rest[close + 1..]);
            class_matches(class, c) && glob_match_at(after, &s[1..])
        }
        literal => s.first() == Some(&literal) && glob_match_at(rest, &s[1..]),
    }
}

fn class_matches(class: &[char], c: char) -> bool {
    let (negated, class) = match class.split_first() {
        Some(('^', rest)) => (true, rest),
        _ => (false, class),
    };
    let mut matched = false;
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            let (lo, hi) = if class[i] <= class[i + 2] {
                (class[i], class[i + 2])
            } else {
                (class[i + 2], class[i])
            };
            if (lo..=hi).contains(&c) {
                matched = true;
            }
            i += 3;
        } else {
            if class[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    matched != negated
}
