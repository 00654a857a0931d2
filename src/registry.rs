//! Credential registry: the set of revoked session-token identifiers (jti).
//!
//! One instance lives in `AppState` for the whole process. Every
//! authenticated request asks `is_revoked` before trusting a token's claims;
//! logout is the only writer. Revocation is permanent for the token's
//! lifetime; entries whose token has expired anyway can be swept with
//! `purge_expired`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct CredentialRegistry {
    /// jti → expiry (unix seconds). `None` is kept until the process exits.
    revoked: RwLock<HashMap<String, Option<i64>>>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token with no known expiry. Idempotent.
    pub fn revoke(&self, jti: &str) {
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        revoked.entry(jti.to_string()).or_insert(None);
    }

    /// Revoke a token that stops being valid on its own at `expires_at`.
    /// Idempotent; a later call never shortens an existing entry.
    pub fn revoke_until(&self, jti: &str, expires_at: i64) {
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        revoked
            .entry(jti.to_string())
            .and_modify(|exp| {
                if let Some(current) = exp {
                    *current = (*current).max(expires_at);
                }
            })
            .or_insert(Some(expires_at));
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }

    /// Drop entries whose token expired before `now`. Returns how many went.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut revoked = self.revoked.write().unwrap_or_else(PoisonError::into_inner);
        let before = revoked.len();
        revoked.retain(|_, exp| exp.map_or(true, |exp| exp >= now));
        before - revoked.len()
    }

    pub fn len(&self) -> usize {
        self.revoked.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unknown_token_is_not_revoked() {
        let reg = CredentialRegistry::new();
        assert!(!reg.is_revoked("abc"));
        assert!(reg.is_empty());
    }

    #[test]
    fn revoke_is_idempotent() {
        let reg = CredentialRegistry::new();
        reg.revoke("abc");
        reg.revoke("abc");
        reg.revoke_until("abc", 100);
        assert!(reg.is_revoked("abc"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn purge_only_drops_expired_entries() {
        let reg = CredentialRegistry::new();
        reg.revoke_until("old", 100);
        reg.revoke_until("fresh", 500);
        reg.revoke("forever");

        assert_eq!(reg.purge_expired(200), 1);
        assert!(!reg.is_revoked("old"));
        assert!(reg.is_revoked("fresh"));
        assert!(reg.is_revoked("forever"));
    }

    #[test]
    fn later_revocation_never_shortens_expiry() {
        let reg = CredentialRegistry::new();
        reg.revoke_until("t", 500);
        reg.revoke_until("t", 100);
        assert_eq!(reg.purge_expired(200), 0);
        assert!(reg.is_revoked("t"));
    }

    #[test]
    fn concurrent_revocations_are_not_lost() {
        let reg = Arc::new(CredentialRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reg = reg.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let jti = format!("{t}-{i}");
                        reg.revoke(&jti);
                        assert!(reg.is_revoked(&jti));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.len(), 800);
    }
}
