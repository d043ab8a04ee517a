//! Relay access decisions

use crate::auth::{BackendAccessCache, ClaimRegistry};
use std::sync::Arc;
use tracing::{debug, error};

/// Where a pubkey's access comes from, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessSource {
    /// Listed in `RELAY_ADMINS`
    Admin,
    /// Listed in `RELAY_WHITELIST`
    Whitelist,
    /// Holds at least one recorded claim
    Claim,
    /// Granted by the remote backend
    Backend,
}

/// Decides whether a pubkey may use the relay
pub struct AccessController {
    admins: Vec<String>,
    whitelist: Vec<String>,
    claims: Arc<ClaimRegistry>,
    backend: Option<BackendAccessCache>,
}

impl AccessController {
    pub fn new(
        admins: Vec<String>,
        whitelist: Vec<String>,
        claims: Arc<ClaimRegistry>,
        backend: Option<BackendAccessCache>,
    ) -> Self {
        Self {
            admins,
            whitelist,
            claims,
            backend,
        }
    }

    pub fn is_admin(&self, pubkey: &str) -> bool {
        !pubkey.is_empty() && self.admins.iter().any(|a| a == pubkey)
    }

    pub fn admins(&self) -> &[String] {
        &self.admins
    }

    pub fn claims(&self) -> &Arc<ClaimRegistry> {
        &self.claims
    }

    pub async fn has_access(&self, pubkey: &str) -> bool {
        self.access_source(pubkey).await.is_some()
    }

    /// First source granting access, or `None` when every source denies
    pub async fn access_source(&self, pubkey: &str) -> Option<AccessSource> {
        if pubkey.is_empty() {
            return None;
        }

        let source = self.resolve(pubkey).await;
        debug!(pubkey = %pubkey, source = ?source, "Access check");
        source
    }

    async fn resolve(&self, pubkey: &str) -> Option<AccessSource> {
        if self.is_admin(pubkey) {
            return Some(AccessSource::Admin);
        }

        if self.whitelist.iter().any(|w| w == pubkey) {
            return Some(AccessSource::Whitelist);
        }

        match self.claims.user_claims(pubkey).await {
            Ok(claims) if !claims.is_empty() => return Some(AccessSource::Claim),
            Ok(_) => {}
            Err(e) => error!(pubkey = %pubkey, error = %e, "Failed to read claims"),
        }

        match &self.backend {
            Some(backend) if backend.check(pubkey).await => Some(AccessSource::Backend),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessBackend, AccessError};
    use crate::storage::MemoryKvStore;
    use async_trait::async_trait;

    struct AllowList(Vec<&'static str>);

    #[async_trait]
    impl AccessBackend for AllowList {
        async fn check(&self, pubkey: &str) -> Result<bool, AccessError> {
            Ok(self.0.iter().any(|allowed| *allowed == pubkey))
        }
    }

    fn controller(backend: Option<Vec<&'static str>>) -> AccessController {
        let claims = Arc::new(ClaimRegistry::new(Arc::new(MemoryKvStore::new()), vec![]));
        AccessController::new(
            vec!["admin".to_string()],
            vec!["friend".to_string()],
            claims,
            backend.map(|allowed| BackendAccessCache::new(Arc::new(AllowList(allowed)))),
        )
    }

    #[tokio::test]
    async fn test_each_source_grants_independently() {
        let access = controller(Some(vec!["remote"]));
        access.claims().add_user_claim("claimer", "vip").await.unwrap();

        assert_eq!(access.access_source("admin").await, Some(AccessSource::Admin));
        assert_eq!(access.access_source("friend").await, Some(AccessSource::Whitelist));
        assert_eq!(access.access_source("claimer").await, Some(AccessSource::Claim));
        assert_eq!(access.access_source("remote").await, Some(AccessSource::Backend));
        assert_eq!(access.access_source("stranger").await, None);
    }

    #[tokio::test]
    async fn test_no_backend_means_no_remote_access() {
        let access = controller(None);
        assert!(!access.has_access("remote").await);
    }

    #[tokio::test]
    async fn test_empty_pubkey_never_has_access() {
        let access = controller(Some(vec![""]));
        assert!(!access.has_access("").await);
        assert!(!access.is_admin(""));
    }
}
