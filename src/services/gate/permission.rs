use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::Session;

/// Per-origin connection grants.
pub trait PermissionStore: Send + Sync {
    fn has_grant(&self, origin: &str) -> bool;
    fn grant(&self, session: &Session, chain_id: u64);
    /// Refresh the last-touched timestamp of a granted origin.
    fn touch(&self, origin: &str);
    fn get(&self, origin: &str) -> Option<ConnectedSite>;
    fn revoke(&self, origin: &str) -> bool;
    fn list(&self) -> Vec<ConnectedSite>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedSite {
    pub origin: String,
    pub name: String,
    pub icon: String,
    pub chain_id: u64,
    pub is_connected: bool,
    /// Milliseconds since the unix epoch
    pub last_touched_at: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Default)]
pub struct ConnectedSites {
    sites: RwLock<HashMap<String, ConnectedSite>>,
}

impl ConnectedSites {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for ConnectedSites {
    fn has_grant(&self, origin: &str) -> bool {
        self.sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(origin)
            .is_some_and(|site| site.is_connected)
    }

    fn grant(&self, session: &Session, chain_id: u64) {
        let site = ConnectedSite {
            origin: session.origin.clone(),
            name: session.name.clone(),
            icon: session.icon.clone(),
            chain_id,
            is_connected: true,
            last_touched_at: now_millis(),
        };
        tracing::info!("Granted connection to {}", session.origin);
        self.sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.origin.clone(), site);
    }

    fn touch(&self, origin: &str) {
        if let Some(site) = self
            .sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(origin)
        {
            site.last_touched_at = now_millis().max(site.last_touched_at);
        }
    }

    fn get(&self, origin: &str) -> Option<ConnectedSite> {
        self.sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(origin)
            .cloned()
    }

    fn revoke(&self, origin: &str) -> bool {
        let removed = self
            .sites
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(origin)
            .is_some();
        if removed {
            tracing::info!("Revoked connection to {}", origin);
        }
        removed
    }

    fn list(&self) -> Vec<ConnectedSite> {
        let mut sites: Vec<_> = self
            .sites
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        sites.sort_by(|a, b| b.last_touched_at.cmp(&a.last_touched_at));
        sites
    }
}
