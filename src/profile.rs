//! Current-user profile with a local cache

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use optiextract_session::KeyValueStore;

use crate::error::Error;
use crate::fetch::{ApiRequest, AuthedClient};

/// User data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Profile lookups that hit the API once and the store afterwards
#[derive(Clone)]
pub struct ProfileCache {
    client: AuthedClient,
    store: Arc<dyn KeyValueStore>,
    key: String,
    path: String,
}

impl ProfileCache {
    pub fn new(client: AuthedClient, store: Arc<dyn KeyValueStore>, key: &str, path: &str) -> Self {
        Self {
            client,
            store,
            key: key.to_string(),
            path: path.to_string(),
        }
    }

    /// The cached profile, if one was stored and is still readable
    pub fn cached(&self) -> Option<UserProfile> {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read cached profile: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Discarding unreadable cached profile: {}", e);
                None
            }
        }
    }

    /// 現在のユーザーを取得
    pub async fn current(&self) -> Result<UserProfile, Error> {
        if let Some(profile) = self.cached() {
            return Ok(profile);
        }

        debug!("Fetching profile from {}", self.path);
        let profile: UserProfile = self.client.execute(ApiRequest::get(&self.path)).await?;

        self.store
            .set(&self.key, &serde_json::to_string(&profile)?)?;
        Ok(profile)
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.store.delete(&self.key)?;
        Ok(())
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("key", &self.key)
            .field("path", &self.path)
            .finish()
    }
}
