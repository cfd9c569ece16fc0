use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use uuid::Uuid;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

use murmur_types::models::Profile;

/// User-service collaborator: public profile fields used to decorate
/// conversation listings. Identities themselves are owned elsewhere.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
}

pub struct HttpProfileDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileDirectory {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let resp = self
            .client
            .get(format!(
                "{}/users/{}",
                self.base_url.trim_end_matches('/'),
                user_id
            ))
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .context("user service unreachable")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            bail!("user service error: {}", resp.status());
        }

        let profile = resp.json().await.context("malformed profile response")?;
        Ok(Some(profile))
    }
}
