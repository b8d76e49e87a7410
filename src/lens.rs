//! Lens Protocol GraphQL client.

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::SocialGraphConfig;
use crate::error::{InsightError, InsightResult};
use crate::ethereum::SocialProfile;

const DEFAULT_PROFILE_QUERY: &str = r#"query DefaultProfile($request: DefaultProfileRequest!) {
  defaultProfile(request: $request) {
    id
    handle
    ownedBy
  }
}"#;

const FOLLOWING_QUERY: &str = r#"query Following($request: FollowingRequest!) {
  following(request: $request) {
    items {
      profile {
        id
        handle
        ownedBy
      }
    }
    pageInfo {
      next
      totalCount
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LensProfile {
    handle: String,
    owned_by: String,
}

impl From<LensProfile> for SocialProfile {
    fn from(profile: LensProfile) -> Self {
        Self {
            wallet_address: profile.owned_by,
            handle: profile.handle,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultProfileData {
    default_profile: Option<LensProfile>,
}

#[derive(Debug, Deserialize)]
struct FollowingData {
    following: FollowingPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FollowingPage {
    #[serde(default)]
    items: Vec<FollowingItem>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct FollowingItem {
    profile: LensProfile,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SocialGraphClient {
    client: Client,
    config: SocialGraphConfig,
}

impl SocialGraphClient {
    pub fn new(client: Client, config: SocialGraphConfig) -> Self {
        Self { client, config }
    }

    /// Profiles followed by `wallet_address`, in the order Lens returns them
    pub async fn following(&self, wallet_address: &str) -> InsightResult<Vec<SocialProfile>> {
        let mut profiles = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..self.config.max_pages.max(1) {
            let mut request = json!({
                "address": wallet_address,
                "limit": self.config.page_size,
            });
            if let Some(cursor) = &cursor {
                request["cursor"] = Value::String(cursor.clone());
            }

            let data: FollowingData = self.query(FOLLOWING_QUERY, request).await?;
            let fetched = data.following.items.len();
            profiles.extend(data.following.items.into_iter().map(|item| item.profile.into()));
            debug!("Following page {} for {}: {} profiles", page, wallet_address, fetched);

            match data.following.page_info.next {
                Some(next) if fetched > 0 => cursor = Some(next),
                _ => break,
            }
        }

        info!("{} follows {} profiles", wallet_address, profiles.len());
        Ok(profiles)
    }

    pub async fn default_profile(&self, wallet_address: &str) -> InsightResult<Option<SocialProfile>> {
        let data: DefaultProfileData = self
            .query(
                DEFAULT_PROFILE_QUERY,
                json!({ "ethereumAddress": wallet_address }),
            )
            .await?;
        Ok(data.default_profile.map(SocialProfile::from))
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, request: Value) -> InsightResult<T> {
        let unavailable = |message: String| InsightError::SocialGraphUnavailable(message);

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&json!({ "query": query, "variables": { "request": request } }))
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid response: {}", e)))?;

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(unavailable(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| unavailable("response carried no data".to_string()))
    }
}
