use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crema_core::db::Database;
use crema_core::models::{ProfileUpdate, UserProfile};
use crema_core::store::DocumentStore;

/// One leaderboard row as sent by `GET /api/leaderboard`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RankedProfile {
    pub uid: String,
    pub profile: UserProfile,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// User documents held by a `crema serve` instance.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base =
            Url::parse(base_url).with_context(|| format!("Invalid remote URL '{base_url}'"))?;
        if base.cannot_be_a_base() {
            bail!("Invalid remote URL '{base_url}'");
        }
        let client = reqwest::Client::builder()
            .user_agent(format!("crema-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("Remote URL cannot carry a path: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .with_context(|| format!("Failed to reach crema server at {}", self.base))
    }
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .map_or_else(|_| status.to_string(), |body| body.error);
    bail!("Server returned {status}: {message}")
}

impl DocumentStore for HttpDocumentStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
        let url = self.url(&["api", "users", uid])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let profile = check(response)
            .await?
            .json()
            .await
            .context("Failed to parse user document")?;
        Ok(Some(profile))
    }

    async fn set(&self, uid: &str, profile: &UserProfile) -> Result<()> {
        let url = self.url(&["api", "users", uid])?;
        let response = self
            .send(self.request(Method::PUT, url).json(profile))
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn update(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        let url = self.url(&["api", "users", uid])?;
        let response = self
            .send(self.request(Method::PATCH, url).json(update))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            bail!("No user document for '{uid}'");
        }
        check(response).await?;
        Ok(())
    }

    async fn top_by_points(&self, limit: usize) -> Result<Vec<(String, UserProfile)>> {
        let mut url = self.url(&["api", "leaderboard"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self.send(self.request(Method::GET, url)).await?;
        let rows: Vec<RankedProfile> = check(response)
            .await?
            .json()
            .await
            .context("Failed to parse leaderboard")?;
        Ok(rows.into_iter().map(|r| (r.uid, r.profile)).collect())
    }
}

/// Where user documents live for this invocation.
pub enum CloudStore {
    /// A SQLite file in the data directory.
    Local(Database),
    Http(HttpDocumentStore),
}

impl CloudStore {
    pub fn remote_url(&self) -> Option<&Url> {
        match self {
            Self::Local(_) => None,
            Self::Http(store) => Some(store.base_url()),
        }
    }
}

impl DocumentStore for CloudStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>> {
        match self {
            Self::Local(db) => db.get(uid).await,
            Self::Http(store) => store.get(uid).await,
        }
    }

    async fn set(&self, uid: &str, profile: &UserProfile) -> Result<()> {
        match self {
            Self::Local(db) => db.set(uid, profile).await,
            Self::Http(store) => store.set(uid, profile).await,
        }
    }

    async fn update(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        match self {
            Self::Local(db) => db.update(uid, update).await,
            Self::Http(store) => store.update(uid, update).await,
        }
    }

    async fn top_by_points(&self, limit: usize) -> Result<Vec<(String, UserProfile)>> {
        match self {
            Self::Local(db) => db.top_by_points(limit).await,
            Self::Http(store) => store.top_by_points(limit).await,
        }
    }
}
