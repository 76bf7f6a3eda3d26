use crate::error::BotResult;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const MEME_SEARCH_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meme {
    pub description: String,
    pub gif_url: String,
}

#[derive(Debug, Deserialize)]
struct TenorSearchResponse {
    #[serde(default)]
    results: Vec<TenorResult>,
}

#[derive(Debug, Deserialize)]
struct TenorResult {
    content_description: Option<String>,
    #[serde(default)]
    media: Vec<TenorMedia>,
}

#[derive(Debug, Deserialize)]
struct TenorMedia {
    gif: Option<TenorGif>,
}

#[derive(Debug, Deserialize)]
struct TenorGif {
    url: Option<String>,
}

impl From<TenorResult> for Meme {
    fn from(result: TenorResult) -> Self {
        let gif_url = result
            .media
            .into_iter()
            .next()
            .and_then(|m| m.gif)
            .and_then(|g| g.url)
            .unwrap_or_else(|| "No GIF URL available".to_string());

        Self {
            description: result
                .content_description
                .unwrap_or_else(|| "No description".to_string()),
            gif_url,
        }
    }
}

/// Tenor v1 GIF search.
pub struct TenorClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TenorClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Non-success responses yield an empty list rather than an error.
    pub async fn search(&self, terms: &str) -> BotResult<Vec<Meme>> {
        let url = format!("{}/v1/search", self.base_url);
        let limit = MEME_SEARCH_LIMIT.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", terms),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Tenor search failed with status {}", response.status());
            return Ok(Vec::new());
        }

        let body: TenorSearchResponse = response.json().await?;
        Ok(body.results.into_iter().map(Meme::from).collect())
    }
}
