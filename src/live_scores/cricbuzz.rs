use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::provider::LiveScoreProvider;

/// Recent-matches feed from the Cricbuzz API on RapidAPI.
pub struct Cricbuzz {
    http: Client,
    api_url: String,
    api_host: String,
    api_key: String,
}

impl Cricbuzz {
    pub fn new(api_url: &str, api_host: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Cricbuzz {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_host: api_host.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn recent_url(&self) -> String {
        format!("{}/matches/v1/recent", self.api_url)
    }
}

#[async_trait]
impl LiveScoreProvider for Cricbuzz {
    fn name(&self) -> &str {
        "Cricbuzz"
    }

    async fn recent_matches(&self) -> Result<serde_json::Value> {
        let url = self.recent_url();
        debug!("Fetching recent matches from {}", url);

        let resp = self
            .http
            .get(&url)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.api_host)
            .send()
            .await
            .context("Cricbuzz request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Cricbuzz error: {}", resp.status());
        }

        resp.json().await.context("Failed to parse Cricbuzz response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_url_tolerates_trailing_slash() {
        let c = Cricbuzz::new(
            "https://cricbuzz-cricket.p.rapidapi.com/",
            "cricbuzz-cricket.p.rapidapi.com",
            "key",
        )
        .unwrap();
        assert_eq!(
            c.recent_url(),
            "https://cricbuzz-cricket.p.rapidapi.com/matches/v1/recent"
        );
        assert_eq!(c.name(), "Cricbuzz");
    }
}
