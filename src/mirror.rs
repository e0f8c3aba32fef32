use eyre::{Context, Result};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct SetInfo {
    pub artist: String,
    pub title: String,
}

/// Metadata and archive lookups against a chimu-style beatmap mirror.
pub struct MirrorClient {
    client: Client,
    base_url: String,
}

impl MirrorClient {
    pub fn new(client: Client, base_url: &str) -> MirrorClient {
        MirrorClient {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    async fn get(&self, path: String) -> Result<Response> {
        self.client
            .get(format!("{}/{}", self.base_url, path))
            .send()
            .await
            .wrap_err_with(|| format!("Network error sending request to mirror ({path})."))?
            .error_for_status()
            .wrap_err_with(|| format!("Mirror returned an error status ({path})."))
    }

    pub async fn set_info(&self, id: u32) -> Result<SetInfo> {
        debug!(id, "Fetching set info from mirror");

        self.get(format!("v1/set/{id}"))
            .await?
            .json::<SetInfo>()
            .await
            .wrap_err_with(|| format!("Failed to read mirror metadata for set {id}."))
    }

    pub async fn download(&self, id: u32) -> Result<Response> {
        self.get(format!("v1/download/{id}")).await
    }
}
