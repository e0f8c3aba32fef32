use crate::cli::MapsType;
use crate::prefs::Credentials;
use eyre::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info};

/// Largest page the scores and beatmapsets endpoints hand out.
const PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Debug)]
pub struct User {
    pub id: u32,
    pub username: String,
}

#[derive(Deserialize)]
struct Score {
    beatmap: ScoreBeatmap,
}

#[derive(Deserialize)]
struct ScoreBeatmap {
    beatmapset_id: u32,
}

#[derive(Deserialize)]
struct SetRef {
    id: u32,
}

// most_played answers with play counts, every other category with beatmap sets.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserMapEntry {
    Playcount { beatmapset: SetRef },
    Beatmapset { id: u32 },
}

impl UserMapEntry {
    fn beatmapset_id(&self) -> u32 {
        match self {
            UserMapEntry::Playcount { beatmapset } => beatmapset.id,
            UserMapEntry::Beatmapset { id } => *id,
        }
    }
}

pub struct OsuClient {
    client: Client,
    base_url: String,
    access_token: String,
}

async fn get_data<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .error_for_status()
        .wrap_err("osu! api returned an error status.")?
        .json::<T>()
        .await
        .wrap_err("Failed to convert api response to JSON.")
}

impl OsuClient {
    pub async fn authenticate(
        client: Client,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<OsuClient> {
        let base_url = base_url.trim_end_matches('/').to_owned();

        let response = client
            .post(format!("{base_url}/oauth/token"))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("scope", "public"),
            ])
            .send()
            .await
            .wrap_err("Network error requesting an osu! api token.")?;

        let token = get_data::<TokenResponse>(response)
            .await
            .wrap_err("Failed to authenticate, check CLIENT_ID and CLIENT_SECRET.")?;

        debug!("Obtained osu! api token");

        Ok(OsuClient {
            client,
            base_url,
            access_token: token.access_token,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, queries: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/api/v2/{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .query(queries)
            .send()
            .await
            .wrap_err_with(|| format!("Network error sending request to osu! api ({path})."))?;

        get_data(response).await
    }

    pub async fn get_user(&self, username: &str) -> Result<User> {
        let user = self
            .get::<User>(
                &format!("users/{username}"),
                &[("key", "username".to_owned())],
            )
            .await
            .wrap_err_with(|| format!("Failed to look up user {username}."))?;

        info!("Found user {} (https://osu.ppy.sh/users/{})", user.username, user.id);
        Ok(user)
    }

    /// Fetches pages of `limit`/`offset` until `amount` entries arrive or a page comes back short.
    async fn get_paged<T: DeserializeOwned>(&self, path: &str, amount: usize) -> Result<Vec<T>> {
        let mut result: Vec<T> = Vec::with_capacity(amount.min(PAGE_SIZE));

        while result.len() < amount {
            let limit = (amount - result.len()).min(PAGE_SIZE);
            let mut page = self
                .get::<Vec<T>>(
                    path,
                    &[
                        ("limit", limit.to_string()),
                        ("offset", result.len().to_string()),
                    ],
                )
                .await?;

            let short = page.len() < limit;
            page.truncate(limit);
            result.append(&mut page);

            if short {
                break;
            }
        }

        Ok(result)
    }

    pub async fn get_top_plays(&self, user_id: u32, amount: usize) -> Result<Vec<u32>> {
        let scores = self
            .get_paged::<Score>(&format!("users/{user_id}/scores/best"), amount)
            .await
            .wrap_err("Failed to fetch top plays.")?;

        Ok(scores
            .into_iter()
            .map(|score| score.beatmap.beatmapset_id)
            .collect())
    }

    pub async fn get_user_beatmapsets(
        &self,
        user_id: u32,
        kind: MapsType,
        amount: Option<usize>,
    ) -> Result<Vec<u32>> {
        let kind = kind.name();
        let path = format!("users/{user_id}/beatmapsets/{kind}");

        let entries = match amount {
            Some(amount) => self.get_paged::<UserMapEntry>(&path, amount).await,
            None => self.get::<Vec<UserMapEntry>>(&path, &[]).await,
        }
        .wrap_err_with(|| format!("Failed to fetch {kind} beatmap sets."))?;

        Ok(entries.iter().map(UserMapEntry::beatmapset_id).collect())
    }
}
