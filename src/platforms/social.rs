//! Social API adapter (v2-style JSON endpoints).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use super::{InboundMessage, Post, Sent, SocialPlatform};
use crate::domain::{Profile, Sample};
use crate::error::{Result, ScoutrError};
use crate::http::RateLimitedClient;

const USER_FIELDS: &str = "username,name,description,public_metrics";

#[derive(Debug, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    followers_count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    public_metrics: Option<PublicMetrics>,
}

impl From<ApiUser> for Profile {
    fn from(user: ApiUser) -> Self {
        Profile {
            external_id: user.id,
            handle: user.username,
            display_name: user.name,
            bio: user.description,
            followers: user.public_metrics.map(|m| m.followers_count).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    #[serde(default)]
    text: String,
    author_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiDmEvent {
    id: String,
    #[serde(default)]
    text: String,
    sender_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DmEventsResponse {
    #[serde(default)]
    data: Vec<ApiDmEvent>,
}

/// Clamp a requested page size into the endpoint's accepted range.
fn page(max: u32, min: u32, limit: u32) -> String {
    max.clamp(min, limit).to_string()
}

fn parse<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T> {
    Ok(serde_json::from_value(body)?)
}

fn created_id(body: &Value, key: &str) -> Sent {
    Sent {
        id: body["data"][key].as_str().map(String::from),
    }
}

pub struct SocialClient {
    client: RateLimitedClient,
    me: OnceCell<String>,
}

impl SocialClient {
    pub fn new(client: RateLimitedClient) -> Self {
        Self {
            client,
            me: OnceCell::new(),
        }
    }

    /// Our own account id, fetched once.
    async fn me(&self) -> Result<&str> {
        let id = self
            .me
            .get_or_try_init(|| async {
                let (body, _) = self.client.get("/users/me", &[]).await?;
                let user: UserResponse = parse(body)?;
                Ok::<_, ScoutrError>(user.data.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl SocialPlatform for SocialClient {
    async fn list_dm_events(&self, max: u32) -> Result<Vec<InboundMessage>> {
        let me = self.me().await?.to_string();
        let max_results = page(max, 1, 100);
        let (body, info) = self
            .client
            .get(
                "/dm_events",
                &[
                    ("event_types", "MessageCreate"),
                    ("dm_event.fields", "id,text,sender_id,created_at"),
                    ("max_results", max_results.as_str()),
                ],
            )
            .await?;
        log::debug!("dm_events remaining={:?}", info.remaining);

        let events: DmEventsResponse = parse(body)?;
        Ok(events
            .data
            .into_iter()
            .filter_map(|e| {
                let sender_id = e.sender_id?;
                (sender_id != me).then_some(InboundMessage {
                    id: e.id,
                    sender_id,
                    text: e.text,
                })
            })
            .take(max as usize)
            .collect())
    }

    async fn send_dm(&self, recipient_id: &str, text: &str) -> Result<Sent> {
        let path = format!("/dm_conversations/with/{}/messages", recipient_id);
        let (body, _) = self.client.post_json(&path, &json!({ "text": text })).await?;
        Ok(created_id(&body, "dm_event_id"))
    }

    async fn search_posts(&self, query: &str, max: u32) -> Result<Vec<Post>> {
        let max_results = page(max, 10, 100);
        let (body, info) = self
            .client
            .get(
                "/tweets/search/recent",
                &[
                    ("query", query),
                    ("max_results", max_results.as_str()),
                    ("expansions", "author_id"),
                    ("tweet.fields", "author_id"),
                    ("user.fields", USER_FIELDS),
                ],
            )
            .await?;
        log::debug!("search remaining={:?} reset={:?}", info.remaining, info.reset_at);

        let response: SearchResponse = parse(body)?;
        let users: HashMap<String, Profile> = response
            .includes
            .users
            .into_iter()
            .map(|u| (u.id.clone(), Profile::from(u)))
            .collect();

        Ok(response
            .data
            .into_iter()
            .filter_map(|tweet| {
                let author_id = tweet.author_id?;
                let author = users.get(&author_id).cloned().unwrap_or_else(|| Profile {
                    external_id: author_id.clone(),
                    handle: author_id.clone(),
                    ..Default::default()
                });
                Some(Post {
                    id: tweet.id,
                    text: tweet.text,
                    author,
                })
            })
            .take(max as usize)
            .collect())
    }

    async fn lookup_user(&self, user_id: &str) -> Result<Profile> {
        let path = format!("/users/{}", user_id);
        let (body, _) = self.client.get(&path, &[("user.fields", USER_FIELDS)]).await?;
        let user: UserResponse = parse(body)?;
        Ok(user.data.into())
    }

    async fn recent_posts(&self, user_id: &str, max: u32) -> Result<Vec<Sample>> {
        let path = format!("/users/{}/tweets", user_id);
        let max_results = page(max, 5, 100);
        let (body, _) = self
            .client
            .get(&path, &[("max_results", max_results.as_str()), ("exclude", "retweets,replies")])
            .await?;
        let timeline: TimelineResponse = parse(body)?;
        Ok(timeline
            .data
            .into_iter()
            .take(max as usize)
            .map(|t| Sample {
                post_id: t.id,
                text: t.text,
            })
            .collect())
    }

    async fn create_post(&self, text: &str) -> Result<Sent> {
        let (body, _) = self.client.post_json("/tweets", &json!({ "text": text })).await?;
        Ok(created_id(&body, "id"))
    }
}
