//! Forum API adapter (listing/thing style endpoints).

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ForumPlatform, InboundMessage, Post, Sent};
use crate::domain::{Profile, Sample};
use crate::error::Result;
use crate::http::RateLimitedClient;

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    #[serde(default = "Vec::new")]
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    /// Fullname, e.g. `t4_abc`
    name: String,
    author: Option<String>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct ApiLink {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    author: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSubreddit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    public_description: String,
    #[serde(default)]
    subscribers: u64,
}

#[derive(Debug, Deserialize)]
struct ApiAccount {
    name: String,
    subreddit: Option<ApiSubreddit>,
}

/// Deleted accounts show up as this author name.
const DELETED_AUTHOR: &str = "[deleted]";

fn author_profile(name: &str) -> Profile {
    Profile {
        external_id: name.to_string(),
        handle: name.to_string(),
        display_name: name.to_string(),
        ..Default::default()
    }
}

fn link_text(link: &ApiLink) -> String {
    if link.selftext.is_empty() {
        link.title.clone()
    } else {
        format!("{}\n\n{}", link.title, link.selftext)
    }
}

fn children<T: DeserializeOwned>(body: Value) -> Result<Vec<T>> {
    let listing: Listing<T> = serde_json::from_value(body)?;
    Ok(listing.data.children.into_iter().map(|c| c.data).collect())
}

pub struct ForumClient {
    client: RateLimitedClient,
}

impl ForumClient {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ForumPlatform for ForumClient {
    async fn list_inbox(&self, max: u32) -> Result<Vec<InboundMessage>> {
        let limit = max.clamp(1, 100).to_string();
        let (body, info) = self.client.get("/message/unread", &[("limit", limit.as_str())]).await?;
        log::debug!("inbox remaining={:?} reset={:?}", info.remaining, info.reset_at);

        let messages: Vec<ApiMessage> = children(body)?;
        Ok(messages
            .into_iter()
            .filter_map(|m| {
                let author = m.author.filter(|a| a != DELETED_AUTHOR)?;
                Some(InboundMessage {
                    id: m.name,
                    sender_id: author,
                    text: m.body,
                })
            })
            .take(max as usize)
            .collect())
    }

    async fn reply(&self, message_id: &str, text: &str) -> Result<Sent> {
        let (body, _) = self
            .client
            .post_form("/api/comment", &[("api_type", "json"), ("thing_id", message_id), ("text", text)])
            .await?;
        Ok(Sent {
            id: body["json"]["data"]["things"][0]["data"]["name"]
                .as_str()
                .map(String::from),
        })
    }

    async fn search_posts(&self, query: &str, max: u32) -> Result<Vec<Post>> {
        let limit = max.clamp(1, 100).to_string();
        let (body, _) = self
            .client
            .get(
                "/search",
                &[("q", query), ("limit", limit.as_str()), ("sort", "new"), ("type", "link")],
            )
            .await?;
        let links: Vec<ApiLink> = children(body)?;
        Ok(links
            .into_iter()
            .filter(|l| l.author != DELETED_AUTHOR)
            .take(max as usize)
            .map(|l| Post {
                text: link_text(&l),
                author: author_profile(&l.author),
                id: l.id,
            })
            .collect())
    }

    async fn lookup_user(&self, username: &str) -> Result<Profile> {
        let path = format!("/user/{}/about", username);
        let (body, _) = self.client.get(&path, &[]).await?;
        let account: Thing<ApiAccount> = serde_json::from_value(body)?;
        let account = account.data;
        let subreddit = account.subreddit.unwrap_or_default();
        Ok(Profile {
            external_id: account.name.clone(),
            handle: account.name.clone(),
            display_name: if subreddit.title.is_empty() {
                account.name
            } else {
                subreddit.title
            },
            bio: subreddit.public_description,
            followers: subreddit.subscribers,
        })
    }

    async fn recent_posts(&self, username: &str, max: u32) -> Result<Vec<Sample>> {
        let path = format!("/user/{}/submitted", username);
        let limit = max.clamp(1, 100).to_string();
        let (body, _) = self.client.get(&path, &[("limit", limit.as_str())]).await?;
        let links: Vec<ApiLink> = children(body)?;
        Ok(links
            .into_iter()
            .take(max as usize)
            .map(|l| Sample {
                text: link_text(&l),
                post_id: l.id,
            })
            .collect())
    }
}
