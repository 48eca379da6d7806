//! In-memory platforms for tests and dry wiring.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ForumPlatform, InboundMessage, Post, Sent, SocialPlatform};
use crate::domain::{Profile, Sample};
use crate::error::{Result, ScoutrError};

#[derive(Default)]
struct SocialState {
    dm_events: Vec<InboundMessage>,
    search: HashMap<String, Vec<Post>>,
    users: HashMap<String, Profile>,
    timelines: HashMap<String, Vec<Sample>>,
    sent_dms: Vec<(String, String)>,
    created_posts: Vec<String>,
    failing: Option<String>,
    calls: u32,
}

/// Scriptable social platform. Every call is counted.
#[derive(Default)]
pub struct MockSocial {
    state: Mutex<SocialState>,
}

impl MockSocial {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut SocialState) -> R) -> Result<R> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScoutrError::InvalidState("mock social state poisoned".into()))?;
        Ok(f(&mut state))
    }

    fn enter(&self, op: &str) -> Result<()> {
        self.with(|s| {
            s.calls += 1;
            s.failing.clone()
        })?
        .filter(|failing| failing == op)
        .map_or(Ok(()), |op| {
            Err(ScoutrError::Http {
                status: 503,
                body: format!("{} unavailable", op),
            })
        })
    }

    pub fn with_dm_event(self, id: &str, sender_id: &str, text: &str) -> Self {
        let _ = self.with(|s| {
            s.dm_events.push(InboundMessage {
                id: id.to_string(),
                sender_id: sender_id.to_string(),
                text: text.to_string(),
            })
        });
        self
    }

    pub fn with_search_results(self, query: &str, posts: Vec<Post>) -> Self {
        let _ = self.with(|s| s.search.insert(query.to_string(), posts));
        self
    }

    pub fn with_user(self, profile: Profile) -> Self {
        let _ = self.with(|s| s.users.insert(profile.external_id.clone(), profile));
        self
    }

    pub fn with_timeline(self, user_id: &str, samples: Vec<Sample>) -> Self {
        let _ = self.with(|s| s.timelines.insert(user_id.to_string(), samples));
        self
    }

    /// Make one operation (`list_dm_events`, `search_posts`, ...) fail with a 503.
    pub fn failing(self, op: &str) -> Self {
        let _ = self.with(|s| s.failing = Some(op.to_string()));
        self
    }

    pub fn sent_dms(&self) -> Vec<(String, String)> {
        self.with(|s| s.sent_dms.clone()).unwrap_or_default()
    }

    pub fn created_posts(&self) -> Vec<String> {
        self.with(|s| s.created_posts.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> u32 {
        self.with(|s| s.calls).unwrap_or_default()
    }
}

#[async_trait]
impl SocialPlatform for MockSocial {
    async fn list_dm_events(&self, max: u32) -> Result<Vec<InboundMessage>> {
        self.enter("list_dm_events")?;
        self.with(|s| s.dm_events.iter().take(max as usize).cloned().collect())
    }

    async fn send_dm(&self, recipient_id: &str, text: &str) -> Result<Sent> {
        self.enter("send_dm")?;
        self.with(|s| {
            s.sent_dms.push((recipient_id.to_string(), text.to_string()));
            Sent {
                id: Some(format!("dm{}", s.sent_dms.len())),
            }
        })
    }

    async fn search_posts(&self, query: &str, max: u32) -> Result<Vec<Post>> {
        self.enter("search_posts")?;
        self.with(|s| {
            s.search
                .get(query)
                .map(|posts| posts.iter().take(max as usize).cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn lookup_user(&self, user_id: &str) -> Result<Profile> {
        self.enter("lookup_user")?;
        self.with(|s| s.users.get(user_id).cloned())?.ok_or_else(|| ScoutrError::Http {
            status: 404,
            body: format!("user {} not found", user_id),
        })
    }

    async fn recent_posts(&self, user_id: &str, max: u32) -> Result<Vec<Sample>> {
        self.enter("recent_posts")?;
        self.with(|s| {
            s.timelines
                .get(user_id)
                .map(|t| t.iter().take(max as usize).cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn create_post(&self, text: &str) -> Result<Sent> {
        self.enter("create_post")?;
        self.with(|s| {
            s.created_posts.push(text.to_string());
            Sent {
                id: Some(format!("post{}", s.created_posts.len())),
            }
        })
    }
}

#[derive(Default)]
struct ForumState {
    inbox: Vec<InboundMessage>,
    search: HashMap<String, Vec<Post>>,
    replies: Vec<(String, String)>,
    calls: u32,
}

/// Scriptable forum platform.
#[derive(Default)]
pub struct MockForum {
    state: Mutex<ForumState>,
}

impl MockForum {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut ForumState) -> R) -> Result<R> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScoutrError::InvalidState("mock forum state poisoned".into()))?;
        state.calls += 1;
        Ok(f(&mut state))
    }

    pub fn with_message(self, id: &str, author: &str, text: &str) -> Self {
        let _ = self.with(|s| {
            s.inbox.push(InboundMessage {
                id: id.to_string(),
                sender_id: author.to_string(),
                text: text.to_string(),
            })
        });
        self
    }

    pub fn with_search_results(self, query: &str, posts: Vec<Post>) -> Self {
        let _ = self.with(|s| s.search.insert(query.to_string(), posts));
        self
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.with(|s| s.replies.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ForumPlatform for MockForum {
    async fn list_inbox(&self, max: u32) -> Result<Vec<InboundMessage>> {
        self.with(|s| s.inbox.iter().take(max as usize).cloned().collect())
    }

    async fn reply(&self, message_id: &str, text: &str) -> Result<Sent> {
        self.with(|s| {
            s.replies.push((message_id.to_string(), text.to_string()));
            Sent {
                id: Some(format!("t1_reply{}", s.replies.len())),
            }
        })
    }

    async fn search_posts(&self, query: &str, max: u32) -> Result<Vec<Post>> {
        self.with(|s| {
            s.search
                .get(query)
                .map(|posts| posts.iter().take(max as usize).cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn lookup_user(&self, username: &str) -> Result<Profile> {
        Ok(Profile {
            external_id: username.to_string(),
            handle: username.to_string(),
            display_name: username.to_string(),
            ..Default::default()
        })
    }

    async fn recent_posts(&self, _username: &str, _max: u32) -> Result<Vec<Sample>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_social_records_writes() {
        let social = MockSocial::new();
        social.send_dm("u1", "hello").await.unwrap();
        social.create_post("test").await.unwrap();
        assert_eq!(social.sent_dms(), vec![("u1".to_string(), "hello".to_string())]);
        assert_eq!(social.created_posts(), vec!["test".to_string()]);
        assert_eq!(social.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_social_failing_op() {
        let social = MockSocial::new().failing("search_posts");
        let err = social.search_posts("q", 10).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(social.list_dm_events(10).await.unwrap().is_empty());
    }
}
