//! Canned forum responses.

use async_trait::async_trait;
use cdk_core::error::ForumError;
use cdk_core::providers::{ForumClient, TopicSummary};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Forum {
    topics: HashMap<u64, TopicSummary>,
    posts: HashMap<(u64, u64), String>,
    unavailable: bool,
}

/// Forum client serving pre-registered topics and posts.
#[derive(Debug, Clone, Default)]
pub struct MockForumClient {
    forum: Arc<Mutex<Forum>>,
}

impl MockForumClient {
    /// Create a forum with no topics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic whose last post is `raw`.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn add_topic(&self, topic_id: u64, tags: &[&str], closed: bool, raw: &str) {
        let mut forum = self.forum.lock().unwrap();
        let highest_post_number = 1 + forum
            .posts
            .keys()
            .filter(|(topic, _)| *topic == topic_id)
            .count() as u64;
        forum.topics.insert(
            topic_id,
            TopicSummary {
                highest_post_number,
                tags: tags.iter().map(ToString::to_string).collect(),
                closed,
            },
        );
        forum
            .posts
            .insert((topic_id, highest_post_number), raw.to_string());
    }

    /// Make every request fail as if the forum were down
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.forum.lock().unwrap().unavailable = unavailable;
    }
}

#[async_trait]
impl ForumClient for MockForumClient {
    async fn topic(&self, topic_id: u64) -> Result<TopicSummary, ForumError> {
        let forum = self
            .forum
            .lock()
            .map_err(|_| ForumError::RequestFailed("Mutex lock failed".into()))?;
        if forum.unavailable {
            return Err(ForumError::RequestFailed("forum unavailable".into()));
        }
        forum.topics.get(&topic_id).cloned().ok_or(ForumError::Status(404))
    }

    async fn raw_post(&self, topic_id: u64, post_number: u64) -> Result<String, ForumError> {
        let forum = self
            .forum
            .lock()
            .map_err(|_| ForumError::RequestFailed("Mutex lock failed".into()))?;
        if forum.unavailable {
            return Err(ForumError::RequestFailed("forum unavailable".into()));
        }
        forum
            .posts
            .get(&(topic_id, post_number))
            .cloned()
            .ok_or(ForumError::Status(404))
    }
}
