use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use pollbot_core::domain::poll::{Poll, PollId};
use pollbot_core::errors::{PollError, StoreError};
use pollbot_core::store::{PollMutation, PollStore};

/// Process-local poll store. Each poll sits behind its own lock, so votes on different polls
/// never wait on each other.
#[derive(Default)]
pub struct InMemoryPollStore {
    polls: RwLock<HashMap<String, Arc<Mutex<Poll>>>>,
}

impl InMemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: &PollId) -> Option<Arc<Mutex<Poll>>> {
        self.polls.read().await.get(&id.0).cloned()
    }
}

#[async_trait::async_trait]
impl PollStore for InMemoryPollStore {
    async fn insert(&self, poll: Poll) -> Result<(), StoreError> {
        let mut polls = self.polls.write().await;
        if polls.contains_key(&poll.id.0) {
            return Err(StoreError::Unavailable(format!("poll {} already exists", poll.id)));
        }
        polls.insert(poll.id.0.clone(), Arc::new(Mutex::new(poll)));
        Ok(())
    }

    async fn find(&self, id: &PollId) -> Result<Option<Poll>, StoreError> {
        match self.entry(id).await {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn atomically(&self, id: &PollId, mutation: PollMutation<'_>) -> Result<Poll, PollError> {
        let entry = self.entry(id).await.ok_or_else(|| PollError::NotFound(id.clone()))?;
        let mut stored = entry.lock().await;

        // mutate a copy so a failing mutation leaves the stored poll untouched
        let mut poll = stored.clone();
        mutation(&mut poll)?;
        *stored = poll.clone();
        Ok(poll)
    }
}
