//! Context tokens round-tripped through the chat client.
//!
//! Every vote button carries `{ "poll_id": .., "vote": <index> }` and the end button carries
//! `{ "poll_id": .. }`. The server keeps no lookup table for them.

use serde::{Deserialize, Serialize};

use crate::domain::poll::{PollId, PollSnapshot};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub poll_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<i64>,
}

impl ActionContext {
    pub fn vote(poll_id: &PollId, option: usize) -> Self {
        Self { poll_id: poll_id.0.clone(), vote: Some(option as i64) }
    }

    pub fn end(poll_id: &PollId) -> Self {
        Self { poll_id: poll_id.0.clone(), vote: None }
    }

    pub fn poll_id(&self) -> PollId {
        PollId(self.poll_id.clone())
    }

    /// The option index carried by a vote token, if it is a usable index.
    pub fn option_index(&self) -> Option<usize> {
        self.vote.and_then(|vote| usize::try_from(vote).ok())
    }
}

impl PollSnapshot {
    pub fn vote_contexts(&self) -> Vec<ActionContext> {
        (0..self.options.len()).map(|option| ActionContext::vote(&self.id, option)).collect()
    }

    pub fn end_context(&self) -> ActionContext {
        ActionContext::end(&self.id)
    }
}
