use async_trait::async_trait;

use crate::domain::poll::{Poll, PollId};
use crate::errors::{PollError, StoreError};

/// A transition applied to a poll inside the store's atomic section.
///
/// Returning an error discards every change the mutation made.
pub type PollMutation<'a> = Box<dyn FnOnce(&mut Poll) -> Result<(), PollError> + Send + 'a>;

/// Durable keyed storage for polls.
///
/// `atomically` is serializable per poll id: two calls for the same id never interleave, and the
/// mutated poll is persisted before the call returns. Calls for different ids may run concurrently.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn insert(&self, poll: Poll) -> Result<(), StoreError>;

    async fn find(&self, id: &PollId) -> Result<Option<Poll>, StoreError>;

    /// Loads the poll, applies `mutation` and persists the result as one unit.
    ///
    /// Fails with `PollError::NotFound` when `id` does not resolve.
    async fn atomically(&self, id: &PollId, mutation: PollMutation<'_>) -> Result<Poll, PollError>;
}
