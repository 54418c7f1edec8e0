//! Poll lifecycle engine.
//!
//! Open -> Closed is the only state change. The engine keeps no poll state between calls: every
//! vote or end reloads, mutates and persists through [`PollStore::atomically`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::poll::{Poll, PollDefinition, PollId, PollSnapshot, VoteChange, VoteOutcome};
use crate::errors::PollError;
use crate::store::PollStore;

#[derive(Clone)]
pub struct PollEngine {
    store: Arc<dyn PollStore>,
}

impl PollEngine {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        definition: PollDefinition,
        creator: &str,
    ) -> Result<PollSnapshot, PollError> {
        let poll = Poll::open(PollId::generate(), definition, creator, Utc::now())?;
        let snapshot = poll.snapshot();
        self.store.insert(poll).await?;

        info!(
            event_name = "poll.created",
            poll_id = %snapshot.id,
            creator = %creator,
            option_count = snapshot.options.len(),
            max_votes = snapshot.settings.max_votes,
            "poll created"
        );
        Ok(snapshot)
    }

    pub async fn vote(
        &self,
        poll_id: &PollId,
        voter: &str,
        option: usize,
    ) -> Result<VoteOutcome, PollError> {
        let mut change = None::<VoteChange>;
        let result = self
            .store
            .atomically(
                poll_id,
                Box::new(|poll: &mut Poll| {
                    change = Some(poll.apply_vote(voter, option)?);
                    Ok(())
                }),
            )
            .await;

        let poll = match result {
            Ok(poll) => poll,
            Err(error) => {
                warn!(
                    event_name = "poll.vote.rejected",
                    poll_id = %poll_id,
                    voter = %voter,
                    option,
                    error = %error,
                    "vote not applied"
                );
                return Err(error);
            }
        };
        let change = change.ok_or_else(|| {
            PollError::StoreUnavailable(format!("store did not apply vote on poll {poll_id}"))
        })?;

        info!(
            event_name = "poll.vote.applied",
            poll_id = %poll_id,
            voter = %voter,
            change = ?change,
            "vote applied"
        );

        Ok(VoteOutcome {
            selection: poll.selection_of(voter).to_vec(),
            snapshot: poll.snapshot(),
            change,
        })
    }

    /// Closes the poll. Ending an already closed poll returns the same closed snapshot.
    pub async fn end(&self, poll_id: &PollId, caller: &str) -> Result<PollSnapshot, PollError> {
        let mut transitioned = false;
        let poll = self
            .store
            .atomically(
                poll_id,
                Box::new(|poll: &mut Poll| {
                    transitioned = poll.close(Utc::now());
                    Ok(())
                }),
            )
            .await?;

        info!(
            event_name = "poll.ended",
            poll_id = %poll_id,
            ended_by = %caller,
            transitioned,
            voter_count = poll.voters.len(),
            "poll ended"
        );
        Ok(poll.snapshot())
    }

    pub async fn snapshot(&self, poll_id: &PollId) -> Result<PollSnapshot, PollError> {
        self.store
            .find(poll_id)
            .await?
            .map(|poll| poll.snapshot())
            .ok_or_else(|| PollError::NotFound(poll_id.clone()))
    }
}
