use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{PollError, ValidationError};

pub const MIN_OPTIONS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollId(pub String);

impl PollId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Upper bound on distinct options a single voter may hold at once.
    pub max_votes: u32,
    /// Show running counts on the vote buttons while the poll is open.
    pub show_progress: bool,
    /// List voter identities per option in the final tally.
    pub public_voters: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { max_votes: 1, show_progress: true, public_voters: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDefinition {
    pub message: String,
    pub options: Vec<String>,
    pub settings: PollSettings,
}

impl PollDefinition {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(ValidationError::TooFewOptions {
                count: self.options.len(),
                minimum: MIN_OPTIONS,
            });
        }
        if self.settings.max_votes == 0 {
            return Err(ValidationError::InvalidMaxVotes);
        }
        Ok(())
    }
}

/// What a single vote transition did to the voter's selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChange {
    Added { option: usize },
    Removed { option: usize },
    /// The voter was at `max_votes`; their oldest selection made room for the new one.
    Replaced { evicted: usize, added: usize },
}

/// Persisted poll state.
///
/// `voters` is the source of truth: each voter maps to their selected option indices in the order
/// they were added. Option counts are always derived from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub message: String,
    pub options: Vec<String>,
    pub settings: PollSettings,
    pub creator: String,
    pub voters: BTreeMap<String, Vec<usize>>,
    pub closed: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Poll {
    pub fn open(
        id: PollId,
        definition: PollDefinition,
        creator: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        definition.validate()?;

        Ok(Self {
            id,
            message: definition.message.trim().to_owned(),
            options: definition.options,
            settings: definition.settings,
            creator: creator.into(),
            voters: BTreeMap::new(),
            closed: false,
            created_at: now,
            closed_at: None,
        })
    }

    pub fn apply_vote(&mut self, voter: &str, option: usize) -> Result<VoteChange, PollError> {
        if self.closed {
            return Err(PollError::Closed(self.id.clone()));
        }
        if option >= self.options.len() {
            return Err(PollError::InvalidOption {
                index: option,
                option_count: self.options.len(),
            });
        }

        let max_votes = self.settings.max_votes.max(1) as usize;
        let selection = self.voters.entry(voter.to_owned()).or_default();

        let change = if let Some(position) = selection.iter().position(|&held| held == option) {
            selection.remove(position);
            VoteChange::Removed { option }
        } else if selection.len() < max_votes {
            selection.push(option);
            VoteChange::Added { option }
        } else {
            let evicted = selection.remove(0);
            selection.push(option);
            VoteChange::Replaced { evicted, added: option }
        };

        if selection.is_empty() {
            self.voters.remove(voter);
        }

        Ok(change)
    }

    /// Returns `true` when this call performed the open -> closed transition.
    pub fn close(&mut self, now: DateTime<Utc>) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.closed_at = Some(now);
        true
    }

    pub fn counts(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.options.len()];
        for selection in self.voters.values() {
            for &option in selection {
                if let Some(count) = counts.get_mut(option) {
                    *count += 1;
                }
            }
        }
        counts
    }

    pub fn selection_of(&self, voter: &str) -> &[usize] {
        self.voters.get(voter).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn voters_of(&self, option: usize) -> Vec<String> {
        self.voters
            .iter()
            .filter(|(_, selection)| selection.contains(&option))
            .map(|(voter, _)| voter.clone())
            .collect()
    }

    /// Checks the structural invariants a loaded record must satisfy.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.options.len() < MIN_OPTIONS {
            return Err(format!("poll {} has {} options", self.id, self.options.len()));
        }

        let max_votes = self.settings.max_votes.max(1) as usize;
        for (voter, selection) in &self.voters {
            if selection.is_empty() || selection.len() > max_votes {
                return Err(format!(
                    "voter {voter} holds {} selections in poll {} (max {max_votes})",
                    selection.len(),
                    self.id
                ));
            }
            if let Some(bad) = selection.iter().find(|&&option| option >= self.options.len()) {
                return Err(format!("voter {voter} selected missing option {bad}"));
            }
            let mut sorted = selection.clone();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != selection.len() {
                return Err(format!("voter {voter} selected an option twice"));
            }
        }

        Ok(())
    }

    pub fn snapshot(&self) -> PollSnapshot {
        let counts = self.counts();
        let options = self
            .options
            .iter()
            .zip(counts)
            .enumerate()
            .map(|(index, (label, votes))| PollOption {
                label: label.clone(),
                votes,
                voters: if self.settings.public_voters { self.voters_of(index) } else { Vec::new() },
            })
            .collect();

        PollSnapshot {
            id: self.id.clone(),
            message: self.message.clone(),
            creator: self.creator.clone(),
            options,
            settings: self.settings,
            voter_count: self.voters.len(),
            closed: self.closed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PollOption {
    pub label: String,
    pub votes: u32,
    /// Populated only for public polls.
    pub voters: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PollSnapshot {
    pub id: PollId,
    pub message: String,
    pub creator: String,
    pub options: Vec<PollOption>,
    pub settings: PollSettings,
    pub voter_count: usize,
    pub closed: bool,
}

impl PollSnapshot {
    pub fn counts(&self) -> Vec<u32> {
        self.options.iter().map(|option| option.votes).collect()
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|option| option.votes).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteOutcome {
    pub snapshot: PollSnapshot,
    pub change: VoteChange,
    /// The acting voter's selection after the transition, oldest first.
    pub selection: Vec<usize>,
}
