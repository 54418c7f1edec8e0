pub mod command;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod store;

pub use command::{parse, parse_with_default_votes, ParsedCommand};
pub use domain::action::ActionContext;
pub use domain::poll::{
    Poll, PollDefinition, PollId, PollOption, PollSettings, PollSnapshot, VoteChange, VoteOutcome,
};
pub use engine::PollEngine;
pub use errors::{Disposition, InterfaceError, ParseError, PollError, StoreError, ValidationError};
pub use store::{PollMutation, PollStore};
