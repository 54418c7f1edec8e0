use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use pollbot_core::command::{parse_with_default_votes, ParsedCommand};
use pollbot_core::domain::poll::{PollDefinition, PollId, PollSettings, PollSnapshot, VoteOutcome};
use pollbot_core::errors::{Disposition, PollError};
use pollbot_core::PollEngine;

use crate::attachments::{self, CommandResponse, DEFAULT_COMMAND};
use crate::auth::TokenPolicy;

/// Form fields Mattermost posts for a slash command. Everything is optional on the wire.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SlashCommandForm {
    pub command: Option<String>,
    pub text: Option<String>,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("slash command request is missing `{0}`")]
    MissingField(&'static str),
}

impl TryFrom<SlashCommandForm> for SlashCommandPayload {
    type Error = CommandParseError;

    fn try_from(form: SlashCommandForm) -> Result<Self, Self::Error> {
        let user_id = form
            .user_id
            .filter(|user_id| !user_id.trim().is_empty())
            .ok_or(CommandParseError::MissingField("user_id"))?;
        let text = form.text.ok_or(CommandParseError::MissingField("text"))?;
        let command = form
            .command
            .map(|command| command.trim().to_owned())
            .filter(|command| !command.is_empty())
            .unwrap_or_else(|| DEFAULT_COMMAND.to_owned());

        Ok(Self { command, text, user_id, channel_id: form.channel_id, token: form.token })
    }
}

/// Errors that must surface as a failed request instead of a chat reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error(transparent)]
    Service(PollError),
}

impl RouteError {
    pub fn into_poll_error(self) -> PollError {
        match self {
            Self::Service(error) => error,
        }
    }
}

/// The poll operations the chat handlers need.
#[async_trait]
pub trait PollService: Send + Sync {
    async fn create_poll(
        &self,
        definition: PollDefinition,
        creator: &str,
    ) -> Result<PollSnapshot, PollError>;

    async fn cast_vote(
        &self,
        poll_id: &PollId,
        voter: &str,
        option: usize,
    ) -> Result<VoteOutcome, PollError>;

    async fn end_poll(&self, poll_id: &PollId, caller: &str) -> Result<PollSnapshot, PollError>;
}

#[async_trait]
impl PollService for PollEngine {
    async fn create_poll(
        &self,
        definition: PollDefinition,
        creator: &str,
    ) -> Result<PollSnapshot, PollError> {
        self.create(definition, creator).await
    }

    async fn cast_vote(
        &self,
        poll_id: &PollId,
        voter: &str,
        option: usize,
    ) -> Result<VoteOutcome, PollError> {
        self.vote(poll_id, voter, option).await
    }

    async fn end_poll(&self, poll_id: &PollId, caller: &str) -> Result<PollSnapshot, PollError> {
        self.end(poll_id, caller).await
    }
}

pub struct CommandRouter<S> {
    service: S,
    default_max_votes: u32,
}

impl<S> CommandRouter<S>
where
    S: PollService,
{
    pub fn new(service: S) -> Self {
        Self { service, default_max_votes: PollSettings::default().max_votes }
    }

    pub fn with_default_max_votes(mut self, default_max_votes: u32) -> Self {
        self.default_max_votes = default_max_votes.max(1);
        self
    }

    pub async fn route(
        &self,
        payload: SlashCommandPayload,
        policy: &TokenPolicy,
        base_url: &str,
    ) -> Result<CommandResponse, RouteError> {
        if !policy.permits(payload.token.as_deref()) {
            warn!(
                event_name = "mattermost.command.rejected",
                user_id = %payload.user_id,
                command = %payload.command,
                "slash command token not accepted"
            );
            return Ok(attachments::invalid_token_message());
        }

        let definition = match parse_with_default_votes(&payload.text, self.default_max_votes) {
            Ok(ParsedCommand::NoCommand) | Ok(ParsedCommand::Help) => {
                return Ok(attachments::usage_message(&payload.command));
            }
            Ok(ParsedCommand::Poll(definition)) => definition,
            Err(error) => {
                info!(
                    event_name = "mattermost.command.invalid",
                    user_id = %payload.user_id,
                    error = %error,
                    "slash command text rejected"
                );
                return Ok(attachments::error_reply(error.user_message(), &payload.command));
            }
        };

        match self.service.create_poll(definition, &payload.user_id).await {
            Ok(snapshot) => {
                info!(
                    event_name = "mattermost.command.poll_posted",
                    poll_id = %snapshot.id,
                    user_id = %payload.user_id,
                    channel_id = payload.channel_id.as_deref().unwrap_or("<unknown>"),
                    "poll posted to channel"
                );
                Ok(attachments::poll_message(&snapshot, base_url))
            }
            Err(error) if error.disposition() == Disposition::Failure => {
                Err(RouteError::Service(error))
            }
            Err(error) => Ok(attachments::error_reply(&error.user_message(), &payload.command)),
        }
    }
}
