//! Handlers for the integration actions attached to poll buttons.

use serde::Deserialize;
use tracing::info;

use pollbot_core::domain::action::ActionContext;
use pollbot_core::errors::{Disposition, PollError};

use crate::attachments::{self, ActionResponse};
use crate::commands::{PollService, RouteError};

/// Body Mattermost posts when a user clicks a poll button.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ActionPayload {
    pub user_id: String,
    pub context: ActionContext,
}

pub struct ActionRouter<S> {
    service: S,
}

impl<S> ActionRouter<S>
where
    S: PollService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn vote(
        &self,
        payload: ActionPayload,
        base_url: &str,
    ) -> Result<ActionResponse, RouteError> {
        let poll_id = payload.context.poll_id();
        let Some(option) = payload.context.option_index() else {
            info!(
                event_name = "mattermost.action.invalid",
                poll_id = %poll_id,
                user_id = %payload.user_id,
                vote = ?payload.context.vote,
                "vote context carries no usable option"
            );
            return Ok(ActionResponse::notice(PollError::NotFound(poll_id).user_message()));
        };

        match self.service.cast_vote(&poll_id, &payload.user_id, option).await {
            Ok(outcome) => Ok(ActionResponse::update(
                attachments::poll_message(&outcome.snapshot, base_url),
                Some(attachments::vote_feedback(&outcome)),
            )),
            Err(error) => notice_or_failure(error),
        }
    }

    /// A stray `vote` in the end context is ignored.
    pub async fn end(&self, payload: ActionPayload) -> Result<ActionResponse, RouteError> {
        let poll_id = payload.context.poll_id();
        match self.service.end_poll(&poll_id, &payload.user_id).await {
            Ok(snapshot) => {
                Ok(ActionResponse::update(attachments::ended_poll_message(&snapshot), None))
            }
            Err(error) => notice_or_failure(error),
        }
    }
}

fn notice_or_failure(error: PollError) -> Result<ActionResponse, RouteError> {
    match error.disposition() {
        Disposition::Failure => Err(RouteError::Service(error)),
        Disposition::CorrectiveReply | Disposition::PrivateNotice => {
            Ok(ActionResponse::notice(error.user_message()))
        }
    }
}
