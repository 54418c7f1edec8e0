use serde::Serialize;

use pollbot_core::domain::action::ActionContext;
use pollbot_core::domain::poll::{PollSnapshot, VoteChange, VoteOutcome};

pub const VOTE_PATH: &str = "vote";
pub const END_PATH: &str = "end";
pub const END_ACTION_NAME: &str = "End Poll";
pub const VOTERS_FIELD_TITLE: &str = "Number of voters";
pub const DEFAULT_COMMAND: &str = "/poll";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Integration {
    pub url: String,
    pub context: ActionContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub integration: Integration,
}

impl Action {
    pub fn new(name: impl Into<String>, url: impl Into<String>, context: ActionContext) -> Self {
        Self { name: name.into(), integration: Integration { url: url.into(), context } }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    pub short: bool,
    pub title: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

/// Slash-command response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub response_type: ResponseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Update {
    pub props: CommandResponse,
}

/// Integration action response body. `update` replaces the original post; `ephemeral_text` is
/// shown only to the acting user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Update>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_text: Option<String>,
}

impl ActionResponse {
    pub fn update(props: CommandResponse, ephemeral_text: Option<String>) -> Self {
        Self { update: Some(Update { props }), ephemeral_text }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self { update: None, ephemeral_text: Some(text.into()) }
    }
}

pub struct MessageBuilder {
    response_type: ResponseType,
    text: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    pub fn in_channel() -> Self {
        Self { response_type: ResponseType::InChannel, text: None, attachments: Vec::new() }
    }

    pub fn ephemeral() -> Self {
        Self { response_type: ResponseType::Ephemeral, text: None, attachments: Vec::new() }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attachment<F>(mut self, text: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut AttachmentBuilder),
    {
        let mut builder = AttachmentBuilder::default();
        build(&mut builder);
        self.attachments.push(Attachment {
            text: text.into(),
            actions: builder.actions,
            fields: builder.fields,
        });
        self
    }

    pub fn build(self) -> CommandResponse {
        CommandResponse {
            response_type: self.response_type,
            text: self.text,
            attachments: self.attachments,
        }
    }
}

#[derive(Default)]
pub struct AttachmentBuilder {
    actions: Vec<Action>,
    fields: Vec<Field>,
}

impl AttachmentBuilder {
    pub fn action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn field(
        &mut self,
        title: impl Into<String>,
        value: impl Into<String>,
        short: bool,
    ) -> &mut Self {
        self.fields.push(Field { short, title: title.into(), value: value.into() });
        self
    }
}

/// Joins an action path onto the externally reachable base URL.
pub fn integration_url(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

fn vote_button_name(label: &str, votes: u32, show_progress: bool) -> String {
    if show_progress {
        format!("{label} ({votes})")
    } else {
        label.to_owned()
    }
}

/// The open poll: one vote button per option in option order, then the end button.
pub fn poll_message(snapshot: &PollSnapshot, base_url: &str) -> CommandResponse {
    let vote_url = integration_url(base_url, VOTE_PATH);
    let end_url = integration_url(base_url, END_PATH);

    MessageBuilder::in_channel()
        .attachment(snapshot.message.clone(), |attachment| {
            for (option, context) in snapshot.options.iter().zip(snapshot.vote_contexts()) {
                attachment.action(Action::new(
                    vote_button_name(&option.label, option.votes, snapshot.settings.show_progress),
                    vote_url.clone(),
                    context,
                ));
            }
            attachment.action(Action::new(END_ACTION_NAME, end_url, snapshot.end_context()));
        })
        .build()
}

fn percent(votes: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((u64::from(votes) * 100 + u64::from(total) / 2) / u64::from(total)) as u32
}

/// The final tally: one field per option, then the voter count. No actions remain.
pub fn ended_poll_message(snapshot: &PollSnapshot) -> CommandResponse {
    let total = snapshot.total_votes();

    MessageBuilder::in_channel()
        .attachment(snapshot.message.clone(), |attachment| {
            for option in &snapshot.options {
                let mut value = format!("{} ({}%)", option.votes, percent(option.votes, total));
                if snapshot.settings.public_voters && !option.voters.is_empty() {
                    value.push('\n');
                    value.push_str(&option.voters.join(", "));
                }
                attachment.field(option.label.clone(), value, false);
            }
            attachment.field(VOTERS_FIELD_TITLE, snapshot.voter_count.to_string(), true);
        })
        .build()
}

pub fn usage_text(command: &str) -> String {
    format!(
        "Create a poll the channel can vote on.\n\
         Usage: `{command} <message> --<option> --<option> ...`\n\
         Without options the poll offers `Yes` and `No`.\n\
         Flags:\n\
         - `--votes=N` lets everybody select up to N options (default 1)\n\
         - `--noprogress` hides the vote counts until the poll ends\n\
         - `--public` lists who voted for what when the poll ends\n\
         `{command} help` shows this text."
    )
}

pub fn usage_message(command: &str) -> CommandResponse {
    MessageBuilder::ephemeral().text(usage_text(command)).build()
}

pub fn error_reply(summary: &str, command: &str) -> CommandResponse {
    MessageBuilder::ephemeral()
        .text(format!("{summary}\nTry `{command} help` for the full syntax."))
        .build()
}

pub fn invalid_token_message() -> CommandResponse {
    MessageBuilder::ephemeral()
        .text("Invalid token. The slash command is not configured for this poll service.")
        .build()
}

/// What the voter sees privately after a vote is applied.
pub fn vote_feedback(outcome: &VoteOutcome) -> String {
    let label = |index: usize| {
        outcome.snapshot.options.get(index).map(|option| option.label.as_str()).unwrap_or("?")
    };
    let selected: Vec<&str> = outcome.selection.iter().map(|&index| label(index)).collect();

    let mut text = match outcome.change {
        VoteChange::Replaced { evicted, .. } => {
            format!("Your vote for {} was replaced. ", label(evicted))
        }
        VoteChange::Removed { option } => format!("Your vote for {} was removed. ", label(option)),
        VoteChange::Added { .. } => String::new(),
    };

    if selected.is_empty() {
        text.push_str("You have not selected any option.");
    } else {
        text.push_str(&format!("You voted for: {}.", selected.join(", ")));
    }

    let max_votes = outcome.snapshot.settings.max_votes;
    if max_votes > 1 {
        text.push_str(&format!(" You used {} of {max_votes} votes.", selected.len()));
    }
    text
}
