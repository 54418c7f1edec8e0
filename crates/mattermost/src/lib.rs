//! Mattermost integration for pollbot.
//!
//! - **Slash commands** (`commands`) - `/poll <message> --<option> ...` creates a poll
//! - **Actions** (`actions`) - vote and end buttons posted back by the chat client
//! - **Attachments** (`attachments`) - message attachment and action JSON builders
//! - **Auth** (`auth`) - slash-command token policy
//!
//! # Architecture
//!
//! ```text
//! Mattermost -> HTTP server -> CommandRouter / ActionRouter -> PollService (PollEngine)
//!                                      |
//!                             attachments <- Response
//! ```
//!
//! The routers never talk HTTP. They return a rendered body or a [`commands::RouteError`] the
//! transport turns into a failed request.

pub mod actions;
pub mod attachments;
pub mod auth;
pub mod commands;

pub use actions::{ActionPayload, ActionRouter};
pub use attachments::{ActionResponse, CommandResponse};
pub use auth::TokenPolicy;
pub use commands::{CommandRouter, PollService, RouteError, SlashCommandForm, SlashCommandPayload};
