//! Slash-command text -> poll definition.
//!
//! `Lunch? --Pizza --Sushi --votes=2 --public`: everything before the first `--` is the
//! message, every following segment is a flag. Unrecognized flags are option labels and may
//! contain spaces.

use crate::domain::poll::{PollDefinition, PollSettings};
use crate::errors::ParseError;

pub const FLAG_MARKER: &str = "--";
pub const DEFAULT_OPTIONS: [&str; 2] = ["Yes", "No"];
pub const HELP_VERB: &str = "help";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedCommand {
    /// No text at all; the caller answers with usage instead of creating a poll.
    NoCommand,
    Help,
    Poll(PollDefinition),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Flag<'a> {
    Votes(Option<u32>),
    NoProgress,
    Public,
    Option(&'a str),
}

pub fn parse(raw: &str) -> Result<ParsedCommand, ParseError> {
    parse_with_default_votes(raw, PollSettings::default().max_votes)
}

pub fn parse_with_default_votes(
    raw: &str,
    default_max_votes: u32,
) -> Result<ParsedCommand, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(ParsedCommand::NoCommand);
    }
    if trimmed.eq_ignore_ascii_case(HELP_VERB) {
        return Ok(ParsedCommand::Help);
    }

    let mut segments = trimmed.split(FLAG_MARKER);
    let message = segments.next().unwrap_or_default().trim();

    let default_max_votes = default_max_votes.max(1);
    let mut settings = PollSettings { max_votes: default_max_votes, ..PollSettings::default() };
    let mut options = Vec::new();

    for flag in segments.map(str::trim).filter(|segment| !segment.is_empty()).map(classify_flag) {
        match flag {
            Flag::Votes(max_votes) => settings.max_votes = max_votes.unwrap_or(default_max_votes),
            Flag::NoProgress => settings.show_progress = false,
            Flag::Public => settings.public_voters = true,
            Flag::Option(label) => options.push(label.to_owned()),
        }
    }

    if message.is_empty() {
        return Err(ParseError::EmptyMessage);
    }

    if options.is_empty() {
        options = DEFAULT_OPTIONS.iter().map(|label| (*label).to_owned()).collect();
    }

    Ok(ParsedCommand::Poll(PollDefinition { message: message.to_owned(), options, settings }))
}

fn classify_flag(segment: &str) -> Flag<'_> {
    let (key, value) = match segment.split_once('=') {
        Some((key, value)) => (key.trim(), Some(value.trim())),
        None => (segment, None),
    };

    match key.to_ascii_lowercase().as_str() {
        "votes" => Flag::Votes(value.and_then(parse_max_votes)),
        "noprogress" if value.is_none() => Flag::NoProgress,
        "public" if value.is_none() => Flag::Public,
        _ => Flag::Option(segment),
    }
}

fn parse_max_votes(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|votes| *votes >= 1)
}
