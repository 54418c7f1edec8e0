use thiserror::Error;

use crate::domain::poll::PollId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("poll message is empty")]
    EmptyMessage,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a poll needs at least {minimum} options, got {count}")]
    TooFewOptions { count: usize, minimum: usize },
    #[error("poll message must not be empty")]
    EmptyMessage,
    #[error("max votes must be at least 1")]
    InvalidMaxVotes,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("poll store unavailable: {0}")]
    Unavailable(String),
    #[error("stored poll is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("poll `{0}` not found")]
    NotFound(PollId),
    #[error("poll `{0}` is closed")]
    Closed(PollId),
    #[error("option {index} does not exist (poll has {option_count} options)")]
    InvalidOption { index: usize, option_count: usize },
    #[error("poll store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for PollError {
    fn from(value: StoreError) -> Self {
        Self::StoreUnavailable(value.to_string())
    }
}

/// How an error reaches people.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Shown to the command issuer with a hint on how to fix the command.
    CorrectiveReply,
    /// Shown only to the acting voter; the channel sees nothing and no state changes.
    PrivateNotice,
    /// The request failed and must not be reported as applied.
    Failure,
}

impl ParseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyMessage => {
                "Please provide a poll message before the first `--` option."
            }
        }
    }
}

impl PollError {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Validation(_) => Disposition::CorrectiveReply,
            Self::NotFound(_) | Self::Closed(_) | Self::InvalidOption { .. } => {
                Disposition::PrivateNotice
            }
            Self::StoreUnavailable(_) => Disposition::Failure,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::TooFewOptions { minimum, .. }) => {
                format!("A poll needs at least {minimum} options.")
            }
            Self::Validation(ValidationError::EmptyMessage) => {
                ParseError::EmptyMessage.user_message().to_owned()
            }
            Self::Validation(ValidationError::InvalidMaxVotes) => {
                "The number of votes per user must be at least 1.".to_owned()
            }
            Self::NotFound(_) | Self::InvalidOption { .. } => {
                "This poll is not valid anymore.\nSorry.".to_owned()
            }
            Self::Closed(_) => "This poll is closed.".to_owned(),
            Self::StoreUnavailable(_) => {
                "The service is temporarily unavailable. Please retry shortly.".to_owned()
            }
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self.disposition() {
            Disposition::Failure => {
                InterfaceError::ServiceUnavailable { message: self.to_string(), correlation_id }
            }
            Disposition::CorrectiveReply | Disposition::PrivateNotice => {
                InterfaceError::BadRequest { message: self.to_string(), correlation_id }
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}
