// ABOUTME: Result of running a command handler
// ABOUTME: Reply, deliberate silence, or a user-facing error; system errors travel as anyhow::Error

use crate::message::Message;
use crate::reply::Reply;
use thiserror::Error;

/// Failure caused by the person invoking the command. Shown to them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("missing arguments")]
    MissingArgs,

    #[error("could not find that")]
    NotFound,

    #[error("that is not supported")]
    Unsupported,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(Reply),
    /// Handled, nothing to send
    Silent,
    UserError {
        error: UserError,
        /// Sent instead of the error text when present
        reply: Option<Reply>,
    },
}

impl Outcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply(Reply::text(text))
    }

    pub fn user_error(error: UserError) -> Self {
        Self::UserError { error, reply: None }
    }

    /// Shorthand for `UserError::Message`
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::user_error(UserError::Message(text.into()))
    }

    /// The usage reply for the matched command, flagged as missing arguments
    pub fn missing_args(msg: &Message) -> Self {
        Self::UserError {
            error: UserError::MissingArgs,
            reply: Some(Reply::usage(&msg.usage())),
        }
    }
}

impl From<Reply> for Outcome {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

impl From<UserError> for Outcome {
    fn from(error: UserError) -> Self {
        Self::user_error(error)
    }
}
