use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Already joined on this connection")]
    DuplicateBinding,
    #[error("Join the chat before sending messages")]
    Unauthenticated,
    #[error("Message content is empty")]
    EmptyContent,
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Unknown user: {0}")]
    UnknownUser(String),
    #[error("Username does not match the logged in user")]
    IdentityMismatch,
    #[error("Invalid message format: {0}")]
    Malformed(String),
    #[error("Connection is closed")]
    Closed,
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}
