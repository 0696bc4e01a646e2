/*!
 * Errors that can be returned by the store, the game engine and the discord glue
 */

use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Db(diesel::result::Error),
    Connection(diesel::ConnectionError),
    Migration(Box<dyn StdError + Send + Sync>),
    Serenity(serenity::Error),
    /// A discord snowflake stored as text that is not a non-zero integer
    InvalidId(String),
    /// An emoji that is neither unicode nor a `<:name:id>` custom emoji
    InvalidEmoji(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::InvalidId(id) => write!(f, "invalid discord id {id:?}"),
            Self::InvalidEmoji(emoji) => write!(f, "invalid emoji {emoji:?}"),
            _ => match self.source() {
                Some(error) => write!(f, "{}", error),
                None => Ok(()),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Db(e) => Some(e),
            Self::Connection(e) => Some(e),
            Self::Migration(e) => Some(e.as_ref()),
            Self::Serenity(e) => Some(e),
            Self::InvalidId(_) | Self::InvalidEmoji(_) => None,
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Error {
        Error::Db(e)
    }
}

impl From<diesel::ConnectionError> for Error {
    fn from(e: diesel::ConnectionError) -> Error {
        Error::Connection(e)
    }
}

impl From<serenity::Error> for Error {
    fn from(e: serenity::Error) -> Error {
        Error::Serenity(e)
    }
}

impl Error {
    /// Whether this is the storage layer rejecting a duplicate row
    pub fn is_unique_violation(&self) -> bool {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        matches!(self, Self::Db(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)))
    }
}

/// Failures here are never shown to players: they are logged and the current operation is
/// abandoned.
pub trait LogResultExt<T> {
    fn log_err(self, what: &str) -> Option<T>;
}

impl<T, E: Display> LogResultExt<T> for std::result::Result<T, E> {
    fn log_err(self, what: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                error!("{what} failed: {e}");
                None
            }
        }
    }
}
