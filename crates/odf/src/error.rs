//! Error taxonomy of the execution core.

use thiserror::Error;

use crate::process::ActorId;
use crate::receiver::ReceiverId;
use crate::time::Time;

/// Errors raised by receivers, time keepers, branches and the director.
///
/// [`Error::Terminated`] is the cooperative shutdown signal: it is returned
/// from every blocking point once a finish request was observed and travels
/// up an actor's call stack to end its thread. It is the only error expected
/// during a normal wind-down.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("process terminated")]
    Terminated,
    #[error("no token available")]
    NoTokenAvailable,
    #[error("no room available")]
    NoRoomAvailable,
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("time stamp {time} on receiver {receiver} precedes {last}")]
    TimeRegression {
        receiver: ReceiverId,
        time: Time,
        last: Time,
    },
    #[error("invalid time stamp {0}")]
    InvalidTime(f64),
    #[error("actor {0} is not part of the network")]
    UnknownActor(ActorId),
    #[error("unbalanced blocks at wrapup: {read} read, {write} write")]
    UnbalancedBlocks { read: usize, write: usize },
    #[error("failed to spawn thread: {0}")]
    Spawn(String),
}

impl Error {
    /// Returns true for the cooperative shutdown signal.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
