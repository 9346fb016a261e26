//! Tokens exchanged between processes.

use crate::time::Time;

/// A value travelling through a receiver.
///
/// The payload is opaque to the execution core. [`Token::Null`] carries no
/// payload; it only moves the consumer's notion of time forward.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<T> {
    Data(T),
    Null,
}

impl<T> Token<T> {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Token::Null)
    }

    /// Returns the payload, dropping null tokens.
    pub fn into_data(self) -> Option<T> {
        match self {
            Token::Data(value) => Some(value),
            Token::Null => None,
        }
    }

    pub fn as_data(&self) -> Option<&T> {
        match self {
            Token::Data(value) => Some(value),
            Token::Null => None,
        }
    }
}

impl<T> From<T> for Token<T> {
    fn from(value: T) -> Self {
        Token::Data(value)
    }
}

/// A token paired with its time stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedToken<T> {
    pub token: Token<T>,
    pub time: Time,
}

impl<T> TimedToken<T> {
    pub fn new(token: Token<T>, time: Time) -> Self {
        Self { token, time }
    }
}
