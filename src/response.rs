use std::fmt;

use crate::data::Data;

/// Outcome of one request, as classified by the client that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    /// No reply within the response timeout.
    Timeout,
    /// The frame could not be translated at all.
    Error,
    /// Translated, but malformed (undecodable content, incomplete block).
    InvalidMessage,
    /// Ciphered, but could not be opened with the configured keys.
    InvalidKeys,
    /// The remote side answered with a DLMS error.
    MessageIsAnError,
}

impl ErrorCode {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "RES_OK",
            ErrorCode::Timeout => "RES_TIMEOUT",
            ErrorCode::Error => "RES_ERROR",
            ErrorCode::InvalidMessage => "RES_INVALID_MESSAGE",
            ErrorCode::InvalidKeys => "RES_INVALID_KEYS",
            ErrorCode::MessageIsAnError => "RES_MESSAGE_IS_AN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub error_code: ErrorCode,
    pub xml: Option<String>,
    /// Raw wrapper frame received.
    pub payload: Option<Vec<u8>>,
    pub value: Option<Data>,
}

impl Response {
    pub fn new(
        error_code: ErrorCode,
        xml: Option<String>,
        payload: Option<Vec<u8>>,
        value: Option<Data>,
    ) -> Self {
        Self { error_code, xml, payload, value }
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, None, None, None)
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == ErrorCode::Ok
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_code)?;
        if let Some(value) = &self.value {
            write!(f, " {value:?}")?;
        }
        if let Some(payload) = &self.payload {
            write!(f, " ({})", hex::encode(payload))?;
        }
        Ok(())
    }
}
