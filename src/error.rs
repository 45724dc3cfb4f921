// src/error.rs
use thiserror::Error;

use crate::text_record::TextEncoding;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("language code is {len} bytes, the status byte holds at most 63")]
    LanguageCodeTooLong { len: usize },

    #[error("language code is not ASCII")]
    InvalidLanguageCode,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodingError {
    #[error("text record payload is empty")]
    EmptyPayload,

    #[error("language code claims {declared} bytes but only {available} follow the status byte")]
    Truncated { declared: usize, available: usize },

    #[error("text is not valid {0}")]
    InvalidTextEncoding(TextEncoding),

    #[error("language code is not ASCII")]
    InvalidLanguageCode,
}

/// Why a write attempt ended without putting the message on the tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("no tag present")]
    NoTagPresent,

    #[error("tag is read-only")]
    RejectedReadOnly,

    #[error("tag does not support NDEF")]
    RejectedIncompatible,

    #[error("tag was removed during the operation")]
    TagLost,

    #[error("NDEF formatter is no longer available on this tag")]
    FormatterUnavailable,

    #[error("tag I/O failed: {0}")]
    IoFailure(String),
}

/// Faults raised by a tag technology while talking to the physical tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagIoError {
    #[error("tag lost")]
    TagLost,

    #[error("{0}")]
    Io(String),
}

impl From<TagIoError> for WriteError {
    fn from(err: TagIoError) -> Self {
        match err {
            TagIoError::TagLost => WriteError::TagLost,
            TagIoError::Io(detail) => WriteError::IoFailure(detail),
        }
    }
}

impl From<NdefError> for TagIoError {
    fn from(err: NdefError) -> Self {
        TagIoError::Io(err.to_string())
    }
}

impl From<pcsc::Error> for TagIoError {
    fn from(err: pcsc::Error) -> Self {
        match err {
            pcsc::Error::RemovedCard | pcsc::Error::ResetCard | pcsc::Error::NoSmartcard => {
                TagIoError::TagLost
            }
            other => TagIoError::Io(other.to_string()),
        }
    }
}

/// Malformed NDEF framing found on the read path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NdefError {
    #[error("no NDEF TLV found")]
    MissingTlv,

    #[error("NDEF message is empty")]
    EmptyMessage,

    #[error("NDEF record is truncated")]
    TruncatedRecord,

    #[error("first record is not a well-known text record")]
    NotTextRecord,

    #[error("NDEF message of {len} bytes does not fit a TLV")]
    MessageTooLong { len: usize },

    #[error(transparent)]
    Text(#[from] DecodingError),
}

/// Why a tag presented on the read path yielded no text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error(transparent)]
    Tag(#[from] TagIoError),

    #[error(transparent)]
    Ndef(#[from] NdefError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,
}
