// src/types.rs
use serde::{Deserialize, Serialize};

use crate::text_record::TextEncoding;

// Messages sent TO the WebSocket client (Frontend)
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    ReaderStatus {
        success: bool,
    },
    CardStatus {
        success: bool,
        message: String,
    },
    DataReadSuccess {
        data: String,
        language: String,
        encoding: TextEncoding,
    },
    DataReadError {
        error: String,
    },
    DataWriteSuccess {
        outcome: String,
        message: String,
    },
    DataWriteError {
        outcome: String,
        error: String,
    },
    /// No card present; the next one presented will be written.
    WriteArmed {
        message: String,
    },
    ReaderError {
        error: String,
    },
}

// Messages received FROM the WebSocket client
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    GetReaderStatus,
    WriteText {
        text: String,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        encoding: Option<TextEncoding>,
    },
    CancelWrite,
}

// Internal commands sent from WS Server -> NFC Thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcCommand {
    Write {
        text: String,
        language: Option<String>,
        encoding: Option<TextEncoding>,
    },
    CancelWrite,
    CheckReaderStatus,
}

impl From<IncomingMessage> for NfcCommand {
    fn from(msg: IncomingMessage) -> Self {
        match msg {
            IncomingMessage::GetReaderStatus => NfcCommand::CheckReaderStatus,
            IncomingMessage::WriteText {
                text,
                language,
                encoding,
            } => NfcCommand::Write {
                text,
                language,
                encoding,
            },
            IncomingMessage::CancelWrite => NfcCommand::CancelWrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outgoing_messages_keep_wire_names() {
        let msg = OutgoingMessage::ReaderStatus { success: true };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "READER_STATUS", "success": true })
        );

        let msg = OutgoingMessage::DataReadSuccess {
            data: "hello".into(),
            language: "en".into(),
            encoding: TextEncoding::Utf16,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "DATA_READ_SUCCESS",
                "data": "hello",
                "language": "en",
                "encoding": "utf16"
            })
        );
    }

    #[test]
    fn write_text_with_defaults() {
        let parsed: IncomingMessage =
            serde_json::from_str(r#"{"type":"WRITE_TEXT","text":"user-42"}"#).unwrap();
        assert_eq!(
            NfcCommand::from(parsed),
            NfcCommand::Write {
                text: "user-42".into(),
                language: None,
                encoding: None,
            }
        );
    }

    #[test]
    fn write_text_with_language_and_encoding() {
        let parsed: IncomingMessage = serde_json::from_str(
            r#"{"type":"WRITE_TEXT","text":"ciao","language":"it","encoding":"utf16"}"#,
        )
        .unwrap();
        assert_eq!(
            parsed,
            IncomingMessage::WriteText {
                text: "ciao".into(),
                language: Some("it".into()),
                encoding: Some(TextEncoding::Utf16),
            }
        );
    }

    #[test]
    fn status_and_cancel_commands() {
        let status: IncomingMessage =
            serde_json::from_str(r#"{"type":"GET_READER_STATUS"}"#).unwrap();
        assert_eq!(NfcCommand::from(status), NfcCommand::CheckReaderStatus);
        let cancel: IncomingMessage = serde_json::from_str(r#"{"type":"CANCEL_WRITE"}"#).unwrap();
        assert_eq!(NfcCommand::from(cancel), NfcCommand::CancelWrite);
    }
}
