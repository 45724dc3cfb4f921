//! NFC text tags: NDEF Text RTD codec, tag write orchestration, and a
//! PC/SC + WebSocket service that reads and writes them.

pub mod apdu;
pub mod cards;
pub mod config;
pub mod error;
pub mod ndef;
pub mod nfc_service;
pub mod orchestrator;
pub mod pcsc_tag;
pub mod tag;
pub mod text_record;
pub mod types;
pub mod ws;

pub use error::{DecodingError, EncodingError, WriteError};
pub use orchestrator::{TagWriteOrchestrator, WriteOutcome};
pub use tag::{Tag, TagCapability};
pub use text_record::{LocalizedText, TextEncoding, TextRecordPayload};
