// src/nfc_service.rs
use std::ffi::{CStr, CString};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};
use pcsc::{Context, Disposition, PNP_NOTIFICATION, ReaderState, Scope, State};

use crate::config::ServiceConfig;
use crate::error::{ReadError, TagIoError, WriteError};
use crate::ndef::{self, NdefMessage};
use crate::orchestrator::{self, WriteOutcome};
use crate::pcsc_tag::{self, PcscTag};
use crate::tag::Tag;
use crate::text_record::{self, LocalizedText};
use crate::types::{NfcCommand, OutgoingMessage};

pub fn run(config: ServiceConfig, tx: Sender<OutgoingMessage>, rx: Receiver<NfcCommand>) {
    info!("Starting NFC Service (Event Driven)...");

    let ctx = match Context::establish(Scope::User) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Failed to establish context: {}", err);
            let _ = tx.send(OutgoingMessage::ReaderError {
                error: err.to_string(),
            });
            return;
        }
    };

    let mut readers_buf = [0; 2048];
    let mut reader_states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];
    let mut pending = PendingWrite::default();

    loop {
        // 1. Wait for State Change
        if let Err(err) = ctx.get_status_change(config.poll_interval(), &mut reader_states) {
            if err != pcsc::Error::Timeout {
                error!("PCSC Error: {}", err);
                std::thread::sleep(Duration::from_secs(1));
                continue;
            }
        }

        // 2. CHECK FOR COMMANDS
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                NfcCommand::Write {
                    text,
                    language,
                    encoding,
                } => {
                    let language = language.unwrap_or_else(|| config.default_language.clone());
                    let encoding = encoding.unwrap_or(config.default_encoding);
                    let message = match text_record::encode_text(&language, &text, encoding) {
                        Ok(payload) => NdefMessage::text(payload),
                        Err(err) => {
                            let _ = tx.send(OutgoingMessage::DataWriteError {
                                outcome: "INVALID_INPUT".into(),
                                error: err.to_string(),
                            });
                            continue;
                        }
                    };

                    // a card already on the reader was read when it arrived
                    if pending.arm(message) {
                        info!("Replaced pending write");
                    }
                    info!("Write armed for the next presentation");
                    let _ = tx.send(OutgoingMessage::WriteArmed {
                        message: "Present a tag to write".into(),
                    });
                }
                NfcCommand::CancelWrite => {
                    if pending.cancel() {
                        info!("Pending write cancelled");
                    }
                }
                NfcCommand::CheckReaderStatus => {
                    // watched states stay as they are so present cards are not re-read
                    let has_readers = match ctx.list_readers(&mut readers_buf) {
                        Ok(mut names) => names.next().is_some(),
                        Err(_) => false,
                    };
                    let _ = tx.send(OutgoingMessage::ReaderStatus {
                        success: has_readers,
                    });
                }
            }
        }

        // 3. PROCESS EVENTS
        let mut readers_changed = false;

        // Check PnP (Index 0)
        if reader_states[0].event_state().intersects(State::CHANGED) {
            info!("Hardware change detected");
            readers_changed = true;
            reader_states[0].sync_current_state();
        }

        // Check Readers (Indices 1..)
        for rs in reader_states.iter_mut().skip(1) {
            if !rs.event_state().intersects(State::CHANGED) {
                continue;
            }
            let name = rs.name().to_owned();
            let current = rs.event_state();

            // Card Inserted: one write or one read, never both
            if current.intersects(State::PRESENT) && !rs.current_state().intersects(State::PRESENT)
            {
                info!("Card Inserted on {:?}", name);
                let _ = tx.send(OutgoingMessage::CardStatus {
                    success: true,
                    message: "Card detected!".into(),
                });
                match pending.serve() {
                    Presentation::Write(message) => handle_write(&ctx, &name, &message, &tx),
                    Presentation::Read => handle_read(&ctx, &name, &tx),
                }
            }

            // Card Removed
            if current.intersects(State::EMPTY) && rs.current_state().intersects(State::PRESENT) {
                info!("Card Removed from {:?}", name);
                let _ = tx.send(OutgoingMessage::CardStatus {
                    success: false,
                    message: "Card removed!".into(),
                });
            }

            rs.sync_current_state();
        }

        // 4. REFRESH LIST
        if readers_changed {
            let has_readers = refresh_readers(&ctx, &mut readers_buf, &mut reader_states);
            let _ = tx.send(OutgoingMessage::ReaderStatus {
                success: has_readers,
            });
        }
    }
}

/// Rebuilds the watched reader list, keeping the PnP entry at index 0.
fn refresh_readers(
    ctx: &Context,
    readers_buf: &mut [u8],
    reader_states: &mut Vec<ReaderState>,
) -> bool {
    reader_states.truncate(1);
    match ctx.list_readers(readers_buf) {
        Ok(names) => {
            for name in names {
                reader_states.push(ReaderState::new(CString::from(name), State::UNAWARE));
            }
        }
        Err(err) => warn!("Failed to list readers: {}", err),
    }
    reader_states.len() > 1
}

/// What one card presentation is used for.
#[derive(Debug, PartialEq, Eq)]
enum Presentation {
    Write(NdefMessage),
    Read,
}

/// Write request waiting for the next card presentation.
#[derive(Debug, Default)]
struct PendingWrite(Option<NdefMessage>);

impl PendingWrite {
    /// Returns true if an earlier request was replaced.
    fn arm(&mut self, message: NdefMessage) -> bool {
        self.0.replace(message).is_some()
    }

    fn cancel(&mut self) -> bool {
        self.0.take().is_some()
    }

    /// Consumes the pending write, if any, for a newly inserted card.
    fn serve(&mut self) -> Presentation {
        match self.0.take() {
            Some(message) => Presentation::Write(message),
            None => Presentation::Read,
        }
    }
}

fn handle_write(ctx: &Context, reader: &CStr, message: &NdefMessage, tx: &Sender<OutgoingMessage>) {
    let outcome = match PcscTag::discover(ctx, reader) {
        Ok(mut tag) => orchestrator::write(Some(&mut tag as &mut dyn Tag), message),
        // card left the field before it could be inspected
        Err(TagIoError::TagLost) => orchestrator::write(None, message),
        Err(err) => WriteOutcome::Failed(WriteError::from(err)),
    };

    let reply = if outcome.is_success() {
        OutgoingMessage::DataWriteSuccess {
            outcome: outcome.code().into(),
            message: outcome.message(),
        }
    } else {
        OutgoingMessage::DataWriteError {
            outcome: outcome.code().into(),
            error: outcome.message(),
        }
    };
    let _ = tx.send(reply);
}

fn handle_read(ctx: &Context, reader: &CStr, tx: &Sender<OutgoingMessage>) {
    let reply = match read_text(ctx, reader) {
        Ok(text) => OutgoingMessage::DataReadSuccess {
            data: text.text,
            language: text.language_code,
            encoding: text.encoding,
        },
        Err(err) => {
            warn!("Read failed: {}", err);
            OutgoingMessage::DataReadError {
                error: read_error_message(&err),
            }
        }
    };
    let _ = tx.send(reply);
}

fn read_text(ctx: &Context, reader: &CStr) -> Result<LocalizedText, ReadError> {
    let card = pcsc_tag::connect(ctx, reader)?;
    let family = pcsc_tag::card_family(&card)?;
    let area = pcsc_tag::read_data_area(&card, family);
    if let Err((_, err)) = card.disconnect(Disposition::LeaveCard) {
        warn!("Failed to release card: {}", err);
    }

    let area = area?;
    let message = ndef::unwrap_tlv(&area)?;
    Ok(ndef::decode_text_message(message)?)
}

fn read_error_message(err: &ReadError) -> String {
    use crate::error::NdefError;

    match err {
        ReadError::Tag(TagIoError::TagLost) => "Card removed during read".into(),
        ReadError::Tag(err) => err.to_string(),
        ReadError::Ndef(NdefError::MissingTlv | NdefError::EmptyMessage) => {
            "No NDEF messages found".into()
        }
        ReadError::Ndef(NdefError::NotTextRecord) => "First NDEF record is not text".into(),
        ReadError::Ndef(err) => format!("Empty/Non-NDEF: {}", err),
    }
}
