// src/orchestrator.rs
//! Single-pass write of an NDEF message to a discovered tag.
//!
//! ```text
//! Start -> Probing -> DirectWrite -> Done
//!                  -> Formatting  -> Done
//!                  -> Rejected
//! ```
//!
//! Each presentation of a tag gets exactly one outcome. Nothing is retried:
//! a tag removed and presented again has to be probed from scratch.

use log::{debug, info, warn};

use crate::error::WriteError;
use crate::ndef::NdefMessage;
use crate::tag::{Session, Tag, TagCapability};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Formatted,
    RejectedReadOnly,
    RejectedIncompatible,
    Failed(WriteError),
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Written | WriteOutcome::Formatted)
    }

    /// Stable identifier for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            WriteOutcome::Written => "WRITTEN",
            WriteOutcome::Formatted => "FORMATTED",
            WriteOutcome::RejectedReadOnly => "REJECTED_READ_ONLY",
            WriteOutcome::RejectedIncompatible => "REJECTED_INCOMPATIBLE",
            WriteOutcome::Failed(_) => "FAILED",
        }
    }

    /// User-facing text. Read-only and incompatible tags need different
    /// remedies, so they never share a message.
    pub fn message(&self) -> String {
        match self {
            WriteOutcome::Written => "Tag written".into(),
            WriteOutcome::Formatted => "Tag formatted and written".into(),
            WriteOutcome::RejectedReadOnly => {
                "Tag is read-only; unlock it or use another tag".into()
            }
            WriteOutcome::RejectedIncompatible => {
                "Tag is not NDEF compatible; use a different tag".into()
            }
            WriteOutcome::Failed(WriteError::NoTagPresent) => "No tag present".into(),
            WriteOutcome::Failed(WriteError::TagLost) => {
                "Tag was removed before the write finished; its content may be incomplete".into()
            }
            WriteOutcome::Failed(err) => format!("Write failed: {}", err),
        }
    }

    pub fn error(&self) -> Option<WriteError> {
        match self {
            WriteOutcome::Written | WriteOutcome::Formatted => None,
            WriteOutcome::RejectedReadOnly => Some(WriteError::RejectedReadOnly),
            WriteOutcome::RejectedIncompatible => Some(WriteError::RejectedIncompatible),
            WriteOutcome::Failed(err) => Some(err.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Start,
    Probing,
    DirectWrite,
    Formatting,
}

/// Result of one step: another state, or a terminal outcome.
#[derive(Debug)]
enum Transition {
    Next(State),
    Rejected(WriteOutcome),
    Done(WriteOutcome),
}

impl Transition {
    fn name(&self) -> String {
        match self {
            Transition::Next(state) => format!("{:?}", state),
            Transition::Rejected(_) => "Rejected".into(),
            Transition::Done(_) => "Done".into(),
        }
    }
}

pub struct TagWriteOrchestrator<'t> {
    tag: Option<&'t mut dyn Tag>,
    state: State,
}

impl<'t> TagWriteOrchestrator<'t> {
    pub fn new(tag: Option<&'t mut dyn Tag>) -> Self {
        Self {
            tag,
            state: State::Start,
        }
    }

    /// Drives the tag to a terminal outcome. Consumes the orchestrator.
    pub fn write(mut self, message: &NdefMessage) -> WriteOutcome {
        loop {
            let transition = self.step(message);
            debug!("Tag write: {:?} -> {}", self.state, transition.name());

            match transition {
                Transition::Next(state) => self.state = state,
                Transition::Rejected(outcome) | Transition::Done(outcome) => {
                    info!("Tag write finished: {}", outcome.code());
                    return outcome;
                }
            }
        }
    }

    fn step(&mut self, message: &NdefMessage) -> Transition {
        let Some(tag) = self.tag.as_deref_mut() else {
            return Transition::Done(WriteOutcome::Failed(WriteError::NoTagPresent));
        };

        match self.state {
            State::Start => Transition::Next(State::Probing),
            State::Probing => match TagCapability::probe(tag) {
                TagCapability::NdefFormattedWritable => Transition::Next(State::DirectWrite),
                TagCapability::NdefFormattedReadOnly => {
                    Transition::Rejected(WriteOutcome::RejectedReadOnly)
                }
                TagCapability::NotNdefFormatted => Transition::Next(State::Formatting),
                TagCapability::FormattableButUnbound => {
                    Transition::Rejected(WriteOutcome::RejectedIncompatible)
                }
            },
            State::DirectWrite => direct_write(tag, message),
            State::Formatting => format_and_write(tag, message),
        }
    }
}

/// Convenience wrapper: one orchestrator, one outcome.
pub fn write(tag: Option<&mut dyn Tag>, message: &NdefMessage) -> WriteOutcome {
    TagWriteOrchestrator::new(tag).write(message)
}

fn direct_write(tag: &mut dyn Tag, message: &NdefMessage) -> Transition {
    let Some(ndef) = tag.ndef() else {
        // bound during probing; gone now means a different tag is in the field
        return Transition::Done(WriteOutcome::Failed(WriteError::TagLost));
    };

    let mut session = match Session::open(ndef) {
        Ok(session) => session,
        Err(err) => return Transition::Done(WriteOutcome::Failed(err.into())),
    };

    if !session.is_writable() {
        return Transition::Rejected(WriteOutcome::RejectedReadOnly);
    }

    match session.write_message(message) {
        Ok(()) => Transition::Done(WriteOutcome::Written),
        Err(err) => {
            warn!("NDEF write failed: {}", err);
            Transition::Done(WriteOutcome::Failed(err.into()))
        }
    }
}

fn format_and_write(tag: &mut dyn Tag, message: &NdefMessage) -> Transition {
    let Some(formatter) = tag.ndef_formatable() else {
        return Transition::Done(WriteOutcome::Failed(WriteError::FormatterUnavailable));
    };

    let mut session = match Session::open(formatter) {
        Ok(session) => session,
        Err(err) => return Transition::Done(WriteOutcome::Failed(err.into())),
    };

    match session.format(message) {
        Ok(()) => Transition::Done(WriteOutcome::Formatted),
        Err(err) => {
            warn!("NDEF format failed, tag state is indeterminate: {}", err);
            Transition::Done(WriteOutcome::Failed(err.into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_outcome_has_its_own_message() {
        let outcomes = [
            WriteOutcome::Written,
            WriteOutcome::Formatted,
            WriteOutcome::RejectedReadOnly,
            WriteOutcome::RejectedIncompatible,
            WriteOutcome::Failed(WriteError::NoTagPresent),
            WriteOutcome::Failed(WriteError::TagLost),
            WriteOutcome::Failed(WriteError::FormatterUnavailable),
            WriteOutcome::Failed(WriteError::IoFailure("Write Failed".into())),
        ];
        let messages: HashSet<String> = outcomes.iter().map(WriteOutcome::message).collect();
        assert_eq!(messages.len(), outcomes.len());
    }

    #[test]
    fn only_written_and_formatted_succeed() {
        assert!(WriteOutcome::Written.is_success());
        assert!(WriteOutcome::Formatted.is_success());
        assert!(!WriteOutcome::RejectedReadOnly.is_success());
        assert_eq!(
            WriteOutcome::RejectedIncompatible.error(),
            Some(WriteError::RejectedIncompatible)
        );
        assert_eq!(WriteOutcome::Written.error(), None);
    }

    #[test]
    fn absent_tag_fails_without_probing() {
        let message = NdefMessage::text(
            crate::text_record::encode(b"en", b"x", crate::text_record::TextEncoding::Utf8)
                .unwrap(),
        );
        assert_eq!(
            write(None, &message),
            WriteOutcome::Failed(WriteError::NoTagPresent)
        );
    }
}
