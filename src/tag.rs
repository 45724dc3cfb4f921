// src/tag.rs
//! Capability view over a discovered tag.
//!
//! A tag exposes at most two technologies: an NDEF interface (already
//! formatted) and an NDEF formatter (blank but formattable). Both are
//! connected through [`Session`], which closes the connection when dropped.

use std::ops::{Deref, DerefMut};

use log::warn;

use crate::error::TagIoError;
use crate::ndef::NdefMessage;

pub trait TagTechnology {
    fn connect(&mut self) -> Result<(), TagIoError>;
    fn close(&mut self) -> Result<(), TagIoError>;
}

pub trait NdefTechnology: TagTechnology {
    /// Writability as known at discovery; no I/O.
    fn is_writable(&self) -> bool;
    fn write_message(&mut self, message: &NdefMessage) -> Result<(), TagIoError>;
}

pub trait FormatterTechnology: TagTechnology {
    /// Formats the tag for NDEF and writes `message` as its initial content.
    fn format(&mut self, message: &NdefMessage) -> Result<(), TagIoError>;
}

/// A tag handle as delivered by the host reader layer.
pub trait Tag {
    fn ndef(&mut self) -> Option<&mut dyn NdefTechnology>;
    fn ndef_formatable(&mut self) -> Option<&mut dyn FormatterTechnology>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCapability {
    NotNdefFormatted,
    NdefFormattedReadOnly,
    NdefFormattedWritable,
    FormattableButUnbound,
}

impl TagCapability {
    /// Binds the tag's technologies to classify it. Never cached: the
    /// tag in the field may differ from the one seen last time.
    pub fn probe(tag: &mut dyn Tag) -> Self {
        if let Some(ndef) = tag.ndef() {
            return if ndef.is_writable() {
                TagCapability::NdefFormattedWritable
            } else {
                TagCapability::NdefFormattedReadOnly
            };
        }

        if tag.ndef_formatable().is_some() {
            TagCapability::NotNdefFormatted
        } else {
            TagCapability::FormattableButUnbound
        }
    }
}

/// Open connection to a tag technology, closed on drop.
pub struct Session<'a, T: TagTechnology + ?Sized> {
    tech: &'a mut T,
}

impl<'a, T: TagTechnology + ?Sized> Session<'a, T> {
    pub fn open(tech: &'a mut T) -> Result<Self, TagIoError> {
        tech.connect()?;
        Ok(Self { tech })
    }
}

impl<T: TagTechnology + ?Sized> Deref for Session<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.tech
    }
}

impl<T: TagTechnology + ?Sized> DerefMut for Session<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.tech
    }
}

impl<T: TagTechnology + ?Sized> Drop for Session<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.tech.close() {
            warn!("Failed to close tag connection: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        connects: usize,
        closes: usize,
        refuse_connect: bool,
    }

    impl TagTechnology for Counting {
        fn connect(&mut self) -> Result<(), TagIoError> {
            if self.refuse_connect {
                return Err(TagIoError::TagLost);
            }
            self.connects += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), TagIoError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn session_closes_on_drop() {
        let mut tech = Counting::default();
        {
            let session = Session::open(&mut tech).unwrap();
            assert_eq!(session.connects, 1);
            assert_eq!(session.closes, 0);
        }
        assert_eq!(tech.closes, 1);
    }

    #[test]
    fn failed_connect_has_nothing_to_close() {
        let mut tech = Counting {
            refuse_connect: true,
            ..Default::default()
        };
        assert!(Session::open(&mut tech).is_err());
        assert_eq!(tech.closes, 0);
    }

    struct Bare;

    impl Tag for Bare {
        fn ndef(&mut self) -> Option<&mut dyn NdefTechnology> {
            None
        }

        fn ndef_formatable(&mut self) -> Option<&mut dyn FormatterTechnology> {
            None
        }
    }

    #[test]
    fn tag_without_technologies_is_unbound() {
        assert_eq!(
            TagCapability::probe(&mut Bare),
            TagCapability::FormattableButUnbound
        );
    }
}
