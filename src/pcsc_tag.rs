// src/pcsc_tag.rs
//! [`Tag`] backed by a card sitting on a PC/SC reader.
//!
//! Discovery connects once to read the ATR and the NDEF markers, then lets
//! go of the card. Each technology opens its own card handle on `connect`
//! and releases it on `close`. The NDEF technology re-reads a Type 2
//! capability container on `connect`, so writability reflects the tag as it
//! is when the session opens.

use std::ffi::{CStr, CString};

use log::{debug, info, warn};
use pcsc::{Card, Context, Disposition, Protocols, ShareMode};

use crate::cards::{self, CapabilityContainer, CardFamily};
use crate::error::TagIoError;
use crate::ndef::{self, NdefMessage, TLV_NDEF};
use crate::tag::{FormatterTechnology, NdefTechnology, Tag, TagTechnology};

pub fn connect(ctx: &Context, reader: &CStr) -> Result<Card, TagIoError> {
    Ok(ctx.connect(reader, ShareMode::Shared, Protocols::ANY)?)
}

pub fn card_family(card: &Card) -> Result<CardFamily, TagIoError> {
    let mut names_buf = [0u8; 128];
    let mut atr_buf = [0u8; 64];
    let status = card.status2(&mut names_buf, &mut atr_buf)?;
    let atr = status.atr();
    debug!("ATR {}", hex::encode_upper(atr));
    Ok(CardFamily::from_atr(atr))
}

/// Raw data area of the card (TLV blocks, padding included).
pub fn read_data_area(card: &Card, family: CardFamily) -> Result<Vec<u8>, TagIoError> {
    match family {
        CardFamily::MifareClassic1k => cards::read_mifare(card),
        CardFamily::Type2 => {
            let cc = cards::read_type2_cc(card)?;
            if !cc.is_ndef_formatted() {
                return Ok(Vec::new());
            }
            cards::read_type2(card, &cc)
        }
    }
}

struct Link {
    ctx: Context,
    reader: CString,
    family: CardFamily,
    card: Option<Card>,
}

impl Link {
    fn connect(&mut self) -> Result<(), TagIoError> {
        if self.card.is_none() {
            self.card = Some(connect(&self.ctx, &self.reader)?);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TagIoError> {
        if let Some(card) = self.card.take() {
            card.disconnect(Disposition::LeaveCard)
                .map_err(|(_, err)| TagIoError::from(err))?;
        }
        Ok(())
    }

    fn card(&self) -> Result<&Card, TagIoError> {
        self.card
            .as_ref()
            .ok_or_else(|| TagIoError::Io("tag not connected".into()))
    }

    fn write_tlv(&self, message: &NdefMessage, capacity: usize) -> Result<(), TagIoError> {
        let tlv = ndef::wrap_in_tlv(&message.to_bytes())?;
        let card = self.card()?;
        match self.family {
            CardFamily::MifareClassic1k => cards::write_mifare(card, &tlv, capacity),
            CardFamily::Type2 => cards::write_type2(card, &tlv, capacity),
        }
    }
}

pub struct PcscNdef {
    link: Link,
    writable: bool,
    capacity: usize,
}

impl PcscNdef {
    fn refresh_access(&mut self) -> Result<(), TagIoError> {
        if self.link.family != CardFamily::Type2 {
            return Ok(());
        }
        let cc = cards::read_type2_cc(self.link.card()?)?;
        let (writable, capacity) = ndef_access(type2_markers(&cc))?;
        self.writable = writable;
        self.capacity = capacity;
        Ok(())
    }
}

impl TagTechnology for PcscNdef {
    fn connect(&mut self) -> Result<(), TagIoError> {
        self.link.connect()?;
        if let Err(err) = self.refresh_access() {
            // no session will exist to release the handle
            if let Err(close_err) = self.link.close() {
                warn!("Failed to release card: {}", close_err);
            }
            return Err(err);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TagIoError> {
        self.link.close()
    }
}

impl NdefTechnology for PcscNdef {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn write_message(&mut self, message: &NdefMessage) -> Result<(), TagIoError> {
        self.link.write_tlv(message, self.capacity)
    }
}

pub struct PcscFormatter {
    link: Link,
}

impl TagTechnology for PcscFormatter {
    fn connect(&mut self) -> Result<(), TagIoError> {
        self.link.connect()
    }

    fn close(&mut self) -> Result<(), TagIoError> {
        self.link.close()
    }
}

impl FormatterTechnology for PcscFormatter {
    fn format(&mut self, message: &NdefMessage) -> Result<(), TagIoError> {
        match self.link.family {
            CardFamily::Type2 => {
                let cc = CapabilityContainer(cards::TYPE2_FORMAT_CC);
                // size check before the CC is burned in
                let tlv_len = ndef::wrap_in_tlv(&message.to_bytes())?.len();
                cards::check_capacity(tlv_len, cc.data_area_len())?;
                cards::write_type2_cc(self.link.card()?, &cc)?;
                self.link.write_tlv(message, cc.data_area_len())
            }
            CardFamily::MifareClassic1k => {
                self.link.write_tlv(message, cards::mifare_data_area_len())
            }
        }
    }
}

pub struct PcscTag {
    ndef: Option<PcscNdef>,
    formatter: Option<PcscFormatter>,
}

impl PcscTag {
    /// Inspects the card on `reader` and works out which technologies it offers.
    pub fn discover(ctx: &Context, reader: &CStr) -> Result<Self, TagIoError> {
        let card = connect(ctx, reader)?;
        let family = card_family(&card)?;
        let markers = inspect(&card, family);
        // discovery handle is released whatever the inspection found
        if let Err((_, err)) = card.disconnect(Disposition::LeaveCard) {
            warn!("Failed to release card after discovery: {}", err);
        }
        let markers = markers?;

        info!("Discovered {:?} tag: {:?}", family, markers);

        let link = || Link {
            ctx: ctx.clone(),
            reader: reader.to_owned(),
            family,
            card: None,
        };

        let (ndef, formatter) = match markers {
            Markers::Ndef { writable, capacity } => (
                Some(PcscNdef {
                    link: link(),
                    writable,
                    capacity,
                }),
                None,
            ),
            Markers::Blank => (None, Some(PcscFormatter { link: link() })),
            Markers::Unsupported => (None, None),
        };

        Ok(Self { ndef, formatter })
    }
}

impl Tag for PcscTag {
    fn ndef(&mut self) -> Option<&mut dyn NdefTechnology> {
        self.ndef.as_mut().map(|n| n as &mut dyn NdefTechnology)
    }

    fn ndef_formatable(&mut self) -> Option<&mut dyn FormatterTechnology> {
        self.formatter
            .as_mut()
            .map(|f| f as &mut dyn FormatterTechnology)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markers {
    Ndef { writable: bool, capacity: usize },
    Blank,
    Unsupported,
}

fn inspect(card: &Card, family: CardFamily) -> Result<Markers, TagIoError> {
    match family {
        CardFamily::Type2 => Ok(type2_markers(&cards::read_type2_cc(card)?)),
        CardFamily::MifareClassic1k => {
            let block = cards::MIFARE_FIRST_DATA_BLOCK;
            match cards::authenticate_sector(card, block) {
                Ok(()) => {}
                Err(TagIoError::TagLost) => return Err(TagIoError::TagLost),
                Err(_) => return Ok(Markers::Unsupported),
            }
            let first_block = crate::apdu::read_binary(card, block, 16)?;
            Ok(classic_markers(&first_block))
        }
    }
}

fn type2_markers(cc: &CapabilityContainer) -> Markers {
    if cc.is_ndef_formatted() {
        Markers::Ndef {
            writable: cc.is_writable(),
            capacity: cc.data_area_len(),
        }
    } else if cc.is_blank() {
        Markers::Blank
    } else {
        Markers::Unsupported
    }
}

/// Writability and capacity of a tag that still carries NDEF.
fn ndef_access(markers: Markers) -> Result<(bool, usize), TagIoError> {
    match markers {
        Markers::Ndef { writable, capacity } => Ok((writable, capacity)),
        other => Err(TagIoError::Io(format!(
            "capability container changed since discovery: {:?}",
            other
        ))),
    }
}

fn classic_markers(first_block: &[u8]) -> Markers {
    if ndef::unwrap_tlv(first_block).is_ok() || first_block.first() == Some(&TLV_NDEF) {
        Markers::Ndef {
            writable: true,
            capacity: cards::mifare_data_area_len(),
        }
    } else {
        Markers::Blank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type2_markers_follow_capability_container() {
        assert_eq!(
            type2_markers(&CapabilityContainer([0xE1, 0x10, 0x12, 0x00])),
            Markers::Ndef {
                writable: true,
                capacity: 144
            }
        );
        assert_eq!(
            type2_markers(&CapabilityContainer([0xE1, 0x10, 0x12, 0x0F])),
            Markers::Ndef {
                writable: false,
                capacity: 144
            }
        );
        assert_eq!(type2_markers(&CapabilityContainer([0; 4])), Markers::Blank);
        assert_eq!(
            type2_markers(&CapabilityContainer([0x12, 0x34, 0x56, 0x78])),
            Markers::Unsupported
        );
    }

    #[test]
    fn access_is_reread_from_capability_container() {
        // locked after discovery
        let locked = type2_markers(&CapabilityContainer([0xE1, 0x10, 0x12, 0x0F]));
        assert_eq!(ndef_access(locked), Ok((false, 144)));
        let open = type2_markers(&CapabilityContainer([0xE1, 0x10, 0x3E, 0x00]));
        assert_eq!(ndef_access(open), Ok((true, 496)));
        // wiped after discovery
        assert!(matches!(
            ndef_access(type2_markers(&CapabilityContainer([0; 4]))),
            Err(TagIoError::Io(_))
        ));
    }

    #[test]
    fn classic_markers_look_for_ndef_tlv() {
        let mut block = [0u8; 16];
        assert_eq!(classic_markers(&block), Markers::Blank);

        block[..4].copy_from_slice(&[0x03, 0x00, 0xFE, 0x00]);
        assert_eq!(
            classic_markers(&block),
            Markers::Ndef {
                writable: true,
                capacity: 720
            }
        );

        // message longer than the first block
        block[..3].copy_from_slice(&[0x03, 0x40, 0xD1]);
        assert!(matches!(classic_markers(&block), Markers::Ndef { .. }));
    }
}
