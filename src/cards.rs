// src/cards.rs
use log::{debug, warn};
use pcsc::Card;

use crate::apdu::{self, KEY_TYPE_A, KEY_TYPE_B};
use crate::error::{NdefError, TagIoError};
use crate::ndef;

// Well-known MIFARE Classic keys (transport, MAD, NDEF and common vendor keys)
pub const COMMON_KEYS: [[u8; 6]; 8] = [
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5],
    [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5],
    [0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD],
    [0x1A, 0x98, 0x2C, 0x7E, 0x45, 0x9A],
    [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
];

pub const ATR_MIFARE_CLASSIC_1K: u8 = 0x6A;

// Type 2 layout: capability container on page 3, data area from page 4
pub const TYPE2_CC_PAGE: u8 = 3;
pub const TYPE2_FIRST_DATA_PAGE: u8 = 4;
pub const TYPE2_CC_MAGIC: u8 = 0xE1;
// CC written when formatting a blank tag: mapping 1.0, 48-byte data area, open access
pub const TYPE2_FORMAT_CC: [u8; 4] = [TYPE2_CC_MAGIC, 0x10, 0x06, 0x00];

pub const MIFARE_FIRST_DATA_BLOCK: u8 = 4;
pub const MIFARE_1K_BLOCKS: u8 = 64;
pub const MIFARE_BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFamily {
    MifareClassic1k,
    /// NTAG / Ultralight
    Type2,
}

impl CardFamily {
    /// The last historical byte of the ATR names the card.
    pub fn from_atr(atr: &[u8]) -> Self {
        match atr.last() {
            Some(&ATR_MIFARE_CLASSIC_1K) => CardFamily::MifareClassic1k,
            _ => CardFamily::Type2,
        }
    }
}

/// Type 2 capability container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityContainer(pub [u8; 4]);

impl CapabilityContainer {
    pub fn is_ndef_formatted(&self) -> bool {
        self.0[0] == TYPE2_CC_MAGIC
    }

    pub fn is_blank(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Write access nibble 0 means granted.
    pub fn is_writable(&self) -> bool {
        self.0[3] & 0x0F == 0
    }

    pub fn data_area_len(&self) -> usize {
        self.0[2] as usize * 8
    }
}

pub fn get_mifare_data_blocks() -> Vec<u8> {
    let mut blocks = Vec::new();
    // Sector 0 holds manufacturer data, so we start at Sector 1
    for sector in 1..16 {
        for block_in_sector in 0..3 {
            // 0, 1, 2 are data. 3 is the Trailer.
            blocks.push((sector * 4) + block_in_sector);
        }
    }
    blocks
}

/// Bytes available for the NDEF TLV on a MIFARE Classic 1K (sectors 1-15).
pub fn mifare_data_area_len() -> usize {
    get_mifare_data_blocks().len() * MIFARE_BLOCK_LEN
}

/// Checked before the first block or page is touched, so an oversize
/// message leaves the tag as it was.
pub fn check_capacity(len: usize, capacity: usize) -> Result<(), TagIoError> {
    if len > capacity {
        return Err(TagIoError::Io(format!(
            "message of {} bytes exceeds tag capacity of {}",
            len, capacity
        )));
    }
    Ok(())
}

/// Tries every common key, as Key A then Key B, against the sector holding `block`.
pub fn authenticate_sector(card: &Card, block: u8) -> Result<(), TagIoError> {
    for key in COMMON_KEYS.iter() {
        match apdu::load_key(card, key) {
            Ok(()) => {}
            Err(TagIoError::TagLost) => return Err(TagIoError::TagLost),
            Err(_) => continue,
        }
        for key_type in [KEY_TYPE_A, KEY_TYPE_B] {
            match apdu::authenticate(card, block, key_type) {
                Ok(()) => return Ok(()),
                Err(TagIoError::TagLost) => return Err(TagIoError::TagLost),
                Err(_) => {}
            }
        }
    }
    Err(TagIoError::Io(format!("Auth Failed for block {}", block)))
}

pub fn read_mifare(card: &Card) -> Result<Vec<u8>, TagIoError> {
    let mut full_data = Vec::new();

    for block in get_mifare_data_blocks() {
        // authenticate at the start of every sector (blocks 4, 8, 12, ...)
        if block % 4 == 0 {
            if let Err(err) = authenticate_sector(card, block) {
                if err == TagIoError::TagLost || full_data.is_empty() {
                    return Err(err);
                }
                warn!("Could not authenticate sector at block {}. Stopping.", block);
                break;
            }
        }

        full_data.extend(apdu::read_binary(card, block, 16)?);
        if !needs_more(&full_data) {
            break;
        }
    }

    Ok(full_data)
}

pub fn write_mifare(card: &Card, data: &[u8], capacity: usize) -> Result<(), TagIoError> {
    check_capacity(data.len(), capacity)?;

    let mut offset = 0;
    let mut current_block = MIFARE_FIRST_DATA_BLOCK;

    while offset < data.len() {
        if current_block >= MIFARE_1K_BLOCKS {
            return Err(TagIoError::Io("message exceeds tag capacity".into()));
        }

        // Skip trailers
        if (current_block + 1) % 4 == 0 {
            current_block += 1;
            continue;
        }

        if current_block % 4 == 0 {
            authenticate_sector(card, current_block)?;
        }

        // 16-byte blocks, zero padded
        let bytes_left = data.len() - offset;
        let copy_len = std::cmp::min(MIFARE_BLOCK_LEN, bytes_left);
        let mut chunk = [0u8; MIFARE_BLOCK_LEN];
        chunk[..copy_len].copy_from_slice(&data[offset..offset + copy_len]);

        apdu::update_binary(card, current_block, &chunk)?;

        offset += MIFARE_BLOCK_LEN;
        current_block += 1;
    }
    Ok(())
}

pub fn read_type2_cc(card: &Card) -> Result<CapabilityContainer, TagIoError> {
    let data = apdu::read_binary(card, TYPE2_CC_PAGE, 4)?;
    match data.get(..4) {
        Some(&[a, b, c, d]) => Ok(CapabilityContainer([a, b, c, d])),
        _ => Err(TagIoError::Io("Read Failed: short capability container".into())),
    }
}

pub fn write_type2_cc(card: &Card, cc: &CapabilityContainer) -> Result<(), TagIoError> {
    apdu::update_binary(card, TYPE2_CC_PAGE, &cc.0)
}

/// Reads the data area 16 bytes (four pages) at a time until the NDEF TLV is complete.
pub fn read_type2(card: &Card, cc: &CapabilityContainer) -> Result<Vec<u8>, TagIoError> {
    let limit = cc.data_area_len();
    let mut area = Vec::with_capacity(limit);
    let mut page = TYPE2_FIRST_DATA_PAGE;

    while area.len() < limit {
        area.extend(apdu::read_binary(card, page, 16)?);
        if !needs_more(&area) {
            break;
        }
        page = page
            .checked_add(4)
            .ok_or_else(|| TagIoError::Io("Read Failed: page overflow".into()))?;
    }

    area.truncate(limit);
    debug!("Read {} bytes of Type 2 data area", area.len());
    Ok(area)
}

/// Pages are 4 bytes; data is padded and written from page 4.
pub fn write_type2(card: &Card, data: &[u8], capacity: usize) -> Result<(), TagIoError> {
    check_capacity(data.len(), capacity)?;

    let mut padded_data = data.to_vec();
    while padded_data.len() % 4 != 0 {
        padded_data.push(0x00);
    }

    let mut current_page = TYPE2_FIRST_DATA_PAGE;
    for chunk in padded_data.chunks(4) {
        apdu::update_binary(card, current_page, chunk)?;
        current_page = current_page
            .checked_add(1)
            .ok_or_else(|| TagIoError::Io("Write Failed: page overflow".into()))?;
    }
    Ok(())
}

// More blocks are needed while the NDEF TLV read so far is cut short.
fn needs_more(area: &[u8]) -> bool {
    matches!(ndef::unwrap_tlv(area), Err(NdefError::TruncatedRecord))
}
