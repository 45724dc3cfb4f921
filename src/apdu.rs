// src/apdu.rs
// ACR122U-style pseudo-APDUs (class 0xFF) passed through PC/SC.
use log::debug;
use pcsc::Card;

use crate::error::TagIoError;

pub const KEY_TYPE_A: u8 = 0x60;
pub const KEY_TYPE_B: u8 = 0x61;

const SW_OK: [u8; 2] = [0x90, 0x00];

fn transmit(card: &Card, apdu: &[u8], what: &str) -> Result<Vec<u8>, TagIoError> {
    let mut recv_buffer = [0u8; 258];
    let resp = card.transmit(apdu, &mut recv_buffer)?;
    check_status(resp, what)
}

/// Strips the status word, failing unless it is `90 00`.
pub fn check_status(resp: &[u8], what: &str) -> Result<Vec<u8>, TagIoError> {
    match resp {
        [data @ .., sw1, sw2] if [*sw1, *sw2] == SW_OK => Ok(data.to_vec()),
        _ => {
            debug!("{} rejected, response {}", what, hex::encode_upper(resp));
            Err(TagIoError::Io(format!("{} Failed: {:02X?}", what, resp)))
        }
    }
}

// Load Authentication Key into reader slot 0
// FF 82 00 00 06 [KEY]
pub fn load_key(card: &Card, key: &[u8; 6]) -> Result<(), TagIoError> {
    let mut apdu = vec![0xFF, 0x82, 0x00, 0x00, 0x06];
    apdu.extend_from_slice(key);
    transmit(card, &apdu, "Load Key").map(|_| ())
}

// FF 86 00 00 05 01 00 Block KeyType KeyNumber
pub fn authenticate(card: &Card, block: u8, key_type: u8) -> Result<(), TagIoError> {
    let apdu = [
        0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_type, 0x00,
    ];
    transmit(card, &apdu, "Auth").map(|_| ())
}

// FF B0 00 Block Len
pub fn read_binary(card: &Card, block: u8, length: u8) -> Result<Vec<u8>, TagIoError> {
    let apdu = [0xFF, 0xB0, 0x00, block, length];
    transmit(card, &apdu, "Read")
}

// FF D6 00 Block Len [Data]
pub fn update_binary(card: &Card, block: u8, data: &[u8]) -> Result<(), TagIoError> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, block, data.len() as u8];
    apdu.extend_from_slice(data);
    transmit(card, &apdu, "Write").map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_word_is_stripped() {
        assert_eq!(
            check_status(&[0x01, 0x02, 0x90, 0x00], "Read").unwrap(),
            vec![0x01, 0x02]
        );
        assert_eq!(check_status(&[0x90, 0x00], "Write").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn error_status_word_fails() {
        assert_eq!(
            check_status(&[0x63, 0x00], "Auth"),
            Err(TagIoError::Io("Auth Failed: [63, 00]".into()))
        );
        assert!(check_status(&[0x90], "Read").is_err());
    }
}
