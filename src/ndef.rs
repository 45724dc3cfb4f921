// src/ndef.rs
use crate::error::NdefError;
use crate::text_record::{self, LocalizedText, TextRecordPayload};

// Record header flags
const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

pub const TNF_WELL_KNOWN: u8 = 0x01;
pub const RTD_TEXT: &[u8] = b"T";

// TLV block types
pub const TLV_NULL: u8 = 0x00;
pub const TLV_NDEF: u8 = 0x03;
pub const TLV_TERMINATOR: u8 = 0xFE;

// 0xFFFF is reserved in the 3-byte length form
pub const MAX_TLV_VALUE_LEN: usize = 0xFFFE;

/// A single-record NDEF message holding one well-known text record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefMessage {
    payload: TextRecordPayload,
}

impl NdefMessage {
    pub fn text(payload: TextRecordPayload) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &TextRecordPayload {
        &self.payload
    }

    /// Serialized record: header, type length, payload length, type, payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = self.payload.as_bytes();
        let short = payload.len() <= u8::MAX as usize;

        // MB=1, ME=1, CF=0, IL=0, TNF=001
        let mut header = FLAG_MB | FLAG_ME | TNF_WELL_KNOWN;
        if short {
            header |= FLAG_SR;
        }

        let mut record = Vec::with_capacity(payload.len() + 7);
        record.push(header);
        record.push(RTD_TEXT.len() as u8);
        if short {
            record.push(payload.len() as u8);
        } else {
            record.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        }
        record.extend_from_slice(RTD_TEXT);
        record.extend_from_slice(payload);
        record
    }
}

pub fn wrap_in_tlv(ndef_bytes: &[u8]) -> Result<Vec<u8>, NdefError> {
    if ndef_bytes.len() > MAX_TLV_VALUE_LEN {
        return Err(NdefError::MessageTooLong {
            len: ndef_bytes.len(),
        });
    }

    let mut tlv = Vec::with_capacity(ndef_bytes.len() + 5);
    tlv.push(TLV_NDEF);

    // 1-byte length below 0xFF, otherwise 0xFF followed by a 2-byte length
    if ndef_bytes.len() < 0xFF {
        tlv.push(ndef_bytes.len() as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(ndef_bytes.len() as u16).to_be_bytes());
    }

    tlv.extend_from_slice(ndef_bytes);
    tlv.push(TLV_TERMINATOR);
    Ok(tlv)
}

/// Walks the TLV blocks of a tag's data area and returns the NDEF message.
pub fn unwrap_tlv(buffer: &[u8]) -> Result<&[u8], NdefError> {
    let mut cursor = 0;

    while cursor < buffer.len() {
        let tag = buffer[cursor];
        cursor += 1;

        match tag {
            TLV_NULL => continue,
            TLV_TERMINATOR => break,
            _ => {}
        }

        let (len, header) = tlv_length(&buffer[cursor..]).ok_or(NdefError::TruncatedRecord)?;
        cursor += header;
        let end = cursor.checked_add(len).ok_or(NdefError::TruncatedRecord)?;
        if end > buffer.len() {
            return Err(NdefError::TruncatedRecord);
        }

        if tag == TLV_NDEF {
            return Ok(&buffer[cursor..end]);
        }
        cursor = end;
    }

    Err(NdefError::MissingTlv)
}

/// Returns (length, bytes used by the length field).
fn tlv_length(bytes: &[u8]) -> Option<(usize, usize)> {
    match bytes {
        [0xFF, hi, lo, ..] => Some((u16::from_be_bytes([*hi, *lo]) as usize, 3)),
        [0xFF, ..] => None,
        [len, ..] => Some((*len as usize, 1)),
        [] => None,
    }
}

/// Payload of the first record in `message`, which must be a well-known
/// text record. Any further records are ignored.
pub fn first_text_record_payload(message: &[u8]) -> Result<&[u8], NdefError> {
    let header = *message.first().ok_or(NdefError::EmptyMessage)?;
    let tnf = header & TNF_MASK;
    let is_short_record = header & FLAG_SR != 0;
    let has_id = header & FLAG_IL != 0;

    let mut cursor = 1;

    let type_len = take(message, &mut cursor, 1)?[0] as usize;
    let payload_len = if is_short_record {
        take(message, &mut cursor, 1)?[0] as usize
    } else {
        let b = take(message, &mut cursor, 4)?;
        u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize
    };
    let id_len = if has_id {
        take(message, &mut cursor, 1)?[0] as usize
    } else {
        0
    };

    let record_type = take(message, &mut cursor, type_len)?;
    take(message, &mut cursor, id_len)?;
    let payload = take(message, &mut cursor, payload_len)?;

    if tnf != TNF_WELL_KNOWN || record_type != RTD_TEXT || header & FLAG_CF != 0 {
        return Err(NdefError::NotTextRecord);
    }
    Ok(payload)
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], NdefError> {
    let end = cursor.checked_add(n).ok_or(NdefError::TruncatedRecord)?;
    let slice = bytes.get(*cursor..end).ok_or(NdefError::TruncatedRecord)?;
    *cursor = end;
    Ok(slice)
}

/// Read path: first record of a raw NDEF message decoded as text.
pub fn decode_text_message(message: &[u8]) -> Result<LocalizedText, NdefError> {
    let payload = first_text_record_payload(message)?;
    Ok(text_record::decode(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_record::{TextEncoding, encode_text};

    fn message(text: &str) -> NdefMessage {
        NdefMessage::text(encode_text("en", text, TextEncoding::Utf8).unwrap())
    }

    #[test]
    fn short_record_layout() {
        let bytes = message("hi").to_bytes();
        assert_eq!(
            bytes,
            vec![0xD1, 0x01, 0x05, b'T', 0x02, b'e', b'n', b'h', b'i']
        );
    }

    #[test]
    fn long_record_uses_four_byte_length() {
        let text = "a".repeat(300);
        let bytes = message(&text).to_bytes();
        assert_eq!(bytes[0], 0xC1);
        assert_eq!(&bytes[2..6], &(303u32).to_be_bytes());
        assert_eq!(decode_text_message(&bytes).unwrap().text, text);
    }

    #[test]
    fn tlv_round_trip() {
        let ndef = message("user-42").to_bytes();
        let tlv = wrap_in_tlv(&ndef).unwrap();
        assert_eq!(tlv[0], TLV_NDEF);
        assert_eq!(tlv[1] as usize, ndef.len());
        assert_eq!(*tlv.last().unwrap(), TLV_TERMINATOR);

        // tags pad their data area with zeroes after the terminator
        let mut area = tlv.clone();
        area.extend_from_slice(&[0u8; 7]);
        assert_eq!(unwrap_tlv(&area).unwrap(), ndef.as_slice());
    }

    #[test]
    fn tlv_three_byte_length() {
        let ndef = vec![0xAB; 400];
        let tlv = wrap_in_tlv(&ndef).unwrap();
        assert_eq!(&tlv[..4], &[TLV_NDEF, 0xFF, 0x01, 0x90]);
        assert_eq!(unwrap_tlv(&tlv).unwrap().len(), 400);
    }

    #[test]
    fn tlv_rejects_message_past_two_byte_length() {
        assert_eq!(
            wrap_in_tlv(&vec![0; 70_000]),
            Err(NdefError::MessageTooLong { len: 70_000 })
        );
        let tlv = wrap_in_tlv(&vec![0; MAX_TLV_VALUE_LEN]).unwrap();
        assert_eq!(&tlv[..4], &[TLV_NDEF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn tlv_skips_null_and_lock_control_blocks() {
        // NULL, Lock Control TLV (0x01) with 3 bytes, then the NDEF TLV
        let area = [0x00, 0x01, 0x03, 0xA0, 0x0C, 0x34, 0x03, 0x02, 0xAA, 0xBB, 0xFE];
        assert_eq!(unwrap_tlv(&area).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn tlv_missing_or_truncated() {
        assert_eq!(unwrap_tlv(&[0x00, 0x00, 0xFE]), Err(NdefError::MissingTlv));
        assert_eq!(unwrap_tlv(&[]), Err(NdefError::MissingTlv));
        assert_eq!(unwrap_tlv(&[0x03, 0x09, 0xD1]), Err(NdefError::TruncatedRecord));
    }

    #[test]
    fn reads_first_record_only() {
        let mut bytes = message("first").to_bytes();
        bytes[0] &= !FLAG_ME;
        let mut second = message("second").to_bytes();
        second[0] &= !FLAG_MB;
        bytes.extend(second);
        assert_eq!(decode_text_message(&bytes).unwrap().text, "first");
    }

    #[test]
    fn rejects_uri_record() {
        // well-known "U" record
        let bytes = [0xD1, 0x01, 0x02, b'U', 0x00, b'x'];
        assert_eq!(decode_text_message(&bytes), Err(NdefError::NotTextRecord));
    }

    #[test]
    fn truncated_record() {
        assert_eq!(
            first_text_record_payload(&[0xD1, 0x01, 0x09, b'T', 0x02]),
            Err(NdefError::TruncatedRecord)
        );
        assert_eq!(first_text_record_payload(&[]), Err(NdefError::EmptyMessage));
    }

    #[test]
    fn record_with_id_field() {
        let bytes = [0xD9, 0x01, 0x03, 0x01, b'T', b'#', 0x00, b'o', b'k'];
        let text = decode_text_message(&bytes).unwrap();
        assert_eq!(text.language_code, "");
        assert_eq!(text.text, "ok");
    }

    #[test]
    fn bad_text_payload_surfaces_decoding_error() {
        let bytes = [0xD1, 0x01, 0x03, b'T', 0x05, b'A', b'B'];
        assert!(matches!(
            decode_text_message(&bytes),
            Err(NdefError::Text(_))
        ));
    }
}
