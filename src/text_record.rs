// src/text_record.rs
//! NFC Forum Text RTD payload: `[status][language code][text]`.
//!
//! Status byte: bit 7 selects UTF-16, bits 5-0 carry the language code
//! length. Bit 6 is reserved, written as 0 and ignored when reading.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecodingError, EncodingError};

const UTF16_FLAG: u8 = 0x80;
const LANG_LEN_MASK: u8 = 0x3F;
const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

pub const MAX_LANGUAGE_CODE_LEN: usize = LANG_LEN_MASK as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("UTF-8"),
            TextEncoding::Utf16 => f.write_str("UTF-16"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedText {
    pub language_code: String,
    pub text: String,
    pub encoding: TextEncoding,
}

/// Encoded text record payload, ready to go inside an NDEF record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecordPayload(Vec<u8>);

impl TextRecordPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds a payload from a language code and text already in `encoding`'s
/// byte form. No transcoding happens here.
pub fn encode(
    language_code: &[u8],
    text: &[u8],
    encoding: TextEncoding,
) -> Result<TextRecordPayload, EncodingError> {
    if language_code.len() > MAX_LANGUAGE_CODE_LEN {
        return Err(EncodingError::LanguageCodeTooLong {
            len: language_code.len(),
        });
    }
    if !language_code.is_ascii() {
        return Err(EncodingError::InvalidLanguageCode);
    }

    let mut status = language_code.len() as u8 & LANG_LEN_MASK;
    if encoding == TextEncoding::Utf16 {
        status |= UTF16_FLAG;
    }

    let mut payload = Vec::with_capacity(1 + language_code.len() + text.len());
    payload.push(status);
    payload.extend_from_slice(language_code);
    payload.extend_from_slice(text);
    Ok(TextRecordPayload(payload))
}

/// Transcodes `text` into `encoding` and encodes it.
///
/// UTF-16 goes out big-endian. A BOM is written only when the text itself
/// starts with U+FEFF or U+FFFE, which would otherwise be read back as one.
pub fn encode_text(
    language_code: &str,
    text: &str,
    encoding: TextEncoding,
) -> Result<TextRecordPayload, EncodingError> {
    match encoding {
        TextEncoding::Utf8 => encode(language_code.as_bytes(), text.as_bytes(), encoding),
        TextEncoding::Utf16 => {
            let mut bytes = Vec::with_capacity(2 + text.len() * 2);
            if text.starts_with(['\u{FEFF}', '\u{FFFE}']) {
                bytes.extend_from_slice(&UTF16_BOM);
            }
            bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
            encode(language_code.as_bytes(), &bytes, encoding)
        }
    }
}

pub fn decode(payload: &[u8]) -> Result<LocalizedText, DecodingError> {
    let (&status, rest) = payload.split_first().ok_or(DecodingError::EmptyPayload)?;

    let lang_len = (status & LANG_LEN_MASK) as usize;
    if lang_len > rest.len() {
        return Err(DecodingError::Truncated {
            declared: lang_len,
            available: rest.len(),
        });
    }
    let (lang, text) = rest.split_at(lang_len);

    if !lang.is_ascii() {
        return Err(DecodingError::InvalidLanguageCode);
    }
    let language_code: String = lang.iter().map(|&b| b as char).collect();

    let encoding = if status & UTF16_FLAG != 0 {
        TextEncoding::Utf16
    } else {
        TextEncoding::Utf8
    };

    let text = match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(text)
            .map_err(|_| DecodingError::InvalidTextEncoding(encoding))?
            .to_string(),
        TextEncoding::Utf16 => decode_utf16(text)?,
    };

    Ok(LocalizedText {
        language_code,
        text,
        encoding,
    })
}

// Big-endian unless a byte order mark says otherwise.
fn decode_utf16(bytes: &[u8]) -> Result<String, DecodingError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodingError::InvalidTextEncoding(TextEncoding::Utf16));
    }

    let (little_endian, body) = match bytes {
        [0xFF, 0xFE, body @ ..] => (true, body),
        [0xFE, 0xFF, body @ ..] => (false, body),
        body => (false, body),
    };

    let units = body.chunks_exact(2).map(|pair| {
        let pair = [pair[0], pair[1]];
        if little_endian {
            u16::from_le_bytes(pair)
        } else {
            u16::from_be_bytes(pair)
        }
    });

    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| DecodingError::InvalidTextEncoding(TextEncoding::Utf16))
}
