// src/services/png_codec.rs
//
// Chunk-level PNG reader/writer for embedded character card payloads. Only
// the text chunks are interpreted; every other chunk is carried through
// byte-for-byte so the image itself is never touched.

use base64::{engine::general_purpose::STANDARD as base64_standard, Engine as _};
use tracing::warn;

use crate::errors::{CardError, EncodeError, FormatError};
use crate::models::card::CharacterCard;
use crate::services::card_parser::parse_json_card;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

const TEXT_CHUNK: [u8; 4] = *b"tEXt";
const ITXT_CHUNK: [u8; 4] = *b"iTXt";
const ZTXT_CHUNK: [u8; 4] = *b"zTXt";
const IEND_CHUNK: [u8; 4] = *b"IEND";
const EXIF_CHUNK: [u8; 4] = *b"eXIf";

/// Keyword written on the metadata chunk this crate produces.
pub const CARD_KEYWORD: &str = "chara";

/// Case-insensitive metadata predicate. "character" contains "chara", so a
/// single substring test covers both keyword spellings in the wild.
fn is_card_keyword(keyword: &str) -> bool {
    keyword.to_ascii_lowercase().contains("chara")
}

fn read_u32_be(buffer: &[u8], offset: usize) -> Option<u32> {
    let bytes = buffer.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn check_signature(buffer: &[u8]) -> Result<(), FormatError> {
    if buffer.len() < PNG_SIGNATURE.len() || buffer[..8] != PNG_SIGNATURE {
        return Err(FormatError::InvalidSignature);
    }
    Ok(())
}

/// One structurally complete chunk: (type, payload, stored CRC, next offset).
fn read_chunk(buffer: &[u8], offset: usize) -> Option<([u8; 4], &[u8], u32, usize)> {
    let length = read_u32_be(buffer, offset)? as usize;
    let type_bytes = buffer.get(offset + 4..offset + 8)?;
    let chunk_type = [type_bytes[0], type_bytes[1], type_bytes[2], type_bytes[3]];
    let data = buffer.get(offset + 8..offset + 8 + length)?;
    let stored_crc = read_u32_be(buffer, offset + 8 + length)?;
    Some((chunk_type, data, stored_crc, offset + 12 + length))
}

fn chunk_crc(chunk_type: &[u8; 4], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    hasher.finalize()
}

/// Keyword of a text-bearing chunk: the bytes up to the first NUL separator.
fn keyword_of(data: &[u8]) -> Option<String> {
    let nul = data.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&data[..nul]).ok().map(str::to_owned)
}

/// Metadata-bearing payloads are Base64 per the card spec, but some
/// producers write the JSON raw; fall back rather than reject.
fn decode_card_text(keyword: &str, raw: &str) -> String {
    if !is_card_keyword(keyword) {
        return raw.to_string();
    }
    match base64_standard.decode(raw) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => raw.to_string(),
        },
        Err(err) => {
            warn!(keyword, %err, "card chunk text is not valid base64, using raw text");
            raw.to_string()
        }
    }
}

// tEXt payload: keyword, NUL, text.
fn parse_text_chunk(data: &[u8]) -> Result<(String, String), String> {
    if data.len() < 2 {
        return Err("tEXt chunk data too short".to_string());
    }
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| "tEXt chunk missing null separator".to_string())?;
    if nul == 0 {
        return Err("tEXt chunk keyword is empty".to_string());
    }
    let keyword = std::str::from_utf8(&data[..nul])
        .map_err(|e| format!("tEXt keyword is not UTF-8: {e}"))?
        .to_string();
    let text_bytes = &data[nul + 1..];
    if text_bytes.is_empty() {
        return Err("tEXt chunk text is empty".to_string());
    }
    let raw = std::str::from_utf8(text_bytes).map_err(|e| format!("tEXt text is not UTF-8: {e}"))?;
    let text = decode_card_text(&keyword, raw);
    Ok((keyword, text))
}

// iTXt payload: keyword, NUL, compression flag, compression method,
// language tag, NUL, translated keyword, NUL, text.
fn parse_itxt_chunk(data: &[u8]) -> Result<(String, String), String> {
    if data.len() < 6 {
        return Err("iTXt chunk data too short".to_string());
    }
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| "iTXt chunk missing keyword separator".to_string())?;
    if nul == 0 {
        return Err("iTXt chunk keyword is empty".to_string());
    }
    let keyword = std::str::from_utf8(&data[..nul])
        .map_err(|e| format!("iTXt keyword is not UTF-8: {e}"))?
        .to_string();

    let mut offset = nul + 1;
    if offset + 1 >= data.len() {
        return Err("iTXt chunk missing compression information".to_string());
    }
    offset += 2; // compression flag + compression method
    if let Some(pos) = data[offset..].iter().position(|&b| b == 0) {
        offset += pos + 1; // language tag
    }
    if let Some(pos) = data[offset..].iter().position(|&b| b == 0) {
        offset += pos + 1; // translated keyword
    }
    if offset >= data.len() {
        return Err("iTXt chunk text is empty".to_string());
    }
    let raw =
        std::str::from_utf8(&data[offset..]).map_err(|e| format!("iTXt text is not UTF-8: {e}"))?;
    let text = decode_card_text(&keyword, raw);
    Ok((keyword, text))
}

/// Scans the PNG chunk stream and returns the decoded text of the first
/// metadata chunk. The buffer itself is never modified.
pub fn extract_card_payload(buffer: &[u8]) -> Result<String, FormatError> {
    check_signature(buffer)?;

    let mut candidates: Vec<(String, String)> = Vec::new();
    let mut terminator_seen = false;
    let mut offset = 8usize;

    while offset < buffer.len() {
        let Some((chunk_type, data, stored_crc, next)) = read_chunk(buffer, offset) else {
            return Err(FormatError::MissingTerminator);
        };

        if chunk_type == IEND_CHUNK {
            terminator_seen = true;
            break;
        }

        let is_text = chunk_type == TEXT_CHUNK || chunk_type == ITXT_CHUNK;
        if chunk_crc(&chunk_type, data) != stored_crc {
            // A corrupt metadata chunk must never be silently misread. Other
            // tools write imperfect CRCs on ancillary chunks, so those are
            // tolerated.
            if is_text && keyword_of(data).is_some_and(|k| is_card_keyword(&k)) {
                return Err(FormatError::InvalidChunkCrc);
            }
            warn!(
                chunk_type = %String::from_utf8_lossy(&chunk_type),
                "chunk CRC mismatch, tolerating"
            );
        }

        if chunk_type == TEXT_CHUNK {
            match parse_text_chunk(data) {
                Ok(pair) => candidates.push(pair),
                Err(reason) => warn!(%reason, "skipping malformed tEXt chunk"),
            }
        } else if chunk_type == ITXT_CHUNK {
            match parse_itxt_chunk(data) {
                Ok(pair) => candidates.push(pair),
                Err(reason) => warn!(%reason, "skipping malformed iTXt chunk"),
            }
        }

        offset = next;
    }

    if !terminator_seen {
        return Err(FormatError::MissingTerminator);
    }

    candidates
        .into_iter()
        .find(|(keyword, _)| is_card_keyword(keyword))
        .map(|(_, text)| text)
        .ok_or(FormatError::NoCardData)
}

/// Decodes the embedded card of a PNG buffer into a document.
pub fn decode_card(buffer: &[u8]) -> Result<CharacterCard, FormatError> {
    let payload = extract_card_payload(buffer)?;
    parse_json_card(&payload)
}

fn build_text_chunk(keyword: &str, text: &str) -> Vec<u8> {
    let encoded = base64_standard.encode(text);
    let mut data = Vec::with_capacity(keyword.len() + 1 + encoded.len());
    data.extend_from_slice(keyword.as_bytes());
    data.push(0);
    data.extend_from_slice(encoded.as_bytes());

    let mut chunk = Vec::with_capacity(12 + data.len());
    chunk.extend_from_slice(&(data.len() as u32).to_be_bytes());
    chunk.extend_from_slice(&TEXT_CHUNK);
    chunk.extend_from_slice(&data);
    chunk.extend_from_slice(&chunk_crc(&TEXT_CHUNK, &data).to_be_bytes());
    chunk
}

/// Produces a new PNG buffer with `card` embedded as the single metadata
/// chunk, spliced immediately before IEND.
///
/// With `preserve_text_chunks` unset, all pre-existing text chunks are
/// stripped along with eXIf (legacy producers stashed card payloads there);
/// when set, text chunks whose keyword does not match the metadata predicate
/// are carried through. There is never more than one metadata chunk in the
/// output.
pub fn embed_card(
    original: &[u8],
    card: &CharacterCard,
    preserve_text_chunks: bool,
) -> Result<Vec<u8>, CardError> {
    check_signature(original)?;

    let normalized = card.normalized();
    let payload = serde_json::to_string(&normalized)?;

    let mut retained: Vec<&[u8]> = Vec::new();
    let mut iend: Option<&[u8]> = None;
    let mut offset = 8usize;

    while offset < original.len() {
        let Some(length) = read_u32_be(original, offset) else {
            break;
        };
        let length = length as usize;
        let Some(type_bytes) = original.get(offset + 4..offset + 8) else {
            break;
        };
        let chunk_type = [type_bytes[0], type_bytes[1], type_bytes[2], type_bytes[3]];

        if chunk_type == IEND_CHUNK {
            // IEND: length(4) + type(4) + data(0) + CRC(4) = 12 bytes.
            iend = original.get(offset..offset + 12);
            break;
        }

        // Chunks whose declared length overruns the buffer are dropped along
        // with everything after them.
        let Some(chunk) = original.get(offset..offset + 12 + length) else {
            break;
        };
        let data = &chunk[8..8 + length];
        offset += 12 + length;

        let is_text =
            chunk_type == TEXT_CHUNK || chunk_type == ITXT_CHUNK || chunk_type == ZTXT_CHUNK;
        if is_text {
            if !preserve_text_chunks {
                continue;
            }
            if keyword_of(data).is_some_and(|k| is_card_keyword(&k)) {
                continue;
            }
        } else if chunk_type == EXIF_CHUNK && !preserve_text_chunks {
            continue;
        }

        retained.push(chunk);
    }

    let iend = iend.ok_or(FormatError::MissingTerminator)?;
    let card_chunk = build_text_chunk(CARD_KEYWORD, &payload);

    let mut out = Vec::with_capacity(8 + card_chunk.len() + original.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    for chunk in retained {
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&card_chunk);
    out.extend_from_slice(iend);

    verify_embedded_card(&out)?;
    Ok(out)
}

// Post-build invariants: intact signature, trailing IEND, exactly one
// metadata chunk whose payload re-parses as a valid card.
fn verify_embedded_card(buffer: &[u8]) -> Result<(), EncodeError> {
    if buffer.len() < 8 || buffer[..8] != PNG_SIGNATURE {
        return Err(EncodeError::SelfCheckFailed(
            "output signature is corrupt".to_string(),
        ));
    }
    if buffer.len() < 20 || buffer[buffer.len() - 8..buffer.len() - 4] != IEND_CHUNK {
        return Err(EncodeError::SelfCheckFailed(
            "output does not end with an IEND chunk".to_string(),
        ));
    }

    let mut card_chunks = 0usize;
    let mut offset = 8usize;
    while offset < buffer.len() {
        let Some((chunk_type, data, _stored_crc, next)) = read_chunk(buffer, offset) else {
            return Err(EncodeError::SelfCheckFailed(
                "output chunk stream is truncated".to_string(),
            ));
        };
        if chunk_type == IEND_CHUNK {
            break;
        }

        let is_textual = chunk_type == TEXT_CHUNK
            || chunk_type == ITXT_CHUNK
            || chunk_type == ZTXT_CHUNK;
        if is_textual && keyword_of(data).is_some_and(|k| is_card_keyword(&k)) {
            card_chunks += 1;
            let parsed = match chunk_type {
                TEXT_CHUNK => parse_text_chunk(data),
                ITXT_CHUNK => parse_itxt_chunk(data),
                _ => Err("compressed card chunk in output".to_string()),
            };
            match parsed {
                Ok((_, text)) if parse_json_card(&text).is_ok() => {}
                _ => {
                    return Err(EncodeError::SelfCheckFailed(
                        "embedded card payload does not re-parse".to_string(),
                    ));
                }
            }
        }
        offset = next;
    }

    if card_chunks != 1 {
        return Err(EncodeError::SelfCheckFailed(format!(
            "expected exactly one card chunk in output, found {card_chunks}"
        )));
    }
    Ok(())
}
