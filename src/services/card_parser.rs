// src/services/card_parser.rs

use base64::{engine::general_purpose::STANDARD as base64_standard, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::errors::FormatError;
use crate::models::card::{CardData, CharacterCard, CARD_SPEC, CARD_SPEC_VERSION};
use crate::services::png_codec;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Png,
    Json,
}

/// A loaded card together with everything needed to export it again.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCardFile {
    pub card: CharacterCard,
    pub source_format: SourceFormat,
    /// Original container bytes, kept for PNG re-export. None for JSON input.
    pub source_bytes: Option<Vec<u8>>,
    pub source_name: String,
}

/// Parses a card file by extension: `.png` goes through the container codec,
/// `.json` straight to the document grammar.
pub fn parse_card_file(name: &str, bytes: &[u8]) -> Result<ParsedCardFile, FormatError> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        let payload = png_codec::extract_card_payload(bytes)?;
        let card = parse_json_card(&payload)?;
        info!(file = %name, "loaded character card from PNG");
        Ok(ParsedCardFile {
            card,
            source_format: SourceFormat::Png,
            source_bytes: Some(bytes.to_vec()),
            source_name: name.to_string(),
        })
    } else if lower.ends_with(".json") {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FormatError::InvalidPayload(format!("card file is not UTF-8: {e}")))?;
        let card = parse_json_card(text)?;
        info!(file = %name, "loaded character card from JSON");
        Ok(ParsedCardFile {
            card,
            source_format: SourceFormat::Json,
            source_bytes: None,
            source_name: name.to_string(),
        })
    } else {
        Err(FormatError::UnsupportedExtension(name.to_string()))
    }
}

/// Parses card text in any of the accepted shapes, normalizing legacy
/// wrappers to the canonical discriminator. A payload that is itself Base64
/// of one of those shapes is decoded exactly once.
pub fn parse_json_card(text: &str) -> Result<CharacterCard, FormatError> {
    parse_json_card_inner(text, false)
}

fn parse_json_card_inner(text: &str, retried: bool) -> Result<CharacterCard, FormatError> {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => classify_card_value(value),
        Err(err) => {
            if !retried && looks_like_base64(trimmed) {
                let bytes = base64_standard.decode(trimmed).map_err(|decode_err| {
                    FormatError::InvalidPayload(format!(
                        "invalid JSON (base64 encoded): {decode_err}"
                    ))
                })?;
                let decoded = String::from_utf8(bytes).map_err(|utf8_err| {
                    FormatError::InvalidPayload(format!(
                        "base64 payload is not UTF-8: {utf8_err}"
                    ))
                })?;
                parse_json_card_inner(&decoded, true)
            } else {
                Err(FormatError::InvalidPayload(format!(
                    "invalid JSON syntax: {err}"
                )))
            }
        }
    }
}

fn classify_card_value(value: Value) -> Result<CharacterCard, FormatError> {
    let Some(obj) = value.as_object() else {
        return Err(FormatError::InvalidPayload(
            "card must be a JSON object".to_string(),
        ));
    };

    let spec = obj.get("spec").and_then(Value::as_str);
    let spec_version = obj.get("spec_version").and_then(Value::as_str);

    // Canonical V2 shape.
    if spec == Some(CARD_SPEC) && spec_version == Some(CARD_SPEC_VERSION) {
        return serde_json::from_value(value)
            .map_err(|e| FormatError::InvalidPayload(e.to_string()));
    }

    // V3 wrapper: the data object carries everything we need.
    if spec == Some("chara_card_v3") {
        if let Some(data) = obj.get("data").filter(|d| d.is_object()) {
            return wrap_data(data.clone());
        }
    }

    // Unversioned wrapper with a recognizable data object.
    if let Some(data) = obj.get("data").filter(|d| has_card_fields(d)) {
        return wrap_data(data.clone());
    }

    // Bare object carrying recognizable top-level fields.
    if has_card_fields(&value) {
        return wrap_data(value);
    }

    Err(FormatError::InvalidPayload(
        "cannot identify card structure".to_string(),
    ))
}

fn has_card_fields(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.contains_key("name")
            || obj.contains_key("description")
            || obj.contains_key("personality")
    })
}

fn wrap_data(data: Value) -> Result<CharacterCard, FormatError> {
    let data: CardData =
        serde_json::from_value(data).map_err(|e| FormatError::InvalidPayload(e.to_string()))?;
    Ok(CharacterCard {
        spec: CARD_SPEC.to_string(),
        spec_version: CARD_SPEC_VERSION.to_string(),
        data,
    })
}

/// Two-stage Base64 classifier. Inherently heuristic: short inputs are
/// ambiguous between a JSON fragment and Base64 text; JSON wins (the caller
/// only reaches this after JSON parsing failed).
pub(crate) fn looks_like_base64(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return false;
    }
    if trimmed.len() < 4 {
        return false;
    }
    let padding = trimmed.chars().rev().take_while(|&c| c == '=').count();
    if padding > 2 {
        return false;
    }
    let body = &trimmed[..trimmed.len() - padding];
    if !body
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
    {
        return false;
    }
    let len = trimmed.len();
    len % 4 == 0 || (len % 4 == 1 && trimmed.ends_with('='))
}
