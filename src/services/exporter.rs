// src/services/exporter.rs
//
// Serializes a document back out, either as compact JSON text or as a PNG
// buffer with the metadata chunk replaced.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::errors::CardError;
use crate::models::card::CharacterCard;
use crate::services::card_parser::SourceFormat;
use crate::services::png_codec;

static FILE_EXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(png|json)$").expect("valid extension regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Compact JSON serialization of the normalized document. UTF-8, no BOM.
pub fn export_json(card: &CharacterCard) -> Result<String, CardError> {
    Ok(serde_json::to_string(&card.normalized())?)
}

/// Re-exports a document in its source format. A PNG export needs the
/// original container bytes; without them the export degrades to JSON.
pub fn export_document(
    card: &CharacterCard,
    source_format: SourceFormat,
    source_bytes: Option<&[u8]>,
    source_name: Option<&str>,
) -> Result<ExportedDocument, CardError> {
    if source_format == SourceFormat::Png {
        if let Some(original) = source_bytes {
            let bytes = png_codec::embed_card(original, card, false)?;
            let file_name = derive_file_name(source_name, card, "png");
            info!(file = %file_name, "exported character card as PNG");
            return Ok(ExportedDocument { file_name, bytes });
        }
    }

    let json = export_json(card)?;
    let file_name = derive_file_name(source_name, card, "json");
    info!(file = %file_name, "exported character card as JSON");
    Ok(ExportedDocument {
        file_name,
        bytes: json.into_bytes(),
    })
}

// Substitute the original extension, or synthesize from the card name when
// no source file name is known.
fn derive_file_name(source_name: Option<&str>, card: &CharacterCard, ext: &str) -> String {
    match source_name {
        Some(name) => FILE_EXT_RE.replace(name, format!(".{ext}")).into_owned(),
        None => {
            let base = card.data.name.as_deref().filter(|n| !n.is_empty());
            format!("{}_converted.{ext}", base.unwrap_or("character"))
        }
    }
}
