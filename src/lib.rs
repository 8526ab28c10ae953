pub mod errors;
pub mod logging;
pub mod models;
pub mod services;

// Re-export the collaborator surface so callers can stay off the module
// paths.
pub use errors::{CardError, EncodeError, FormatError};
pub use models::card::{CardData, CharacterBook, CharacterBookEntry, CharacterCard};
pub use models::fields::{fields_to_titles, CardField, CORE_FIELDS};
pub use models::tasks::{ConversionTask, RangeKind, TaskGroup, TaskRange};
pub use services::backfill::backfill_task_result;
pub use services::card_parser::{parse_card_file, parse_json_card, ParsedCardFile, SourceFormat};
pub use services::exporter::{export_document, export_json, ExportedDocument};
pub use services::png_codec::{decode_card, embed_card, extract_card_payload};
pub use services::prompts::{build_conversion_prompt, OrientationTarget};
pub use services::segmenter::{count_card_chars, generate_task_groups};
