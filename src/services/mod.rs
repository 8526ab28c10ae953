pub mod backfill;
pub mod card_parser;
pub mod exporter;
pub mod png_codec;
pub mod prompts;
pub mod segmenter;

pub use backfill::backfill_task_result;
pub use card_parser::{parse_card_file, parse_json_card, ParsedCardFile, SourceFormat};
pub use exporter::{export_document, export_json, ExportedDocument};
pub use png_codec::{decode_card, embed_card, extract_card_payload};
pub use prompts::{build_conversion_prompt, OrientationTarget};
pub use segmenter::{count_card_chars, generate_task_groups};
