// src/models/card.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Canonical discriminator pair forced onto every exported card.
pub const CARD_SPEC: &str = "chara_card_v2";
pub const CARD_SPEC_VERSION: &str = "2.0";

// Main Character Card Structure (V2)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CharacterCard {
    #[serde(default)] // Use default for spec fields if missing in JSON
    pub spec: String,
    #[serde(default)]
    pub spec_version: String,
    #[serde(default)] // Uses Default impl of CardData
    pub data: CardData,
}

// Character Card Data Payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CardData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)] // Use default empty string if missing
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub first_mes: String,
    #[serde(default)]
    pub mes_example: String,
    #[serde(default)]
    pub creator_notes: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub post_history_instructions: String,
    #[serde(default)]
    pub alternate_greetings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_book: Option<CharacterBook>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub character_version: String,
    #[serde(default)]
    pub extensions: Map<String, Value>,
    // Anything the card carries beyond the modeled fields must survive a
    // decode -> encode round trip untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CharacterBook {
    #[serde(default)]
    pub entries: Vec<CharacterBookEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CharacterBookEntry {
    #[serde(default, deserialize_with = "keys_from_scalar_or_list")]
    pub keys: Vec<String>,
    #[serde(default, deserialize_with = "content_as_string")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_order: Option<i64>,
    // comment, id, priority, position, extensions, ... pass through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CharacterCard {
    /// Canonicalization pass applied before every serialization.
    ///
    /// Pure: returns a new card, the input is never mutated.
    pub fn normalized(&self) -> CharacterCard {
        let mut card = self.clone();

        // The top-level discriminator is authoritative. Some producers stash a
        // second copy inside `data`; drop it so there is exactly one.
        card.spec = CARD_SPEC.to_string();
        card.spec_version = CARD_SPEC_VERSION.to_string();
        card.data.extra.remove("spec");
        card.data.extra.remove("spec_version");

        if let Some(book) = card.data.character_book.as_mut() {
            for (idx, entry) in book.entries.iter_mut().enumerate() {
                entry.enabled.get_or_insert(true);
                if entry.insertion_order.is_none() {
                    entry.insertion_order = Some(idx as i64);
                }
            }
        }

        card
    }
}

// Other tools emit `keys` as a bare string, a mixed array, or not at all.
fn keys_from_scalar_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}

fn content_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_keys_scalar_is_wrapped() {
        let entry: CharacterBookEntry =
            serde_json::from_str(r#"{"keys": "dragon", "content": "fire"}"#).unwrap();
        assert_eq!(entry.keys, vec!["dragon".to_string()]);
        assert_eq!(entry.content, "fire");
    }

    #[test]
    fn test_entry_keys_and_content_absent_default_empty() {
        let entry: CharacterBookEntry = serde_json::from_str("{}").unwrap();
        assert!(entry.keys.is_empty());
        assert!(entry.content.is_empty());
        assert!(entry.enabled.is_none());
        assert!(entry.insertion_order.is_none());
    }

    #[test]
    fn test_entry_null_content_coerced_to_empty_string() {
        let entry: CharacterBookEntry =
            serde_json::from_str(r#"{"keys": null, "content": null}"#).unwrap();
        assert!(entry.keys.is_empty());
        assert_eq!(entry.content, "");
    }

    #[test]
    fn test_entry_passthrough_attributes_survive_round_trip() {
        let raw = r#"{
            "keys": ["a"],
            "content": "c",
            "enabled": false,
            "insertion_order": 3,
            "comment": "note",
            "id": 7,
            "priority": 100,
            "extensions": {"depth": 4}
        }"#;
        let entry: CharacterBookEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.extra.get("comment"), Some(&Value::from("note")));
        assert_eq!(entry.extra.get("id"), Some(&Value::from(7)));

        let reencoded = serde_json::to_value(&entry).unwrap();
        let original: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(reencoded, original);
    }

    #[test]
    fn test_normalized_forces_discriminator_and_entry_defaults() {
        let card: CharacterCard = serde_json::from_str(
            r#"{
                "spec": "chara_card_v3",
                "spec_version": "3.0",
                "data": {
                    "name": "Test",
                    "spec": "chara_card_v3",
                    "spec_version": "3.0",
                    "character_book": {
                        "entries": [
                            {"keys": ["k"], "content": "c"},
                            {"keys": [], "content": "", "enabled": false, "insertion_order": 9}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        let normalized = card.normalized();
        assert_eq!(normalized.spec, CARD_SPEC);
        assert_eq!(normalized.spec_version, CARD_SPEC_VERSION);
        assert!(!normalized.data.extra.contains_key("spec"));
        assert!(!normalized.data.extra.contains_key("spec_version"));

        let entries = &normalized.data.character_book.as_ref().unwrap().entries;
        assert_eq!(entries[0].enabled, Some(true));
        assert_eq!(entries[0].insertion_order, Some(0));
        // Explicit values are never overwritten.
        assert_eq!(entries[1].enabled, Some(false));
        assert_eq!(entries[1].insertion_order, Some(9));

        // The input card is untouched.
        assert_eq!(card.spec, "chara_card_v3");
    }

    #[test]
    fn test_normalized_preserves_unknown_data_attributes() {
        let card: CharacterCard = serde_json::from_str(
            r#"{"spec": "chara_card_v2", "spec_version": "2.0",
                "data": {"name": "X", "custom_field": [1, 2, 3]}}"#,
        )
        .unwrap();
        let normalized = card.normalized();
        assert_eq!(
            normalized.data.extra.get("custom_field"),
            Some(&serde_json::json!([1, 2, 3]))
        );
    }
}
