// src/models/fields.rs
//
// Closed registry of the card fields the segmentation/backfill protocol knows
// about. Field identifiers arriving from outside are resolved through
// `CardField::from_name` and rejected when unknown; nothing in the crate reads
// card fields through arbitrary string keys.

use serde::{Deserialize, Serialize};

use crate::models::card::{CardData, CharacterBookEntry};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardField {
    Description,
    Personality,
    Scenario,
    SystemPrompt,
    FirstMes,
    MesExample,
    CreatorNotes,
    PostHistoryInstructions,
    AlternateGreetings,
    CharacterBook,
}

/// The four fields that make up the "core settings" work group.
pub const CORE_FIELDS: [CardField; 4] = [
    CardField::Description,
    CardField::Personality,
    CardField::Scenario,
    CardField::SystemPrompt,
];

impl CardField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardField::Description => "description",
            CardField::Personality => "personality",
            CardField::Scenario => "scenario",
            CardField::SystemPrompt => "system_prompt",
            CardField::FirstMes => "first_mes",
            CardField::MesExample => "mes_example",
            CardField::CreatorNotes => "creator_notes",
            CardField::PostHistoryInstructions => "post_history_instructions",
            CardField::AlternateGreetings => "alternate_greetings",
            CardField::CharacterBook => "character_book",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "description" => CardField::Description,
            "personality" => CardField::Personality,
            "scenario" => CardField::Scenario,
            "system_prompt" => CardField::SystemPrompt,
            "first_mes" => CardField::FirstMes,
            "mes_example" => CardField::MesExample,
            "creator_notes" => CardField::CreatorNotes,
            "post_history_instructions" => CardField::PostHistoryInstructions,
            "alternate_greetings" => CardField::AlternateGreetings,
            "character_book" => CardField::CharacterBook,
            _ => return None,
        })
    }

    /// Section title used in work-unit content and recognized by backfill.
    pub fn title(&self) -> &'static str {
        match self {
            CardField::Description => "角色描述",
            CardField::Personality => "性格设定",
            CardField::Scenario => "场景设定",
            CardField::SystemPrompt => "系统提示词",
            CardField::FirstMes => "开场白",
            CardField::MesExample => "消息示例",
            CardField::CreatorNotes => "创作者笔记",
            CardField::PostHistoryInstructions => "历史后处理",
            CardField::AlternateGreetings => "备用开场白",
            CardField::CharacterBook => "世界书",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            CardField::AlternateGreetings | CardField::CharacterBook
        )
    }

    /// Renders this field's text the way work units present it.
    pub fn extract(&self, data: &CardData) -> String {
        match self {
            CardField::Description => data.description.clone(),
            CardField::Personality => data.personality.clone(),
            CardField::Scenario => data.scenario.clone(),
            CardField::SystemPrompt => data.system_prompt.clone(),
            CardField::FirstMes => data.first_mes.clone(),
            CardField::MesExample => data.mes_example.clone(),
            CardField::CreatorNotes => data.creator_notes.clone(),
            CardField::PostHistoryInstructions => data.post_history_instructions.clone(),
            CardField::AlternateGreetings => data.alternate_greetings.join("\n\n"),
            CardField::CharacterBook => data
                .character_book
                .as_ref()
                .map(|book| {
                    book.entries
                        .iter()
                        .enumerate()
                        .map(|(idx, entry)| render_book_entry(idx + 1, entry))
                        .collect::<Vec<_>>()
                        .join("\n\n")
                })
                .unwrap_or_default(),
        }
    }

    /// Writes a scalar field back. Returns false for list-valued fields,
    /// which have their own backfill paths.
    pub fn set_scalar(&self, data: &mut CardData, value: &str) -> bool {
        let slot = match self {
            CardField::Description => &mut data.description,
            CardField::Personality => &mut data.personality,
            CardField::Scenario => &mut data.scenario,
            CardField::SystemPrompt => &mut data.system_prompt,
            CardField::FirstMes => &mut data.first_mes,
            CardField::MesExample => &mut data.mes_example,
            CardField::CreatorNotes => &mut data.creator_notes,
            CardField::PostHistoryInstructions => &mut data.post_history_instructions,
            CardField::AlternateGreetings | CardField::CharacterBook => return false,
        };
        *slot = value.to_string();
        true
    }
}

/// Work-unit rendering of a single knowledge-book entry. `index` is the
/// entry's absolute 1-based position in the book.
pub fn render_book_entry(index: usize, entry: &CharacterBookEntry) -> String {
    format!(
        "### 【世界书条目{}】\n**关键词**: {}\n{}",
        index,
        entry.keys.join(", "),
        entry.content
    )
}

pub fn fields_to_titles(fields: &[CardField]) -> Vec<&'static str> {
    fields.iter().map(CardField::title).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_round_trip() {
        for field in [
            CardField::Description,
            CardField::Personality,
            CardField::Scenario,
            CardField::SystemPrompt,
            CardField::FirstMes,
            CardField::MesExample,
            CardField::CreatorNotes,
            CardField::PostHistoryInstructions,
            CardField::AlternateGreetings,
            CardField::CharacterBook,
        ] {
            assert_eq!(CardField::from_name(field.as_str()), Some(field));
        }
        assert_eq!(CardField::from_name("no_such_field"), None);
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&CardField::PostHistoryInstructions).unwrap();
        assert_eq!(json, "\"post_history_instructions\"");
        let back: CardField = serde_json::from_str("\"mes_example\"").unwrap();
        assert_eq!(back, CardField::MesExample);
    }

    #[test]
    fn test_fields_to_titles_maps_in_order() {
        assert_eq!(
            fields_to_titles(&[CardField::Description, CardField::FirstMes]),
            vec!["角色描述", "开场白"]
        );
    }

    #[test]
    fn test_extract_book_renders_absolute_indices() {
        let data: CardData = serde_json::from_str(
            r#"{"character_book": {"entries": [
                {"keys": ["a", "b"], "content": "first"},
                {"keys": [], "content": "second"}
            ]}}"#,
        )
        .unwrap();
        let rendered = CardField::CharacterBook.extract(&data);
        assert!(rendered.starts_with("### 【世界书条目1】\n**关键词**: a, b\nfirst"));
        assert!(rendered.contains("### 【世界书条目2】\n**关键词**: \nsecond"));
    }
}
