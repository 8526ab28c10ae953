// src/services/segmenter.rs
//
// Turns a card into an ordered list of bounded work units. Pure function of
// the document: loading a new card regenerates the groups from scratch.

use tracing::debug;

use crate::models::card::CharacterCard;
use crate::models::fields::{render_book_entry, CardField, CORE_FIELDS};
use crate::models::tasks::{ConversionTask, RangeKind, TaskGroup, TaskRange};

/// Any one of these three size signals forces segmented mode on its own.
const CHAR_THRESHOLD: usize = 3500;
const WORLD_BOOK_THRESHOLD: usize = 8;
const ALTERNATE_GREETINGS_THRESHOLD: usize = 5;

const GREETING_BATCH_SIZE: usize = 5;
const BOOK_BATCH_SIZE: usize = 10;

/// Total tracked content volume in characters: the eight scalar fields plus
/// every alternate greeting plus every book entry's content and keys.
pub fn count_card_chars(card: &CharacterCard) -> usize {
    let data = &card.data;
    let mut count = data.description.chars().count()
        + data.personality.chars().count()
        + data.scenario.chars().count()
        + data.first_mes.chars().count()
        + data.mes_example.chars().count()
        + data.creator_notes.chars().count()
        + data.system_prompt.chars().count()
        + data.post_history_instructions.chars().count();

    for greeting in &data.alternate_greetings {
        count += greeting.chars().count();
    }

    if let Some(book) = &data.character_book {
        for entry in &book.entries {
            count += entry.content.chars().count();
            for key in &entry.keys {
                count += key.chars().count();
            }
        }
    }

    count
}

fn should_segment(card: &CharacterCard) -> bool {
    let char_count = count_card_chars(card);
    let book_count = card
        .data
        .character_book
        .as_ref()
        .map_or(0, |book| book.entries.len());
    let greeting_count = card.data.alternate_greetings.len();

    char_count > CHAR_THRESHOLD
        || book_count > WORLD_BOOK_THRESHOLD
        || greeting_count > ALTERNATE_GREETINGS_THRESHOLD
}

// Sequential ids: tasks number globally, groups by emission order.
struct TaskIds {
    task: usize,
    group: usize,
}

impl TaskIds {
    fn new() -> Self {
        Self { task: 1, group: 1 }
    }

    fn next_task(&mut self) -> String {
        let id = format!("task-{}", self.task);
        self.task += 1;
        id
    }

    fn current_group(&self) -> String {
        format!("group-{}", self.group)
    }

    fn advance_group(&mut self) {
        self.group += 1;
    }
}

fn section(field: CardField, content: &str) -> String {
    format!("### 【{}】\n{}", field.title(), content)
}

/// Derives the ordered work groups for a card.
pub fn generate_task_groups(card: &CharacterCard) -> Vec<TaskGroup> {
    let segmented = should_segment(card);
    debug!(segmented, "generating task groups");

    if !segmented {
        return vec![whole_card_group(card)];
    }

    let data = &card.data;
    let mut ids = TaskIds::new();
    let mut groups: Vec<TaskGroup> = Vec::new();

    // Core settings.
    let mut core_fields = Vec::new();
    let mut core_content = Vec::new();
    for field in CORE_FIELDS {
        let text = field.extract(data);
        if !text.is_empty() {
            core_fields.push(field);
            core_content.push(section(field, &text));
        }
    }
    if !core_fields.is_empty() {
        push_single_task_group(
            &mut groups,
            &mut ids,
            "核心设定",
            core_fields,
            core_content.join("\n\n"),
        );
    }

    // Primary greeting.
    let first_mes = CardField::FirstMes.extract(data);
    if !first_mes.is_empty() {
        push_single_task_group(
            &mut groups,
            &mut ids,
            "主开场白",
            vec![CardField::FirstMes],
            section(CardField::FirstMes, &first_mes),
        );
    }

    // Example dialogue, creator notes, post-history instructions.
    let mut other_fields = Vec::new();
    let mut other_content = Vec::new();
    for field in [
        CardField::MesExample,
        CardField::CreatorNotes,
        CardField::PostHistoryInstructions,
    ] {
        let text = field.extract(data);
        if !text.is_empty() {
            other_fields.push(field);
            other_content.push(section(field, &text));
        }
    }
    if !other_fields.is_empty() {
        push_single_task_group(
            &mut groups,
            &mut ids,
            "其他字段",
            other_fields,
            other_content.join("\n\n"),
        );
    }

    // Alternate greetings, batches of at most 5, absolute 1-based titles.
    if !data.alternate_greetings.is_empty() {
        let mut tasks = Vec::new();
        for (batch_idx, batch) in data
            .alternate_greetings
            .chunks(GREETING_BATCH_SIZE)
            .enumerate()
        {
            let start = batch_idx * GREETING_BATCH_SIZE + 1;
            let end = start + batch.len() - 1;
            let content = batch
                .iter()
                .enumerate()
                .map(|(i, greeting)| format!("### 【备用开场白{}】\n{}", start + i, greeting))
                .collect::<Vec<_>>()
                .join("\n\n");
            tasks.push(ConversionTask {
                id: ids.next_task(),
                group_id: ids.current_group(),
                group_name: "备用开场白".to_string(),
                fields: vec![CardField::AlternateGreetings],
                content,
                completed: false,
                result: None,
                range: Some(TaskRange {
                    start,
                    end,
                    kind: RangeKind::AlternateGreetings,
                }),
            });
        }
        groups.push(TaskGroup {
            id: ids.current_group(),
            name: "备用开场白".to_string(),
            tasks,
            completed: false,
        });
        ids.advance_group();
    }

    // Knowledge book, batches of at most 10.
    if let Some(book) = data.character_book.as_ref().filter(|b| !b.entries.is_empty()) {
        let mut tasks = Vec::new();
        for (batch_idx, batch) in book.entries.chunks(BOOK_BATCH_SIZE).enumerate() {
            let start = batch_idx * BOOK_BATCH_SIZE + 1;
            let end = start + batch.len() - 1;
            let content = batch
                .iter()
                .enumerate()
                .map(|(i, entry)| render_book_entry(start + i, entry))
                .collect::<Vec<_>>()
                .join("\n\n");
            tasks.push(ConversionTask {
                id: ids.next_task(),
                group_id: ids.current_group(),
                group_name: "世界观/知识库".to_string(),
                fields: vec![CardField::CharacterBook],
                content,
                completed: false,
                result: None,
                range: Some(TaskRange {
                    start,
                    end,
                    kind: RangeKind::WorldBook,
                }),
            });
        }
        groups.push(TaskGroup {
            id: ids.current_group(),
            name: "世界观/知识库".to_string(),
            tasks,
            completed: false,
        });
        ids.advance_group();
    }

    groups
}

fn push_single_task_group(
    groups: &mut Vec<TaskGroup>,
    ids: &mut TaskIds,
    name: &str,
    fields: Vec<CardField>,
    content: String,
) {
    let task = ConversionTask {
        id: ids.next_task(),
        group_id: ids.current_group(),
        group_name: name.to_string(),
        fields,
        content,
        completed: false,
        result: None,
        range: None,
    };
    groups.push(TaskGroup {
        id: ids.current_group(),
        name: name.to_string(),
        tasks: vec![task],
        completed: false,
    });
    ids.advance_group();
}

// Everything in one unit, fields in document order.
fn whole_card_group(card: &CharacterCard) -> TaskGroup {
    let data = &card.data;
    let ordered = [
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
    ];

    let mut fields = Vec::new();
    let mut content = Vec::new();
    for field in ordered {
        let text = field.extract(data);
        if !text.is_empty() {
            fields.push(field);
            content.push(section(field, &text));
        }
    }

    let task = ConversionTask {
        id: "task-1".to_string(),
        group_id: "group-1".to_string(),
        group_name: "全部内容".to_string(),
        fields,
        content: content.join("\n\n"),
        completed: false,
        result: None,
        range: None,
    };
    TaskGroup {
        id: "group-1".to_string(),
        name: "全部内容".to_string(),
        tasks: vec![task],
        completed: false,
    }
}
