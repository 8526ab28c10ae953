// src/services/backfill.rs
//
// Maps an externally-edited result string back onto the document. Backfill
// is deliberately lenient: a result that lost its markers degrades to
// best-effort recovery instead of failing, and anything that cannot be
// positively matched is left untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::card::{CharacterBook, CharacterBookEntry, CharacterCard};
use crate::models::fields::CardField;
use crate::models::tasks::{ConversionTask, RangeKind, TaskRange};

static TITLE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"###\s*【([^】]+)】").expect("valid marker regex"));
static LEADING_BLANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\n+").expect("valid leading-blank regex"));
static TRAILING_BLANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n+\s*$").expect("valid trailing-blank regex"));
static STRAY_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^###\s*【[^】]+】\s*").expect("valid stray-marker regex"));
static GREETING_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"备用开场白(\d+)").expect("valid greeting-title regex"));
static ENTRY_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"世界书条目(\d+)").expect("valid entry-title regex"));
static ENTRY_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^###\s*【世界书条目\d+】\s*").expect("valid entry-marker regex"));
static KEYS_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*关键词\*\*:\s*(.+?)(?:\n|$)").expect("valid keys-line regex"));
static BLANK_LINE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\n+").expect("valid blank-line regex"));

/// Fallback titles used when the result carries no markers at all.
const WORLD_BOOK_TITLE: &str = "世界书";
const WORLD_BOOK_GROUP_TITLE: &str = "世界观/知识库";
const RAW_CONTENT_TITLE: &str = "原始内容";

// Title -> section text, preserving first-seen order (the degraded
// world-book path takes the first non-empty section).
#[derive(Debug, Default)]
struct SectionMap(Vec<(String, String)>);

impl SectionMap {
    fn insert(&mut self, title: String, content: String) {
        if let Some(slot) = self.0.iter_mut().find(|(t, _)| *t == title) {
            slot.1 = content;
        } else {
            self.0.push((title, content));
        }
    }

    fn get(&self, title: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, c)| c.as_str())
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(t, c)| (t.as_str(), c.as_str()))
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Splits the result on `### 【title】` markers; everything the external
// editor wrote outside the marked sections is discarded.
fn extract_marked_content(result: &str) -> SectionMap {
    let mut sections = SectionMap::default();

    let markers: Vec<(usize, usize, String)> = TITLE_MARKER_RE
        .captures_iter(result)
        .map(|cap| {
            let whole = cap.get(0).expect("regex group 0 always present");
            (whole.start(), whole.end(), cap[1].trim().to_string())
        })
        .collect();

    if markers.is_empty() {
        let trimmed = result.trim();
        if !trimmed.is_empty() {
            if result.contains("世界书条目") {
                sections.insert(WORLD_BOOK_TITLE.to_string(), trimmed.to_string());
            } else {
                sections.insert(RAW_CONTENT_TITLE.to_string(), trimmed.to_string());
            }
        }
        return sections;
    }

    for i in 0..markers.len() {
        let (_, content_start, title) = &markers[i];
        let content_end = markers
            .get(i + 1)
            .map(|m| m.0)
            .unwrap_or_else(|| result.len());

        let mut content = result[*content_start..content_end].to_string();
        content = LEADING_BLANK_RE.replace(&content, "").into_owned();
        content = TRAILING_BLANK_RE.replace(&content, "").into_owned();
        // Editors sometimes echo the marker line again inside the section.
        content = STRAY_MARKER_RE.replace(&content, "").into_owned();

        sections.insert(title.clone(), content);
    }

    sections
}

// Optional leading `**关键词**: a, b` line -> (keys, remaining content).
fn split_keys_line(content: &str) -> (Vec<String>, String) {
    match KEYS_LINE_RE.captures(content) {
        Some(cap) => {
            let keys = cap[1]
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            let body = KEYS_LINE_RE.replace(content, "").trim().to_string();
            (keys, body)
        }
        None => (Vec::new(), content.trim().to_string()),
    }
}

fn recover_greetings(sections: &SectionMap) -> Vec<String> {
    let mut numbered: Vec<(usize, String)> = Vec::new();
    for (title, content) in sections.iter() {
        if let Some(cap) = GREETING_TITLE_RE.captures(title) {
            if let Ok(index) = cap[1].parse::<usize>() {
                numbered.push((index, content.trim().to_string()));
            }
        }
    }
    numbered.sort_by_key(|(index, _)| *index);

    if !numbered.is_empty() {
        return numbered.into_iter().map(|(_, text)| text).collect();
    }

    // No numbered titles: fall back to a single unnumbered section split on
    // blank-line runs.
    match sections.get(CardField::AlternateGreetings.title()) {
        Some(text) => BLANK_LINE_SPLIT_RE
            .split(text)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

#[derive(Debug)]
struct RecoveredEntry {
    /// Absolute 1-based entry index parsed from the section title.
    index: usize,
    keys: Vec<String>,
    content: String,
}

fn recover_book_entries(sections: &SectionMap, range: Option<TaskRange>) -> Vec<RecoveredEntry> {
    let mut entries: Vec<RecoveredEntry> = Vec::new();

    for (title, content) in sections.iter() {
        let Some(cap) = ENTRY_TITLE_RE.captures(title) else {
            continue;
        };
        let Ok(index) = cap[1].parse::<usize>() else {
            continue;
        };
        let (keys, mut body) = split_keys_line(content);
        body = ENTRY_MARKER_RE.replace(&body, "").trim().to_string();
        if body.is_empty() {
            body = content.trim().to_string();
        }
        entries.push(RecoveredEntry {
            index,
            keys,
            content: body,
        });
    }

    // Degraded path: no per-entry markers survived, but the unit's range
    // tells us which entries the text was meant for.
    if entries.is_empty() {
        if let Some(range) = range {
            let source = sections
                .get(WORLD_BOOK_TITLE)
                .or_else(|| sections.get(WORLD_BOOK_GROUP_TITLE))
                .or_else(|| sections.get(RAW_CONTENT_TITLE));
            if let Some(text) = source {
                if range.start == range.end {
                    let (keys, body) = split_keys_line(text.trim());
                    entries.push(RecoveredEntry {
                        index: range.start,
                        keys,
                        content: body,
                    });
                } else {
                    for (offset, part) in BLANK_LINE_SPLIT_RE.split(text).enumerate() {
                        let part = part.trim();
                        if part.is_empty() {
                            continue;
                        }
                        let index = range.start + offset;
                        if index > range.end {
                            continue;
                        }
                        let (keys, body) = split_keys_line(part);
                        entries.push(RecoveredEntry {
                            index,
                            keys,
                            content: body,
                        });
                    }
                }
            }
        }
    }

    entries.sort_by_key(|entry| entry.index);
    entries
}

fn apply_greetings(card: &mut CharacterCard, task: &ConversionTask, sections: &SectionMap) {
    let recovered = recover_greetings(sections);
    if recovered.is_empty() {
        return;
    }

    match task.range {
        Some(range) if range.kind == RangeKind::AlternateGreetings => {
            let list = &mut card.data.alternate_greetings;
            let original_len = list.len();
            let start_idx = range.start.saturating_sub(1);
            for (offset, text) in recovered.into_iter().enumerate() {
                let target = start_idx + offset;
                if target < original_len {
                    list[target] = text;
                } else {
                    list.push(text);
                }
            }
        }
        _ => card.data.alternate_greetings = recovered,
    }
}

fn apply_book_entries(card: &mut CharacterCard, task: &ConversionTask, sections: &SectionMap) {
    let range = task
        .range
        .filter(|range| range.kind == RangeKind::WorldBook);
    let mut recovered = recover_book_entries(sections, range);

    // Last resort for a single-entry unit: accept the first non-empty
    // section as that entry's content.
    if recovered.is_empty() && !sections.is_empty() {
        if let Some(range) = range {
            if range.start == range.end {
                for (_, content) in sections.iter() {
                    let trimmed = content.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let (keys, body) = split_keys_line(trimmed);
                    recovered.push(RecoveredEntry {
                        index: range.start,
                        keys,
                        content: body,
                    });
                    break;
                }
            }
        }
    }

    if recovered.is_empty() {
        return;
    }

    let book = card
        .data
        .character_book
        .get_or_insert_with(CharacterBook::default);
    let original_len = book.entries.len();

    for entry in recovered {
        if let Some(range) = range {
            if entry.index < range.start || entry.index > range.end {
                continue;
            }
        }
        let Some(target) = entry.index.checked_sub(1) else {
            continue;
        };
        if target < original_len {
            // Only keys and content change; every other attribute of the
            // existing entry stays as it was.
            book.entries[target].keys = entry.keys;
            book.entries[target].content = entry.content;
        } else if target == original_len {
            let insertion_order = book.entries.len() as i64;
            book.entries.push(CharacterBookEntry {
                keys: entry.keys,
                content: entry.content,
                enabled: Some(true),
                insertion_order: Some(insertion_order),
                extra: Default::default(),
            });
        }
        // Indices past a single append are unmatchable; dropped.
    }
}

/// Merges an externally-produced result string into a copy of the document.
/// Only the unit's fields (and, for range units, only the addressed slice)
/// are touched; the input card is never mutated.
pub fn backfill_task_result(
    card: &CharacterCard,
    task: &ConversionTask,
    result: &str,
) -> CharacterCard {
    let mut updated = card.clone();
    let sections = extract_marked_content(result);
    debug!(task = %task.id, sections = sections.0.len(), "backfilling task result");

    for field in &task.fields {
        match field {
            CardField::AlternateGreetings => apply_greetings(&mut updated, task, &sections),
            CardField::CharacterBook => apply_book_entries(&mut updated, task, &sections),
            scalar => {
                let content = sections.get(scalar.title()).or_else(|| {
                    // Marker-free degraded path, single-field units only.
                    if task.fields.len() == 1 && task.range.is_none() {
                        sections.get(RAW_CONTENT_TITLE)
                    } else {
                        None
                    }
                });
                if let Some(content) = content {
                    scalar.set_scalar(&mut updated.data, content);
                }
            }
        }
    }

    updated
}
