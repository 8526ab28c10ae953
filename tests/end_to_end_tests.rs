// tests/end_to_end_tests.rs
//
// Full-pipeline coverage: file bytes -> decode -> segment -> backfill ->
// encode -> decode again.

use base64::{engine::general_purpose::STANDARD as base64_standard, Engine as _};

use cardkit::{
    backfill_task_result, decode_card, embed_card, export_document, generate_task_groups,
    parse_card_file, CharacterCard, FormatError, RangeKind, SourceFormat,
};

// --- Test Helpers ---

fn push_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);
    let crc = crc32fast::hash(&[&chunk_type[..], data].concat());
    png.extend_from_slice(&crc.to_be_bytes());
}

fn minimal_png_with_card(json_payload: &str) -> Vec<u8> {
    let mut png = Vec::new();
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);
    push_chunk(&mut png, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
    let encoded = base64_standard.encode(json_payload);
    let text_data = [&b"chara"[..], &[0u8], encoded.as_bytes()].concat();
    push_chunk(&mut png, b"tEXt", &text_data);
    push_chunk(&mut png, b"IDAT", &[8, 29, 99, 96, 0, 0, 0, 3, 0, 1]);
    push_chunk(&mut png, b"IEND", &[]);
    png
}

fn rich_card_json() -> String {
    let greetings: Vec<String> = (1..=12).map(|i| format!("greeting {i}")).collect();
    serde_json::json!({
        "spec": "chara_card_v2",
        "spec_version": "2.0",
        "data": {
            "name": "巫回雁",
            "description": "一个用于端到端测试的角色。",
            "personality": "冷静",
            "scenario": "雨夜的茶馆",
            "first_mes": "你来了。",
            "alternate_greetings": greetings,
            "character_book": {
                "name": "茶馆设定集",
                "entries": [
                    {"keys": ["茶馆"], "content": "茶馆的历史。", "enabled": true,
                     "insertion_order": 0, "comment": "场景", "id": 11,
                     "extensions": {"position": 4}},
                    {"keys": ["老板"], "content": "老板的秘密。", "enabled": false,
                     "insertion_order": 1, "comment": "人物", "id": 12}
                ]
            },
            "custom_top_level": {"nested": [1, 2, 3]}
        }
    })
    .to_string()
}

// --- Tests ---

#[test]
fn test_png_round_trip_equals_normalized_document() {
    let png = minimal_png_with_card(&rich_card_json());
    let card = decode_card(&png).unwrap();

    let rebuilt = embed_card(&png, &card, false).unwrap();
    let decoded = decode_card(&rebuilt).unwrap();
    assert_eq!(decoded, card.normalized());

    // Passthrough attributes survive the full cycle.
    let book = decoded.data.character_book.as_ref().unwrap();
    assert_eq!(
        book.extra.get("name"),
        Some(&serde_json::json!("茶馆设定集"))
    );
    assert_eq!(
        book.entries[0].extra.get("extensions"),
        Some(&serde_json::json!({"position": 4}))
    );
    assert_eq!(
        decoded.data.extra.get("custom_top_level"),
        Some(&serde_json::json!({"nested": [1, 2, 3]}))
    );
}

#[test]
fn test_single_bit_flip_in_card_chunk_is_detected() {
    let png = minimal_png_with_card(&rich_card_json());
    let chara_pos = png
        .windows(6)
        .position(|w| w == b"chara\x00")
        .expect("card chunk present");

    // Flip one bit inside the base64 payload.
    let mut corrupted = png.clone();
    corrupted[chara_pos + 8] ^= 0x01;
    assert_eq!(
        decode_card(&corrupted).unwrap_err(),
        FormatError::InvalidChunkCrc
    );
}

#[test]
fn test_parse_segment_backfill_export_cycle() {
    let png = minimal_png_with_card(&rich_card_json());
    let parsed = parse_card_file("雁.png", &png).unwrap();
    assert_eq!(parsed.source_format, SourceFormat::Png);

    // 12 greetings force segmentation into [1,5], [6,10], [11,12].
    let groups = generate_task_groups(&parsed.card);
    let greeting_group = groups.iter().find(|g| g.name == "备用开场白").unwrap();
    let ranges: Vec<(usize, usize)> = greeting_group
        .tasks
        .iter()
        .map(|t| {
            let r = t.range.unwrap();
            assert_eq!(r.kind, RangeKind::AlternateGreetings);
            (r.start, r.end)
        })
        .collect();
    assert_eq!(ranges, vec![(1, 5), (6, 10), (11, 12)]);

    // Backfill the middle unit.
    let unit = &greeting_group.tasks[1];
    let result = (6..=10)
        .map(|i| format!("### 【备用开场白{i}】\n重写的开场白{i}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    let updated = backfill_task_result(&parsed.card, unit, &result);

    for i in 1..=5 {
        assert_eq!(
            updated.data.alternate_greetings[i - 1],
            format!("greeting {i}")
        );
    }
    for i in 6..=10 {
        assert_eq!(
            updated.data.alternate_greetings[i - 1],
            format!("重写的开场白{i}")
        );
    }
    for i in 11..=12 {
        assert_eq!(
            updated.data.alternate_greetings[i - 1],
            format!("greeting {i}")
        );
    }

    // Every other part of the document is untouched.
    let mut expected = parsed.card.clone();
    expected.data.alternate_greetings = updated.data.alternate_greetings.clone();
    assert_eq!(updated, expected);

    // Export back to PNG and decode once more.
    let exported = export_document(
        &updated,
        parsed.source_format,
        parsed.source_bytes.as_deref(),
        Some(&parsed.source_name),
    )
    .unwrap();
    assert_eq!(exported.file_name, "雁.png");
    let reloaded = decode_card(&exported.bytes).unwrap();
    assert_eq!(reloaded, updated.normalized());
    assert_eq!(reloaded.data.alternate_greetings[5], "重写的开场白6");
}

#[test]
fn test_book_backfill_preserves_entry_attributes_through_export() {
    let png = minimal_png_with_card(&rich_card_json());
    let parsed = parse_card_file("card.png", &png).unwrap();

    let groups = generate_task_groups(&parsed.card);
    let book_group = groups.iter().find(|g| g.name == "世界观/知识库").unwrap();
    let unit = &book_group.tasks[0];

    let result = "### 【世界书条目2】\n**关键词**: 掌柜, 老板\n其实老板是一位退隐的剑客。";
    let updated = backfill_task_result(&parsed.card, unit, result);

    let exported = embed_card(parsed.source_bytes.as_deref().unwrap(), &updated, false).unwrap();
    let reloaded = decode_card(&exported).unwrap();
    let entries = &reloaded.data.character_book.as_ref().unwrap().entries;

    assert_eq!(entries[1].keys, vec!["掌柜".to_string(), "老板".to_string()]);
    assert_eq!(entries[1].content, "其实老板是一位退隐的剑客。");
    assert_eq!(entries[1].enabled, Some(false));
    assert_eq!(entries[1].insertion_order, Some(1));
    assert_eq!(entries[1].extra.get("comment"), Some(&serde_json::json!("人物")));
    // The untouched first entry is structurally identical.
    assert_eq!(entries[0].content, "茶馆的历史。");
    assert_eq!(entries[0].extra.get("id"), Some(&serde_json::json!(11)));
}

#[test]
fn test_json_file_cycle_with_base64_payload() {
    let json = rich_card_json();
    let encoded = base64_standard.encode(&json);
    let parsed = parse_card_file("card.json", encoded.as_bytes()).unwrap();
    assert_eq!(parsed.card.data.name.as_deref(), Some("巫回雁"));

    let exported = export_document(&parsed.card, SourceFormat::Json, None, None).unwrap();
    assert_eq!(exported.file_name, "巫回雁_converted.json");
    let reparsed: CharacterCard = serde_json::from_slice(&exported.bytes).unwrap();
    assert_eq!(reparsed, parsed.card.normalized());
}
