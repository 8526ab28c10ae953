// src/bin/cardkit_cli.rs
//
// Thin batch front-end over the cardkit collaborator surface: load a card,
// show its work units, convert between formats, apply a backfill result.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

use cardkit::{
    backfill_task_result, build_conversion_prompt, count_card_chars, export_document,
    generate_task_groups, parse_card_file, ConversionTask, OrientationTarget, ParsedCardFile,
    SourceFormat,
};

/// Batch tool for character card files (PNG or JSON).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a card's fields, content volume, and derived work groups.
    Inspect { file: PathBuf },
    /// Print every work unit's editable content.
    Segment { file: PathBuf },
    /// Re-export the card, optionally switching between PNG and JSON.
    Convert {
        file: PathBuf,
        /// Target container format; defaults to the source format.
        #[arg(long, value_enum)]
        format: Option<TargetFormat>,
        /// Output path; defaults to the derived file name.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the full external-editing prompt for one work unit.
    Prompt {
        file: PathBuf,
        /// 1-based index of the work unit, in segmentation order.
        #[arg(long)]
        task: usize,
        #[arg(long, value_enum, default_value = "bg")]
        target: Orientation,
    },
    /// Apply an externally edited result file to one work unit and re-export.
    Backfill {
        file: PathBuf,
        /// 1-based index of the work unit, in segmentation order.
        #[arg(long)]
        task: usize,
        /// Path of the edited result text.
        #[arg(long)]
        result: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TargetFormat {
    Png,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Orientation {
    Bl,
    Bg,
}

impl From<Orientation> for OrientationTarget {
    fn from(value: Orientation) -> Self {
        match value {
            Orientation::Bl => OrientationTarget::Bl,
            Orientation::Bg => OrientationTarget::Bg,
        }
    }
}

impl From<TargetFormat> for SourceFormat {
    fn from(value: TargetFormat) -> Self {
        match value {
            TargetFormat::Png => SourceFormat::Png,
            TargetFormat::Json => SourceFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "cardkit=info".into());
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    match args.command {
        Command::Inspect { file } => inspect(&file),
        Command::Segment { file } => segment(&file),
        Command::Convert {
            file,
            format,
            output,
        } => convert(&file, format, output),
        Command::Prompt { file, task, target } => prompt(&file, task, target),
        Command::Backfill {
            file,
            task,
            result,
            output,
        } => backfill(&file, task, &result, output),
    }
}

fn load(path: &Path) -> Result<ParsedCardFile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid file name: {}", path.display()))?;
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_card_file(name, &bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn inspect(path: &Path) -> Result<()> {
    let parsed = load(path)?;
    let card = &parsed.card;
    println!("name:       {}", card.data.name.as_deref().unwrap_or("(unnamed)"));
    println!("source:     {:?}", parsed.source_format);
    println!("characters: {}", count_card_chars(card));
    println!("greetings:  {}", card.data.alternate_greetings.len());
    println!(
        "book:       {} entries",
        card.data
            .character_book
            .as_ref()
            .map_or(0, |b| b.entries.len())
    );

    let groups = generate_task_groups(card);
    println!("work groups:");
    for group in &groups {
        println!("  {} ({}, {} unit(s))", group.name, group.id, group.tasks.len());
        for task in &group.tasks {
            match task.range {
                Some(range) => println!("    {} [{}..{}]", task.id, range.start, range.end),
                None => println!("    {}", task.id),
            }
        }
    }
    Ok(())
}

fn segment(path: &Path) -> Result<()> {
    let parsed = load(path)?;
    let groups = generate_task_groups(&parsed.card);
    for group in &groups {
        for task in &group.tasks {
            println!("===== {} / {} =====", group.name, task.id);
            println!("{}\n", task.content);
        }
    }
    Ok(())
}

fn convert(path: &Path, format: Option<TargetFormat>, output: Option<PathBuf>) -> Result<()> {
    let parsed = load(path)?;
    let target = format.map(SourceFormat::from).unwrap_or(parsed.source_format);
    if target == SourceFormat::Png && parsed.source_bytes.is_none() {
        bail!("PNG export needs a PNG source file to supply the image");
    }

    let exported = export_document(
        &parsed.card,
        target,
        parsed.source_bytes.as_deref(),
        Some(&parsed.source_name),
    )?;
    let out_path = output.unwrap_or_else(|| PathBuf::from(&exported.file_name));
    fs::write(&out_path, &exported.bytes)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    println!("wrote {}", out_path.display());
    Ok(())
}

fn prompt(path: &Path, task_index: usize, target: Orientation) -> Result<()> {
    let parsed = load(path)?;
    let groups = generate_task_groups(&parsed.card);
    let tasks: Vec<&ConversionTask> = groups.iter().flat_map(|g| g.tasks.iter()).collect();
    if task_index == 0 || task_index > tasks.len() {
        bail!(
            "task index {task_index} out of range, card has {} unit(s)",
            tasks.len()
        );
    }
    println!(
        "{}",
        build_conversion_prompt(target.into(), &tasks[task_index - 1].content)
    );
    Ok(())
}

fn backfill(path: &Path, task_index: usize, result: &Path, output: Option<PathBuf>) -> Result<()> {
    let parsed = load(path)?;
    let groups = generate_task_groups(&parsed.card);
    let tasks: Vec<&ConversionTask> = groups.iter().flat_map(|g| g.tasks.iter()).collect();
    if task_index == 0 || task_index > tasks.len() {
        bail!(
            "task index {task_index} out of range, card has {} unit(s)",
            tasks.len()
        );
    }
    let task = tasks[task_index - 1];

    let result_text = fs::read_to_string(result)
        .with_context(|| format!("failed to read {}", result.display()))?;
    let updated = backfill_task_result(&parsed.card, task, &result_text);

    let exported = export_document(
        &updated,
        parsed.source_format,
        parsed.source_bytes.as_deref(),
        Some(&parsed.source_name),
    )?;
    let out_path = output.unwrap_or_else(|| PathBuf::from(&exported.file_name));
    fs::write(&out_path, &exported.bytes)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    println!("applied {} to {}, wrote {}", result.display(), task.id, out_path.display());
    Ok(())
}
