use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use eyephoto_meta::config::{self, SharedConfig, WritePolicy};
use eyephoto_meta::container;
use eyephoto_meta::coordinator::WriteCoordinator;
use eyephoto_meta::reconciler::{self, JpegMetadataStore, WriteOutcome};
use eyephoto_meta::record::{MetadataRecord, MillisDate, Orientation, RightLeft};

#[derive(Parser, Debug)]
#[command(
    name = "eyephoto-meta",
    version,
    about = "Read and write reconciled EXIF + XMP metadata of eye photos"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the reconciled metadata of JPEG files
    Read {
        /// Image files or directories to read
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge the given fields into a file's metadata and write it back
    Write(WriteArgs),

    /// Initialize a default config.json and exit
    Init,
}

#[derive(Args, Debug)]
struct WriteArgs {
    /// JPEG file to update
    #[arg(value_name = "PATH")]
    path: PathBuf,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long)]
    comment: Option<String>,

    /// Person shown in the photo
    #[arg(long)]
    person: Option<String>,

    /// Overlay center, as a fraction of the image width
    #[arg(long)]
    x_center: Option<f32>,

    /// Overlay center, as a fraction of the image height
    #[arg(long)]
    y_center: Option<f32>,

    /// Overlay scale factor
    #[arg(long = "scale")]
    overlay_scale_factor: Option<f32>,

    #[arg(long)]
    brightness: Option<f32>,

    #[arg(long)]
    contrast: Option<f32>,

    /// Which eye the photo shows
    #[arg(long, value_enum)]
    side: Option<RightLeft>,

    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    #[arg(long, value_parser = parse_orientation)]
    orientation: Option<Orientation>,

    /// Organize date, RFC 3339 (e.g. 2021-03-14T15:09:26Z)
    #[arg(long, value_parser = parse_date)]
    date: Option<MillisDate>,

    /// Override the write policy from the config file
    #[arg(long, value_enum)]
    policy: Option<WritePolicy>,
}

impl WriteArgs {
    fn patch(&self) -> MetadataRecord {
        MetadataRecord {
            title: self.title.clone(),
            description: self.description.clone(),
            subject: self.subject.clone(),
            comment: self.comment.clone(),
            person: self.person.clone(),
            x_center: self.x_center,
            y_center: self.y_center,
            overlay_scale_factor: self.overlay_scale_factor,
            organize_date: self.date,
            right_left: self.side,
            brightness: self.brightness,
            contrast: self.contrast,
            orientation: self.orientation,
            ..Default::default()
        }
    }
}

fn parse_orientation(s: &str) -> Result<Orientation, String> {
    s.parse::<u16>()
        .ok()
        .and_then(Orientation::from_degrees)
        .ok_or_else(|| format!("{s} is not one of 0, 90, 180, 270"))
}

/// Precision below a millisecond is dropped; the stores keep milliseconds.
fn parse_date(s: &str) -> Result<MillisDate, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| MillisDate::from(d.with_timezone(&Utc)))
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Init => init(cli.config.as_deref()),
        Command::Read { paths, json } => read(&paths, json),
        Command::Write(args) => write(cli.config.as_deref(), args).await,
    }
}

fn init(path: Option<&Path>) -> Result<()> {
    let config = config::Config::default();
    config.save(path)?;
    let save_path = match path {
        Some(p) => p.to_path_buf(),
        None => config::Config::config_path()?,
    };
    println!("Default config written to {}", save_path.display());
    Ok(())
}

fn read(paths: &[PathBuf], json: bool) -> Result<()> {
    let images = container::collect_jpegs(paths);
    if images.is_empty() {
        anyhow::bail!("No JPEG files found in the specified paths.");
    }

    let mut results = Vec::new();
    for image_path in &images {
        match reconciler::read_record(image_path) {
            Some(record) => results.push((image_path, record)),
            None => log::warn!("No metadata available for {}", image_path.display()),
        }
    }

    if json {
        let json_results: Vec<serde_json::Value> = results
            .iter()
            .map(|(path, record)| {
                serde_json::json!({
                    "path": path.display().to_string(),
                    "metadata": record,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
    } else {
        for (path, record) in &results {
            print_record(path, record);
        }
    }

    log::info!("Read {} of {} file(s)", results.len(), images.len());
    Ok(())
}

async fn write(config_path: Option<&Path>, args: WriteArgs) -> Result<()> {
    let mut config = config::Config::load(config_path)?;
    if let Some(policy) = args.policy {
        config.write_policy = policy;
    }
    if config.write_policy == WritePolicy::NoWrite {
        log::warn!("Write policy is no-write; nothing will be changed. Use --policy to override.");
    }

    let coordinator = WriteCoordinator::new(
        JpegMetadataStore,
        SharedConfig::new(config),
        tokio::runtime::Handle::current(),
    );
    let mut events = coordinator.subscribe();

    let mut record = coordinator
        .read(&args.path)
        .with_context(|| format!("{} is not a readable JPEG file", args.path.display()))?;
    record.update_from(args.patch());
    coordinator.write(&args.path, record);
    coordinator.flush(&args.path).await;

    let event = events
        .recv()
        .await
        .context("Write finished without reporting a result")?;
    match event.result {
        Ok(WriteOutcome::Written { tags }) => {
            let stores = if tags { "XMP packet and EXIF tags" } else { "XMP packet" };
            log::info!("Wrote {stores} of {}", event.path.display());
        }
        Ok(WriteOutcome::Skipped) => log::info!("Skipped {} (write policy)", event.path.display()),
        Ok(WriteOutcome::NotJpeg) => {
            anyhow::bail!("{} is not a JPEG file", event.path.display())
        }
        Err(e) => anyhow::bail!("Failed to write {}: {e}", event.path.display()),
    }
    Ok(())
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print the reconciled record of a file as a table.
fn print_record(path: &Path, record: &MetadataRecord) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    let text_fields: Vec<(&str, Option<String>)> = vec![
        ("Title", record.title.clone()),
        ("Description", record.description.clone()),
        ("Subject", record.subject.clone()),
        ("Comment", record.comment.clone()),
        ("Person", record.person.clone()),
    ];
    let overlay_fields: Vec<(&str, Option<String>)> = vec![
        ("Side", record.right_left.map(|s| format!("{s:?}"))),
        ("XCenter", record.x_center.map(|v| v.to_string())),
        ("YCenter", record.y_center.map(|v| v.to_string())),
        ("OverlayScaleFactor", record.overlay_scale_factor.map(|v| v.to_string())),
        ("OverlayColor", record.overlay_color.map(|c| format!("#{:08X}", c.0))),
        ("Brightness", record.brightness.map(|v| v.to_string())),
        ("Contrast", record.contrast.map(|v| v.to_string())),
        ("Orientation", record.orientation.map(|o| format!("{}°", o.degrees()))),
        ("OrganizeDate", record.organize_date.map(|d| d.to_string())),
        (
            "Flags",
            (!record.flags.is_empty()).then(|| format!("{:#x}", record.flags.bits())),
        ),
    ];

    let mut has_any = false;
    for (title, fields) in [("Descriptive", &text_fields), ("Overlay", &overlay_fields)] {
        if fields.iter().all(|(_, v)| v.is_none()) {
            continue;
        }
        has_any = true;
        println!("  {BOLD}{title}{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (tag, val) in fields.iter() {
            if let Some(v) = val {
                print_row(tag, v);
            }
        }
        println!();
    }

    if !has_any {
        println!("  {DIM}(no metadata found){RESET}");
        println!();
    }
}

/// Print one field; continuation lines are indented under the value column.
fn print_row(label: &str, value: &str) {
    let mut lines = wrap_value(value, VAL_WIDTH).into_iter();
    println!("  {label:<22} : {}", lines.next().unwrap_or_default());
    for line in lines {
        println!("  {INDENT}{line}");
    }
}

/// Split a value into display lines. Line breaks in the value are kept, and each of its
/// lines is word-wrapped to `max_width` characters.
fn wrap_value(value: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in value.lines() {
        let mut line = String::new();
        let mut width = 0;
        for word in paragraph.split_whitespace() {
            let len = word.chars().count();
            if width > 0 && width + 1 + len > max_width {
                lines.push(std::mem::take(&mut line));
                width = 0;
            }
            if width > 0 {
                line.push(' ');
                width += 1;
            }
            line.push_str(word);
            width += len;
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
