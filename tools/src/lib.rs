//! Inspection tools for Source 2 demo files.
//!
//! This crate backs the `s2demo-tools` binary:
//!
//! - Parse demos and report packet, memory and timing statistics
//! - Dump the entity state left at the end of a demo
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Every report has a JSON form and a pretty form.

use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;
use indexmap::IndexMap;
use pipeline::{Parser, ParserStats, PipelineConfig};
use schema::FieldValue;
use serde::Serialize;
use wire::DemoSource;

/// Loads a pipeline config from JSON; missing keys keep their defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig = serde_json::from_str(&contents).context("parse config json")?;
    config
        .validate()
        .map_err(|err| anyhow::anyhow!("config validation failed: {err}"))?;
    Ok(config)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoEntry {
    pub path: PathBuf,
    pub size: u64,
}

/// Lists the demo files at `path`: the file itself, or the files of a
/// directory whose path or name matches `glob`, sorted by path.
pub fn collect_demo_entries(path: &Path, glob: Option<&str>) -> Result<Vec<DemoEntry>> {
    if path.is_file() {
        let size = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        return Ok(vec![DemoEntry {
            path: path.to_path_buf(),
            size,
        }]);
    }

    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };
    let mut entries = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("read dir {}", path.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(DemoEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Statistics for one parsed demo.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub path: String,
    pub bytes: u64,
    pub map_name: Option<String>,
    pub last_tick: u32,
    pub stats: ParserStats,
}

/// Parses a whole stream and reports its statistics.
pub fn collect_stats(
    name: &str,
    bytes: u64,
    reader: impl Read,
    config: PipelineConfig,
    source: DemoSource,
) -> Result<StatsReport> {
    let mut parser = Parser::new(config).context("create parser")?;
    parser
        .parse(reader, source)
        .with_context(|| format!("parse {name}"))?;
    let demo = parser.demo();
    Ok(StatsReport {
        path: name.to_owned(),
        bytes,
        map_name: demo
            .server_info()
            .map(|info| info.map_name.clone())
            .or_else(|| demo.header().map(|header| header.map_name.clone())),
        last_tick: demo.tick(),
        stats: parser.stats(),
    })
}

pub fn format_stats_pretty(report: &StatsReport) -> String {
    let stats = &report.stats;
    let packets = &stats.packets;
    let mut out = String::new();
    let _ = writeln!(out, "== {} ({} bytes) ==", report.path, report.bytes);
    if let Some(map) = &report.map_name {
        let _ = writeln!(out, "map: {map}");
    }
    let _ = writeln!(
        out,
        "last tick: {} raw packets: {} messages: {} entity ops: {}",
        report.last_tick, packets.raw_packets, packets.messages, packets.entity_ops
    );
    let _ = writeln!(out, "commands:");
    for (name, count) in &packets.commands {
        let _ = writeln!(out, "  {name}: {count}");
    }
    if packets.skipped > 0 || packets.unparsed > 0 {
        let _ = writeln!(
            out,
            "skipped: {} unparsed: {}",
            packets.skipped, packets.unparsed
        );
        for (reason, count) in &packets.skip_reasons {
            let _ = writeln!(out, "  {reason}: {count}");
        }
    }
    if packets.framing_warnings > 0 {
        let _ = writeln!(
            out,
            "framing warnings: {} ({} bytes truncated)",
            packets.framing_warnings, packets.truncated_bytes
        );
    }

    let memory = &stats.memory;
    let _ = writeln!(
        out,
        "entities: {} ({} active) string tables: {} ({} entries) field paths: {}",
        memory.entities,
        memory.active_entities,
        memory.string_tables,
        memory.string_table_entries,
        memory.interned_field_paths
    );

    let perf = &stats.performance;
    let _ = writeln!(
        out,
        "batches: {} inline: {} broadcast: {} partitions: {} resyncs: {}",
        perf.batches, perf.inline_batches, perf.broadcast_batches, perf.partitions, perf.resyncs
    );
    if !perf.worker_batches.is_empty() {
        let per_worker: Vec<String> = perf.worker_batches.iter().map(u64::to_string).collect();
        let _ = writeln!(out, "per worker: [{}]", per_worker.join(", "));
    }
    for (name, timing) in &perf.timings {
        let _ = writeln!(
            out,
            "  {name}: {} calls, {:.3} ms",
            timing.calls,
            timing.total().as_secs_f64() * 1000.0
        );
    }
    out
}

/// Which entities an entity dump keeps.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Exact class name.
    pub class: Option<String>,
    pub limit: Option<usize>,
    /// Keep entities that left the PVS.
    pub include_inactive: bool,
}

/// One entity at the end of a demo, with named properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDump {
    pub index: u32,
    pub serial: u32,
    pub class: String,
    pub active: bool,
    pub fields: IndexMap<String, FieldValue>,
}

/// Parses a whole stream and dumps the entities it leaves behind.
pub fn dump_entities(
    reader: impl Read,
    config: PipelineConfig,
    source: DemoSource,
    filter: &EntityFilter,
) -> Result<Vec<EntityDump>> {
    let mut parser = Parser::new(config).context("create parser")?;
    parser.parse(reader, source).context("parse demo")?;
    let limit = filter.limit.unwrap_or(usize::MAX);
    let mut dumps = Vec::new();
    for entity in parser.demo_mut().entities_mut().iter_mut() {
        if dumps.len() >= limit {
            break;
        }
        if !filter.include_inactive && !entity.is_active() {
            continue;
        }
        if filter
            .class
            .as_deref()
            .is_some_and(|class| class != entity.class_name())
        {
            continue;
        }
        let (index, serial, active) = (entity.index(), entity.serial(), entity.is_active());
        let class = entity.class_name().to_owned();
        let fields = entity
            .unpack_flattened()
            .with_context(|| format!("resolve fields of entity {index}"))?
            .clone();
        dumps.push(EntityDump {
            index,
            serial,
            class,
            active,
            fields,
        });
    }
    Ok(dumps)
}

pub fn format_entities_pretty(dumps: &[EntityDump]) -> String {
    let mut out = String::new();
    for dump in dumps {
        let state = if dump.active { "" } else { " (inactive)" };
        let _ = writeln!(
            out,
            "#{} {} serial {}{state}",
            dump.index, dump.class, dump.serial
        );
        for (name, value) in &dump.fields {
            let _ = writeln!(out, "  {name} = {}", format_value(value));
        }
    }
    out
}

fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Bool(v) => v.to_string(),
        FieldValue::Signed(v) => v.to_string(),
        FieldValue::Unsigned(v) => v.to_string(),
        FieldValue::Float(v) => format!("{v:.3}"),
        FieldValue::String(v) => format!("{v:?}"),
        FieldValue::Vector2([x, y]) => format!("[{x:.3}, {y:.3}]"),
        FieldValue::Vector3([x, y, z]) => format!("[{x:.3}, {y:.3}, {z:.3}]"),
        FieldValue::Vector4([x, y, z, w]) => format!("[{x:.3}, {y:.3}, {z:.3}, {w:.3}]"),
    }
}
