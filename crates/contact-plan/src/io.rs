//! Plan file reading and writing.
//!
//! Two line-oriented formats: a human-readable table with `#` metadata
//! lines, and a dense `;`-separated CSV variant for programmatic
//! consumption. The satellite/ground-station ID boundary lives in the
//! metadata lines, not per row, so metadata must be parsed before (or
//! correctly interleaved with) the rows that depend on it.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::entry::{ContactPlanEntry, InterferencePlanEntry};
use crate::{NodeId, PlanError, Result, SimTime};

/// Node-ID ranges and horizon declared in a plan-file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanMetadata {
    /// Satellites occupy IDs `1..=max_satellite_id`.
    pub max_satellite_id: NodeId,
    /// Ground stations occupy IDs `max_satellite_id+1..=max_node_id`.
    pub max_node_id: NodeId,
    /// Horizon the plan was generated for (s); -1 when not declared.
    pub sim_time_limit: SimTime,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            max_satellite_id: 0,
            max_node_id: 0,
            sim_time_limit: -1,
        }
    }
}

impl PlanMetadata {
    pub fn new(max_satellite_id: NodeId, max_node_id: NodeId, sim_time_limit: SimTime) -> Self {
        Self {
            max_satellite_id,
            max_node_id,
            sim_time_limit,
        }
    }

    pub fn is_ground_station(&self, id: NodeId) -> bool {
        self.max_node_id > 0 && id > self.max_satellite_id
    }

    pub fn num_satellites(&self) -> u32 {
        self.max_satellite_id
    }

    pub fn num_ground_stations(&self) -> u32 {
        self.max_node_id.saturating_sub(self.max_satellite_id)
    }
}

/// A parsed contact plan: entries plus the header metadata they were
/// interpreted under.
#[derive(Debug, Clone)]
pub struct ContactPlanFile {
    pub metadata: PlanMetadata,
    pub entries: Vec<ContactPlanEntry>,
}

#[derive(Debug, Clone)]
pub struct InterferencePlanFile {
    pub metadata: PlanMetadata,
    pub entries: Vec<InterferencePlanEntry>,
}

// ---------------------------------------------------------------------------
// contact plan, table format
// ---------------------------------------------------------------------------

pub fn read_contact_plan(path: impl AsRef<Path>) -> Result<ContactPlanFile> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PlanError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let plan = parse_contact_plan(BufReader::new(file))?;
    info!(
        "Loaded {} contacts from {:?} ({} satellites, {} ground stations)",
        plan.entries.len(),
        path,
        plan.metadata.num_satellites(),
        plan.metadata.num_ground_stations()
    );
    Ok(plan)
}

pub fn parse_contact_plan<R: BufRead>(reader: R) -> Result<ContactPlanFile> {
    let mut metadata = PlanMetadata::default();
    let mut entries = Vec::new();
    let mut discarded = 0usize;

    for line in reader.lines() {
        let line = line.map_err(|e| PlanError::Unreadable {
            path: "<stream>".into(),
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            apply_metadata_line(trimmed, &mut metadata);
            continue;
        }
        match parse_contact_row(trimmed, &metadata) {
            Some(entry) => entries.push(entry),
            None => {
                // a truncated or otherwise unparseable row carries no
                // record; it is dropped, not an error
                debug!("discarding unparseable contact row: {:?}", trimmed);
                discarded += 1;
            }
        }
    }

    if discarded > 0 {
        debug!("{} rows discarded while parsing contact plan", discarded);
    }
    Ok(ContactPlanFile { metadata, entries })
}

fn apply_metadata_line(line: &str, metadata: &mut PlanMetadata) {
    let body = line.trim_start_matches('#').trim();
    if let Some(rest) = body.strip_prefix("Satellites:") {
        if let Some((_, hi)) = parse_id_range(rest) {
            metadata.max_satellite_id = hi;
        }
    } else if let Some(rest) = body.strip_prefix("Ground Stations:") {
        if let Some((lo, hi)) = parse_id_range(rest) {
            metadata.max_node_id = hi;
            if metadata.max_satellite_id == 0 && lo > 0 {
                metadata.max_satellite_id = lo - 1;
            }
        }
    } else if let Some(rest) = body.strip_prefix("sim-time-limit:") {
        if let Ok(t) = rest.trim().parse() {
            metadata.sim_time_limit = t;
        }
    }
    // any other comment line is free-form and ignored
}

fn parse_id_range(s: &str) -> Option<(NodeId, NodeId)> {
    let mut numbers = s
        .split(|c: char| !c.is_ascii_digit())
        .filter(|t| !t.is_empty());
    let lo = numbers.next()?.parse().ok()?;
    let hi = numbers.next()?.parse().ok()?;
    Some((lo, hi))
}

fn parse_contact_row(line: &str, metadata: &PlanMetadata) -> Option<ContactPlanEntry> {
    let mut tokens = line.split_whitespace();
    let start_time = tokens.next()?.parse().ok()?;
    let end_time = tokens.next()?.parse().ok()?;
    let source: NodeId = tokens.next()?.parse().ok()?;
    let sink: NodeId = tokens.next()?.parse().ok()?;
    let bitrate_bps = tokens.next()?.parse().ok()?;
    let range = tokens.next()?.parse().ok()?;
    // trailing text is reserved for future fields and discarded

    let mut entry = ContactPlanEntry::new(source, sink, start_time, end_time, bitrate_bps, range);
    entry.source_is_ground_station = metadata.is_ground_station(source);
    entry.sink_is_ground_station = metadata.is_ground_station(sink);
    entry.max_sim_time = metadata.sim_time_limit;
    Some(entry)
}

pub fn write_contact_plan(
    path: impl AsRef<Path>,
    entries: &[ContactPlanEntry],
    metadata: &PlanMetadata,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| PlanError::Unwritable {
        path: path.to_path_buf(),
        source: e,
    })?;
    format_contact_plan(BufWriter::new(file), entries, metadata).map_err(|e| {
        PlanError::Unwritable {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    info!("Wrote contact plan to {:?}", path);
    Ok(())
}

/// Emit the table format. Disabled and degenerate entries are skipped;
/// column widths right-align on the widest value present (minimum floors
/// keep short plans readable) and have no semantic meaning.
pub fn format_contact_plan<W: Write>(
    mut w: W,
    entries: &[ContactPlanEntry],
    metadata: &PlanMetadata,
) -> std::io::Result<()> {
    writeln!(w, "# Satellites: 1 - {}", metadata.max_satellite_id)?;
    writeln!(
        w,
        "# Ground Stations: {} - {}",
        metadata.max_satellite_id + 1,
        metadata.max_node_id
    )?;
    writeln!(w, "# sim-time-limit: {}", metadata.sim_time_limit)?;

    let rows: Vec<&ContactPlanEntry> = entries
        .iter()
        .filter(|e| e.enabled && !e.is_degenerate())
        .collect();

    let sw = column_width(rows.iter().map(|e| e.start_time), 10);
    let ew = column_width(rows.iter().map(|e| e.end_time), 8);
    let ow = column_width(rows.iter().map(|e| i64::from(e.source)), 6);
    let iw = column_width(rows.iter().map(|e| i64::from(e.sink)), 6);
    let bw = column_width(rows.iter().map(|e| e.bitrate_bps), 9);
    let rw = column_width(rows.iter().map(|e| e.range), 10);

    writeln!(
        w,
        "# {:>sw$} {:>ew$} {:>ow$} {:>iw$} {:>bw$} {:>rw$}",
        "start(sec)",
        "end(sec)",
        "source",
        "sink",
        "rate(bps)",
        "range(km)",
        sw = sw,
        ew = ew,
        ow = ow,
        iw = iw,
        bw = bw,
        rw = rw,
    )?;

    for e in rows {
        writeln!(
            w,
            "  {:>sw$} {:>ew$} {:>ow$} {:>iw$} {:>bw$} {:>rw$}",
            e.start_time,
            e.end_time,
            e.source,
            e.sink,
            e.bitrate_bps,
            e.range,
            sw = sw,
            ew = ew,
            ow = ow,
            iw = iw,
            bw = bw,
            rw = rw,
        )?;
    }
    Ok(())
}

fn column_width(values: impl Iterator<Item = i64>, floor: usize) -> usize {
    values
        .map(|v| v.to_string().len())
        .max()
        .unwrap_or(0)
        .max(floor)
}

// ---------------------------------------------------------------------------
// contact plan, CSV variant
// ---------------------------------------------------------------------------

pub fn read_contact_plan_csv(path: impl AsRef<Path>) -> Result<ContactPlanFile> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PlanError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_contact_plan_csv(BufReader::new(file))
}

pub fn parse_contact_plan_csv<R: BufRead>(reader: R) -> Result<ContactPlanFile> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| PlanError::MalformedHeader("empty CSV plan".to_string()))?
        .map_err(|e| PlanError::Unreadable {
            path: "<stream>".into(),
            source: e,
        })?;

    let fields: Vec<&str> = header.trim().split(';').collect();
    if fields.len() != 3 {
        return Err(PlanError::MalformedHeader(header));
    }
    let sim_time_limit: SimTime = fields[0]
        .parse()
        .map_err(|_| PlanError::MalformedHeader(header.clone()))?;
    let num_satellites: NodeId = fields[1]
        .parse()
        .map_err(|_| PlanError::MalformedHeader(header.clone()))?;
    let num_ground_stations: NodeId = fields[2]
        .parse()
        .map_err(|_| PlanError::MalformedHeader(header.clone()))?;
    let metadata = PlanMetadata::new(
        num_satellites,
        num_satellites + num_ground_stations,
        sim_time_limit,
    );

    let mut entries = Vec::new();
    for line in lines {
        let line = line.map_err(|e| PlanError::Unreadable {
            path: "<stream>".into(),
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parts: Vec<&str> = trimmed.split(';').collect();
        if parts.len() != 4 {
            debug!("discarding unparseable CSV row: {:?}", trimmed);
            continue;
        }
        let parsed = (
            parts[0].parse::<SimTime>(),
            parts[1].parse::<SimTime>(),
            parts[2].parse::<NodeId>(),
            parts[3].parse::<NodeId>(),
        );
        if let (Ok(start), Ok(end), Ok(source), Ok(sink)) = parsed {
            // bitrate/range are externally known in this variant
            let mut entry = ContactPlanEntry::new(source, sink, start, end, 0, 0);
            entry.source_is_ground_station = metadata.is_ground_station(source);
            entry.sink_is_ground_station = metadata.is_ground_station(sink);
            entry.max_sim_time = metadata.sim_time_limit;
            entries.push(entry);
        } else {
            debug!("discarding unparseable CSV row: {:?}", trimmed);
        }
    }
    Ok(ContactPlanFile { metadata, entries })
}

pub fn write_contact_plan_csv(
    path: impl AsRef<Path>,
    entries: &[ContactPlanEntry],
    metadata: &PlanMetadata,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| PlanError::Unwritable {
        path: path.to_path_buf(),
        source: e,
    })?;
    format_contact_plan_csv(BufWriter::new(file), entries, metadata).map_err(|e| {
        PlanError::Unwritable {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

pub fn format_contact_plan_csv<W: Write>(
    mut w: W,
    entries: &[ContactPlanEntry],
    metadata: &PlanMetadata,
) -> std::io::Result<()> {
    writeln!(
        w,
        "{};{};{}",
        metadata.sim_time_limit,
        metadata.num_satellites(),
        metadata.num_ground_stations()
    )?;
    for e in entries.iter().filter(|e| e.enabled && !e.is_degenerate()) {
        writeln!(w, "{};{};{};{}", e.start_time, e.end_time, e.source, e.sink)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// interference plan
// ---------------------------------------------------------------------------

pub fn read_interference_plan(path: impl AsRef<Path>) -> Result<InterferencePlanFile> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PlanError::Unreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    let plan = parse_interference_plan(BufReader::new(file))?;
    info!(
        "Loaded {} interference entries from {:?}",
        plan.entries.len(),
        path
    );
    Ok(plan)
}

pub fn parse_interference_plan<R: BufRead>(reader: R) -> Result<InterferencePlanFile> {
    let mut metadata = PlanMetadata::default();
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(|e| PlanError::Unreadable {
            path: "<stream>".into(),
            source: e,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            apply_metadata_line(trimmed, &mut metadata);
            continue;
        }
        match parse_interference_row(trimmed, &metadata) {
            Some(entry) => entries.push(entry),
            None => debug!("discarding unparseable interference row: {:?}", trimmed),
        }
    }
    Ok(InterferencePlanFile { metadata, entries })
}

fn parse_interference_row(line: &str, metadata: &PlanMetadata) -> Option<InterferencePlanEntry> {
    let mut tokens = line.split_whitespace();
    let start_time = tokens.next()?.parse().ok()?;
    let end_time = tokens.next()?.parse().ok()?;
    let interferers: Vec<NodeId> = tokens
        .next()?
        .split(',')
        .map(|t| t.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    let source: NodeId = tokens.next()?.parse().ok()?;
    let sink: NodeId = tokens.next()?.parse().ok()?;

    let mut entry = InterferencePlanEntry::new(source, sink, start_time, end_time, interferers);
    entry.source_is_ground_station = metadata.is_ground_station(source);
    entry.sink_is_ground_station = metadata.is_ground_station(sink);
    entry.max_sim_time = metadata.sim_time_limit;
    Some(entry)
}

pub fn write_interference_plan(
    path: impl AsRef<Path>,
    entries: &[InterferencePlanEntry],
    metadata: &PlanMetadata,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| PlanError::Unwritable {
        path: path.to_path_buf(),
        source: e,
    })?;
    format_interference_plan(BufWriter::new(file), entries, metadata).map_err(|e| {
        PlanError::Unwritable {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    info!("Wrote interference plan to {:?}", path);
    Ok(())
}

pub fn format_interference_plan<W: Write>(
    mut w: W,
    entries: &[InterferencePlanEntry],
    metadata: &PlanMetadata,
) -> std::io::Result<()> {
    writeln!(w, "# Satellites: 1 - {}", metadata.max_satellite_id)?;
    writeln!(
        w,
        "# Ground Stations: {} - {}",
        metadata.max_satellite_id + 1,
        metadata.max_node_id
    )?;
    writeln!(w, "# sim-time-limit: {}", metadata.sim_time_limit)?;

    let rows: Vec<(&InterferencePlanEntry, String)> = entries
        .iter()
        .filter(|e| e.enabled && !e.is_degenerate())
        .map(|e| {
            // interferers are kept sorted by construction; the file format
            // wants an ascending comma-joined list with no whitespace
            let combo = e
                .interfering_nodes
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            (e, combo)
        })
        .collect();

    let sw = column_width(rows.iter().map(|(e, _)| e.start_time), 10);
    let ew = column_width(rows.iter().map(|(e, _)| e.end_time), 8);
    let cw = rows
        .iter()
        .map(|(_, combo)| combo.len())
        .max()
        .unwrap_or(0)
        .max(10);
    let ow = column_width(rows.iter().map(|(e, _)| i64::from(e.source)), 6);
    let iw = column_width(rows.iter().map(|(e, _)| i64::from(e.sink)), 6);

    writeln!(
        w,
        "# {:>sw$} {:>ew$} {:>cw$} {:>ow$} {:>iw$}",
        "start(sec)",
        "end(sec)",
        "interferer",
        "source",
        "sink",
        sw = sw,
        ew = ew,
        cw = cw,
        ow = ow,
        iw = iw,
    )?;

    for (e, combo) in &rows {
        writeln!(
            w,
            "  {:>sw$} {:>ew$} {:>cw$} {:>ow$} {:>iw$}",
            e.start_time,
            e.end_time,
            combo,
            e.source,
            e.sink,
            sw = sw,
            ew = ew,
            cw = cw,
            ow = ow,
            iw = iw,
        )?;
    }
    Ok(())
}
