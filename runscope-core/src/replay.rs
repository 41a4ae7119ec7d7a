//! Frame recordings
//!
//! A recording is a JSON Lines file with one `{"at": <RFC 3339>, "message":
//! <frame>}` object per inbound frame, written to `<dir>/<run id>.jsonl`.
//! Recordings are fed back through the same dispatcher the live viewer uses,
//! so a replay reconstructs exactly the tree the viewer showed.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatch::{dispatch, Outcome};
use crate::error::Result;
use crate::format::{format_seconds, format_timestamp, format_tokens};
use crate::state::{LaneMark, ViewerState};
use crate::types::{timestamp_utc, RunId};

/// One recorded frame.
///
/// `at` is written as RFC 3339; UNIX seconds (as older recorders wrote it)
/// are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(deserialize_with = "timestamp_utc")]
    pub at: DateTime<Utc>,
    pub message: serde_json::Value,
}

impl ReplayRecord {
    /// The run a frame concerns: the run itself, or the payload's `run_id`.
    pub fn run_id(&self) -> Option<RunId> {
        let data = self.message.get("data")?;
        match self.message.get("type")?.as_str()? {
            "Run" => data.get("id")?.as_i64(),
            _ => data.get("run_id")?.as_i64(),
        }
    }

    /// The frame as it would arrive from a server, without the live epoch.
    pub fn frame_text(&self) -> String {
        let mut message = self.message.clone();
        if let Some(object) = message.as_object_mut() {
            object.remove("epoch");
        }
        message.to_string()
    }
}

/// Appends applied frames to per-run files.
#[derive(Debug, Clone)]
pub struct Recorder {
    dir: PathBuf,
}

impl Recorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.jsonl"))
    }

    pub fn record(&self, run_id: RunId, frame_text: &str) -> Result<()> {
        let record = ReplayRecord {
            at: Utc::now(),
            message: serde_json::from_str(frame_text)?,
        };

        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(run_id))?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }

    /// Record when an outcome says the frame was applied.
    pub fn record_outcome(&self, outcome: &Outcome, frame_text: &str) {
        if let Outcome::Applied { run_id, .. } = outcome {
            if let Err(e) = self.record(*run_id, frame_text) {
                tracing::warn!(run_id, error = %e, "Failed to record frame");
            }
        }
    }
}

/// Read a recording. Lines that do not parse are skipped with a warning.
pub fn read_recording(path: &Path) -> Result<Vec<ReplayRecord>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping unreadable recording line");
            }
        }
    }

    Ok(records)
}

/// Counts from a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub ignored: usize,
}

/// Feed records through a fresh selection of `run_id`.
///
/// Without an explicit run, the first run mentioned in the recording is
/// used. Returns `None` when no run can be determined.
pub fn replay_into(
    state: &mut ViewerState,
    records: &[ReplayRecord],
    run_id: Option<RunId>,
) -> Option<ReplaySummary> {
    let run_id = run_id.or_else(|| records.iter().find_map(ReplayRecord::run_id))?;
    state.select_now(run_id);

    // Frames are applied in file order; the clock only matters for follow
    // mode, which replay never enables.
    let now = Instant::now();
    let mut summary = ReplaySummary::default();
    for record in records {
        if dispatch(state, &record.frame_text(), now).is_applied() {
            summary.applied += 1;
        } else {
            summary.ignored += 1;
        }
    }
    Some(summary)
}

/// Plain-text dump of the selected run.
pub fn render_transcript(state: &ViewerState) -> String {
    let mut out = String::new();
    let Some(session) = state.session() else {
        out.push_str("no run selected\n");
        return out;
    };

    match state.registry().get(session.run_id) {
        Some(run) => {
            let _ = writeln!(out, "Run {} [{}] {}", run.id, run.state, run.model);
            if !run.tag.is_empty() {
                let _ = writeln!(out, "tag: {}", run.tag);
            }
            let started = run.started_at.as_deref().map(format_timestamp);
            let stopped = run.stopped_at.as_deref().map(format_timestamp);
            let _ = writeln!(
                out,
                "started: {}  stopped: {}",
                started.as_deref().unwrap_or("-"),
                stopped.as_deref().unwrap_or("-")
            );
            let configuration = run.configuration_display();
            if !configuration.is_empty() {
                out.push_str("configuration:\n");
                for line in configuration.lines() {
                    let _ = writeln!(out, "  {line}");
                }
            }
        }
        None => {
            let _ = writeln!(out, "Run {} (no metadata)", session.run_id);
        }
    }

    let sections: Vec<_> = session.sections().collect();
    if !sections.is_empty() {
        out.push_str("sections:\n");
        for section in sections {
            let column = session
                .layout
                .placement(section.id)
                .map(|p| p.column)
                .unwrap_or_default();
            let to = section
                .to_message
                .map(|to| to.to_string())
                .unwrap_or_else(|| "open".to_string());
            let _ = writeln!(
                out,
                "  [{}] {} messages {}..{} ({})",
                column,
                section.name,
                section.from_message,
                to,
                format_seconds(section.duration)
            );
        }
    }

    out.push('\n');
    for message in session.trace.messages() {
        let gutter: String = session
            .lanes(message.id)
            .iter()
            .map(|lane| match lane.mark {
                LaneMark::Empty => ' ',
                LaneMark::Start => '┌',
                LaneMark::Inside => '│',
                LaneMark::End => '└',
                LaneMark::Only => '[',
            })
            .collect();

        let role = message.role.as_deref().unwrap_or("?");
        let mut header = if gutter.is_empty() {
            format!("#{} {role}", message.id)
        } else {
            format!("{gutter} #{} {role}", message.id)
        };
        if let Some(duration) = message.duration {
            let _ = write!(header, " {}", format_seconds(duration));
        }
        if let (Some(query), Some(response)) = (message.tokens_query, message.tokens_response) {
            let _ = write!(header, " {}", format_tokens(query, response));
        }
        let _ = writeln!(out, "{header}");

        for line in message.content.lines() {
            let _ = writeln!(out, "    {line}");
        }
        for call in &message.tool_calls {
            let _ = write!(out, "    -> {} [{}]", call.function_name, call.state);
            if let Some(duration) = call.duration {
                let _ = write!(out, " {}", format_seconds(duration));
            }
            out.push('\n');
            if !call.arguments.is_empty() {
                let _ = writeln!(out, "       args: {}", call.arguments);
            }
            for line in call.result_text.lines() {
                let _ = writeln!(out, "       | {line}");
            }
        }
    }

    out
}
