//! CK-061: Append-only JSONL build event log.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One build provenance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildStarted {
        run_id: String,
        cook_version: String,
        targets: Vec<String>,
    },
    RecipeStarted {
        run_id: String,
        recipe: String,
        target: String,
    },
    RecipeSucceeded {
        run_id: String,
        recipe: String,
        target: String,
        duration_seconds: f64,
    },
    RecipeFailed {
        run_id: String,
        recipe: String,
        target: String,
        error: String,
    },
    BuildCompleted {
        run_id: String,
        recipes_run: u32,
        recipes_up_to_date: u32,
        recipes_failed: u32,
        total_seconds: f64,
    },
}

/// Event plus its timestamp, flattened into one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: BuildEvent,
}

/// Generate an ISO 8601 UTC timestamp.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_iso8601(secs)
}

fn format_iso8601(secs: u64) -> String {
    let days = secs / 86400;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    let mut y = 1970u64;
    let mut remaining = days;
    loop {
        let year_days = if is_leap(y) { 366 } else { 365 };
        if remaining < year_days {
            break;
        }
        remaining -= year_days;
        y += 1;
    }
    let feb = if is_leap(y) { 29 } else { 28 };
    let month_days = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut m = 12;
    for (i, &md) in month_days.iter().enumerate() {
        if remaining < md {
            m = i + 1;
            break;
        }
        remaining -= md;
    }
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        remaining + 1,
        hours,
        minutes,
        seconds
    )
}

fn is_leap(y: u64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Generate a run id.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

pub fn event_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// Append an event to the log under `state_dir`.
pub fn append_event(state_dir: &Path, event: BuildEvent) -> Result<(), String> {
    let path = event_log_path(state_dir);
    std::fs::create_dir_all(state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;
    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;
    Ok(())
}

/// Where walk events go.
pub trait EventSink {
    fn emit(&mut self, event: BuildEvent);
}

/// Appends to `<state-dir>/events.jsonl`. Write failures are logged, never
/// fatal to the build.
#[derive(Debug)]
pub struct JsonlSink {
    state_dir: PathBuf,
}

impl JsonlSink {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, event: BuildEvent) {
        if let Err(e) = append_event(&self.state_dir, event) {
            tracing::warn!("event log: {}", e);
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<BuildEvent>,
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: BuildEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ck061_format_iso8601() {
        assert_eq!(format_iso8601(0), "1970-01-01T00:00:00Z");
        // 2024-02-29T12:34:56Z
        assert_eq!(format_iso8601(1_709_210_096), "2024-02-29T12:34:56Z");
        assert_eq!(format_iso8601(1_735_689_599), "2024-12-31T23:59:59Z");
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }

    #[test]
    fn test_ck061_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_ck061_append_events() {
        let dir = tempfile::tempdir().unwrap();
        for t in ["a.o", "b.o"] {
            append_event(
                dir.path(),
                BuildEvent::RecipeStarted {
                    run_id: "r-1".into(),
                    recipe: "%.o".into(),
                    target: t.into(),
                },
            )
            .unwrap();
        }
        let content = std::fs::read_to_string(event_log_path(dir.path())).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"recipe_started\""));
        let parsed: TimestampedEvent = serde_json::from_str(lines[1]).unwrap();
        assert!(matches!(parsed.event, BuildEvent::RecipeStarted { ref target, .. } if target == "b.o"));
    }

    #[test]
    fn test_ck061_is_leap() {
        assert!(is_leap(2000));
        assert!(!is_leap(1900));
        assert!(is_leap(2024));
        assert!(!is_leap(2026));
    }
}
