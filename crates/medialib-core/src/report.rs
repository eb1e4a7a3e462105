use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Stage;
use crate::fileops::MoveOutcome;

/// A file that was left out of processing, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    /// Video moved, image handling failed.
    PartiallyDone,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub source: PathBuf,
    pub target: PathBuf,
    pub outcome: MoveOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetReport {
    pub title: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub moved: Vec<MovedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_variant: Option<PathBuf>,
    /// Video target computed in dry-run mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_target: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_images: Vec<PathBuf>,
}

impl SetReport {
    pub fn new(title: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            title: title.into(),
            outcome,
            stage: None,
            reason: None,
            moved: Vec::new(),
            alternate_variant: None,
            planned_target: None,
            ignored_images: Vec::new(),
        }
    }

    pub fn skipped(title: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut report = Self::new(title, Outcome::Skipped);
        report.reason = Some(reason.into());
        report
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub sets: Vec<SetReport>,
    pub diagnostics: Vec<Diagnostic>,
    pub cancelled: bool,
    pub dry_run: bool,
}

impl RunReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.sets.iter().filter(|s| s.outcome == outcome).count()
    }

    pub fn files_moved(&self) -> usize {
        self.sets
            .iter()
            .flat_map(|s| &s.moved)
            .filter(|m| m.outcome == MoveOutcome::Moved)
            .count()
    }

    /// True when no set ended in `Error`.
    pub fn is_success(&self) -> bool {
        self.count(Outcome::Error) == 0
    }
}

/// Write the run report as pretty-printed JSON.
pub fn write_report_json(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> RunReport {
        let mut done = SetReport::new("2023-05-01 Hochzeit", Outcome::Done);
        done.moved.push(MovedFile {
            source: PathBuf::from("/in/2023-05-01 Hochzeit-4K.mp4"),
            target: PathBuf::from("/lib/2023/2023-05-01/Hochzeit.mp4"),
            outcome: MoveOutcome::Moved,
        });
        let mut failed = SetReport::new("Ferien", Outcome::Error);
        failed.stage = Some(Stage::VideoMoved);
        failed.reason = Some("disk full".to_string());
        RunReport {
            sets: vec![done, failed, SetReport::skipped("Notizen", "no primary video")],
            diagnostics: vec![Diagnostic::new(PathBuf::from("/in/a.txt"), "unrecognized")],
            cancelled: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_counts() {
        let report = sample();
        assert_eq!(report.count(Outcome::Done), 1);
        assert_eq!(report.count(Outcome::Skipped), 1);
        assert_eq!(report.files_moved(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_write_report_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        write_report_json(&sample(), &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let sets = value["sets"].as_array().unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0]["outcome"], "done");
        assert_eq!(sets[0]["moved"][0]["outcome"], "moved");
        assert_eq!(sets[1]["stage"], "video_moved");
        assert!(sets[0].get("stage").is_none());
        assert_eq!(value["diagnostics"][0]["message"], "unrecognized");
    }
}
