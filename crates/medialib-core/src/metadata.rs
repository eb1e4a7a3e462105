use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ExtractionError;

/// Runs an external tool and returns its standard output split into lines.
pub trait ToolRunner: Send + Sync {
    fn invoke(&self, tool: &str, args: &[String]) -> Result<Vec<String>, ExtractionError>;
}

/// [`ToolRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl ToolRunner for CommandRunner {
    fn invoke(&self, tool: &str, args: &[String]) -> Result<Vec<String>, ExtractionError> {
        tracing::debug!(tool, ?args, "invoking external tool");
        let output = Command::new(tool)
            .args(args)
            .output()
            .map_err(|e| ExtractionError::Spawn {
                tool: tool.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Resolve a tool name to an executable path via `PATH`.
pub fn locate_tool(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Tag reader for video containers through ffmpeg/ffprobe.
///
/// Transport failures (the tool cannot be spawned or exits non-zero) are
/// [`ExtractionError`]s. A tag that is simply not present comes back as an
/// empty string from [`MetadataExtractor::field`] and as `None` from the
/// typed readers.
pub struct MetadataExtractor<'a> {
    runner: &'a dyn ToolRunner,
    ffmpeg: String,
    ffprobe: String,
}

impl<'a> MetadataExtractor<'a> {
    pub fn new(runner: &'a dyn ToolRunner, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Full tag dump in ffmetadata format.
    pub fn raw_metadata(&self, file: &Path) -> Result<String, ExtractionError> {
        let args = vec![
            "-i".to_string(),
            file.to_string_lossy().into_owned(),
            "-f".to_string(),
            "ffmetadata".to_string(),
            "-".to_string(),
        ];
        let lines = self.runner.invoke(&self.ffmpeg, &args)?;
        Ok(lines.join("\n"))
    }

    /// One container tag, trimmed. Absent tags yield an empty string.
    pub fn field(&self, file: &Path, field: &str) -> Result<String, ExtractionError> {
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-show_entries".to_string(),
            format!("format_tags={field}"),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            file.to_string_lossy().into_owned(),
        ];
        let lines = self.runner.invoke(&self.ffprobe, &args)?;
        Ok(lines.join("\n").trim().to_string())
    }

    pub fn optional_field(&self, file: &Path, field: &str) -> Result<Option<String>, ExtractionError> {
        let value = self.field(file, field)?;
        Ok((!value.is_empty()).then_some(value))
    }

    pub fn album(&self, file: &Path) -> Result<Option<String>, ExtractionError> {
        self.optional_field(file, "album")
    }

    pub fn title(&self, file: &Path) -> Result<Option<String>, ExtractionError> {
        self.optional_field(file, "title")
    }

    pub fn description(&self, file: &Path) -> Result<Option<String>, ExtractionError> {
        self.optional_field(file, "description")
    }
}

/// Parsed global section of an ffmetadata dump.
///
/// Keys are lowercased. Stream and chapter sections are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FfMetadata {
    pub tags: BTreeMap<String, String>,
    pub raw: String,
}

impl FfMetadata {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut lines = raw.lines().skip_while(|l| !l.starts_with(";FFMETADATA"));
        lines.next()?;

        let mut tags = BTreeMap::new();
        let mut pending: Option<(String, String)> = None;
        for line in lines {
            if line.starts_with('[') {
                break;
            }
            if let Some((key, mut value)) = pending.take() {
                // a trailing backslash escapes the newline
                value.push('\n');
                value.push_str(&unescape(line));
                if line.ends_with('\\') && !line.ends_with("\\\\") {
                    value.pop();
                    pending = Some((key, value));
                } else {
                    tags.insert(key, value);
                }
                continue;
            }
            if line.starts_with(';') || line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let mut value = unescape(value);
            if line.ends_with('\\') && !line.ends_with("\\\\") {
                value.pop();
                pending = Some((key, value));
            } else {
                tags.insert(key, value);
            }
        }
        if let Some((key, value)) = pending {
            tags.insert(key, value);
        }

        Some(Self {
            tags,
            raw: raw.to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .get(&key.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers ffprobe field queries from a table and records every call.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        pub fields: HashMap<String, String>,
        pub raw: String,
        pub fail: bool,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedRunner {
        pub(crate) fn with_field(mut self, field: &str, value: &str) -> Self {
            self.fields.insert(field.to_string(), value.to_string());
            self
        }
    }

    impl ToolRunner for ScriptedRunner {
        fn invoke(&self, tool: &str, args: &[String]) -> Result<Vec<String>, ExtractionError> {
            self.calls.lock().unwrap().push((tool.to_string(), args.to_vec()));
            if self.fail {
                return Err(ExtractionError::Failed {
                    tool: tool.to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "No such file or directory".to_string(),
                });
            }
            if tool == "ffmpeg" {
                return Ok(self.raw.lines().map(str::to_string).collect());
            }
            let field = args
                .iter()
                .find_map(|a| a.strip_prefix("format_tags="))
                .unwrap_or_default();
            Ok(self
                .fields
                .get(field)
                .map(|v| vec![format!("  {v}  "), String::new()])
                .unwrap_or_default())
        }
    }

    #[test]
    fn test_field_is_trimmed() {
        let runner = ScriptedRunner::default().with_field("album", "Familie");
        let extractor = MetadataExtractor::new(&runner, "ffmpeg", "ffprobe");
        assert_eq!(extractor.field(Path::new("/v/a.mp4"), "album").unwrap(), "Familie");

        let calls = runner.calls.lock().unwrap();
        let (tool, args) = &calls[0];
        assert_eq!(tool, "ffprobe");
        assert!(args.contains(&"format_tags=album".to_string()));
        assert_eq!(args.last().unwrap(), "/v/a.mp4");
    }

    #[test]
    fn test_absent_tag_is_none_not_error() {
        let runner = ScriptedRunner::default();
        let extractor = MetadataExtractor::new(&runner, "ffmpeg", "ffprobe");
        assert_eq!(extractor.field(Path::new("/v/a.mp4"), "album").unwrap(), "");
        assert_eq!(extractor.album(Path::new("/v/a.mp4")).unwrap(), None);
    }

    #[test]
    fn test_title_and_description() {
        let runner = ScriptedRunner::default()
            .with_field("title", "2023-05-01 Hochzeit")
            .with_field("description", "Trauung und Apéro");
        let extractor = MetadataExtractor::new(&runner, "ffmpeg", "ffprobe");
        let file = Path::new("/v/a.mp4");
        assert_eq!(extractor.title(file).unwrap().as_deref(), Some("2023-05-01 Hochzeit"));
        assert_eq!(extractor.description(file).unwrap().as_deref(), Some("Trauung und Apéro"));

        let calls = runner.calls.lock().unwrap();
        assert!(calls[0].1.contains(&"format_tags=title".to_string()));
        assert!(calls[1].1.contains(&"format_tags=description".to_string()));
    }

    #[test]
    fn test_process_failure_is_error() {
        let runner = ScriptedRunner {
            fail: true,
            ..Default::default()
        };
        let extractor = MetadataExtractor::new(&runner, "ffmpeg", "ffprobe");
        assert!(extractor.album(Path::new("/v/a.mp4")).is_err());
        assert!(extractor.raw_metadata(Path::new("/v/a.mp4")).is_err());
    }

    #[test]
    fn test_raw_metadata_joins_lines() {
        let runner = ScriptedRunner {
            raw: ";FFMETADATA1\ntitle=Hochzeit\nalbum=Familie".to_string(),
            ..Default::default()
        };
        let extractor = MetadataExtractor::new(&runner, "ffmpeg", "ffprobe");
        let raw = extractor.raw_metadata(Path::new("/v/a.mp4")).unwrap();
        assert_eq!(raw, ";FFMETADATA1\ntitle=Hochzeit\nalbum=Familie");
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec!["-i", "/v/a.mp4", "-f", "ffmetadata", "-"]);
    }

    #[test]
    fn test_parse_ffmetadata() {
        let raw = "ffmpeg version 7\n;FFMETADATA1\nmajor_brand=qt  \nTITLE=2023-05-01 Hochzeit\nalbum=Familie\ndescription=Zeile eins\\\nZeile zwei\ndate=2023-05-01\n[CHAPTER]\ntitle=Kapitel";
        let meta = FfMetadata::parse(raw).unwrap();
        assert_eq!(meta.get("title"), Some("2023-05-01 Hochzeit"));
        assert_eq!(meta.get("album"), Some("Familie"));
        assert_eq!(meta.get("description"), Some("Zeile eins\nZeile zwei"));
        assert_eq!(meta.get("date"), Some("2023-05-01"));
        assert_eq!(meta.tags.len(), 5);

        assert!(FfMetadata::parse("no header here").is_none());
    }
}
