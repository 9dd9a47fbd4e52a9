use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use serde::Deserialize;

use crate::telemetry::{MediaCandidate, WireProfile, lenient_string};

/// Lessons to process in one `batch` run.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Manifest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) course_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) classroom_id: Option<String>,
    #[serde(default)]
    pub(crate) wire: Option<WireProfile>,
    #[serde(default)]
    pub(crate) lessons: Vec<LessonRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LessonRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) lesson_id: Option<String>,
    #[serde(default)]
    pub(crate) title: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub(crate) create_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) course_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) classroom_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub(crate) media_id: Option<String>,
    #[serde(default)]
    pub(crate) duration_sec: Option<f64>,
    #[serde(default)]
    pub(crate) media: Vec<MediaCandidate>,
}

impl Manifest {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse manifest {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Lessons oldest first; lessons without a creation time sort as epoch
    /// and ties keep manifest order.
    pub(crate) fn ordered_lessons(&self) -> Vec<&LessonRecord> {
        let mut lessons = self.lessons.iter().collect::<Vec<_>>();
        lessons.sort_by_key(|lesson| lesson.create_time.unwrap_or(0));
        lessons
    }
}

impl LessonRecord {
    pub(crate) fn display_title(&self) -> String {
        let title = if self.title.trim().is_empty() {
            self.lesson_id.as_deref().unwrap_or("untitled lesson")
        } else {
            self.title.trim()
        };
        match self.create_time.and_then(format_create_time) {
            Some(created) => format!("{title} ({created})"),
            None => title.to_string(),
        }
    }
}

pub(crate) fn load_candidates(path: &Path) -> Result<Vec<MediaCandidate>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read media candidates {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse media candidates {}", path.display()))
}

fn format_create_time(ms: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
}
