use serde::{Deserialize, Serialize};

use super::error::TelemetryResult;
use super::timeline::{PlaybackEvent, Timeline};

/// Turns one batch of a timeline into a request body.
pub(crate) trait PayloadEncoder {
    fn encode(&self, timeline: &Timeline, batch: &[PlaybackEvent]) -> TelemetryResult<String>;
}

/// Static tags repeated on every wire record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct WireProfile {
    pub(crate) platform: String,
    pub(crate) log_type: String,
    pub(crate) line_of_business: String,
    pub(crate) cdn_host: String,
    pub(crate) source: String,
    pub(crate) report_interval: u32,
    pub(crate) speed: u32,
}

impl Default for WireProfile {
    fn default() -> Self {
        Self {
            platform: "web".to_string(),
            log_type: "playback".to_string(),
            line_of_business: String::new(),
            cdn_host: String::new(),
            source: String::new(),
            report_interval: 20,
            speed: 1,
        }
    }
}

/// Encodes a batch as `{"heart_data": [...]}` using the short field names
/// the ingestion endpoint expects.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeartDataEncoder {
    profile: WireProfile,
}

impl HeartDataEncoder {
    pub(crate) fn new(profile: WireProfile) -> Self {
        Self { profile }
    }
}

#[derive(Serialize)]
struct HeartData<'a> {
    heart_data: Vec<WireRecord<'a>>,
}

#[derive(Serialize)]
struct WireRecord<'a> {
    ts: String,
    i: u32,
    et: &'static str,
    p: &'a str,
    t: &'a str,
    u: &'a str,
    c: &'a str,
    classroomid: &'a str,
    lob: &'a str,
    v: &'a str,
    fp: u32,
    tp: u32,
    d: u32,
    pg: &'a str,
    n: &'a str,
    lesson_id: &'a str,
    source: &'a str,
    sp: u32,
    sq: u32,
    cp: f64,
}

impl PayloadEncoder for HeartDataEncoder {
    fn encode(&self, timeline: &Timeline, batch: &[PlaybackEvent]) -> TelemetryResult<String> {
        let identity = &timeline.identity;
        let profile = &self.profile;
        let heart_data = batch
            .iter()
            .map(|event| WireRecord {
                ts: event.timestamp_ms.to_string(),
                i: profile.report_interval,
                et: event.kind.as_str(),
                p: &profile.platform,
                t: &profile.log_type,
                u: &identity.user_id,
                c: &identity.course_id,
                classroomid: &identity.classroom_id,
                lob: &profile.line_of_business,
                v: &identity.media_id,
                fp: 0,
                tp: 0,
                d: 0,
                pg: &timeline.session_token,
                n: &profile.cdn_host,
                lesson_id: &identity.lesson_id,
                source: &profile.source,
                sp: profile.speed,
                sq: event.sequence,
                cp: event.progress,
            })
            .collect();

        Ok(serde_json::to_string(&HeartData { heart_data })?)
    }
}
