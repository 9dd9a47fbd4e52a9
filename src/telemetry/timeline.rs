use chrono::{DateTime, Utc};

use super::error::{TelemetryError, TelemetryResult};

/// Player lifecycle events emitted before the first heartbeat, with their
/// offset from session start in milliseconds.
const BOOTSTRAP: [(EventKind, f64); 6] = [
    (EventKind::LoadStart, 0.0),
    (EventKind::LoadedData, 600.0),
    (EventKind::Play, 900.0),
    (EventKind::Playing, 920.0),
    (EventKind::Waiting, 1_100.0),
    (EventKind::Playing, 1_400.0),
];

const FIRST_HEARTBEAT_OFFSET_MS: f64 = 2_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    LoadStart,
    LoadedData,
    Play,
    Playing,
    Waiting,
    Heartbeat,
}

impl EventKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::LoadStart => "loadstart",
            Self::LoadedData => "loadeddata",
            Self::Play => "play",
            Self::Playing => "playing",
            Self::Waiting => "waiting",
            Self::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlaybackEvent {
    pub(crate) timestamp_ms: i64,
    pub(crate) kind: EventKind,
    pub(crate) sequence: u32,
    pub(crate) progress: f64,
}

/// Identity stamped onto every record of a timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EventIdentity {
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) classroom_id: String,
    pub(crate) lesson_id: String,
    pub(crate) media_id: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Timeline {
    pub(crate) identity: EventIdentity,
    pub(crate) session_token: String,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) duration: f64,
    pub(crate) events: Vec<PlaybackEvent>,
}

impl Timeline {
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn heartbeat_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| event.kind == EventKind::Heartbeat)
            .count()
    }
}

pub(crate) fn generate(
    identity: EventIdentity,
    duration: f64,
    interval: f64,
) -> TelemetryResult<Timeline> {
    generate_at(identity, duration, interval, Utc::now())
}

/// Builds the event timeline of one simulated viewing session.
///
/// Six bootstrap events are followed by a heartbeat every `interval` seconds
/// of progress. The timeline always ends with a heartbeat at exactly
/// `duration`, even when `duration` is not a multiple of `interval`.
pub(crate) fn generate_at(
    identity: EventIdentity,
    duration: f64,
    interval: f64,
    started_at: DateTime<Utc>,
) -> TelemetryResult<Timeline> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(TelemetryError::InvalidInterval(interval));
    }
    if !duration.is_finite() || duration < 0.0 {
        return Err(TelemetryError::InvalidDuration(duration));
    }

    let start_ms = started_at.timestamp_millis();
    let session_token = format!("{}_{}", identity.media_id, start_ms);
    let mut builder = EventBuilder {
        start_ms,
        duration,
        events: Vec::with_capacity(estimated_len(duration, interval)),
    };

    for (kind, offset) in BOOTSTRAP {
        builder.push(kind, 0.0, offset);
    }

    let mut current = interval;
    let mut offset = FIRST_HEARTBEAT_OFFSET_MS;
    let mut last_progress = 0.0;
    while current <= duration {
        last_progress = builder.push(EventKind::Heartbeat, current.min(duration), offset);
        current += interval;
        offset += interval * 1_000.0;
    }

    if last_progress < round_progress(duration).min(duration) {
        builder.push(EventKind::Heartbeat, duration, offset);
    }

    Ok(Timeline {
        identity,
        session_token,
        started_at,
        duration,
        events: builder.events,
    })
}

struct EventBuilder {
    start_ms: i64,
    duration: f64,
    events: Vec<PlaybackEvent>,
}

impl EventBuilder {
    fn push(&mut self, kind: EventKind, progress: f64, offset_ms: f64) -> f64 {
        let progress = round_progress(progress).clamp(0.0, self.duration);
        self.events.push(PlaybackEvent {
            timestamp_ms: self.start_ms + offset_ms.round() as i64,
            kind,
            sequence: self.events.len() as u32 + 1,
            progress,
        });
        progress
    }
}

fn round_progress(progress: f64) -> f64 {
    (progress * 1_000.0).round() / 1_000.0
}

fn estimated_len(duration: f64, interval: f64) -> usize {
    let heartbeats = (duration / interval).ceil();
    if heartbeats.is_finite() && heartbeats < 1_000_000.0 {
        BOOTSTRAP.len() + heartbeats as usize + 1
    } else {
        BOOTSTRAP.len()
    }
}
