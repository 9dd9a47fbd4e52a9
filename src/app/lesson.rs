use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::config::{DeliverySettings, TimelineSettings};
use crate::telemetry::{
    BatchSender, DeliveryResult, EventIdentity, MediaCandidate, PayloadEncoder, Timeline,
    Transport, generate, normalize_duration, select_best,
};

/// Everything known about a lesson before selection and normalization.
#[derive(Debug, Clone, Default)]
pub(crate) struct LessonInput {
    pub(crate) user_id: Option<String>,
    pub(crate) course_id: Option<String>,
    pub(crate) classroom_id: Option<String>,
    pub(crate) lesson_id: Option<String>,
    /// Explicit media id; wins over the selected candidate.
    pub(crate) media_id: Option<String>,
    /// Explicit duration; wins over the selected candidate.
    pub(crate) duration: Option<f64>,
    /// Used when the selected candidate has no id of its own.
    pub(crate) default_media_id: Option<String>,
    /// Used when no candidate carries a duration.
    pub(crate) default_duration: Option<f64>,
    pub(crate) candidates: Vec<MediaCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedLesson {
    pub(crate) identity: EventIdentity,
    pub(crate) duration: f64,
}

pub(crate) fn resolve_lesson(input: &LessonInput, auto_fix_ms: bool) -> Result<ResolvedLesson> {
    for candidate in &input.candidates {
        debug!(
            id = candidate.id.as_deref().unwrap_or("-"),
            duration_sec = candidate.duration_sec,
            order = candidate.order,
            source = candidate.source.as_deref().unwrap_or("-"),
            url = candidate.url.as_deref().unwrap_or("-"),
            start = candidate.start,
            end = candidate.end,
            "media candidate"
        );
    }
    let selection = select_best(
        &input.candidates,
        input.default_media_id.as_deref(),
        input.default_duration,
    );
    debug!(
        candidates = input.candidates.len(),
        selected_id = selection.id.as_deref().unwrap_or("-"),
        selected_duration = selection.duration.unwrap_or_default(),
        "media selection"
    );

    let media_id = non_empty(input.media_id.as_deref()).or(selection.id);
    let raw_duration = input.duration.or(selection.duration);
    let duration = normalize_duration(raw_duration, auto_fix_ms)
        .context("cannot determine the media duration")?;
    if !duration.is_finite() || duration <= 0.0 {
        bail!("media duration must be positive, got {duration}");
    }

    let identity = EventIdentity {
        user_id: required(input.user_id.as_deref(), "user id")?,
        course_id: required(input.course_id.as_deref(), "course id")?,
        classroom_id: required(input.classroom_id.as_deref(), "classroom id")?,
        lesson_id: required(input.lesson_id.as_deref(), "lesson id")?,
        media_id: required(media_id.as_deref(), "media id")?,
    };
    Ok(ResolvedLesson { identity, duration })
}

pub(crate) fn build_timeline(
    lesson: &ResolvedLesson,
    settings: &TimelineSettings,
) -> Result<Timeline> {
    let timeline = generate(lesson.identity.clone(), lesson.duration, settings.interval)
        .context("failed to build the playback timeline")?;
    debug!(
        events = timeline.len(),
        heartbeats = timeline.heartbeat_count(),
        token = %timeline.session_token,
        "timeline built"
    );
    Ok(timeline)
}

pub(crate) fn deliver_timeline<T: Transport + ?Sized>(
    timeline: &Timeline,
    encoder: &dyn PayloadEncoder,
    delivery: &DeliverySettings,
    transport: &T,
    pause: &mut dyn FnMut(Duration),
) -> DeliveryResult {
    BatchSender::new(transport, encoder, &delivery.target, delivery.options.clone())
        .with_pause(|delay| pause(delay))
        .deliver(timeline, |progress| {
            info!(
                batch = progress.batch,
                batches = progress.batches,
                "sent {}/{} events",
                progress.delivered,
                progress.total
            );
        })
}

pub(crate) fn describe_lesson(lesson: &ResolvedLesson) -> String {
    let identity = &lesson.identity;
    format!(
        "user={} course={} classroom={} lesson={} media={} duration={}s",
        identity.user_id,
        identity.course_id,
        identity.classroom_id,
        identity.lesson_id,
        identity.media_id,
        lesson.duration
    )
}

pub(crate) fn delivery_failure_message(result: &DeliveryResult) -> String {
    let mut message = format!("Delivery failed after {} event(s) sent", result.delivered);
    if let Some(status) = result.last_status {
        message.push_str(&format!("; last status {status}"));
    }
    if let Some(err) = result.last_error.as_deref() {
        message.push_str(&format!("; {err}"));
    } else if let Some(body) = result.last_body.as_deref().map(str::trim)
        && !body.is_empty()
    {
        message.push_str(&format!("; response: {body}"));
    }
    message
}

fn required(value: Option<&str>, what: &str) -> Result<String> {
    match non_empty(value) {
        Some(value) => Ok(value),
        None => bail!("missing {what}"),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
