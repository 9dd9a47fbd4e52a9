mod lesson;
mod manifest;

#[cfg(test)]
mod tests;

use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::{BatchArgs, Cli, Command, LessonArgs, PlanArgs, SendArgs};
use crate::config::{DeliverySettings, TimelineSettings};
use crate::http::UreqTransport;
use crate::telemetry::{DeliveryOptions, HeartDataEncoder, PayloadEncoder, Transport};

use self::lesson::{
    LessonInput, ResolvedLesson, build_timeline, deliver_timeline, delivery_failure_message,
    describe_lesson, resolve_lesson,
};
use self::manifest::{LessonRecord, Manifest, load_candidates};

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Plan(args) => run_plan(&args),
        Command::Send(args) => run_send(&args),
        Command::Batch(args) => run_batch(&args),
    }
}

fn run_plan(args: &PlanArgs) -> Result<()> {
    let settings = TimelineSettings::from_args(&args.timeline)?;
    let lesson = resolve_lesson(&lesson_input(&args.lesson)?, settings.auto_fix_ms)?;
    let timeline = build_timeline(&lesson, &settings)?;

    if args.json {
        let encoder = HeartDataEncoder::new(settings.wire.clone().unwrap_or_default());
        let batch_size = match args.batch_size {
            0 => timeline.len().max(1),
            size => size,
        };
        for chunk in timeline.events.chunks(batch_size) {
            println!("{}", encoder.encode(&timeline, chunk)?);
        }
        return Ok(());
    }

    println!("Planned timeline: {}", describe_lesson(&lesson));
    println!(
        "  {} event(s), {} heartbeat(s) every {}s up to {}s",
        timeline.len(),
        timeline.heartbeat_count(),
        settings.interval,
        timeline.duration
    );
    println!(
        "  session {} starting {}",
        timeline.session_token,
        timeline.started_at.to_rfc3339()
    );
    Ok(())
}

fn run_send(args: &SendArgs) -> Result<()> {
    let settings = TimelineSettings::from_args(&args.timeline)?;
    let delivery = DeliverySettings::from_args(&args.delivery)?;
    let lesson = resolve_lesson(&lesson_input(&args.lesson)?, settings.auto_fix_ms)?;
    let transport = UreqTransport::new(delivery.options.timeout);
    let encoder = HeartDataEncoder::new(settings.wire.clone().unwrap_or_default());

    let mut pause = |delay: Duration| thread::sleep(delay);
    match send_lesson(&lesson, &settings, &delivery, &encoder, &transport, &mut pause)? {
        Some(sent) => {
            println!("Done: {sent} event(s) delivered.");
            Ok(())
        }
        None => bail!("lesson {} was not fully delivered", lesson.identity.lesson_id),
    }
}

fn run_batch(args: &BatchArgs) -> Result<()> {
    let settings = TimelineSettings::from_args(&args.timeline)?;
    let manifest = Manifest::load(&args.manifest)?;
    let delivery = if args.dry_run {
        None
    } else {
        Some(DeliverySettings::from_args(&args.delivery)?)
    };
    let timeout = delivery
        .as_ref()
        .map(|delivery| delivery.options.timeout)
        .unwrap_or(DeliveryOptions::default().timeout);
    let transport = UreqTransport::new(timeout);

    let mut pause = |delay: Duration| thread::sleep(delay);
    let summary = run_manifest(
        &manifest,
        &settings,
        delivery.as_ref(),
        &transport,
        Duration::from_secs(args.lesson_delay_secs),
        &mut pause,
    );

    if summary.total == 0 {
        println!("No lessons to process.");
    } else {
        println!("\nBatch finished: {}/{} lesson(s) succeeded.", summary.ok, summary.total);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchSummary {
    ok: usize,
    total: usize,
}

/// Runs every manifest lesson in creation order, one after another.
///
/// A failing lesson is reported and skipped; it does not stop the run.
fn run_manifest<T: Transport + ?Sized>(
    manifest: &Manifest,
    settings: &TimelineSettings,
    delivery: Option<&DeliverySettings>,
    transport: &T,
    lesson_delay: Duration,
    pause: &mut dyn FnMut(Duration),
) -> BatchSummary {
    let lessons = manifest.ordered_lessons();
    let total = lessons.len();
    let wire = settings
        .wire
        .clone()
        .or_else(|| manifest.wire.clone())
        .unwrap_or_default();
    let encoder = HeartDataEncoder::new(wire);

    if total > 0 {
        println!("Processing {total} lesson(s)");
    }

    let mut ok = 0;
    for (idx, record) in lessons.iter().enumerate() {
        println!("\n[{}/{}] {}", idx + 1, total, record.display_title());

        let outcome = resolve_lesson(&manifest_input(manifest, record), settings.auto_fix_ms)
            .and_then(|lesson| match delivery {
                Some(delivery) => {
                    send_lesson(&lesson, settings, delivery, &encoder, transport, pause)
                        .map(|sent| sent.is_some())
                }
                None => dry_run_lesson(&lesson, settings).map(|()| true),
            });

        match outcome {
            Ok(true) => ok += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(lesson = idx + 1, "lesson skipped: {err:#}");
                println!("Skipped: {err:#}");
            }
        }

        if idx + 1 < total && !lesson_delay.is_zero() {
            info!("waiting {}s before the next lesson", lesson_delay.as_secs());
            pause(lesson_delay);
        }
    }

    BatchSummary { ok, total }
}

/// Returns the number of delivered events, or `None` after a failed delivery.
fn send_lesson<T: Transport + ?Sized>(
    lesson: &ResolvedLesson,
    settings: &TimelineSettings,
    delivery: &DeliverySettings,
    encoder: &dyn PayloadEncoder,
    transport: &T,
    pause: &mut dyn FnMut(Duration),
) -> Result<Option<usize>> {
    let timeline = build_timeline(lesson, settings)?;
    println!("Sending: {}", describe_lesson(lesson));
    println!(
        "  {} event(s) in batches of {}",
        timeline.len(),
        delivery.options.batch_size
    );

    let result = deliver_timeline(&timeline, encoder, delivery, transport, pause);
    if result.success {
        println!("Delivered {} event(s).", result.delivered);
        Ok(Some(result.delivered))
    } else {
        println!("{}", delivery_failure_message(&result));
        Ok(None)
    }
}

fn dry_run_lesson(lesson: &ResolvedLesson, settings: &TimelineSettings) -> Result<()> {
    let timeline = build_timeline(lesson, settings)?;
    println!("Dry run: {}", describe_lesson(lesson));
    println!("  generated {} event(s)", timeline.len());
    Ok(())
}

fn lesson_input(args: &LessonArgs) -> Result<LessonInput> {
    let candidates = match args.media.as_deref() {
        Some(path) => load_candidates(path)?,
        None => Vec::new(),
    };
    Ok(LessonInput {
        user_id: args.user_id.clone(),
        course_id: args.course_id.clone(),
        classroom_id: args.classroom_id.clone(),
        lesson_id: args.lesson_id.clone(),
        media_id: args.media_id.clone(),
        duration: args.duration,
        default_media_id: None,
        default_duration: None,
        candidates,
    })
}

fn manifest_input(manifest: &Manifest, record: &LessonRecord) -> LessonInput {
    LessonInput {
        user_id: manifest.user_id.clone(),
        course_id: record.course_id.clone().or_else(|| manifest.course_id.clone()),
        classroom_id: record
            .classroom_id
            .clone()
            .or_else(|| manifest.classroom_id.clone()),
        lesson_id: record.lesson_id.clone(),
        media_id: None,
        duration: None,
        default_media_id: record.media_id.clone(),
        default_duration: record.duration_sec,
        candidates: record.media.clone(),
    }
}
