use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use super::lesson::*;
use super::manifest::*;
use super::{BatchSummary, manifest_input, run_manifest};
use crate::cli::DeliveryArgs;
use crate::config::{DeliverySettings, TimelineSettings, parse_header};
use crate::telemetry::{
    DeliveryOptions, DeliveryResult, DeliveryTarget, Headers, MediaCandidate, Method,
    TelemetryError, TelemetryResult, Transport, TransportResponse,
};

fn candidate(id: &str, duration_sec: f64, order: i64) -> MediaCandidate {
    MediaCandidate {
        id: Some(id.to_string()),
        duration_sec: Some(duration_sec),
        order: Some(order),
        ..MediaCandidate::default()
    }
}

fn full_input() -> LessonInput {
    LessonInput {
        user_id: Some("1001".to_string()),
        course_id: Some("2002".to_string()),
        classroom_id: Some("3003".to_string()),
        lesson_id: Some("4004".to_string()),
        ..LessonInput::default()
    }
}

fn timeline_settings() -> TimelineSettings {
    TimelineSettings {
        interval: 5.0,
        auto_fix_ms: true,
        wire: None,
    }
}

#[derive(Default)]
struct RecordingTransport {
    statuses: RefCell<VecDeque<u16>>,
    bodies: RefCell<Vec<String>>,
}

impl RecordingTransport {
    fn with_statuses(statuses: Vec<u16>) -> Self {
        Self {
            statuses: RefCell::new(VecDeque::from(statuses)),
            bodies: RefCell::new(Vec::new()),
        }
    }

    fn lesson_ids(&self) -> Vec<String> {
        self.bodies
            .borrow()
            .iter()
            .map(|body| {
                let parsed: Value = serde_json::from_str(body).expect("json body");
                parsed["heart_data"][0]["lesson_id"]
                    .as_str()
                    .expect("lesson id")
                    .to_string()
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(
        &self,
        method: Method,
        _url: &str,
        _headers: &Headers,
        body: Option<&str>,
        _timeout: Duration,
    ) -> TelemetryResult<TransportResponse> {
        assert_eq!(method, Method::Post);
        self.bodies
            .borrow_mut()
            .push(body.unwrap_or_default().to_string());
        match self.statuses.borrow_mut().pop_front() {
            Some(0) => Err(TelemetryError::transport("connection reset")),
            Some(status) => Ok(TransportResponse {
                status,
                body: format!("status-{status}"),
            }),
            None => Ok(TransportResponse {
                status: 200,
                body: "ok".to_string(),
            }),
        }
    }
}

fn delivery_settings(batch_size: usize, max_retries: u32) -> DeliverySettings {
    DeliverySettings {
        target: DeliveryTarget {
            url: "http://ingest.test/heartbeat".to_string(),
            headers: Headers::new(),
        },
        options: DeliveryOptions {
            batch_size,
            max_retries,
            ..DeliveryOptions::default()
        },
    }
}

fn delivery_args(endpoint: Option<&str>) -> DeliveryArgs {
    DeliveryArgs {
        endpoint: endpoint.map(str::to_string),
        headers: Vec::new(),
        cookie: None,
        batch_size: 120,
        timeout: 20,
        retries: 2,
        batch_delay_ms: 80,
    }
}

#[test]
fn resolve_lesson_uses_longest_candidate() {
    let input = LessonInput {
        candidates: vec![
            candidate("lecturer-cam", 35.0, 0),
            candidate("screen", 2_710.456, 1),
        ],
        ..full_input()
    };

    let lesson = resolve_lesson(&input, true).expect("lesson should resolve");
    assert_eq!(lesson.identity.media_id, "screen");
    assert_eq!(lesson.duration, 2_710.456);
    assert_eq!(lesson.identity.lesson_id, "4004");
}

#[test]
fn resolve_lesson_explicit_values_override_selection() {
    let input = LessonInput {
        media_id: Some("forced".to_string()),
        duration: Some(600.0),
        candidates: vec![candidate("screen", 2_710.0, 0)],
        ..full_input()
    };

    let lesson = resolve_lesson(&input, true).expect("lesson should resolve");
    assert_eq!(lesson.identity.media_id, "forced");
    assert_eq!(lesson.duration, 600.0);
}

#[test]
fn resolve_lesson_normalizes_millisecond_duration() {
    let input = LessonInput {
        media_id: Some("m".to_string()),
        duration: Some(5_400_000.0),
        ..full_input()
    };

    assert_eq!(resolve_lesson(&input, true).expect("resolves").duration, 5_400.0);
    assert_eq!(
        resolve_lesson(&input, false).expect("resolves").duration,
        5_400_000.0
    );
}

#[test]
fn resolve_lesson_falls_back_to_lesson_defaults() {
    let input = LessonInput {
        default_media_id: Some("lesson-default".to_string()),
        default_duration: Some(1_800.0),
        ..full_input()
    };

    let lesson = resolve_lesson(&input, true).expect("defaults should be enough");
    assert_eq!(lesson.identity.media_id, "lesson-default");
    assert_eq!(lesson.duration, 1_800.0);
}

#[test]
fn resolve_lesson_reports_missing_duration() {
    let input = LessonInput {
        media_id: Some("m".to_string()),
        ..full_input()
    };

    let err = resolve_lesson(&input, true).expect_err("duration is required");
    assert!(
        err.downcast_ref::<TelemetryError>()
            .is_some_and(|err| matches!(err, TelemetryError::MissingDuration)),
        "unexpected error: {err:#}"
    );
}

#[test]
fn resolve_lesson_rejects_zero_duration_and_missing_ids() {
    let zero = LessonInput {
        media_id: Some("m".to_string()),
        duration: Some(0.0),
        ..full_input()
    };
    let err = resolve_lesson(&zero, true).expect_err("zero duration");
    assert!(err.to_string().contains("must be positive"), "{err:#}");

    let no_user = LessonInput {
        user_id: Some("  ".to_string()),
        media_id: Some("m".to_string()),
        duration: Some(60.0),
        ..full_input()
    };
    let err = resolve_lesson(&no_user, true).expect_err("blank user id");
    assert_eq!(err.to_string(), "missing user id");

    let no_media = LessonInput {
        duration: Some(60.0),
        ..full_input()
    };
    let err = resolve_lesson(&no_media, true).expect_err("no media id anywhere");
    assert_eq!(err.to_string(), "missing media id");
}

#[test]
fn build_timeline_rejects_non_positive_interval() {
    let lesson = resolve_lesson(
        &LessonInput {
            media_id: Some("m".to_string()),
            duration: Some(12.0),
            ..full_input()
        },
        true,
    )
    .expect("resolves");
    let settings = TimelineSettings {
        interval: 0.0,
        ..timeline_settings()
    };

    let err = build_timeline(&lesson, &settings).expect_err("interval 0 must fail");
    assert!(
        err.downcast_ref::<TelemetryError>()
            .is_some_and(|err| matches!(err, TelemetryError::InvalidInterval(_))),
        "unexpected error: {err:#}"
    );
}

#[test]
fn delivery_failure_message_reports_count_and_status() {
    let result = DeliveryResult {
        success: false,
        delivered: 100,
        last_status: Some(500),
        last_body: Some("oops".to_string()),
        last_error: Some("HTTP status 500 (oops)".to_string()),
    };
    assert_eq!(
        delivery_failure_message(&result),
        "Delivery failed after 100 event(s) sent; last status 500; HTTP status 500 (oops)"
    );
}

const MANIFEST: &str = r#"{
    "user_id": 1001,
    "course_id": "2002",
    "classroom_id": 3003,
    "wire": {"log_type": "lecture"},
    "lessons": [
        {"lesson_id": "late", "title": "Week 2", "create_time": 1700000500000,
         "media": [{"id": 52, "duration_sec": 12.0, "order": 0}]},
        {"lesson_id": "broken", "title": "No media", "create_time": 1700000200000},
        {"lesson_id": "early", "title": "Week 1", "create_time": 1700000100000,
         "duration_sec": 7.0, "media_id": "51"}
    ]
}"#;

#[test]
fn manifest_parses_and_orders_lessons_by_creation_time() {
    let manifest = Manifest::parse(MANIFEST).expect("manifest parses");
    assert_eq!(manifest.user_id.as_deref(), Some("1001"));
    assert_eq!(manifest.classroom_id.as_deref(), Some("3003"));
    assert_eq!(
        manifest.wire.as_ref().map(|wire| wire.log_type.as_str()),
        Some("lecture")
    );

    let order = manifest
        .ordered_lessons()
        .iter()
        .map(|lesson| lesson.lesson_id.clone().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["early", "broken", "late"]);
}

#[test]
fn manifest_keeps_listing_order_for_lessons_without_time() {
    let manifest = Manifest::parse(
        r#"{"lessons": [{"lesson_id": "b"}, {"lesson_id": "a"}, {"lesson_id": "c", "create_time": 5}]}"#,
    )
    .expect("manifest parses");

    let order = manifest
        .ordered_lessons()
        .iter()
        .map(|lesson| lesson.lesson_id.clone().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["b", "a", "c"]);
}

#[test]
fn manifest_input_prefers_lesson_level_ids() {
    let manifest = Manifest::parse(MANIFEST).expect("manifest parses");
    let record = LessonRecord {
        lesson_id: Some("x".to_string()),
        classroom_id: Some("override-room".to_string()),
        ..LessonRecord::default()
    };

    let input = manifest_input(&manifest, &record);
    assert_eq!(input.classroom_id.as_deref(), Some("override-room"));
    assert_eq!(input.course_id.as_deref(), Some("2002"));
    assert_eq!(input.user_id.as_deref(), Some("1001"));
}

#[test]
fn lesson_display_title_falls_back_to_lesson_id() {
    let record = LessonRecord {
        lesson_id: Some("4004".to_string()),
        ..LessonRecord::default()
    };
    assert_eq!(record.display_title(), "4004");

    let record = LessonRecord {
        title: " Week 3 ".to_string(),
        ..LessonRecord::default()
    };
    assert_eq!(record.display_title(), "Week 3");
}

#[test]
fn run_manifest_processes_lessons_in_order_and_skips_failures() {
    let manifest = Manifest::parse(MANIFEST).expect("manifest parses");
    let transport = RecordingTransport::default();
    let delivery = delivery_settings(0, 2);
    let mut pauses = Vec::new();

    let summary = run_manifest(
        &manifest,
        &timeline_settings(),
        Some(&delivery),
        &transport,
        Duration::from_secs(10),
        &mut |delay: Duration| pauses.push(delay),
    );

    assert_eq!(summary, BatchSummary { ok: 2, total: 3 });
    assert_eq!(transport.lesson_ids(), vec!["early", "late"]);
    assert_eq!(
        pauses,
        vec![Duration::from_secs(10), Duration::from_secs(10)]
    );

    let bodies = transport.bodies.borrow();
    let late: Value = serde_json::from_str(&bodies[1]).expect("json");
    let records = late["heart_data"].as_array().expect("records");
    assert_eq!(records.len(), 9);
    assert_eq!(records[0]["v"], "52");
    assert_eq!(records[0]["t"], "lecture");
    assert_eq!(records[8]["cp"], 12.0);
}

#[test]
fn run_manifest_counts_failed_delivery_as_not_ok() {
    let manifest = Manifest::parse(MANIFEST).expect("manifest parses");
    let transport = RecordingTransport::with_statuses(vec![0, 500, 200]);
    let delivery = delivery_settings(0, 1);

    let summary = run_manifest(
        &manifest,
        &timeline_settings(),
        Some(&delivery),
        &transport,
        Duration::ZERO,
        &mut |_: Duration| {},
    );

    assert_eq!(summary, BatchSummary { ok: 1, total: 3 });
    assert_eq!(transport.lesson_ids(), vec!["early", "early", "late"]);
}

#[test]
fn run_manifest_dry_run_never_sends() {
    let manifest = Manifest::parse(MANIFEST).expect("manifest parses");
    let transport = RecordingTransport::default();

    let summary = run_manifest(
        &manifest,
        &timeline_settings(),
        None,
        &transport,
        Duration::ZERO,
        &mut |_: Duration| panic!("no pause expected"),
    );

    assert_eq!(summary, BatchSummary { ok: 2, total: 3 });
    assert!(transport.bodies.borrow().is_empty());
}

#[test]
fn parse_header_splits_on_first_colon() {
    assert_eq!(
        parse_header("Referer: https://example.test/a:b").expect("valid header"),
        (
            "Referer".to_string(),
            "https://example.test/a:b".to_string()
        )
    );
    assert!(parse_header("no-colon").is_err());
    assert!(parse_header(": value").is_err());
    assert!(parse_header("Bad Name: value").is_err());
}

#[test]
fn delivery_settings_collects_headers_and_cookie() {
    let args = DeliveryArgs {
        headers: vec!["X-Client: web".to_string()],
        cookie: Some(" sessionid=abc ".to_string()),
        batch_size: 50,
        retries: 4,
        ..delivery_args(Some("https://ingest.example/heartbeat/"))
    };

    let settings = DeliverySettings::from_args(&args).expect("valid settings");
    assert_eq!(settings.target.url, "https://ingest.example/heartbeat/");
    assert_eq!(
        settings.target.headers.get("X-Client").map(String::as_str),
        Some("web")
    );
    assert_eq!(
        settings.target.headers.get("Cookie").map(String::as_str),
        Some("sessionid=abc")
    );
    assert_eq!(settings.options.batch_size, 50);
    assert_eq!(settings.options.max_retries, 4);
    assert_eq!(settings.options.timeout, Duration::from_secs(20));
    assert_eq!(settings.options.inter_batch_delay, Duration::from_millis(80));
}

#[test]
fn delivery_settings_requires_http_endpoint() {
    let err = DeliverySettings::from_args(&delivery_args(None)).expect_err("endpoint required");
    assert!(err.to_string().contains("missing ingestion endpoint"), "{err:#}");

    let err = DeliverySettings::from_args(&delivery_args(Some("ftp://nope")))
        .expect_err("scheme checked");
    assert!(err.to_string().contains("http(s)"), "{err:#}");
}
