use serde::{Deserialize, Deserializer};

/// Scores below this floor never displace the "nothing selected" state.
const SCORE_FLOOR: f64 = -9_007_199_254_740_991.0;

/// One recorded stream available for a lesson.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawCandidate")]
pub(crate) struct MediaCandidate {
    pub(crate) id: Option<String>,
    pub(crate) duration_sec: Option<f64>,
    pub(crate) order: Option<i64>,
    pub(crate) source: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) start: Option<i64>,
    pub(crate) end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectionResult {
    pub(crate) id: Option<String>,
    pub(crate) duration: Option<f64>,
}

impl MediaCandidate {
    fn score(&self) -> f64 {
        let duration = self.duration_sec.unwrap_or(0.0);
        let order = self.order.unwrap_or(0) as f64;
        duration * 1000.0 - order
    }
}

/// Picks the candidate with the greatest `duration * 1000 - order`.
///
/// Long recordings dominate; `order` only breaks near-ties in favor of
/// earlier segments. Exact ties keep the first candidate seen. When nothing
/// qualifies the defaults are returned unchanged, and a selected candidate
/// missing its id or duration borrows the matching default.
pub(crate) fn select_best(
    candidates: &[MediaCandidate],
    default_id: Option<&str>,
    default_duration: Option<f64>,
) -> SelectionResult {
    let mut best: Option<&MediaCandidate> = None;
    let mut best_score = SCORE_FLOOR;

    for candidate in candidates {
        let score = candidate.score();
        if score > best_score {
            best_score = score;
            best = Some(candidate);
        }
    }

    match best {
        Some(candidate) => SelectionResult {
            id: candidate
                .id
                .clone()
                .or_else(|| default_id.map(str::to_string)),
            duration: candidate.duration_sec.or(default_duration),
        },
        None => SelectionResult {
            id: default_id.map(str::to_string),
            duration: default_duration,
        },
    }
}

#[derive(Deserialize)]
struct RawCandidate {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default)]
    duration_sec: Option<f64>,
    #[serde(default)]
    duration_ms: Option<f64>,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    start: Option<i64>,
    #[serde(default)]
    end: Option<i64>,
}

impl From<RawCandidate> for MediaCandidate {
    fn from(raw: RawCandidate) -> Self {
        let duration_sec = raw
            .duration_sec
            .or_else(|| raw.duration_ms.map(|ms| ms.round() / 1000.0));
        Self {
            id: raw.id.filter(|id| !id.trim().is_empty()),
            duration_sec,
            order: raw.order,
            source: raw.source,
            url: raw.url,
            start: raw.start,
            end: raw.end,
        }
    }
}

/// Accepts ids written either as JSON strings or as JSON numbers.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::Text(text) => text.trim().to_string(),
            StringOrNumber::Int(num) => num.to_string(),
            StringOrNumber::Float(num) => num.to_string(),
        }),
    )
}
