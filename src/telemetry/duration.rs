use tracing::info;

use super::error::{TelemetryError, TelemetryResult};

/// One day in seconds; longer "lectures" are assumed to be milliseconds.
const IMPLAUSIBLE_SECONDS: f64 = 86_400.0;
/// Half a day in seconds; the upper bound for a reinterpreted value.
const PLAUSIBLE_SECONDS: f64 = 43_200.0;

/// Resolves a duration that upstream may report in seconds or milliseconds.
///
/// This is a best-effort heuristic: with `auto_fix` enabled, a value above one
/// day whose thousandth is at most half a day is taken to be milliseconds.
/// Anything else is returned untouched.
pub(crate) fn normalize_duration(raw: Option<f64>, auto_fix: bool) -> TelemetryResult<f64> {
    let value = raw.ok_or(TelemetryError::MissingDuration)?;
    if auto_fix && value > IMPLAUSIBLE_SECONDS {
        let candidate = value / 1000.0;
        if candidate <= PLAUSIBLE_SECONDS {
            info!(raw = value, seconds = candidate, "treating duration as milliseconds");
            return Ok(candidate);
        }
    }
    Ok(value)
}
