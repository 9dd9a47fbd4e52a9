mod delivery;
mod duration;
mod error;
mod payload;
mod select;
mod timeline;

pub(crate) use delivery::*;
pub(crate) use duration::normalize_duration;
pub(crate) use error::{TelemetryError, TelemetryResult};
pub(crate) use payload::{HeartDataEncoder, PayloadEncoder, WireProfile};
pub(crate) use select::{MediaCandidate, lenient_string, select_best};
pub(crate) use timeline::{EventIdentity, Timeline, generate};
