use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::{TelemetryError, TelemetryResult};
use super::payload::PayloadEncoder;
use super::timeline::Timeline;

pub(crate) const SUCCESS_STATUS: u16 = 200;
pub(crate) const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_millis(300);

pub(crate) type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Post,
}

impl Method {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TransportResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

/// Request/response plumbing consumed by the delivery engine.
///
/// Implementations report any HTTP status as `Ok`; only connection failures,
/// timeouts and unreadable responses are errors.
pub(crate) trait Transport {
    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&str>,
        timeout: Duration,
    ) -> TelemetryResult<TransportResponse>;
}

/// Where batches are posted.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeliveryTarget {
    pub(crate) url: String,
    pub(crate) headers: Headers,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeliveryOptions {
    /// Events per request; `0` sends the whole timeline at once.
    pub(crate) batch_size: usize,
    pub(crate) timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) inter_batch_delay: Duration,
    pub(crate) retry_cooldown: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            batch_size: 120,
            timeout: Duration::from_secs(20),
            max_retries: 2,
            inter_batch_delay: Duration::from_millis(80),
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeliveryProgress {
    pub(crate) batch: usize,
    pub(crate) batches: usize,
    pub(crate) delivered: usize,
    pub(crate) total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeliveryResult {
    pub(crate) success: bool,
    /// Events in fully acknowledged batches only.
    pub(crate) delivered: usize,
    pub(crate) last_status: Option<u16>,
    pub(crate) last_body: Option<String>,
    pub(crate) last_error: Option<String>,
}

/// Posts a timeline batch by batch, strictly in order.
///
/// Each batch gets `max_retries + 1` attempts. A batch that never succeeds
/// ends the run: later batches would report progress the endpoint has not
/// seen the earlier part of.
pub(crate) struct BatchSender<'a, T: Transport + ?Sized> {
    transport: &'a T,
    encoder: &'a dyn PayloadEncoder,
    target: &'a DeliveryTarget,
    options: DeliveryOptions,
    pause: Box<dyn FnMut(Duration) + 'a>,
}

impl<'a, T: Transport + ?Sized> BatchSender<'a, T> {
    pub(crate) fn new(
        transport: &'a T,
        encoder: &'a dyn PayloadEncoder,
        target: &'a DeliveryTarget,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            transport,
            encoder,
            target,
            options,
            pause: Box::new(thread::sleep),
        }
    }

    /// Replaces the timed wait used for cooldowns and pacing.
    pub(crate) fn with_pause<F>(mut self, pause: F) -> Self
    where
        F: FnMut(Duration) + 'a,
    {
        self.pause = Box::new(pause);
        self
    }

    pub(crate) fn deliver<F>(&mut self, timeline: &Timeline, mut on_progress: F) -> DeliveryResult
    where
        F: FnMut(DeliveryProgress),
    {
        let total = timeline.len();
        let batch_size = match self.options.batch_size {
            0 => total.max(1),
            size => size,
        };
        let batches = total.div_ceil(batch_size);

        let mut delivered = 0;
        let mut last_status = None;
        let mut last_body = None;

        for (index, chunk) in timeline.events.chunks(batch_size).enumerate() {
            let payload = match self.encoder.encode(timeline, chunk) {
                Ok(payload) => payload,
                Err(err) => {
                    return DeliveryResult {
                        success: false,
                        delivered,
                        last_status: None,
                        last_body: None,
                        last_error: Some(err.to_string()),
                    };
                }
            };

            let mut attempt = 0;
            let outcome = loop {
                let result = self.attempt(&payload);
                let response = response_of(&result);
                last_status = response.map(|response| response.status);
                last_body = response.map(|response| response.body.clone());
                let err = match result {
                    Ok(_) => break Ok(()),
                    Err(err) => err,
                };

                attempt += 1;
                if attempt > self.options.max_retries {
                    break Err(err);
                }
                warn!(
                    batch = index + 1,
                    batches,
                    attempt,
                    max_retries = self.options.max_retries,
                    "retrying batch: {err}"
                );
                (self.pause)(self.options.retry_cooldown);
            };

            if let Err(err) = outcome {
                warn!(batch = index + 1, batches, delivered, "batch failed: {err}");
                return DeliveryResult {
                    success: false,
                    delivered,
                    last_status,
                    last_body,
                    last_error: Some(err.to_string()),
                };
            }

            delivered += chunk.len();
            debug!(batch = index + 1, batches, delivered, total, "batch delivered");
            on_progress(DeliveryProgress {
                batch: index + 1,
                batches,
                delivered,
                total,
            });

            if index + 1 < batches && !self.options.inter_batch_delay.is_zero() {
                (self.pause)(self.options.inter_batch_delay);
            }
        }

        info!(delivered, total, "timeline delivered");
        DeliveryResult {
            success: true,
            delivered,
            last_status,
            last_body,
            last_error: None,
        }
    }

    /// One request; `Ok` only for the success status.
    fn attempt(&self, payload: &str) -> Result<TransportResponse, AttemptError> {
        let response = self
            .transport
            .send(
                Method::Post,
                &self.target.url,
                &self.target.headers,
                Some(payload),
                self.options.timeout,
            )
            .map_err(AttemptError::Failed)?;

        if response.status == SUCCESS_STATUS {
            Ok(response)
        } else {
            Err(AttemptError::Rejected(response))
        }
    }
}

enum AttemptError {
    Failed(TelemetryError),
    Rejected(TransportResponse),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "{err}"),
            Self::Rejected(response) => write!(
                f,
                "{}",
                TelemetryError::UnexpectedStatus {
                    status: response.status,
                    body: response.body.clone(),
                }
            ),
        }
    }
}

fn response_of(result: &Result<TransportResponse, AttemptError>) -> Option<&TransportResponse> {
    match result {
        Ok(response) | Err(AttemptError::Rejected(response)) => Some(response),
        Err(AttemptError::Failed(_)) => None,
    }
}
