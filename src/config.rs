use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::cli::{DeliveryArgs, TimelineArgs};
use crate::telemetry::{
    DEFAULT_RETRY_COOLDOWN, DeliveryOptions, DeliveryTarget, Headers, WireProfile,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TimelineSettings {
    pub(crate) interval: f64,
    pub(crate) auto_fix_ms: bool,
    pub(crate) wire: Option<WireProfile>,
}

impl TimelineSettings {
    pub(crate) fn from_args(args: &TimelineArgs) -> Result<Self> {
        let wire = args
            .wire_profile
            .as_deref()
            .map(load_wire_profile)
            .transpose()?;
        Ok(Self {
            interval: args.interval,
            auto_fix_ms: !args.no_auto_fix_ms,
            wire,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DeliverySettings {
    pub(crate) target: DeliveryTarget,
    pub(crate) options: DeliveryOptions,
}

impl DeliverySettings {
    pub(crate) fn from_args(args: &DeliveryArgs) -> Result<Self> {
        let url = args
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .context("missing ingestion endpoint (pass --endpoint or set LESSONBEAT_ENDPOINT)")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("endpoint must be an http(s) URL, got '{url}'");
        }

        let mut headers = Headers::new();
        for raw in &args.headers {
            let (name, value) = parse_header(raw)?;
            headers.insert(name, value);
        }
        if let Some(cookie) = args.cookie.as_deref().map(str::trim)
            && !cookie.is_empty()
        {
            headers.insert("Cookie".to_string(), cookie.to_string());
        }

        Ok(Self {
            target: DeliveryTarget {
                url: url.to_string(),
                headers,
            },
            options: DeliveryOptions {
                batch_size: args.batch_size,
                timeout: Duration::from_secs(args.timeout),
                max_retries: args.retries,
                inter_batch_delay: Duration::from_millis(args.batch_delay_ms),
                retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            },
        })
    }
}

/// Parses a `Name: value` header argument.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header '{raw}' must look like 'Name: value'"))?;
    let name = name.trim();
    if name.is_empty() || name.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        bail!("invalid header name in '{raw}'");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub(crate) fn load_wire_profile(path: &Path) -> Result<WireProfile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read wire profile {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse wire profile {}", path.display()))
}
