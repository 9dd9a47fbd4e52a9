use std::time::Duration;

use crate::telemetry::{Headers, Method, TelemetryError, TelemetryResult, Transport, TransportResponse};

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Blocking HTTP transport backed by a shared `ureq` agent.
pub(crate) struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub(crate) fn new(connect_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &Headers,
        body: Option<&str>,
        timeout: Duration,
    ) -> TelemetryResult<TransportResponse> {
        let mut request = self.agent.request(method.as_str(), url).timeout(timeout);
        for (name, value) in headers {
            request = request.set(name, value);
        }

        let result = match body {
            Some(body) => {
                if !has_header(headers, "content-type") {
                    request = request.set("Content-Type", JSON_CONTENT_TYPE);
                }
                request.send_string(body)
            }
            None => request.call(),
        };

        match result {
            Ok(response) => read_response(response.status(), response),
            Err(ureq::Error::Status(status, response)) => read_response(status, response),
            Err(ureq::Error::Transport(err)) => Err(TelemetryError::transport(err.to_string())),
        }
    }
}

fn read_response(status: u16, response: ureq::Response) -> TelemetryResult<TransportResponse> {
    let body = response
        .into_string()
        .map_err(|err| TelemetryError::transport(format!("response decode failed: {err}")))?;
    Ok(TransportResponse { status, body })
}

fn has_header(headers: &Headers, name: &str) -> bool {
    headers.keys().any(|key| key.eq_ignore_ascii_case(name))
}
