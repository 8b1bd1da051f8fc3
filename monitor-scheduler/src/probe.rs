use async_trait::async_trait;
use monitor_core::{
    Result,
    models::{Check, HttpMethod, ProbeOutcome},
};
use reqwest::{Client, Method, redirect::Policy};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// One outbound request, already resolved from a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub method: HttpMethod,
    pub url: Url,
}

/// Sends probe requests. Implementations only report what came back; the
/// time bound is applied by [`ProbeExecutor`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Status code of the response, or a description of the transport failure.
    async fn send(&self, request: &ProbeRequest) -> std::result::Result<u16, String>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        // Redirects are reported as their own status code.
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self { client })
    }
}

fn reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ProbeRequest) -> std::result::Result<u16, String> {
        let response = self
            .client
            .request(reqwest_method(request.method), request.url.clone())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}

/// Runs exactly one bounded request per check and classifies what happened.
#[derive(Clone)]
pub struct ProbeExecutor {
    transport: Arc<dyn Transport>,
}

impl ProbeExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Probe `check` once.
    ///
    /// The first of response, transport error or timeout wins. On timeout the
    /// request future is dropped, so a response arriving later is never seen.
    /// No retries.
    pub async fn probe(&self, check: &Check) -> ProbeOutcome {
        let url = match check.target() {
            Ok(url) => url,
            Err(e) => return ProbeOutcome::transport(e.to_string()),
        };
        let request = ProbeRequest { method: check.method, url };

        let outcome = match tokio::time::timeout(check.timeout(), self.transport.send(&request)).await {
            Ok(Ok(code)) => ProbeOutcome::response(code),
            Ok(Err(detail)) => ProbeOutcome::transport(detail),
            Err(_) => ProbeOutcome::timeout(),
        };

        debug!(
            check_id = %check.id,
            method = request.method.as_upper(),
            url = %request.url,
            ?outcome,
            "probe finished"
        );
        outcome
    }
}
