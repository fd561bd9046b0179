// Test helper: wire types, client and stateless request handler

use crate::archival::{ArchivalDnsLookupMeasurement, ArchivalEndpointMeasurement};
use crate::crawl::{lookup_dns, run_endpoint_plans};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{CoreError, PlanningError, Result};
use crate::model::UrlMeasurement;
use crate::plan::{alpn_for_http_endpoint, port_from_url};
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use websteps_scanner::{
    DnsLookupMeasurement, DnsResolverInfo, EndpointMeasurement, EndpointPlan, Measurer,
    NetworkType,
};

pub const DEFAULT_TH_URL: &str = "http://127.0.0.1:9876";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThRequestOptions {
    /// Only probe the scheme of the submitted URL.
    #[serde(default)]
    pub do_not_initially_force_http_and_https: bool,
}

/// One endpoint the client explicitly asks the helper to probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThEndpointPlan {
    /// "tcp" or "quic"
    pub network: String,
    /// `ip:port`
    pub address: String,
    pub url: String,
    #[serde(default)]
    pub cookies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThRequest {
    pub url: String,
    #[serde(default)]
    pub options: ThRequestOptions,
    /// When empty the helper plans endpoints on its own.
    #[serde(default)]
    pub plan: Vec<ThEndpointPlan>,
}

impl ThRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            options: ThRequestOptions::default(),
            plan: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThResponse {
    pub dns: Vec<DnsLookupMeasurement>,
    pub endpoint: Vec<EndpointMeasurement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalThResponse {
    pub dns: Vec<ArchivalDnsLookupMeasurement>,
    pub endpoint: Vec<ArchivalEndpointMeasurement>,
}

impl ThResponse {
    pub fn to_archival(&self, begin: DateTime<Utc>) -> ArchivalThResponse {
        ArchivalThResponse {
            dns: self
                .dns
                .iter()
                .map(|d| ArchivalDnsLookupMeasurement::from_measurement(d, begin))
                .collect(),
            endpoint: self
                .endpoint
                .iter()
                .map(|e| ArchivalEndpointMeasurement::from_measurement(e, begin))
                .collect(),
        }
    }
}

/// Talks to a remote test helper.
#[derive(Debug, Clone)]
pub struct ThClient {
    client: reqwest::Client,
    backend: String,
}

impl ThClient {
    pub fn new(backend: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            backend: backend.to_string(),
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub async fn round_trip(&self, request: &ThRequest) -> Result<ThResponse> {
        debug!("Submitting {} to {}", request.url, self.backend);
        let response = self.client.post(&self.backend).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::TestHelper(format!("{}: {}", status, body.trim())));
        }
        Ok(response.json::<ThResponse>().await?)
    }

    /// Submits `request` in the background. The receiver yields exactly
    /// one value: the response, or an error if the exchange failed or
    /// `cancel` fired first.
    pub fn submit(
        &self,
        request: ThRequest,
        cancel: CancellationToken,
    ) -> oneshot::Receiver<Result<ThResponse>> {
        let (tx, rx) = oneshot::channel();
        let client = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(CoreError::TestHelper("request canceled".to_string())),
                result = client.round_trip(&request) => result,
            };
            // the caller may have dropped the receiver
            let _ = tx.send(outcome);
        });
        rx
    }
}

/// Serves test helper requests. Keeps no state between requests.
pub struct ThHandler<M> {
    measurer: M,
    resolvers: Vec<DnsResolverInfo>,
}

impl<M: Measurer> ThHandler<M> {
    pub fn new(measurer: M) -> Self {
        Self {
            measurer,
            resolvers: vec![DnsResolverInfo::system()],
        }
    }

    pub fn with_resolvers(mut self, resolvers: Vec<DnsResolverInfo>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub async fn handle(&self, request: ThRequest) -> Result<ThResponse> {
        self.handle_with(request, &TracingSink).await
    }

    pub async fn handle_with(
        &self,
        request: ThRequest,
        sink: &dyn DiagnosticSink,
    ) -> Result<ThResponse> {
        let mut um = UrlMeasurement::new(&request.url)?;
        um.force_both_schemes = !request.options.do_not_initially_force_http_and_https;
        info!("Test helper measuring {}", um.url);

        let dns = lookup_dns(&self.measurer, &um, &self.resolvers).await;
        um.add_dns(dns);

        let plans = if request.plan.is_empty() {
            um.new_endpoint_plan_with(sink).0
        } else {
            explicit_plans(&um, &request.plan, sink)
        };
        let results = run_endpoint_plans(&self.measurer, &plans).await;
        um.add_endpoint(results);

        Ok(ThResponse {
            dns: um.dns().to_vec(),
            endpoint: um.endpoint().to_vec(),
        })
    }
}

/// Converts the client's plan into endpoint plans, skipping bad entries.
fn explicit_plans(
    um: &UrlMeasurement,
    entries: &[ThEndpointPlan],
    sink: &dyn DiagnosticSink,
) -> Vec<EndpointPlan> {
    let mut out = Vec::new();
    for entry in entries {
        match explicit_plan(um, entry) {
            Ok(plan) => out.push(plan),
            Err(error) => sink.skipped(&error),
        }
    }
    out
}

fn explicit_plan(
    um: &UrlMeasurement,
    entry: &ThEndpointPlan,
) -> std::result::Result<EndpointPlan, PlanningError> {
    let network: NetworkType = entry
        .network
        .parse()
        .map_err(|_| PlanningError::InvalidPlanEntry(format!("network {:?}", entry.network)))?;
    let url = Url::parse(&entry.url)
        .map_err(|_| PlanningError::InvalidPlanEntry(format!("url {:?}", entry.url)))?;
    port_from_url(&url)?;
    if entry.address.parse::<SocketAddr>().is_err() {
        return Err(PlanningError::AddressParse {
            address: entry.address.clone(),
            context: "plan".to_string(),
        });
    }
    let domain = url.host_str().unwrap_or_default().to_string();
    Ok(EndpointPlan {
        url_measurement_id: um.id(),
        domain: domain.clone(),
        network,
        address: entry.address.clone(),
        sni: domain,
        alpn: alpn_for_http_endpoint(network),
        url,
        headers: um.headers.clone(),
        cookies: entry.cookies.clone(),
    })
}

async fn th_endpoint<M: Measurer + 'static>(
    State(handler): State<Arc<ThHandler<M>>>,
    Json(request): Json<ThRequest>,
) -> Response {
    match handler.handle(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!("Test helper request failed: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Exposes `handler` as `POST /`.
pub fn router<M: Measurer + 'static>(handler: Arc<ThHandler<M>>) -> Router {
    Router::new()
        .route("/", post(th_endpoint::<M>))
        .with_state(handler)
}
