// Measurement steps: the local view of a URL next to the test helper's

use crate::archival::{ArchivalEndpointMeasurement, ArchivalUrlMeasurement};
use crate::crawl::run_endpoint_plans;
use crate::diagnostics::DiagnosticSink;
use crate::model::UrlMeasurement;
use crate::thelper::{
    ArchivalThResponse, ThClient, ThEndpointPlan, ThRequest, ThRequestOptions, ThResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use websteps_scanner::{EndpointMeasurement, EndpointPlan, Measurer};

/// One hop of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleStepMeasurement {
    /// What was measured locally.
    pub probe_initial: UrlMeasurement,
    /// The test helper's measurement of the same URL, when one was asked.
    pub th: Option<ThResponse>,
    /// Endpoints only the test helper knew about, measured locally.
    pub probe_additional: Vec<EndpointMeasurement>,
}

impl SingleStepMeasurement {
    pub fn new(probe_initial: UrlMeasurement) -> Self {
        Self {
            probe_initial,
            th: None,
            probe_additional: Vec::new(),
        }
    }
}

impl From<UrlMeasurement> for SingleStepMeasurement {
    fn from(um: UrlMeasurement) -> Self {
        Self::new(um)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivalSingleStepMeasurement {
    #[serde(flatten)]
    pub probe_initial: ArchivalUrlMeasurement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub th: Option<ArchivalThResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub probe_additional: Vec<ArchivalEndpointMeasurement>,
}

impl ArchivalSingleStepMeasurement {
    pub fn from_step(step: &SingleStepMeasurement, begin: DateTime<Utc>) -> Self {
        Self {
            probe_initial: ArchivalUrlMeasurement::from_measurement(&step.probe_initial, begin),
            th: step.th.as_ref().map(|th| th.to_archival(begin)),
            probe_additional: step
                .probe_additional
                .iter()
                .map(|e| ArchivalEndpointMeasurement::from_measurement(e, begin))
                .collect(),
        }
    }
}

impl UrlMeasurement {
    /// Asks the test helper to repeat the endpoints this measurement
    /// measured. Without any, the helper plans on its own.
    pub fn th_request(&self) -> ThRequest {
        let mut seen = HashSet::new();
        let plan = self
            .endpoint()
            .iter()
            .filter(|e| seen.insert((e.network, e.address.clone(), e.url.to_string())))
            .map(|e| ThEndpointPlan {
                network: e.network.as_str().to_string(),
                address: e.address.clone(),
                url: e.url.to_string(),
                cookies: self.cookies.clone(),
            })
            .collect();
        ThRequest {
            url: self.url.to_string(),
            options: ThRequestOptions {
                do_not_initially_force_http_and_https: !self.force_both_schemes,
            },
            plan,
        }
    }

    /// Plans for the addresses the test helper resolved that this
    /// measurement did not test yet.
    pub fn additional_endpoint_plan_with(
        &self,
        th: &ThResponse,
        sink: &dyn DiagnosticSink,
    ) -> Vec<EndpointPlan> {
        let mut merged = self.clone();
        merged.add_dns(th.dns.iter().cloned());
        merged.new_endpoint_plan_with(sink).0
    }
}

/// Submits `um` to the test helper, then measures whatever new endpoints
/// the helper's answer reveals. A failed exchange leaves both empty.
pub async fn measure_with_test_helper<M: Measurer + ?Sized>(
    measurer: &M,
    client: &ThClient,
    um: &UrlMeasurement,
    cancel: &CancellationToken,
    sink: &dyn DiagnosticSink,
) -> (Option<ThResponse>, Vec<EndpointMeasurement>) {
    let rx = client.submit(um.th_request(), cancel.child_token());
    let response = match rx.await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!("Test helper failed for {}: {}", um.url, e);
            return (None, Vec::new());
        }
        Err(_) => {
            warn!("Test helper task for {} vanished", um.url);
            return (None, Vec::new());
        }
    };

    let plans = um.additional_endpoint_plan_with(&response, sink);
    if plans.is_empty() {
        return (Some(response), Vec::new());
    }
    debug!("Measuring {} additional endpoints for {}", plans.len(), um.url);
    let additional = run_endpoint_plans(measurer, &plans).await;
    (Some(response), additional)
}
