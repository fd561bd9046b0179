use crate::deque::UrlRedirectDeque;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::Result;
use crate::model::UrlMeasurement;
use crate::step::{SingleStepMeasurement, measure_with_test_helper};
use crate::thelper::ThClient;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use websteps_scanner::{
    DnsLookupMeasurement, DnsResolverInfo, EndpointMeasurement, EndpointPlan, Measurer,
};

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Options for measuring a URL and following its redirects
#[derive(Debug, Clone)]
pub struct MeasureOptions {
    /// Stop after this many URLMeasurements have been measured
    pub max_redirects: usize,
    /// Whether the root URLMeasurement probes both HTTP and HTTPS
    pub force_both_schemes: bool,
    pub resolvers: Vec<DnsResolverInfo>,
}

impl Default for MeasureOptions {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            force_both_schemes: true,
            resolvers: vec![DnsResolverInfo::system()],
        }
    }
}

/// Callback invoked with every URLMeasurement as soon as it is measured
pub type MeasureResultCallback = Arc<dyn Fn(&UrlMeasurement) + Send + Sync>;

/// Resolves the domain of `um` with every resolver, concurrently.
pub async fn lookup_dns<M: Measurer + ?Sized>(
    measurer: &M,
    um: &UrlMeasurement,
    resolvers: &[DnsResolverInfo],
) -> Vec<DnsLookupMeasurement> {
    let plans = um.new_dns_lookup_plans(resolvers);
    join_all(plans.iter().map(|plan| measurer.lookup_dns(plan))).await
}

/// Runs every plan concurrently, one future per plan, and returns once
/// all of them completed.
pub async fn run_endpoint_plans<M: Measurer + ?Sized>(
    measurer: &M,
    plans: &[EndpointPlan],
) -> Vec<EndpointMeasurement> {
    join_all(plans.iter().map(|plan| measurer.probe_endpoint(plan))).await
}

/// Resolves and probes a single URLMeasurement, recording the results
/// into it. Failures are recorded, never returned.
pub async fn measure_session<M: Measurer + ?Sized>(
    measurer: &M,
    um: &mut UrlMeasurement,
    resolvers: &[DnsResolverInfo],
    sink: &dyn DiagnosticSink,
) {
    let dns = lookup_dns(measurer, um, resolvers).await;
    um.add_dns(dns);

    let (plans, any) = um.new_endpoint_plan_with(sink);
    if !any {
        debug!("No endpoints to probe for {}", um.url);
        return;
    }
    debug!("Probing {} endpoints for {}", plans.len(), um.url);
    let results = run_endpoint_plans(measurer, &plans).await;
    um.add_endpoint(results);
}

/// Measures `url` and every URL it redirects to, breadth-first.
///
/// Returns the measured URLMeasurements in visit order. The only error
/// is a root URL that cannot be measured at all.
pub async fn measure_url<M: Measurer + ?Sized>(
    measurer: &M,
    url: &str,
    options: &MeasureOptions,
) -> Result<Vec<UrlMeasurement>> {
    measure_url_with(measurer, url, options, None, &TracingSink).await
}

pub async fn measure_url_with<M: Measurer + ?Sized>(
    measurer: &M,
    url: &str,
    options: &MeasureOptions,
    result_callback: Option<MeasureResultCallback>,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<UrlMeasurement>> {
    let cancel = CancellationToken::new();
    let steps = traverse(measurer, url, options, None, &cancel, result_callback, sink).await?;
    Ok(steps.into_iter().map(|step| step.probe_initial).collect())
}

/// Like [`measure_url_with`], but every hop is also submitted to the test
/// helper behind `client`, and endpoints only the helper resolved are
/// probed as well. Stops early once `cancel` fires.
pub async fn measure_url_steps<M: Measurer + ?Sized>(
    measurer: &M,
    url: &str,
    options: &MeasureOptions,
    client: &ThClient,
    cancel: &CancellationToken,
    result_callback: Option<MeasureResultCallback>,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<SingleStepMeasurement>> {
    traverse(measurer, url, options, Some(client), cancel, result_callback, sink).await
}

async fn traverse<M: Measurer + ?Sized>(
    measurer: &M,
    url: &str,
    options: &MeasureOptions,
    client: Option<&ThClient>,
    cancel: &CancellationToken,
    result_callback: Option<MeasureResultCallback>,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<SingleStepMeasurement>> {
    let mut root = UrlMeasurement::new(url)?;
    root.force_both_schemes = options.force_both_schemes;

    let mut deque = UrlRedirectDeque::new();
    deque.append([root]);

    let mut out = Vec::new();
    while !deque.is_empty() && deque.depth() < options.max_redirects {
        if cancel.is_cancelled() {
            info!("Measurement of {} canceled", url);
            break;
        }
        let mut cur = deque.pop_left();
        info!("Measuring {} (hop {})", cur.url, deque.depth());

        measure_session(measurer, &mut cur, &options.resolvers, sink).await;

        // all probes have joined, so siblings cannot be revisited
        deque.remember_visited(&cur);
        let (follow_ups, _) = cur.redirects();
        deque.append(follow_ups);
        debug!("Redirect queue: {}", deque);

        let mut step = SingleStepMeasurement::new(cur);
        if let Some(client) = client {
            let (th, additional) =
                measure_with_test_helper(measurer, client, &step.probe_initial, cancel, sink).await;
            step.th = th;
            step.probe_additional = additional;
        }

        if let Some(ref callback) = result_callback {
            callback(&step.probe_initial);
        }
        out.push(step);
    }

    if !deque.is_empty() && !cancel.is_cancelled() {
        info!(
            "Redirect budget of {} reached, dropping {} queued URLs",
            options.max_redirects,
            deque.len()
        );
    }
    Ok(out)
}
