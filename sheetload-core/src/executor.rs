use std::sync::Arc;
use std::time::Duration;

use sheetload_http::{HttpClient, HttpRequest, join_url};
use sheetload_metrics::Registry;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::flow::{Flow, Group, Step};
use crate::lifecycle::SetupContext;
use crate::request_metrics::{RequestSample, RunMetricIds};
use crate::vu::{Interrupt, VuContext};

/// Lower bound on the pause of a short-circuited iteration against an unhealthy service.
const UNHEALTHY_PAUSE: Duration = Duration::from_millis(100);

/// Walks the flow once per iteration on behalf of a VU.
///
/// Shared by every VU of a run; holds no per-VU state.
#[derive(Debug)]
pub struct FlowExecutor {
    pub client: HttpClient,
    pub base_url: String,
    pub flow: Arc<Flow>,
    pub setup: Arc<SetupContext>,
    pub metrics: Arc<Registry>,
    pub ids: RunMetricIds,
    /// Pause after each step, and the whole iteration when the service is unhealthy
    /// (never shorter than 100ms there).
    pub think_time: Duration,
    pub request_timeout: Option<Duration>,
}

/// What a single iteration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationOutcome {
    pub requests: u64,
    pub skipped_groups: u64,
    pub interrupted: bool,
}

impl FlowExecutor {
    /// VU body: iterate until the scheduler drains this VU or the run is interrupted.
    pub async fn run_vu(self: Arc<Self>, ctx: VuContext) -> u64 {
        let vu_id = ctx.vu_id;
        let interrupt = ctx.interrupt.clone();
        debug!(vu_id, "vu waiting for start");

        let iterations = ctx
            .run_loop(|| {
                let exec = self.clone();
                let interrupt = interrupt.clone();
                async move {
                    let outcome = exec.run_iteration(&interrupt).await;
                    trace!(
                        vu_id,
                        requests = outcome.requests,
                        skipped_groups = outcome.skipped_groups,
                        interrupted = outcome.interrupted,
                        "iteration done"
                    );
                }
            })
            .await;

        debug!(vu_id, iterations, "vu stopped");
        iterations
    }

    pub async fn run_iteration(&self, interrupt: &Interrupt) -> IterationOutcome {
        let started = Instant::now();
        let mut outcome = IterationOutcome::default();

        if !self.setup.healthy {
            let pause = self.think_time.max(UNHEALTHY_PAUSE);
            outcome.interrupted = !interrupt.sleep(pause).await;
            self.ids.record_iteration(&self.metrics, started.elapsed());
            return outcome;
        }

        'groups: for group in &self.flow.groups {
            if group.requires_auth && self.setup.token.is_none() {
                trace!(group = %group.name, "skipping group without a token");
                outcome.skipped_groups += 1;
                continue;
            }

            for step in &group.steps {
                if interrupt.is_triggered() {
                    outcome.interrupted = true;
                    break 'groups;
                }

                self.run_step(group, step).await;
                outcome.requests += 1;

                if !interrupt.sleep(self.think_time).await {
                    outcome.interrupted = true;
                    break 'groups;
                }
            }
        }

        self.ids.record_iteration(&self.metrics, started.elapsed());
        outcome
    }

    fn build_request(&self, step: &Step) -> HttpRequest {
        let mut req = HttpRequest::new(step.method.clone(), join_url(&self.base_url, &step.path))
            .timeout(self.request_timeout);

        if let Some(body) = &step.body {
            match serde_json::to_vec(body) {
                Ok(bytes) => {
                    req.body = bytes.into();
                    req = req.header("content-type", "application/json");
                }
                Err(err) => debug!(endpoint = %step.endpoint, error = %err, "dropping unencodable body"),
            }
        }

        if let Some(token) = &self.setup.token {
            req = req.bearer(token);
        }
        req
    }

    async fn run_step(&self, group: &Group, step: &Step) {
        let result = self.client.request(self.build_request(step)).await;

        let (response, latency, error_kind) = match &result {
            Ok(res) => (Some((res.status, res.body.as_ref())), res.latency, None),
            Err(err) => {
                debug!(group = %group.name, endpoint = %step.endpoint, error = %err, "request failed");
                (None, Duration::ZERO, Some(err.transport_error_kind().to_string()))
            }
        };

        let status = response.map(|(status, _)| status);
        self.ids.record_request(
            &self.metrics,
            RequestSample {
                group: &group.name,
                endpoint: &step.endpoint,
                status,
                status_expected: status.is_some_and(|s| step.expected_status.contains(&s)),
                latency,
                error_kind: error_kind.as_deref(),
            },
        );

        let mut all_passed = true;
        for check in &step.checks {
            let passed = check.evaluate(response);
            all_passed &= passed;
            self.ids
                .record_check(&self.metrics, &group.name, &check.name, passed);
        }
        if all_passed {
            self.ids.record_api_request(&self.metrics, &group.name);
        }
    }
}
