//! Once-per-run setup and teardown around the VU phase.
//!
//! Setup probes the service and obtains a bearer token. The result is frozen into an
//! [`Arc<SetupContext>`] that every VU reads and nobody writes. Teardown consumes the
//! [`Lifecycle`], so it cannot run twice.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sheetload_http::{HttpClient, HttpRequest, HttpResponse, join_url};
use sheetload_metrics::{MetricValue, Registry};
use tracing::{info, warn};

use crate::request_metrics::{CHECKS, HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS};

pub const PATH_HEALTH: &str = "/actuator/health";
pub const PATH_SIGNUP: &str = "/api/auth/signup";
pub const PATH_LOGIN: &str = "/api/auth/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "loadtest_user".to_string(),
            password: "LoadTest123!".to_string(),
            email: "loadtest@example.com".to_string(),
            name: "Load Test User".to_string(),
        }
    }
}

/// Immutable result of setup, shared by every VU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupContext {
    pub healthy: bool,
    #[serde(skip)]
    pub token: Option<String>,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl SetupContext {
    pub fn authenticated(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Serialize)]
struct SignupBody<'a> {
    username: &'a str,
    email: &'a str,
    name: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Debug)]
pub struct Lifecycle {
    context: Arc<SetupContext>,
}

impl Lifecycle {
    /// Health probe, then signup with login fallback. Never fails: problems degrade the
    /// context (unhealthy, or no token) and are logged.
    pub async fn setup(
        client: &HttpClient,
        base_url: &str,
        credentials: &Credentials,
        timeout: Option<Duration>,
    ) -> Self {
        let healthy = match client
            .request(HttpRequest::get(join_url(base_url, PATH_HEALTH)).timeout(timeout))
            .await
        {
            Ok(res) if res.is_success() => true,
            Ok(res) => {
                warn!(status = res.status, "health check failed");
                false
            }
            Err(err) => {
                warn!(error = %err, "health check unreachable");
                false
            }
        };

        if !healthy {
            info!("setup finished: service unhealthy, VUs will idle");
            return Self::from_context(SetupContext::default());
        }

        let signup = HttpRequest::post_json(
            join_url(base_url, PATH_SIGNUP),
            &SignupBody {
                username: &credentials.username,
                email: &credentials.email,
                name: &credentials.name,
                password: &credentials.password,
            },
        );
        let mut token = match signup {
            Ok(req) => token_from(client.request(req.timeout(timeout)).await, "signup"),
            Err(err) => {
                warn!(error = %err, "failed to encode signup body");
                None
            }
        };

        if token.is_none() {
            let login = HttpRequest::post_json(
                join_url(base_url, PATH_LOGIN),
                &LoginBody {
                    username: &credentials.username,
                    password: &credentials.password,
                },
            );
            token = match login {
                Ok(req) => token_from(client.request(req.timeout(timeout)).await, "login"),
                Err(err) => {
                    warn!(error = %err, "failed to encode login body");
                    None
                }
            };
        }

        let context = match token {
            Some(token) => {
                info!(username = %credentials.username, "setup finished: authenticated");
                SetupContext {
                    healthy: true,
                    token: Some(token),
                    username: Some(credentials.username.clone()),
                    password: Some(credentials.password.clone()),
                }
            }
            None => {
                warn!("setup finished: no token, authenticated groups will be skipped");
                SetupContext {
                    healthy: true,
                    ..SetupContext::default()
                }
            }
        };

        Self::from_context(context)
    }

    pub fn from_context(context: SetupContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> Arc<SetupContext> {
        self.context.clone()
    }

    /// Logs the run outcome. Consumes the lifecycle and returns the shared context.
    pub fn teardown(self, metrics: &Registry) -> Arc<SetupContext> {
        let count = |name: &str| match metrics.metric_value(name) {
            Some(MetricValue::Counter { count }) => count,
            Some(MetricValue::Rate { total, .. }) => total,
            _ => 0,
        };
        let rate = |name: &str| match metrics.metric_value(name) {
            Some(MetricValue::Rate { rate, .. }) => rate,
            _ => 0.0,
        };

        info!(
            healthy = self.context.healthy,
            authenticated = self.context.authenticated(),
            requests = count(HTTP_REQS),
            iterations = count(ITERATIONS),
            failed_rate = rate(HTTP_REQ_FAILED),
            checks_rate = rate(CHECKS),
            "teardown: load test completed"
        );

        self.context
    }
}

fn token_from(result: sheetload_http::Result<HttpResponse>, step: &'static str) -> Option<String> {
    let res = match result {
        Ok(res) => res,
        Err(err) => {
            warn!(step, error = %err, "auth request failed");
            return None;
        }
    };

    if !res.is_success() {
        info!(step, status = res.status, "auth request rejected");
        return None;
    }

    match res.json::<TokenResponse>() {
        Ok(TokenResponse { token: Some(token) }) if !token.is_empty() => Some(token),
        Ok(_) => {
            warn!(step, "auth response carried no token");
            None
        }
        Err(err) => {
            warn!(step, error = %err, "auth response is not valid JSON");
            None
        }
    }
}
