//! Login gate: decides whether a module may collect, must wait for a human,
//! or has to hand control back to the orchestrator.

use super::wait::{wait_for, WaitSpec};
use crate::browser::{Page, Probe};
use crate::error::{AppError, Result};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Unknown,
    Authenticated,
    Unauthenticated,
    WaitingManualLogin,
    AuthRequired,
    TimedOut,
}

/// How a gate check ended when collection may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    /// Neither indicator showed up; collection proceeds best-effort.
    Unverified,
    /// Manual login did not happen within the ceiling; proceed degraded.
    TimedOut,
}

/// DOM evidence for each side of the login wall.
#[derive(Debug, Clone, Default)]
pub struct LoginIndicators {
    pub authenticated: Vec<Probe>,
    pub unauthenticated: Vec<Probe>,
}

#[derive(Debug, Clone)]
pub struct LoginGate {
    module: String,
    home_url: String,
    indicators: LoginIndicators,
    detection: WaitSpec,
    manual_login: WaitSpec,
}

impl LoginGate {
    pub fn new(module: impl Into<String>, home_url: impl Into<String>, indicators: LoginIndicators) -> Self {
        Self {
            module: module.into(),
            home_url: home_url.into(),
            indicators,
            detection: WaitSpec::secs(2, 6),
            manual_login: WaitSpec::secs(2, 120),
        }
    }

    /// Polls used to tell the two sides apart before giving up as "unknown".
    pub fn with_detection(mut self, spec: WaitSpec) -> Self {
        self.detection = spec;
        self
    }

    /// Cadence and ceiling of the headful manual-login wait.
    pub fn with_manual_login(mut self, spec: WaitSpec) -> Self {
        self.manual_login = spec;
        self
    }

    pub fn with_manual_login_ceiling(mut self, ceiling: Duration) -> Self {
        self.manual_login.ceiling = ceiling;
        self
    }

    /// Navigate to the module's home surface and run the state machine.
    ///
    /// Fails with `AuthRequired` only when the session is headless and the
    /// page shows the logged-out indicator.
    pub async fn check(&self, page: &dyn Page, headless: bool) -> Result<LoginOutcome> {
        tracing::info!(module = %self.module, "Checking login status");
        page.goto(&self.home_url).await?;

        let mut state = LoginState::Unknown;
        loop {
            state = match state {
                LoginState::Unknown => match self.detect(page).await {
                    Some(detected) => detected,
                    None => {
                        tracing::warn!(
                            module = %self.module,
                            "No login indicator found, continuing best-effort"
                        );
                        return Ok(LoginOutcome::Unverified);
                    }
                },
                LoginState::Authenticated => {
                    tracing::info!(module = %self.module, "Logged in");
                    return Ok(LoginOutcome::Authenticated);
                }
                LoginState::Unauthenticated if headless => LoginState::AuthRequired,
                LoginState::Unauthenticated => LoginState::WaitingManualLogin,
                LoginState::WaitingManualLogin => {
                    tracing::info!(
                        module = %self.module,
                        ceiling_secs = self.manual_login.ceiling.as_secs(),
                        "Not logged in, waiting for manual login"
                    );
                    let outcome = wait_for(self.manual_login, || self.is_authenticated(page)).await;
                    if outcome.is_satisfied() {
                        LoginState::Authenticated
                    } else {
                        LoginState::TimedOut
                    }
                }
                LoginState::AuthRequired => {
                    tracing::warn!(module = %self.module, "Login required but running headless");
                    return Err(AppError::AuthRequired(self.module.clone()));
                }
                LoginState::TimedOut => {
                    tracing::warn!(module = %self.module, "Login wait timed out, continuing anyway");
                    return Ok(LoginOutcome::TimedOut);
                }
            };
        }
    }

    async fn detect(&self, page: &dyn Page) -> Option<LoginState> {
        let attempts = self.detection.max_attempts();
        for attempt in 1..=attempts {
            if self.any_present(page, &self.indicators.authenticated).await {
                return Some(LoginState::Authenticated);
            }
            if self.any_present(page, &self.indicators.unauthenticated).await {
                return Some(LoginState::Unauthenticated);
            }
            if attempt < attempts {
                tokio::time::sleep(self.detection.interval).await;
            }
        }
        None
    }

    /// Logged in once a positive indicator appears; sites without one count
    /// as logged in when the login control disappears.
    async fn is_authenticated(&self, page: &dyn Page) -> bool {
        if self.indicators.authenticated.is_empty() {
            !self.any_present(page, &self.indicators.unauthenticated).await
        } else {
            self.any_present(page, &self.indicators.authenticated).await
        }
    }

    async fn any_present(&self, page: &dyn Page, probes: &[Probe]) -> bool {
        for probe in probes {
            match page.probe(probe).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => tracing::debug!(module = %self.module, "Login probe failed: {}", e),
            }
        }
        false
    }
}
