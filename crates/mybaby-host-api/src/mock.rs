//! Mock collaborators for testing

use async_trait::async_trait;
use mybaby_api::RecentDeviceSighting;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    AdvisoryError, AdvisoryRequest, AdvisoryResult, AdvisoryService, DiscoveryError,
    DiscoveryResult, DiscoveryService, EnforcementBackend, EnforcementError, EnforcementPlan,
    EnforcementResult,
};

/// Mock discovery service with settable sightings and failure mode
#[derive(Default)]
pub struct MockDiscovery {
    sightings: Mutex<Vec<RecentDeviceSighting>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sightings(sightings: Vec<RecentDeviceSighting>) -> Self {
        let mock = Self::new();
        mock.set_sightings(sightings);
        mock
    }

    pub fn set_sightings(&self, sightings: Vec<RecentDeviceSighting>) {
        *self.sightings.lock().unwrap_or_else(|e| e.into_inner()) = sightings;
    }

    /// Configure fetches to fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay each fetch (simulates a slow service)
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryService for MockDiscovery {
    async fn fetch_sightings(&self) -> DiscoveryResult<Vec<RecentDeviceSighting>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Unavailable("Mock discovery failure".into()));
        }

        Ok(self.sightings.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Mock enforcement backend that records every plan it receives
#[derive(Default)]
pub struct MockEnforcement {
    plans: Mutex<Vec<EnforcementPlan>>,
    failing: AtomicBool,
}

impl MockEnforcement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure apply to fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn plan_count(&self) -> usize {
        self.plans.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_plan(&self) -> Option<EnforcementPlan> {
        self.plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl EnforcementBackend for MockEnforcement {
    async fn apply_plan(&self, plan: &EnforcementPlan) -> EnforcementResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnforcementError::Unavailable("Mock enforcement failure".into()));
        }

        self.plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(plan.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock advisory service with a fixed reply
pub struct MockAdvisor {
    reply: Option<String>,
    delay: Option<Duration>,
}

impl MockAdvisor {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
        }
    }

    /// Answer only after `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl AdvisoryService for MockAdvisor {
    async fn advise(&self, _request: &AdvisoryRequest) -> AdvisoryResult<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| AdvisoryError::Unavailable("Mock advisory failure".into()))
    }
}
