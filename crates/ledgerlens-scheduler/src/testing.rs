//! Test doubles shared by the scheduler tests.

use async_trait::async_trait;
use ledgerlens_core::{
    DateRange, DeliveryMethod, MetricProvider, ReportError, ReportFilters, Result,
};
use ledgerlens_delivery::{DeliveryChannel, DeliveryPayload};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

enum Behavior {
    Fixed(Value),
    Failing(String),
    /// First call signals `entered` and waits for `release`.
    Gated {
        value: Value,
        entered: Arc<Notify>,
        release: Arc<Notify>,
        passed: AtomicBool,
    },
}

pub struct StubProvider {
    behavior: Behavior,
    seen: Arc<Mutex<Vec<ReportFilters>>>,
    calls: AtomicUsize,
}

impl StubProvider {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            seen: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fixed(value: Value) -> Self {
        Self::with(Behavior::Fixed(value))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Behavior::Failing(message.to_string()))
    }

    /// Returns the provider plus its `(entered, release)` pair.
    pub fn gated(value: Value) -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let provider = Self::with(Behavior::Gated {
            value,
            entered: entered.clone(),
            release: release.clone(),
            passed: AtomicBool::new(false),
        });
        (provider, entered, release)
    }

    pub fn seen_filters(&self) -> Arc<Mutex<Vec<ReportFilters>>> {
        self.seen.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricProvider for StubProvider {
    async fn fetch(&self, _metric: &str, _range: &DateRange, filters: &ReportFilters) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(filters.clone());
        match &self.behavior {
            Behavior::Fixed(v) => Ok(v.clone()),
            Behavior::Failing(msg) => Err(ReportError::Provider(msg.clone())),
            Behavior::Gated { value, entered, release, passed } => {
                if !passed.swap(true, Ordering::SeqCst) {
                    entered.notify_one();
                    release.notified().await;
                }
                Ok(value.clone())
            }
        }
    }
}

/// Captures payloads; optionally refuses them.
pub struct RecordingChannel {
    pub method: DeliveryMethod,
    pub delivered: Mutex<Vec<DeliveryPayload>>,
    pub fail: bool,
}

impl RecordingChannel {
    pub fn new(method: DeliveryMethod) -> Arc<Self> {
        Arc::new(Self { method, delivered: Mutex::new(Vec::new()), fail: false })
    }

    pub fn refusing(method: DeliveryMethod) -> Arc<Self> {
        Arc::new(Self { method, delivered: Mutex::new(Vec::new()), fail: true })
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn method(&self) -> DeliveryMethod {
        self.method
    }

    async fn deliver(&self, payload: &DeliveryPayload) -> Result<()> {
        if self.fail {
            return Err(ReportError::delivery(self.method.as_str(), "503 Service Unavailable"));
        }
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
