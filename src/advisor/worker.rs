//! Single-flight advisory worker.

use crate::advisor::request::AdvisoryRequest;
use crate::advisor::service::{AdvisoryService, FALLBACK_ADVICE};
use crate::defaults;
use crate::pipeline::queue::{DropOldestSender, drop_oldest};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

const IDLE: u8 = 0;
const REQUESTING: u8 = 1;

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorState {
    Idle,
    Requesting,
}

/// Advice delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub text: String,
    /// True when the service failed and the fixed fallback was used.
    pub fallback: bool,
}

/// Create the single-slot advice handoff.
///
/// An unread result is overwritten by the next one.
pub fn advice_slot() -> (DropOldestSender<Advice>, Receiver<Advice>) {
    drop_oldest(1)
}

/// Runs at most one advisory request at a time on a background thread.
///
/// `trigger` is non-blocking; while a request is in flight further triggers
/// are ignored. The worker returns to idle only after the result has been
/// placed in the slot.
#[derive(Clone)]
pub struct AdvisorWorker {
    state: Arc<AtomicU8>,
    service: Arc<dyn AdvisoryService>,
    slot: DropOldestSender<Advice>,
    timeout: Duration,
}

impl AdvisorWorker {
    pub fn new(service: Arc<dyn AdvisoryService>, slot: DropOldestSender<Advice>) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(IDLE)),
            service,
            slot,
            timeout: Duration::from_secs(defaults::LLM_TIMEOUT_SECS),
        }
    }

    /// Upper bound for one service call; past it the fallback is used.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> AdvisorState {
        match self.state.load(Ordering::SeqCst) {
            IDLE => AdvisorState::Idle,
            _ => AdvisorState::Requesting,
        }
    }

    /// Start a request unless one is already in flight.
    ///
    /// Returns true if the request was accepted.
    pub fn trigger(&self, request: AdvisoryRequest) -> bool {
        if self
            .state
            .compare_exchange(IDLE, REQUESTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("advisory request already in flight, trigger ignored");
            return false;
        }

        let state = self.state.clone();
        let service = self.service.clone();
        let slot = self.slot.clone();
        let timeout = self.timeout;

        let spawned = thread::Builder::new()
            .name("advisor".to_string())
            .spawn(move || {
                let advice = run_request(service.as_ref(), &request, timeout);
                if slot.push(advice).is_err() {
                    tracing::debug!("advice slot closed, result discarded");
                }
                state.store(IDLE, Ordering::SeqCst);
            });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("failed to spawn advisory thread: {e}");
                self.state.store(IDLE, Ordering::SeqCst);
                false
            }
        }
    }
}

fn run_request(service: &dyn AdvisoryService, request: &AdvisoryRequest, timeout: Duration) -> Advice {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!("advisory runtime unavailable, using fallback: {e}");
            return fallback();
        }
    };

    let result = runtime.block_on(async {
        tokio::time::timeout(timeout, service.advise(request)).await
    });

    match result {
        Ok(Ok(text)) => {
            tracing::info!(service = service.name(), "advice received");
            Advice {
                text,
                fallback: false,
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(service = service.name(), "advisory request failed, using fallback: {e}");
            fallback()
        }
        Err(_) => {
            tracing::warn!(
                service = service.name(),
                timeout_secs = timeout.as_secs_f32(),
                "advisory request timed out, using fallback"
            );
            fallback()
        }
    }
}

fn fallback() -> Advice {
    Advice {
        text: FALLBACK_ADVICE.to_string(),
        fallback: true,
    }
}
