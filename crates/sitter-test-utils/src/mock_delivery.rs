//! Mock delivery collaborator.
//!
//! Records every call and answers from a script of results; once the
//! script runs out every call succeeds.
//!
//! ```rust,ignore
//! let delivery = MockDelivery::new();
//! delivery.push_result(Err(DeliveryError::Failed("502".into())));
//! delivery.push_result(Err(DeliveryError::Unreachable("404".into())));
//! ```

use async_trait::async_trait;
use common::types::ChannelId;
use sitter_service::delivery::Delivery;
use sitter_service::errors::DeliveryError;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One recorded delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDelivery {
    pub target: ChannelId,
    pub text: String,
    pub wide_attention: bool,
}

/// Recording [`Delivery`] with scripted results.
#[derive(Debug, Default)]
pub struct MockDelivery {
    calls: Mutex<Vec<RecordedDelivery>>,
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    unreachable: Mutex<Vec<ChannelId>>,
    delay: Mutex<Option<Duration>>,
}

impl MockDelivery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next unscripted call.
    pub fn push_result(&self, result: Result<(), DeliveryError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Every delivery to `target` fails as unreachable from now on.
    pub fn mark_unreachable(&self, target: ChannelId) {
        self.unreachable.lock().unwrap().push(target);
    }

    /// Sleep this long inside every call (for timeout tests).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Every attempt so far, in order.
    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of attempts so far.
    pub fn delivery_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of attempts to `target`.
    pub fn deliveries_to(&self, target: ChannelId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.target == target)
            .count()
    }

    /// Most recent attempt.
    pub fn last(&self) -> Option<RecordedDelivery> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Delivery for MockDelivery {
    async fn deliver(
        &self,
        target: ChannelId,
        text: &str,
        wide_attention: bool,
    ) -> Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(RecordedDelivery {
            target,
            text: text.to_string(),
            wide_attention,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.lock().unwrap().contains(&target) {
            return Err(DeliveryError::Unreachable(format!(
                "Unknown channel {target}"
            )));
        }

        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
