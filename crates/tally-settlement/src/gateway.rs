//! # Simulated Payment Gateway
//!
//! A [`PaymentGateway`] that settles locally.
//!
//! ```text
//! charge(amount, method, order_id)
//!     │
//!     ├── sleep(latency)                    (0 by default)
//!     ├── declining?          ──► declined "payment declined"
//!     ├── amount > max_charge ──► declined "amount exceeds limit"
//!     └── approved            ──► "{cc|pp|bt}_<uuid>"
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use tally_core::{ChargeOutcome, Money, PaymentGateway, PaymentMethod};

use crate::config::GatewaySettings;

#[derive(Debug)]
pub struct SimulatedGateway {
    max_charge: Money,
    latency: Duration,
    declining: AtomicBool,
    attempts: AtomicUsize,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::from_settings(&GatewaySettings::default())
    }
}

impl SimulatedGateway {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        SimulatedGateway {
            max_charge: Money::from_cents(settings.max_charge_cents),
            latency: Duration::from_millis(settings.latency_ms),
            declining: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn with_max_charge(mut self, max_charge: Money) -> Self {
        self.max_charge = max_charge;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Declines every charge while set.
    pub fn set_declining(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    /// Number of charge calls received so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, amount: Money, method: PaymentMethod, order_id: &str) -> ChargeOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = if self.declining.load(Ordering::SeqCst) {
            ChargeOutcome::declined("payment declined")
        } else if amount > self.max_charge {
            ChargeOutcome::declined(format!("amount {amount} exceeds limit {}", self.max_charge))
        } else {
            ChargeOutcome::approved(format!(
                "{}_{}",
                method.settlement_prefix(),
                Uuid::new_v4().simple()
            ))
        };

        debug!(
            order_id = %order_id,
            amount = %amount,
            method = %method,
            success = outcome.success,
            "Simulated charge"
        );
        outcome
    }
}
