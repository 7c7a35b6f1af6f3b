//! Leg execution against venues.
//!
//! The coordinator only sees [`LegExecutor`]. The simulated executor backs
//! the binary; the scripted one replays a fixed sequence of outcomes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, instrument};

use super::order::{Leg, LegFill};
use crate::error::LegError;

/// Executes one leg on its venue.
#[async_trait]
pub trait LegExecutor: Send + Sync {
    /// Execute `leg` and report the realized price.
    async fn execute(&self, leg: &Leg) -> Result<LegFill, LegError>;
}

/// Executor that fills around the expected price with random slippage,
/// latency and failures.
#[derive(Debug, Clone)]
pub struct SimulatedLegExecutor {
    max_slippage: Decimal,
    failure_rate: f64,
    max_latency: Duration,
}

impl Default for SimulatedLegExecutor {
    fn default() -> Self {
        Self {
            max_slippage: dec!(0.002),
            failure_rate: 0.05,
            max_latency: Duration::from_millis(200),
        }
    }
}

impl SimulatedLegExecutor {
    /// Executor with default slippage, failure rate and latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest relative deviation from the expected price.
    pub fn with_max_slippage(mut self, slippage: Decimal) -> Self {
        self.max_slippage = slippage;
        self
    }

    /// Probability that a leg is rejected.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Upper bound of simulated venue latency.
    pub fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = latency;
        self
    }
}

#[async_trait]
impl LegExecutor for SimulatedLegExecutor {
    #[instrument(skip(self, leg), fields(leg = leg.index, venue = %leg.venue, kind = %leg.kind))]
    async fn execute(&self, leg: &Leg) -> Result<LegFill, LegError> {
        let (latency, fails, deviation) = {
            let mut rng = rand::rng();
            let max_ms = self.max_latency.as_millis() as u64;
            let deviation: f64 = rng.random_range(-1.0..=1.0);
            (
                Duration::from_millis(rng.random_range(0..=max_ms)),
                rng.random_bool(self.failure_rate),
                Decimal::from_f64(deviation).unwrap_or_default() * self.max_slippage,
            )
        };

        tokio::time::sleep(latency).await;

        if fails {
            return Err(LegError::Rejected(format!("{} rejected the order", leg.venue)));
        }

        let price = leg
            .expected_price
            .checked_mul(Decimal::ONE + deviation)
            .ok_or_else(|| LegError::Rejected(format!("unfillable price {}", leg.expected_price)))?
            .round_dp(10);
        debug!(expected = %leg.expected_price, realized = %price, "Leg filled");
        Ok(LegFill::now(price))
    }
}

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum ScriptedFill {
    /// Fill exactly at the expected price.
    AtExpected,
    /// Fill at the given price.
    At(Decimal),
    /// Fail with the given error.
    Fail(LegError),
    /// Wait, then fill at the expected price.
    Delayed(Duration),
}

/// Executor replaying scripted outcomes in call order.
///
/// Once the script runs out every leg fills at its expected price. Every
/// leg it receives is recorded.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLegExecutor {
    script: Arc<Mutex<VecDeque<ScriptedFill>>>,
    calls: Arc<Mutex<Vec<Leg>>>,
}

impl ScriptedLegExecutor {
    /// Executor replaying `script`.
    pub fn new(script: impl IntoIterator<Item = ScriptedFill>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    /// Legs received so far, in call order.
    pub fn calls(&self) -> Vec<Leg> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_step(&self, leg: &Leg) -> ScriptedFill {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(leg.clone());
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or(ScriptedFill::AtExpected)
    }
}

#[async_trait]
impl LegExecutor for ScriptedLegExecutor {
    async fn execute(&self, leg: &Leg) -> Result<LegFill, LegError> {
        match self.next_step(leg) {
            ScriptedFill::AtExpected => Ok(LegFill::now(leg.expected_price)),
            ScriptedFill::At(price) => Ok(LegFill::now(price)),
            ScriptedFill::Fail(err) => Err(err),
            ScriptedFill::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(LegFill::now(leg.expected_price))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Pair, VenueId};
    use crate::trading::LegKind;

    fn leg() -> Leg {
        Leg {
            index: 0,
            kind: LegKind::Buy,
            venue: VenueId::from("a"),
            pair: Pair::usd("ETH"),
            expected_price: dec!(100),
        }
    }

    #[tokio::test]
    async fn simulated_fill_stays_within_slippage() {
        let executor = SimulatedLegExecutor::new()
            .with_failure_rate(0.0)
            .with_max_latency(Duration::ZERO)
            .with_max_slippage(dec!(0.01));

        for _ in 0..20 {
            let fill = executor.execute(&leg()).await.unwrap();
            assert!(fill.price >= dec!(99) && fill.price <= dec!(101));
        }
    }

    #[tokio::test]
    async fn simulated_failure_rate_one_always_rejects() {
        let executor = SimulatedLegExecutor::new()
            .with_failure_rate(1.0)
            .with_max_latency(Duration::ZERO);

        let result = executor.execute(&leg()).await;
        assert!(matches!(result, Err(LegError::Rejected(_))));
    }

    #[tokio::test]
    async fn scripted_replays_then_defaults() {
        let executor = ScriptedLegExecutor::new([
            ScriptedFill::At(dec!(101)),
            ScriptedFill::Fail(LegError::InsufficientLiquidity {
                venue: VenueId::from("a"),
            }),
        ]);

        assert_eq!(executor.execute(&leg()).await.unwrap().price, dec!(101));
        assert!(executor.execute(&leg()).await.is_err());
        assert_eq!(executor.execute(&leg()).await.unwrap().price, dec!(100));
        assert_eq!(executor.calls().len(), 3);
    }
}
