//! Tariff source (C1, §4.1). Grounded on the teacher's
//! `src/forecast/prices.rs` `PriceForecaster` trait and its
//! cache/fallback-on-failure shape.

mod constant;
mod fallback;
mod time_of_use;

pub use constant::ConstantTariff;
pub use fallback::FallbackTariff;
pub use time_of_use::{TimeOfUseBand, TimeOfUseTariff};

use crate::domain::Rates;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait TariffSource: Send + Sync {
    /// Returns the current known rate horizon, sorted descending by start.
    async fn rates(&self, now: DateTime<Utc>) -> anyhow::Result<Rates>;

    /// Returns the price in effect right now.
    async fn current_price(&self, now: DateTime<Utc>) -> anyhow::Result<f64>;
}
