use super::TariffSource;
use crate::domain::{RateSlot, Rates};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A fixed price for the whole horizon. Used standalone and as the fallback
/// inside `FallbackTariff`.
#[derive(Debug, Clone, Copy)]
pub struct ConstantTariff {
    pub price_per_kwh: f64,
    pub horizon: chrono::Duration,
}

impl ConstantTariff {
    pub fn new(price_per_kwh: f64) -> Self {
        Self {
            price_per_kwh,
            horizon: chrono::Duration::hours(24),
        }
    }
}

#[async_trait]
impl TariffSource for ConstantTariff {
    async fn rates(&self, now: DateTime<Utc>) -> anyhow::Result<Rates> {
        Ok(Rates::new(vec![RateSlot::new(
            now,
            now + self.horizon,
            self.price_per_kwh,
        )]))
    }

    async fn current_price(&self, _now: DateTime<Utc>) -> anyhow::Result<f64> {
        Ok(self.price_per_kwh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn constant_tariff_reports_fixed_price() {
        let tariff = ConstantTariff::new(0.30);
        let now = Utc::now();
        assert_eq!(tariff.current_price(now).await.unwrap(), 0.30);
        let rates = tariff.rates(now).await.unwrap();
        assert_eq!(rates.0.len(), 1);
        assert_eq!(rates.0[0].price, 0.30);
    }
}
