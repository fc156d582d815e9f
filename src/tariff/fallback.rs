use super::{ConstantTariff, TariffSource};
use crate::domain::Rates;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Wraps an inner tariff source; if it errors or returns an empty horizon,
/// degrades to a constant-price fallback rather than failing the control
/// loop (§4.1, §7 Transient I/O).
pub struct FallbackTariff {
    inner: Arc<dyn TariffSource>,
    fallback: ConstantTariff,
}

impl FallbackTariff {
    pub fn new(inner: Arc<dyn TariffSource>, fallback_price_per_kwh: f64) -> Self {
        Self {
            inner,
            fallback: ConstantTariff::new(fallback_price_per_kwh),
        }
    }
}

#[async_trait]
impl TariffSource for FallbackTariff {
    async fn rates(&self, now: DateTime<Utc>) -> anyhow::Result<Rates> {
        match self.inner.rates(now).await {
            Ok(rates) if !rates.is_empty() => Ok(rates),
            Ok(_) => {
                warn!("tariff source returned an empty horizon, degrading to constant fallback");
                self.fallback.rates(now).await
            }
            Err(err) => {
                warn!(error = %err, "tariff source failed, degrading to constant fallback");
                self.fallback.rates(now).await
            }
        }
    }

    async fn current_price(&self, now: DateTime<Utc>) -> anyhow::Result<f64> {
        match self.inner.current_price(now).await {
            Ok(price) => Ok(price),
            Err(err) => {
                warn!(error = %err, "tariff source failed, degrading to constant fallback");
                self.fallback.current_price(now).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysFails;

    #[async_trait]
    impl TariffSource for AlwaysFails {
        async fn rates(&self, _now: DateTime<Utc>) -> anyhow::Result<Rates> {
            Err(anyhow::anyhow!("upstream unavailable"))
        }
        async fn current_price(&self, _now: DateTime<Utc>) -> anyhow::Result<f64> {
            Err(anyhow::anyhow!("upstream unavailable"))
        }
    }

    #[tokio::test]
    async fn degrades_to_constant_price_on_failure() {
        let fallback = FallbackTariff::new(Arc::new(AlwaysFails), 0.25);
        let now = Utc::now();
        assert_eq!(fallback.current_price(now).await.unwrap(), 0.25);
        let rates = fallback.rates(now).await.unwrap();
        assert_eq!(rates.0[0].price, 0.25);
    }
}
