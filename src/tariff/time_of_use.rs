use super::TariffSource;
use crate::domain::{RateSlot, Rates};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};

/// One band of a repeating daily price table: `[start_hour, end_hour)` at
/// `price`. Hours wrap at 24; a band spanning midnight is not supported —
/// split it into two bands instead.
#[derive(Debug, Clone, Copy)]
pub struct TimeOfUseBand {
    pub start_hour: u32,
    pub end_hour: u32,
    pub price: f64,
}

/// A small repeating daily price table, expanded into concrete slots for a
/// bounded horizon on each call.
#[derive(Debug, Clone)]
pub struct TimeOfUseTariff {
    pub bands: Vec<TimeOfUseBand>,
    pub horizon: chrono::Duration,
}

impl TimeOfUseTariff {
    pub fn new(bands: Vec<TimeOfUseBand>) -> Self {
        Self {
            bands,
            horizon: chrono::Duration::hours(24),
        }
    }

    fn band_at(&self, hour: u32) -> Option<&TimeOfUseBand> {
        self.bands
            .iter()
            .find(|b| hour >= b.start_hour && hour < b.end_hour)
    }
}

#[async_trait]
impl TariffSource for TimeOfUseTariff {
    async fn rates(&self, now: DateTime<Utc>) -> anyhow::Result<Rates> {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let horizon_end = now + self.horizon;

        let mut slots = Vec::new();
        let mut cursor = day_start;
        while cursor < horizon_end {
            let hour = cursor.hour();
            if let Some(band) = self.band_at(hour) {
                let slot_end = cursor + chrono::Duration::hours(1);
                slots.push(RateSlot::new(cursor, slot_end, band.price));
            }
            cursor += chrono::Duration::hours(1);
        }
        Ok(Rates::new(slots))
    }

    async fn current_price(&self, now: DateTime<Utc>) -> anyhow::Result<f64> {
        self.band_at(now.hour())
            .map(|b| b.price)
            .ok_or_else(|| anyhow::anyhow!("no band configured for hour {}", now.hour()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expands_bands_into_hourly_slots() {
        let tariff = TimeOfUseTariff::new(vec![
            TimeOfUseBand { start_hour: 0, end_hour: 6, price: 0.10 },
            TimeOfUseBand { start_hour: 6, end_hour: 24, price: 0.30 },
        ]);
        let now = Utc::now();
        let rates = tariff.rates(now).await.unwrap();
        assert!(!rates.is_empty());
        assert!(rates.iter().all(|s| s.price == 0.10 || s.price == 0.30));
    }
}
