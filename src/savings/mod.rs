//! Savings accumulator (C4, §4.4). Formulas and fixtures are grounded
//! bit-for-bit on `examples/original_source/core/savings_test.go`.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Savings {
    clock: Arc<dyn Clock>,
    updated: DateTime<Utc>,
    total_charged_kwh: f64,
    self_consumption_kwh: f64,
    /// reference tariffs used for effective-price/savings reporting —
    /// independent of the time-varying Tariff source the Planner consumes.
    grid_tariff_per_kwh: f64,
    feed_in_tariff_per_kwh: f64,
}

impl Savings {
    pub fn new(clock: Arc<dyn Clock>, grid_tariff_per_kwh: f64, feed_in_tariff_per_kwh: f64) -> Self {
        let now = clock.now();
        Self {
            clock,
            updated: now,
            total_charged_kwh: 0.0,
            self_consumption_kwh: 0.0,
            grid_tariff_per_kwh,
            feed_in_tariff_per_kwh,
        }
    }

    pub fn total_charged_kwh(&self) -> f64 {
        self.total_charged_kwh
    }

    pub fn self_consumption_kwh(&self) -> f64 {
        self.self_consumption_kwh
    }

    pub fn self_consumption_percent(&self) -> f64 {
        if self.total_charged_kwh <= 0.0 {
            0.0
        } else {
            100.0 * self.self_consumption_kwh / self.total_charged_kwh
        }
    }

    pub fn effective_price(&self) -> f64 {
        if self.total_charged_kwh <= 0.0 {
            return self.grid_tariff_per_kwh;
        }
        let self_share = self.self_consumption_kwh / self.total_charged_kwh;
        let grid_share = 1.0 - self_share;
        grid_share * self.grid_tariff_per_kwh + self_share * self.feed_in_tariff_per_kwh
    }

    pub fn savings_amount(&self) -> f64 {
        self.total_charged_kwh * (self.grid_tariff_per_kwh - self.effective_price())
    }

    /// §4.4 step: fold one sample of `(grid, pv, battery, charge)` power (W)
    /// into the accumulator, using the wall-clock delta since the last call.
    pub fn update(&mut self, grid_w: f64, pv_w: f64, battery_w: f64, charge_w: f64) {
        let now = self.clock.now();
        let dt_hours = (now - self.updated).num_milliseconds() as f64 / 3_600_000.0;
        self.updated = now;

        if dt_hours <= 0.0 {
            return;
        }

        // §4.4: inputs below 1 W are treated as zero to avoid drift.
        let zero_below_1w = |w: f64| if w.abs() < 1.0 { 0.0 } else { w };
        let grid_w = zero_below_1w(grid_w);
        let pv_w = zero_below_1w(pv_w);
        let battery_w = zero_below_1w(battery_w);
        let charge_w = zero_below_1w(charge_w);

        let non_grid = pv_w + (-grid_w).max(0.0) + (-battery_w).max(0.0);
        let denom = non_grid + grid_w.max(0.0);
        let self_ratio = if denom > 0.0 {
            (non_grid / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let charged_wh = charge_w * dt_hours;
        let self_wh = charged_wh * self_ratio;

        self.total_charged_kwh += charged_wh / 1000.0;
        self.self_consumption_kwh += self_wh / 1000.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use rstest::rstest;

    fn tolerance_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.001
    }

    #[test]
    fn changing_energy_sources_accumulate_cumulatively() {
        let clock = MockClock::new(Utc::now());
        let mut s = Savings::new(clock.clone(), 0.30, 0.08);

        let cases = [
            ("half grid, half pv", 2500.0, 2500.0, 0.0, 5000.0, 5.0, 2.5, 50.0),
            ("full pv", 0.0, 5000.0, 0.0, 5000.0, 10.0, 7.5, 75.0),
            ("full grid", 5000.0, 0.0, 0.0, 5000.0, 15.0, 7.5, 50.0),
            ("half grid, half battery", 2500.0, 0.0, 2500.0, 5000.0, 20.0, 10.0, 50.0),
            ("full pv, pv export", -5000.0, 10000.0, 0.0, 5000.0, 25.0, 15.0, 60.0),
            ("full pv, pv export, battery charge", -2500.0, 10000.0, -2500.0, 5000.0, 30.0, 20.0, 66.0),
            ("double charge speed, full grid", 10000.0, 0.0, 0.0, 10000.0, 40.0, 20.0, 50.0),
        ];

        for (title, grid, pv, battery, charge, total, self_kwh, percentage) in cases {
            clock.advance(chrono::Duration::hours(1));
            s.update(grid, pv, battery, charge);
            assert!(tolerance_eq(s.total_charged_kwh(), total), "{title}: total");
            assert!(tolerance_eq(s.self_consumption_kwh(), self_kwh), "{title}: self");
            assert_eq!(s.self_consumption_percent() as i64, percentage as i64, "{title}: pct");
        }
    }

    #[rstest]
    #[case(10000.0, 0.0, 0.0, 10000.0, 0.3, 0.0)]
    #[case(0.0, 10000.0, 0.0, 10000.0, 0.08, 2.2)]
    #[case(0.0, 0.0, 10000.0, 10000.0, 0.08, 2.2)]
    #[case(5000.0, 0.0, 5000.0, 10000.0, 0.19, 1.1)]
    fn one_hour_effective_price_and_savings(
        #[case] grid: f64,
        #[case] pv: f64,
        #[case] battery: f64,
        #[case] charge: f64,
        #[case] expected_price: f64,
        #[case] expected_savings: f64,
    ) {
        let clock = MockClock::new(Utc::now());
        let mut s = Savings::new(clock.clone(), 0.30, 0.08);
        clock.advance(chrono::Duration::hours(1));
        s.update(grid, pv, battery, charge);
        assert!(tolerance_eq(s.effective_price(), expected_price));
        assert!(tolerance_eq(s.savings_amount(), expected_savings));
    }

    #[test]
    fn totals_are_monotonic_non_decreasing() {
        let clock = MockClock::new(Utc::now());
        let mut s = Savings::new(clock.clone(), 0.30, 0.08);
        let mut prev_total = 0.0;
        let mut prev_self = 0.0;
        for _ in 0..5 {
            clock.advance(chrono::Duration::minutes(10));
            s.update(1000.0, 500.0, 0.0, 2000.0);
            assert!(s.total_charged_kwh() >= prev_total);
            assert!(s.self_consumption_kwh() >= prev_self);
            assert!(s.total_charged_kwh() >= s.self_consumption_kwh());
            prev_total = s.total_charged_kwh();
            prev_self = s.self_consumption_kwh();
        }
    }

    proptest::proptest! {
        /// §8: "totalCharged >= selfConsumptionCharged >= 0, both monotonically
        /// non-decreasing" over an arbitrary sequence of samples.
        #[test]
        fn totals_stay_monotonic_and_ordered_for_arbitrary_samples(
            samples in proptest::collection::vec(
                (-10_000.0f64..10_000.0, 0.0f64..10_000.0, -10_000.0f64..10_000.0, 0.0f64..20_000.0),
                1..20,
            ),
        ) {
            let clock = MockClock::new(Utc::now());
            let mut s = Savings::new(clock.clone(), 0.30, 0.08);
            let mut prev_total = 0.0;
            let mut prev_self = 0.0;
            for (grid, pv, battery, charge) in samples {
                clock.advance(chrono::Duration::seconds(30));
                s.update(grid, pv, battery, charge);
                proptest::prop_assert!(s.total_charged_kwh() >= prev_total);
                proptest::prop_assert!(s.self_consumption_kwh() >= prev_self);
                proptest::prop_assert!(s.total_charged_kwh() >= s.self_consumption_kwh());
                proptest::prop_assert!(s.self_consumption_kwh() >= 0.0);
                prev_total = s.total_charged_kwh();
                prev_self = s.self_consumption_kwh();
            }
        }
    }

    #[test]
    fn sub_minute_steps_match_single_step_of_equal_total_duration() {
        let clock = MockClock::new(Utc::now());
        let mut stepped = Savings::new(clock.clone(), 0.30, 0.08);
        for _ in 0..5 {
            clock.advance(chrono::Duration::seconds(2));
            stepped.update(0.0, 0.0, 0.0, 11000.0);
        }

        let clock2 = MockClock::new(Utc::now());
        let mut single = Savings::new(clock2.clone(), 0.30, 0.08);
        clock2.advance(chrono::Duration::seconds(10));
        single.update(0.0, 0.0, 0.0, 11000.0);

        assert!(tolerance_eq(stepped.total_charged_kwh(), single.total_charged_kwh()));
    }
}
