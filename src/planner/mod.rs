//! Deadline planner (C2, §4.2). Decides whether the current moment is a
//! scheduled "active" charging slot for a required-energy/deadline pair,
//! given a descending-by-start rate sequence.

use crate::domain::{RateSlot, Rates};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerVerdict {
    pub active: bool,
    pub projected_start: DateTime<Utc>,
    /// True when the admitted cheapest-slots set could not reach the
    /// required duration before the deadline — the controller should treat
    /// this as "charge continuously" rather than waiting for a slot.
    pub infeasible: bool,
}

pub struct Planner;

impl Planner {
    /// `Active(requiredEnergy, targetPower, deadline, now) -> verdict`.
    pub fn active(
        rates: &Rates,
        required_energy_wh: f64,
        target_power_w: f64,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PlannerVerdict {
        if deadline <= now {
            return PlannerVerdict {
                active: true,
                projected_start: now,
                infeasible: false,
            };
        }
        if required_energy_wh <= 0.0 {
            return PlannerVerdict {
                active: false,
                projected_start: deadline,
                infeasible: false,
            };
        }

        let required_hours = required_energy_wh / target_power_w;
        let required_duration = chrono::Duration::milliseconds((required_hours * 3_600_000.0) as i64);

        // Candidates clipped to [now, deadline], ordered (price asc, start
        // desc) so that among equal prices the later slot is admitted first
        // — the §4.2 tie-break.
        let mut candidates: Vec<RateSlot> = rates
            .iter()
            .filter_map(|slot| slot.clip(now, deadline))
            .collect();
        candidates.sort_by(|a, b| {
            a.price
                .partial_cmp(&b.price)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.start.cmp(&a.start))
        });

        let mut admitted: Vec<RateSlot> = Vec::new();
        let mut accumulated = chrono::Duration::zero();
        for slot in candidates {
            if accumulated >= required_duration {
                break;
            }
            accumulated = accumulated + slot.duration();
            admitted.push(slot);
        }

        let infeasible = accumulated < required_duration;
        let active = admitted.iter().any(|slot| slot.contains(now));
        let projected_start = admitted
            .iter()
            .map(|slot| slot.start)
            .min()
            .unwrap_or(deadline);

        PlannerVerdict {
            active,
            projected_start,
            infeasible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateSlot;
    use chrono::Duration;

    #[test]
    fn deadline_in_past_is_active() {
        let now = Utc::now();
        let rates = Rates::new(vec![]);
        let verdict = Planner::active(&rates, 1000.0, 1000.0, now - Duration::minutes(1), now);
        assert!(verdict.active);
        assert!(!verdict.infeasible);
    }

    #[test]
    fn zero_required_energy_is_inactive() {
        let now = Utc::now();
        let rates = Rates::new(vec![]);
        let verdict = Planner::active(&rates, 0.0, 1000.0, now + Duration::hours(4), now);
        assert!(!verdict.active);
    }

    #[test]
    fn scenario_6_planner_admits_only_cheap_slot() {
        // 10 kWh required, 4h deadline, rates [(now,0.30),(now+2h,0.10)],
        // targetPower 10 kW -> required duration 1h, only the cheaper
        // now+2h slot is admitted.
        let now = Utc::now();
        let deadline = now + Duration::hours(4);
        let rates = Rates::new(vec![
            RateSlot::new(now, now + Duration::hours(2), 0.30),
            RateSlot::new(now + Duration::hours(2), now + Duration::hours(4), 0.10),
        ]);

        let verdict_now = Planner::active(&rates, 10_000.0, 10_000.0, deadline, now);
        assert!(!verdict_now.active);
        assert!(!verdict_now.infeasible);
        assert_eq!(verdict_now.projected_start, now + Duration::hours(2));

        let verdict_later = Planner::active(
            &rates,
            10_000.0,
            10_000.0,
            deadline,
            now + Duration::hours(2),
        );
        assert!(verdict_later.active);
    }

    #[test]
    fn infeasible_plan_still_reports_a_verdict() {
        let now = Utc::now();
        let deadline = now + Duration::hours(1);
        // Only 1h of rate coverage but 2h required -> infeasible.
        let rates = Rates::new(vec![RateSlot::new(now, deadline, 0.20)]);
        let verdict = Planner::active(&rates, 20_000.0, 10_000.0, deadline, now);
        assert!(verdict.infeasible);
        assert!(verdict.active);
    }

    #[test]
    fn equal_price_tie_break_prefers_later_slot() {
        let now = Utc::now();
        let deadline = now + Duration::hours(4);
        let rates = Rates::new(vec![
            RateSlot::new(now, now + Duration::hours(1), 0.20),
            RateSlot::new(now + Duration::hours(3), deadline, 0.20),
        ]);
        // Required duration 1h at 10kW/10kWh: only one slot is needed, and
        // since prices tie the later slot (now+3h) must be chosen.
        let verdict = Planner::active(&rates, 10_000.0, 10_000.0, deadline, now);
        assert_eq!(verdict.projected_start, now + Duration::hours(3));
    }
}
