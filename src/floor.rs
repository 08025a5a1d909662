//! Floor and story adjustment.
//!
//! Apartments pay a premium at ground level, lose a little per story above the
//! first and drop sharply into basements. Houses, villas and townhouses gain a
//! capped premium per story. Farms are not adjusted.

use crate::config::{ApartmentFloorCurve, StoryCurve};
use crate::query::{FloorRule, PropertyType};

/// Round half to even, so `2.5` is floor 2 and `3.5` is floor 4.
fn round_floor(v: f64) -> Option<i64> {
    v.is_finite().then(|| v.round_ties_even() as i64)
}

#[derive(Debug, Clone)]
pub struct FloorAdjuster {
    apartment: ApartmentFloorCurve,
    stories: StoryCurve,
}

impl FloorAdjuster {
    pub fn new(apartment: ApartmentFloorCurve, stories: StoryCurve) -> Self {
        Self { apartment, stories }
    }

    /// Multiplier for an apartment on `floor`; 1.0 when the floor is unknown.
    pub fn apartment_factor(&self, floor: Option<f64>) -> f64 {
        let c = &self.apartment;
        let Some(f) = floor.and_then(round_floor) else {
            return 1.0;
        };
        match f {
            0 => 1.0 + c.ground_floor_premium,
            f if f > 0 => {
                let steps = (f - 1).max(0) as f64;
                let drop = c.up_cap.min(steps * c.up_step);
                (1.0 - drop).max(0.0)
            }
            -1 => (1.0 - c.basement1_drop).max(0.0),
            f => {
                let extra = (f.abs() - 1) as i32;
                let base = (1.0 - c.basement1_drop).max(0.0);
                let factor = base * (1.0 - c.down_step).powi(extra);
                let min_cap = 1.0 - c.basement1_drop - c.down_cap;
                factor.max(min_cap)
            }
        }
    }

    /// Multiplier for a house, villa or townhouse with `floor` stories.
    ///
    /// A missing, zero or non-numeric story count counts as one story.
    pub fn stories_factor(&self, floor: Option<f64>) -> f64 {
        let c = &self.stories;
        let stories = floor
            .filter(|v| *v != 0.0)
            .and_then(round_floor)
            .unwrap_or(1)
            .max(1);
        let inc = c.stories_cap.min((stories - 1) as f64 * c.stories_step);
        1.0 + inc
    }

    pub fn factor(&self, floor: Option<f64>, property_type: PropertyType) -> f64 {
        match property_type.floor_rule() {
            FloorRule::ApartmentCurve => self.apartment_factor(floor),
            FloorRule::StoryCurve => self.stories_factor(floor),
            FloorRule::Flat => 1.0,
        }
    }

    /// Apply the property type's floor rule to `y`; the result is never negative.
    pub fn adjust(&self, y: f64, floor: Option<f64>, property_type: PropertyType) -> f64 {
        (y.max(0.0) * self.factor(floor, property_type)).max(0.0)
    }
}

impl Default for FloorAdjuster {
    fn default() -> Self {
        Self::new(ApartmentFloorCurve::default(), StoryCurve::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_ground_floor_premium() {
        let adj = FloorAdjuster::default();
        assert!(close(adj.apartment_factor(Some(0.0)), 1.11));
        assert!(close(adj.apartment_factor(Some(0.4)), 1.11));
    }

    #[test]
    fn test_upper_floors() {
        let adj = FloorAdjuster::default();
        assert!(close(adj.apartment_factor(Some(1.0)), 1.0));
        assert!(close(adj.apartment_factor(Some(3.0)), 0.93));
        // 10 floors: 9 steps × 0.035 = 0.315, capped at 0.20
        assert!(close(adj.apartment_factor(Some(10.0)), 0.80));
    }

    #[test]
    fn test_basements() {
        let adj = FloorAdjuster::default();
        assert!(close(adj.apartment_factor(Some(-1.0)), 0.80));
        assert!(close(adj.apartment_factor(Some(-3.0)), 0.80 * 0.965 * 0.965));
        assert!(close(adj.apartment_factor(Some(-2.0)), 0.772));
    }

    #[test]
    fn test_deep_basement_clamped() {
        let adj = FloorAdjuster::default();
        // 0.8 × 0.965^30 ≈ 0.274 is below the 0.45 floor
        assert!(close(adj.apartment_factor(Some(-31.0)), 0.45));
    }

    #[test]
    fn test_unknown_floor_is_neutral() {
        let adj = FloorAdjuster::default();
        assert_eq!(adj.apartment_factor(None), 1.0);
        assert_eq!(adj.apartment_factor(Some(f64::NAN)), 1.0);
        assert_eq!(adj.apartment_factor(Some(f64::INFINITY)), 1.0);
    }

    #[test]
    fn test_half_floors_round_to_even() {
        let adj = FloorAdjuster::default();
        // 2.5 → 2, 3.5 → 4
        assert!(close(adj.apartment_factor(Some(2.5)), 0.965));
        assert!(close(adj.apartment_factor(Some(3.5)), 1.0 - 3.0 * 0.035));
    }

    #[test]
    fn test_villa_stories() {
        let adj = FloorAdjuster::default();
        assert!(close(adj.stories_factor(Some(4.0)), 1.15));
        assert!(close(adj.stories_factor(Some(2.0)), 1.05));
        assert!(close(adj.stories_factor(Some(1.0)), 1.0));
        assert!(close(adj.stories_factor(Some(0.0)), 1.0));
        assert!(close(adj.stories_factor(Some(-2.0)), 1.0));
        assert!(close(adj.stories_factor(None), 1.0));
        assert!(close(adj.stories_factor(Some(f64::NAN)), 1.0));
    }

    #[test]
    fn test_dispatch_by_property_type() {
        let adj = FloorAdjuster::default();
        assert!(close(adj.adjust(100.0, Some(4.0), PropertyType::Villa), 115.0));
        assert!(close(adj.adjust(100.0, Some(4.0), PropertyType::House), 115.0));
        assert!(close(adj.adjust(100.0, Some(4.0), PropertyType::Townhouse), 115.0));
        assert!(close(adj.adjust(100.0, Some(4.0), PropertyType::Apartment), 89.5));
        assert_eq!(adj.adjust(100.0, Some(4.0), PropertyType::Farm), 100.0);
    }

    #[test]
    fn test_negative_price_clamped() {
        let adj = FloorAdjuster::default();
        assert_eq!(adj.adjust(-50.0, Some(0.0), PropertyType::Apartment), 0.0);
        assert_eq!(adj.adjust(-50.0, None, PropertyType::Farm), 0.0);
    }

    #[test]
    fn test_aggressive_curve_never_negative() {
        // down_step > 1 flips the sign of the basement factor
        let adj = FloorAdjuster::new(
            ApartmentFloorCurve {
                basement1_drop: 0.6,
                down_step: 1.5,
                down_cap: 0.9,
                ..ApartmentFloorCurve::default()
            },
            StoryCurve::default(),
        );
        assert!(adj.apartment_factor(Some(-2.0)) < 0.0);
        assert_eq!(adj.adjust(100.0, Some(-2.0), PropertyType::Apartment), 0.0);
    }

    proptest! {
        #[test]
        fn prop_factor_non_negative(floor in -60.0f64..60.0, pt in 0usize..5) {
            let adj = FloorAdjuster::default();
            let pt = PropertyType::all()[pt];
            prop_assert!(adj.factor(Some(floor), pt) >= 0.0);
        }

        #[test]
        fn prop_apartment_non_increasing_above_ground(a in 1i64..60, b in 1i64..60) {
            let adj = FloorAdjuster::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                adj.apartment_factor(Some(hi as f64)) <= adj.apartment_factor(Some(lo as f64))
            );
        }
    }
}
