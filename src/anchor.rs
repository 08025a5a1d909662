//! Furnished/unfurnished anchoring.
//!
//! The model sees furnishing as a weak signal, so the two predicted variants
//! are reconciled by a configured policy before the floor curve is applied to
//! each branch.

use crate::config::{AnchorPolicy, FurnishedConfig};
use crate::floor::FloorAdjuster;
use crate::query::PropertyType;

/// Floor-adjusted prices for both furnishing branches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchoredPrices {
    pub furnished: f64,
    pub unfurnished: f64,
}

impl AnchoredPrices {
    /// The branch matching the listing's furnished flag.
    pub fn select(&self, furnished: bool) -> f64 {
        if furnished {
            self.furnished
        } else {
            self.unfurnished
        }
    }
}

#[derive(Debug, Clone)]
pub struct FurnishedAnchor {
    config: FurnishedConfig,
    floor: FloorAdjuster,
}

impl FurnishedAnchor {
    pub fn new(config: FurnishedConfig, floor: FloorAdjuster) -> Self {
        Self { config, floor }
    }

    pub fn config(&self) -> &FurnishedConfig {
        &self.config
    }

    /// Whether the furnished split applies to this property type at all.
    pub fn applies_to(&self, property_type: PropertyType) -> bool {
        self.config.all_property_types || property_type == PropertyType::Apartment
    }

    /// Clamped furnished gap for the midpoint policy.
    ///
    /// The raw gap `(y_t - y_f) * boost` is kept within `[floor, cap]` of the
    /// midpoint, mirrored to `[-cap, -floor]` when the model prices furnished
    /// below unfurnished.
    pub fn midpoint_gap(&self, y_t: f64, y_f: f64) -> f64 {
        let c = &self.config;
        let mid = 0.5 * (y_t + y_f);
        let cap = c.cap.abs() * mid.max(1.0);
        let floor = c.floor.abs() * mid.max(1.0);
        let raw_delta = (y_t - y_f) * c.boost.max(0.0);
        if raw_delta >= 0.0 {
            raw_delta.max(floor).min(cap)
        } else {
            raw_delta.min(-floor).max(-cap)
        }
    }

    /// Reconcile blended predictions for the furnished (`y_t`) and unfurnished
    /// (`y_f`) variants, then apply the floor curve to each branch.
    pub fn resolve(
        &self,
        y_t: f64,
        y_f: f64,
        property_type: PropertyType,
        floor: Option<f64>,
    ) -> AnchoredPrices {
        let adjust = |y: f64| self.floor.adjust(y, floor, property_type);

        if !self.applies_to(property_type) {
            return AnchoredPrices {
                furnished: adjust(y_t),
                unfurnished: adjust(y_f),
            };
        }

        match self.config.anchor {
            AnchorPolicy::Furnished => AnchoredPrices {
                furnished: adjust(y_t),
                unfurnished: adjust(y_t * (1.0 - self.config.unfurnished_pct)),
            },
            AnchorPolicy::Midpoint => {
                let target = self.midpoint_gap(y_t, y_f);
                AnchoredPrices {
                    furnished: adjust(y_f + target),
                    unfurnished: adjust(y_t - target),
                }
            }
        }
    }
}
