//! Listing queries and their validation boundary.
//!
//! [`PriceRequest`] is what callers send (loosely typed, deserialized as-is).
//! [`PriceRequest::validate`] turns it into a [`PriceQuery`], rejecting anything
//! the pipeline must never see: unknown property types, non-positive areas,
//! negative room counts.

use crate::error::EstimateError;
use crate::normalize::title_case;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of property types the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Apartment,
    House,
    Townhouse,
    Villa,
    Farm,
}

/// How the floor/story number affects the price of a property type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorRule {
    /// Ground premium, per-story drop upward, compounding drop into basements
    ApartmentCurve,
    /// Capped per-story premium
    StoryCurve,
    /// Floor number is ignored
    Flat,
}

impl PropertyType {
    /// Get all property types in order.
    pub fn all() -> [PropertyType; 5] {
        [
            PropertyType::Apartment,
            PropertyType::House,
            PropertyType::Townhouse,
            PropertyType::Villa,
            PropertyType::Farm,
        ]
    }

    /// Canonical display name, as the model saw it during training.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "Apartment",
            PropertyType::House => "House",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::Villa => "Villa",
            PropertyType::Farm => "Farm",
        }
    }

    pub fn floor_rule(&self) -> FloorRule {
        match self {
            PropertyType::Apartment => FloorRule::ApartmentCurve,
            PropertyType::House | PropertyType::Townhouse | PropertyType::Villa => {
                FloorRule::StoryCurve
            }
            PropertyType::Farm => FloorRule::Flat,
        }
    }

    /// Houses, villas and townhouses report stories rather than a unit floor.
    pub fn counts_stories(&self) -> bool {
        self.floor_rule() == FloorRule::StoryCurve
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = EstimateError;

    /// Trims and title-cases before matching, so `" villa "` is a `Villa`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = title_case(s.trim());
        PropertyType::all()
            .into_iter()
            .find(|pt| pt.as_str() == canonical)
            .ok_or_else(|| {
                let known: Vec<&str> = PropertyType::all().iter().map(|p| p.as_str()).collect();
                EstimateError::invalid(
                    "property_type",
                    format!("`{}` is not one of {}", s.trim(), known.join(", ")),
                )
            })
    }
}

/// A pricing request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub area_sqm: f64,
    #[serde(default)]
    pub floor: Option<f64>,
    /// Only meaningful for houses and villas; folded into `floor` during normalization
    #[serde(default)]
    pub total_floors: Option<f64>,
    #[serde(default)]
    pub building_age: Option<f64>,
    pub city: String,
    pub neighborhood: String,
    pub property_type: String,
    pub furnished: bool,
}

/// Floor assumed by [`PriceRequest::with_estimate_defaults`] for apartments.
pub const DEFAULT_APARTMENT_FLOOR: f64 = 2.0;

/// Floor assumed by [`PriceRequest::with_estimate_defaults`] for everything else.
pub const DEFAULT_OTHER_FLOOR: f64 = 1.0;

/// Building age assumed by [`PriceRequest::with_estimate_defaults`].
pub const DEFAULT_BUILDING_AGE: f64 = 10.0;

impl PriceRequest {
    /// Validate into a [`PriceQuery`], naming the first offending field.
    pub fn validate(&self) -> Result<PriceQuery, EstimateError> {
        let bedrooms = u32::try_from(self.bedrooms)
            .map_err(|_| EstimateError::invalid("bedrooms", "must be a non-negative integer"))?;
        let bathrooms = u32::try_from(self.bathrooms)
            .map_err(|_| EstimateError::invalid("bathrooms", "must be a non-negative integer"))?;
        if !(self.area_sqm.is_finite() && self.area_sqm > 0.0) {
            return Err(EstimateError::invalid(
                "area_sqm",
                format!("must be a positive number, got {}", self.area_sqm),
            ));
        }
        let property_type = self.property_type.parse::<PropertyType>()?;

        Ok(PriceQuery {
            bedrooms,
            bathrooms,
            area_sqm: self.area_sqm,
            floor: self.floor,
            total_floors: self.total_floors,
            building_age: self.building_age,
            city: self.city.clone(),
            neighborhood: self.neighborhood.clone(),
            property_type,
            furnished: self.furnished,
        })
    }

    /// Fill the floor and building age when the caller left them out.
    ///
    /// Apartments default to floor 2, everything else (including an
    /// unrecognised type, which validation rejects later) to floor 1.
    pub fn with_estimate_defaults(mut self) -> Self {
        if self.floor.is_none() {
            let is_apartment = matches!(
                self.property_type.parse::<PropertyType>(),
                Ok(PropertyType::Apartment)
            );
            self.floor = Some(if is_apartment {
                DEFAULT_APARTMENT_FLOOR
            } else {
                DEFAULT_OTHER_FLOOR
            });
        }
        if self.building_age.is_none() {
            self.building_age = Some(DEFAULT_BUILDING_AGE);
        }
        self
    }
}

/// A validated query: safe to hand to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub area_sqm: f64,
    pub floor: Option<f64>,
    pub total_floors: Option<f64>,
    pub building_age: Option<f64>,
    pub city: String,
    pub neighborhood: String,
    pub property_type: PropertyType,
    pub furnished: bool,
}
