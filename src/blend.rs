//! Neighborhood blending.
//!
//! Neighborhood is a sparse, high-cardinality category; the model's response to
//! it is noisy for rarely seen values. The blended price is a convex mix of a
//! neighborhood-blind and a neighborhood-aware prediction. Both variants are
//! scored in the pipeline's single batched model call, which then lifts the
//! blend toward the market floor.

use crate::features::ListingRecord;

#[derive(Debug, Clone, Copy)]
pub struct NeighborhoodBlender {
    factor: f64,
}

impl NeighborhoodBlender {
    /// `factor` in [0, 1]: 0 ignores the neighborhood, 1 trusts it fully.
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// The two records the blend needs: neighborhood cleared, neighborhood as given.
    pub fn variants(record: &ListingRecord) -> [ListingRecord; 2] {
        [record.without_neighborhood(), record.clone()]
    }

    /// `y0 + factor * (y1 - y0)`.
    pub fn combine(&self, y_neutral: f64, y_local: f64) -> f64 {
        y_neutral + self.factor * (y_local - y_neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Scalar;

    fn record(area: f64) -> ListingRecord {
        ListingRecord {
            area_sqm: Some(Scalar::Number(area)),
            city: "Amman".to_string(),
            neighborhood: "Abdoun".to_string(),
            property_type: "Apartment".to_string(),
            ..ListingRecord::default()
        }
    }

    #[test]
    fn test_combine_endpoints() {
        assert_eq!(NeighborhoodBlender::new(0.0).combine(10.0, 20.0), 10.0);
        assert_eq!(NeighborhoodBlender::new(1.0).combine(10.0, 20.0), 20.0);
        assert_eq!(NeighborhoodBlender::new(0.85).combine(10.0, 20.0), 18.5);
    }

    #[test]
    fn test_combine_downweights_neighborhood_premium() {
        let blender = NeighborhoodBlender::new(0.85);
        assert!((blender.combine(60_000.0, 100_000.0) - 94_000.0).abs() < 1e-9);
        // a neighborhood discount is damped the same way
        assert!((blender.combine(100_000.0, 60_000.0) - 66_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_variants_clear_only_neighborhood() {
        let [neutral, local] = NeighborhoodBlender::variants(&record(80.0));
        assert_eq!(neutral.neighborhood, "");
        assert_eq!(local.neighborhood, "Abdoun");
        assert_eq!(neutral.area_sqm, local.area_sqm);
    }
}
