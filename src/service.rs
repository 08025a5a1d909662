//! Public estimation API.
//!
//! [`PriceService`] is the recovery boundary: every failure is logged here with
//! its context and returned as an [`EstimateError`], never a panic and never a
//! substituted price.

use crate::config::{ApartmentFloorCurve, FurnishedConfig, Settings, StoryCurve};
use crate::error::{ErrorClass, EstimateError};
use crate::market::MarketBaselineTable;
use crate::pipeline::PriceEstimationPipeline;
use crate::predictor::{LazyModel, ModelGateway};
use crate::query::{PriceQuery, PriceRequest};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Listed below the estimate by more than this (percent) is an exceptional deal.
pub const EXCEPTIONAL_DEAL_PCT: f64 = -10.0;

/// Listed below the estimate by more than this (percent) is good value.
pub const GREAT_VALUE_PCT: f64 = -3.0;

/// Listed above the estimate by more than this (percent) is above market.
pub const ABOVE_MARKET_PCT: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEstimate {
    pub prices: Vec<f64>,
}

/// Batch input: either `{"rows": [...]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchRequest {
    Rows { rows: Vec<PriceRequest> },
    List(Vec<PriceRequest>),
}

impl BatchRequest {
    pub fn into_rows(self) -> Vec<PriceRequest> {
        match self {
            BatchRequest::Rows { rows } => rows,
            BatchRequest::List(rows) => rows,
        }
    }
}

impl From<Vec<PriceRequest>> for BatchRequest {
    fn from(rows: Vec<PriceRequest>) -> Self {
        BatchRequest::List(rows)
    }
}

/// Floor curves as reported by [`PriceService::meta`].
#[derive(Debug, Clone, Serialize)]
pub struct FloorRuleMeta {
    pub apartment: ApartmentFloorCurve,
    pub stories: StoryCurve,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketMeta {
    pub blend: f64,
    pub has_baseline: bool,
    pub baseline_entries: usize,
    pub baseline_path: Option<String>,
}

/// Read-only view of the active configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMeta {
    /// Loaded artifact, or the configured path when nothing is loaded yet
    pub model_path: Option<String>,
    pub model_loaded: bool,
    pub neighborhood_blend: f64,
    pub furnished: FurnishedConfig,
    pub floor_rule: FloorRuleMeta,
    pub market: MarketMeta,
}

/// How a listed price sits against the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// More than 10% below the estimate
    ExceptionalDeal,
    /// Between 3% and 10% below
    GreatValue,
    /// Within 3% below to 3% above
    FairMarketPrice,
    /// More than 3% above
    AboveMarketAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceComparison {
    /// `(listed - estimate) / estimate * 100`
    pub difference_pct: f64,
    pub verdict: Verdict,
}

/// Compare a listed price against an estimate.
pub fn compare(listed_price: f64, estimate: f64) -> Result<PriceComparison, EstimateError> {
    if !(listed_price.is_finite() && listed_price >= 0.0) {
        return Err(EstimateError::invalid(
            "listed_price",
            format!("must be a non-negative number, got {listed_price}"),
        ));
    }
    if !(estimate.is_finite() && estimate > 0.0) {
        return Err(EstimateError::invalid(
            "estimate",
            format!("must be a positive number, got {estimate}"),
        ));
    }
    let difference_pct = (listed_price - estimate) / estimate * 100.0;
    let verdict = if difference_pct < EXCEPTIONAL_DEAL_PCT {
        Verdict::ExceptionalDeal
    } else if difference_pct < GREAT_VALUE_PCT {
        Verdict::GreatValue
    } else if difference_pct > ABOVE_MARKET_PCT {
        Verdict::AboveMarketAverage
    } else {
        Verdict::FairMarketPrice
    };
    Ok(PriceComparison {
        difference_pct,
        verdict,
    })
}

pub struct PriceService {
    settings: Settings,
    pipeline: PriceEstimationPipeline,
}

impl PriceService {
    /// Service over the ONNX artifact described by `settings`, loaded on first use.
    pub fn from_settings(settings: Settings) -> Result<Self, EstimateError> {
        let model = LazyModel::from_settings(settings.model.clone());
        Self::with_model(settings, model)
    }

    /// Service over an arbitrary model handle.
    pub fn with_model(settings: Settings, model: LazyModel) -> Result<Self, EstimateError> {
        settings.validate()?;
        let baseline = match &settings.market_baseline_path {
            Some(path) => {
                let table = MarketBaselineTable::from_json_file(path)
                    .map_err(|e| EstimateError::Config(format!("{e:#}")))?;
                info!(
                    path = %path.display(),
                    entries = table.len(),
                    "loaded market baseline"
                );
                table
            }
            None => MarketBaselineTable::default(),
        };
        let gateway = ModelGateway::new(model, settings.model.batch_chunk_size);
        let pipeline = PriceEstimationPipeline::new(settings.adjustment.clone(), baseline, gateway);
        Ok(Self { settings, pipeline })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pipeline(&self) -> &PriceEstimationPipeline {
        &self.pipeline
    }

    pub fn predict(&self, request: &PriceRequest) -> Result<PriceEstimate, EstimateError> {
        let result = request
            .validate()
            .and_then(|query| self.pipeline.estimate(&query))
            .map(|price| PriceEstimate { price });
        result.inspect_err(|e| {
            report(
                "predict",
                e,
                &format!(
                    "{} in {}/{}",
                    request.property_type, request.city, request.neighborhood
                ),
            )
        })
    }

    /// Estimate every row; any invalid row rejects the whole batch.
    pub fn predict_batch(&self, batch: BatchRequest) -> Result<BatchEstimate, EstimateError> {
        let rows = batch.into_rows();
        let count = rows.len();
        let result = validate_rows(&rows)
            .and_then(|queries| self.pipeline.estimate_batch(&queries))
            .map(|prices| BatchEstimate { prices });
        result.inspect_err(|e| report("predict_batch", e, &format!("{count} rows")))
    }

    /// [`Self::predict`] after filling a missing floor and building age.
    pub fn estimate(&self, request: PriceRequest) -> Result<PriceEstimate, EstimateError> {
        self.predict(&request.with_estimate_defaults())
    }

    pub fn meta(&self) -> ModelMeta {
        let adjustment = self.pipeline.config();
        let model_path = self
            .pipeline
            .gateway()
            .model()
            .loaded_path()
            .or(self.settings.model.model_path.as_deref())
            .map(|p| p.display().to_string());
        ModelMeta {
            model_path,
            model_loaded: self.pipeline.gateway().model().loaded_path().is_some(),
            neighborhood_blend: adjustment.neighborhood_blend,
            furnished: adjustment.furnished.clone(),
            floor_rule: FloorRuleMeta {
                apartment: adjustment.apartment.clone(),
                stories: adjustment.stories.clone(),
            },
            market: MarketMeta {
                blend: adjustment.market_blend,
                has_baseline: !self.pipeline.market().table().is_empty(),
                baseline_entries: self.pipeline.market().table().len(),
                baseline_path: self
                    .settings
                    .market_baseline_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
            },
        }
    }
}

fn validate_rows(rows: &[PriceRequest]) -> Result<Vec<PriceQuery>, EstimateError> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            row.validate().map_err(|e| match e {
                EstimateError::InvalidField { field, message } => EstimateError::InvalidField {
                    field,
                    message: format!("row {i}: {message}"),
                },
                other => other,
            })
        })
        .collect()
}

fn report(op: &'static str, err: &EstimateError, context: &str) {
    match err.class() {
        ErrorClass::InvalidInput => warn!(
            op,
            field = err.field().unwrap_or_default(),
            context,
            "rejected request: {err}"
        ),
        ErrorClass::Configuration | ErrorClass::Internal => error!(
            op,
            status = err.status_code(),
            context,
            "request failed: {err}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_verdicts() {
        let c = compare(110_000.0, 100_000.0).unwrap();
        assert!((c.difference_pct - 10.0).abs() < 1e-12);
        assert_eq!(c.verdict, Verdict::AboveMarketAverage);

        assert_eq!(compare(80_000.0, 100_000.0).unwrap().verdict, Verdict::ExceptionalDeal);
        assert_eq!(compare(95_000.0, 100_000.0).unwrap().verdict, Verdict::GreatValue);
        assert_eq!(compare(100_000.0, 100_000.0).unwrap().verdict, Verdict::FairMarketPrice);
        assert_eq!(compare(102_000.0, 100_000.0).unwrap().verdict, Verdict::FairMarketPrice);
        assert_eq!(compare(98_000.0, 100_000.0).unwrap().verdict, Verdict::FairMarketPrice);
    }

    #[test]
    fn test_compare_tier_boundaries() {
        // the thresholds themselves fall in the milder tier
        assert_eq!(compare(90.0, 100.0).unwrap().verdict, Verdict::GreatValue);
        assert_eq!(compare(97.0, 100.0).unwrap().verdict, Verdict::FairMarketPrice);
        assert_eq!(compare(103.0, 100.0).unwrap().verdict, Verdict::FairMarketPrice);
        assert_eq!(compare(89.9, 100.0).unwrap().verdict, Verdict::ExceptionalDeal);
        assert_eq!(compare(96.9, 100.0).unwrap().verdict, Verdict::GreatValue);
        assert_eq!(compare(103.1, 100.0).unwrap().verdict, Verdict::AboveMarketAverage);
    }

    #[test]
    fn test_compare_rejects_non_positive_estimate() {
        let err = compare(100.0, 0.0).unwrap_err();
        assert_eq!(err.field(), Some("estimate"));
        assert_eq!(compare(-1.0, 10.0).unwrap_err().field(), Some("listed_price"));
    }

    #[test]
    fn test_batch_request_shapes() {
        let row = r#"{"bedrooms":2,"bathrooms":1,"area_sqm":90,"city":"Amman",
            "neighborhood":"Abdoun","property_type":"Apartment","furnished":false}"#;
        let wrapped: BatchRequest = serde_json::from_str(&format!(r#"{{"rows":[{row}]}}"#)).unwrap();
        let bare: BatchRequest = serde_json::from_str(&format!("[{row},{row}]")).unwrap();
        assert_eq!(wrapped.into_rows().len(), 1);
        assert_eq!(bare.into_rows().len(), 2);
    }

    #[test]
    fn test_batch_validation_names_row() {
        let mut bad = crate::query::fixtures::request("Apartment");
        bad.area_sqm = 0.0;
        let rows = vec![crate::query::fixtures::request("Villa"), bad];
        let err = validate_rows(&rows).unwrap_err();
        assert_eq!(err.field(), Some("area_sqm"));
        assert!(err.to_string().contains("row 1"));
    }
}
