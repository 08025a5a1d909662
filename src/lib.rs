//! Listing price estimation over a trained regression model.
//!
//! A validated query is normalized, expanded into furnished/unfurnished and
//! neighborhood-blind/aware variants, scored by the ONNX model in one batch,
//! then corrected by deterministic post-processing: neighborhood blending, a
//! market price-per-area floor, furnished anchoring and a floor/story curve.

pub mod anchor;
pub mod artifact;
pub mod blend;
pub mod config;
pub mod error;
pub mod features;
pub mod floor;
pub mod market;
pub mod normalize;
pub mod pipeline;
pub mod predictor;
pub mod query;
pub mod service;

pub use config::{AdjustmentConfig, AnchorPolicy, ModelSettings, Settings};
pub use error::{ErrorClass, EstimateError};
pub use features::{FeatureFrame, FeatureRow, ListingRecord};
pub use pipeline::PriceEstimationPipeline;
pub use predictor::{FnRegressor, LazyModel, ModelGateway, OnnxRegressor, Regressor};
pub use query::{PriceQuery, PriceRequest, PropertyType};
pub use service::{
    compare, BatchEstimate, BatchRequest, ModelMeta, PriceComparison, PriceEstimate,
    PriceService, Verdict,
};

/// Library-wide error type for internals.
pub type Result<T> = anyhow::Result<T>;
