//! End-to-end price estimation.
//!
//! normalize → furnished/unfurnished × neighborhood-blind/aware variants →
//! one batched model call → neighborhood blend → market lift → furnished
//! anchor (floor curve per branch) → branch selection → clamp and round.
//!
//! A single query is a batch of one, so [`PriceEstimationPipeline::estimate`]
//! and [`PriceEstimationPipeline::estimate_batch`] share every instruction.

use crate::anchor::FurnishedAnchor;
use crate::blend::NeighborhoodBlender;
use crate::config::AdjustmentConfig;
use crate::error::EstimateError;
use crate::features::ListingRecord;
use crate::floor::FloorAdjuster;
use crate::market::{MarketBaselineTable, MarketFloorBlender};
use crate::normalize::{normalize, NeighborhoodAliasTable};
use crate::predictor::ModelGateway;
use crate::query::PriceQuery;
use tracing::debug;

/// Model rows per query: furnished × {blind, aware}, unfurnished × {blind, aware}.
const VARIANTS_PER_QUERY: usize = 4;

/// Round to cents on the exact decimal value, ties to even.
///
/// Goes through the float formatter, which is correctly rounded; scaling by
/// 100 first would round `2.675` (really `2.67499…`) up to `2.68`.
pub fn round_cents(y: f64) -> f64 {
    format!("{y:.2}").parse().unwrap_or(y)
}

pub struct PriceEstimationPipeline {
    config: AdjustmentConfig,
    aliases: NeighborhoodAliasTable,
    neighborhood: NeighborhoodBlender,
    market: MarketFloorBlender,
    anchor: FurnishedAnchor,
    gateway: ModelGateway,
}

impl PriceEstimationPipeline {
    pub fn new(config: AdjustmentConfig, baseline: MarketBaselineTable, gateway: ModelGateway) -> Self {
        let floor = FloorAdjuster::new(config.apartment.clone(), config.stories.clone());
        Self {
            aliases: NeighborhoodAliasTable::builtin().clone(),
            neighborhood: NeighborhoodBlender::new(config.neighborhood_blend),
            market: MarketFloorBlender::new(baseline, config.market_blend),
            anchor: FurnishedAnchor::new(config.furnished.clone(), floor),
            gateway,
            config,
        }
    }

    /// Replace the neighborhood alias table.
    pub fn with_aliases(mut self, aliases: NeighborhoodAliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn config(&self) -> &AdjustmentConfig {
        &self.config
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    pub fn market(&self) -> &MarketFloorBlender {
        &self.market
    }

    pub fn estimate(&self, query: &PriceQuery) -> Result<f64, EstimateError> {
        let prices = self.estimate_batch(std::slice::from_ref(query))?;
        prices
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("pipeline produced no price").into())
    }

    /// Estimate every query, in input order.
    pub fn estimate_batch(&self, queries: &[PriceQuery]) -> Result<Vec<f64>, EstimateError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<ListingRecord> = queries
            .iter()
            .map(|q| normalize(q, &self.aliases))
            .collect();

        let mut variants = Vec::with_capacity(records.len() * VARIANTS_PER_QUERY);
        for record in &records {
            variants.extend(NeighborhoodBlender::variants(&record.with_furnished(true)));
            variants.extend(NeighborhoodBlender::variants(&record.with_furnished(false)));
        }
        debug!(
            queries = queries.len(),
            model_rows = variants.len(),
            "estimating batch"
        );

        let ys = self.gateway.predict_batch(&variants)?;
        if ys.len() != variants.len() {
            return Err(anyhow::anyhow!(
                "expected {} predictions, got {}",
                variants.len(),
                ys.len()
            )
            .into());
        }

        queries
            .iter()
            .zip(&records)
            .zip(ys.chunks_exact(VARIANTS_PER_QUERY))
            .enumerate()
            .map(|(i, ((query, record), y))| {
                let y_t = self.market.lift(self.neighborhood.combine(y[0], y[1]), record);
                let y_f = self.market.lift(self.neighborhood.combine(y[2], y[3]), record);
                // the floor clamp would turn NaN into 0
                if !(y_t.is_finite() && y_f.is_finite()) {
                    return Err(anyhow::anyhow!(
                        "row {i}: non-finite price (furnished {y_t}, unfurnished {y_f})"
                    )
                    .into());
                }
                let prices = self.anchor.resolve(
                    y_t,
                    y_f,
                    query.property_type,
                    record.floor_value(),
                );
                Ok(round_cents(prices.select(query.furnished).max(0.0)))
            })
            .collect()
    }
}
