//! Market price-per-area floor.
//!
//! The model underprices sparse, expensive pockets of the market. When a
//! prediction falls below the known per-sqm baseline for its location, it is
//! lifted part of the way there geometrically; it is never forced all the way.

use crate::features::ListingRecord;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Wildcard for the neighborhood or property type of a baseline key.
pub const WILDCARD: &str = "*";

/// One baseline row as stored in a baseline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub city: String,
    pub neighborhood: String,
    pub property_type: String,
    /// Price per square meter
    pub psqm: f64,
}

/// On-disk shape of a baseline table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineFile {
    pub entries: Vec<BaselineEntry>,
    #[serde(default)]
    pub city_fallback: HashMap<String, f64>,
    pub global_fallback: f64,
}

type Key = (String, String, String);

/// Price-per-sqm baselines keyed by (city, neighborhood, property type).
///
/// Lookup order: exact key, `(city, neighborhood, *)`, `(city, *, type)`,
/// city fallback, global fallback.
#[derive(Debug, Clone)]
pub struct MarketBaselineTable {
    entries: HashMap<Key, f64>,
    city_fallback: HashMap<String, f64>,
    global_fallback: f64,
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

impl Default for MarketBaselineTable {
    fn default() -> Self {
        let entries = [
            ("amman", "abdoun", "apartment", 950.0),
            ("amman", "khalda", "apartment", 700.0),
            ("amman", "jubihaa", "apartment", 520.0),
            ("amman", "khalda", "villa", 900.0),
        ]
        .into_iter()
        .map(|(c, n, p, v)| ((c.to_string(), n.to_string(), p.to_string()), v))
        .collect();

        Self {
            entries,
            city_fallback: HashMap::from([("amman".to_string(), 500.0)]),
            global_fallback: 450.0,
        }
    }
}

impl MarketBaselineTable {
    pub fn from_file_contents(file: BaselineFile) -> crate::Result<Self> {
        let mut entries = HashMap::with_capacity(file.entries.len());
        for entry in file.entries {
            if !(entry.psqm.is_finite() && entry.psqm > 0.0) {
                anyhow::bail!(
                    "baseline for ({}, {}, {}) must be positive, got {}",
                    entry.city,
                    entry.neighborhood,
                    entry.property_type,
                    entry.psqm
                );
            }
            entries.insert(
                (
                    norm(&entry.city),
                    norm(&entry.neighborhood),
                    norm(&entry.property_type),
                ),
                entry.psqm,
            );
        }
        if !(file.global_fallback.is_finite() && file.global_fallback > 0.0) {
            anyhow::bail!("global fallback must be positive, got {}", file.global_fallback);
        }
        Ok(Self {
            entries,
            city_fallback: file
                .city_fallback
                .into_iter()
                .map(|(city, v)| (norm(&city), v))
                .collect(),
            global_fallback: file.global_fallback,
        })
    }

    /// Load a baseline table from a JSON file.
    pub fn from_json_file(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading market baseline {}", path.display()))?;
        let file: BaselineFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing market baseline {}", path.display()))?;
        Self::from_file_contents(file)
    }

    /// Baseline price per sqm for a location and type.
    pub fn lookup(&self, city: &str, neighborhood: &str, property_type: &str) -> f64 {
        let city = norm(city);
        let nb = norm(neighborhood);
        let pt = norm(property_type);

        let get = |n: &str, p: &str| {
            self.entries
                .get(&(city.clone(), n.to_string(), p.to_string()))
                .copied()
        };

        get(&nb, &pt)
            .or_else(|| get(&nb, WILDCARD))
            .or_else(|| get(WILDCARD, &pt))
            .or_else(|| self.city_fallback.get(&city).copied())
            .unwrap_or(self.global_fallback)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifts underpriced predictions toward the market floor.
#[derive(Debug, Clone)]
pub struct MarketFloorBlender {
    table: MarketBaselineTable,
    exponent: f64,
}

impl MarketFloorBlender {
    pub fn new(table: MarketBaselineTable, exponent: f64) -> Self {
        Self { table, exponent }
    }

    pub fn table(&self) -> &MarketBaselineTable {
        &self.table
    }

    /// Market floor (never below 1 per sqm) for a record's location.
    pub fn psqm_floor(&self, record: &ListingRecord) -> f64 {
        self.table
            .lookup(&record.city, &record.neighborhood, &record.property_type)
            .max(1.0)
    }

    /// Returns `y` unchanged unless the market floor for the record's area is
    /// above it, in which case `y * (floor / y)^exponent`.
    pub fn lift(&self, y: f64, record: &ListingRecord) -> f64 {
        let area = record.area();
        if area <= 0.0 || y <= 0.0 {
            return y;
        }
        let y_market = self.psqm_floor(record) * area;
        if y_market <= y {
            return y;
        }
        let ratio = y_market / y;
        y * ratio.powf(self.exponent)
    }
}
