//! Process-wide configuration for the adjustment layer and the model artifact.
//!
//! Everything here is built once at startup (defaults overridden by `PRICE_*`
//! environment variables) and handed to the pipeline by value. Nothing reads
//! the environment after that.

use crate::error::EstimateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Rule used to derive furnished and unfurnished prices from the two model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorPolicy {
    /// The furnished prediction is authoritative; unfurnished is a fixed discount off it.
    Furnished,
    /// Both variants are pulled toward their midpoint with a clamped gap.
    Midpoint,
}

impl AnchorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorPolicy::Furnished => "furnished",
            AnchorPolicy::Midpoint => "midpoint",
        }
    }
}

impl fmt::Display for AnchorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnchorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "furnished" | "furnished-anchor" | "furnished_anchor" => Ok(AnchorPolicy::Furnished),
            "midpoint" | "mid" => Ok(AnchorPolicy::Midpoint),
            other => Err(format!(
                "unknown anchor policy `{other}` (expected `furnished` or `midpoint`)"
            )),
        }
    }
}

/// Furnished/unfurnished anchoring constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FurnishedConfig {
    /// Apply the furnished split to every property type, not just apartments
    pub all_property_types: bool,

    /// Which anchor policy is active
    pub anchor: AnchorPolicy,

    /// Discount applied to the furnished price for unfurnished listings (anchor = furnished)
    pub unfurnished_pct: f64,

    /// Upper bound of the furnished gap as a fraction of the midpoint (anchor = midpoint)
    pub cap: f64,

    /// Lower bound of the furnished gap as a fraction of the midpoint (anchor = midpoint)
    pub floor: f64,

    /// Multiplier on the raw model gap before clamping (anchor = midpoint)
    pub boost: f64,
}

impl Default for FurnishedConfig {
    fn default() -> Self {
        Self {
            all_property_types: true,
            anchor: AnchorPolicy::Furnished,
            unfurnished_pct: 0.107,
            cap: 0.15,
            floor: 0.08,
            boost: 2.0,
        }
    }
}

/// Multiplicative floor curve for apartments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApartmentFloorCurve {
    /// Premium for ground floor units
    pub ground_floor_premium: f64,

    /// Drop per story above the first
    pub up_step: f64,

    /// Maximum total drop above ground
    pub up_cap: f64,

    /// Drop for the first basement level
    pub basement1_drop: f64,

    /// Compounding drop per extra basement level
    pub down_step: f64,

    /// Maximum extra drop below the first basement
    pub down_cap: f64,
}

impl Default for ApartmentFloorCurve {
    fn default() -> Self {
        Self {
            ground_floor_premium: 0.11,
            up_step: 0.035,
            up_cap: 0.20,
            basement1_drop: 0.20,
            down_step: 0.035,
            down_cap: 0.35,
        }
    }
}

/// Per-story premium for houses, villas and townhouses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryCurve {
    pub stories_step: f64,
    pub stories_cap: f64,
}

impl Default for StoryCurve {
    fn default() -> Self {
        Self {
            stories_step: 0.05,
            stories_cap: 0.15,
        }
    }
}

/// Constants for every adjustment stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentConfig {
    /// Weight of the neighborhood-aware prediction versus the neighborhood-blind one
    pub neighborhood_blend: f64,

    /// Exponent of the geometric lift toward the market floor
    pub market_blend: f64,

    pub furnished: FurnishedConfig,

    pub apartment: ApartmentFloorCurve,

    pub stories: StoryCurve,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            neighborhood_blend: 0.85,
            market_blend: 0.35,
            furnished: FurnishedConfig::default(),
            apartment: ApartmentFloorCurve::default(),
            stories: StoryCurve::default(),
        }
    }
}

/// Where to find the model artifact and how to run it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Explicit artifact path; takes priority over directory search when it resolves
    pub model_path: Option<PathBuf>,

    /// Directory scanned for artifacts when no explicit path resolves
    pub models_dir: PathBuf,

    /// Glob pattern (relative to `models_dir`) artifact files must match
    pub artifact_pattern: String,

    /// Maximum rows per model invocation
    pub batch_chunk_size: usize,

    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,

    /// Sessions loaded over the artifact; this many predictions run at once
    pub session_pool: usize,

    /// Enable graph optimization
    pub optimize_graph: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            models_dir: PathBuf::from("models"),
            artifact_pattern: "price_model_*.onnx".to_string(),
            batch_chunk_size: 10_000,
            intra_threads: 1, // deterministic output
            session_pool: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(1),
            optimize_graph: true,
        }
    }
}

/// Full startup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub adjustment: AdjustmentConfig,
    pub model: ModelSettings,

    /// Optional JSON file replacing the built-in market baseline table
    pub market_baseline_path: Option<PathBuf>,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self, EstimateError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EstimateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let a = &defaults.adjustment;
        let m = &defaults.model;

        let adjustment = AdjustmentConfig {
            neighborhood_blend: read(&lookup, "PRICE_NEIGHBORHOOD_BLEND", a.neighborhood_blend)?,
            market_blend: read(&lookup, "PRICE_MARKET_BLEND", a.market_blend)?,
            furnished: FurnishedConfig {
                all_property_types: read_flag(
                    &lookup,
                    "PRICE_FURNISHED_ALL_TYPES",
                    a.furnished.all_property_types,
                )?,
                anchor: read(&lookup, "PRICE_FURNISHED_ANCHOR", a.furnished.anchor)?,
                unfurnished_pct: read(&lookup, "PRICE_UNFURNISHED_PCT", a.furnished.unfurnished_pct)?,
                cap: read(&lookup, "PRICE_FURNISHED_CAP", a.furnished.cap)?,
                floor: read(&lookup, "PRICE_FURNISHED_FLOOR", a.furnished.floor)?,
                boost: read(&lookup, "PRICE_FURNISHED_BOOST", a.furnished.boost)?,
            },
            apartment: ApartmentFloorCurve {
                ground_floor_premium: read(
                    &lookup,
                    "PRICE_APT_GF_PREMIUM",
                    a.apartment.ground_floor_premium,
                )?,
                up_step: read(&lookup, "PRICE_APT_UP_STEP", a.apartment.up_step)?,
                up_cap: read(&lookup, "PRICE_APT_UP_CAP", a.apartment.up_cap)?,
                basement1_drop: read(&lookup, "PRICE_APT_B1_DROP", a.apartment.basement1_drop)?,
                down_step: read(&lookup, "PRICE_APT_DOWN_STEP", a.apartment.down_step)?,
                down_cap: read(&lookup, "PRICE_APT_DOWN_CAP", a.apartment.down_cap)?,
            },
            stories: StoryCurve {
                stories_step: read(&lookup, "PRICE_HV_STORIES_STEP", a.stories.stories_step)?,
                stories_cap: read(&lookup, "PRICE_HV_STORIES_CAP", a.stories.stories_cap)?,
            },
        };

        let model = ModelSettings {
            model_path: lookup("PRICE_MODEL_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            models_dir: lookup("PRICE_MODELS_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| m.models_dir.clone()),
            artifact_pattern: lookup("PRICE_MODEL_PATTERN")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| m.artifact_pattern.clone()),
            batch_chunk_size: read(&lookup, "PRICE_BATCH_CHUNK", m.batch_chunk_size)?,
            intra_threads: read(&lookup, "PRICE_MODEL_THREADS", m.intra_threads)?,
            session_pool: read(&lookup, "PRICE_MODEL_SESSIONS", m.session_pool)?,
            optimize_graph: read_flag(&lookup, "PRICE_MODEL_OPTIMIZE", m.optimize_graph)?,
        };

        let settings = Settings {
            adjustment,
            model,
            market_baseline_path: lookup("PRICE_MARKET_BASELINE_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), EstimateError> {
        let a = &self.adjustment;
        check_unit("PRICE_NEIGHBORHOOD_BLEND", a.neighborhood_blend)?;
        check_unit("PRICE_MARKET_BLEND", a.market_blend)?;
        if !(0.0..1.0).contains(&a.furnished.unfurnished_pct) {
            return Err(EstimateError::Config(format!(
                "PRICE_UNFURNISHED_PCT must be in [0, 1), got {}",
                a.furnished.unfurnished_pct
            )));
        }
        if self.model.batch_chunk_size == 0 {
            return Err(EstimateError::Config(
                "PRICE_BATCH_CHUNK must be at least 1".to_string(),
            ));
        }
        if self.model.session_pool == 0 {
            return Err(EstimateError::Config(
                "PRICE_MODEL_SESSIONS must be at least 1".to_string(),
            ));
        }
        if self.model.intra_threads == 0 {
            return Err(EstimateError::Config(
                "PRICE_MODEL_THREADS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit(key: &str, value: f64) -> Result<(), EstimateError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EstimateError::Config(format!(
            "{key} must be in [0, 1], got {value}"
        )))
    }
}

fn read<F, T>(lookup: &F, key: &str, default: T) -> Result<T, EstimateError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| EstimateError::Config(format!("{key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}

fn read_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool, EstimateError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(EstimateError::Config(format!(
                "{key}={raw:?}: expected a boolean"
            ))),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, EstimateError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_match_production_constants() {
        let settings = settings_from(&[]).unwrap();
        let a = &settings.adjustment;
        assert_eq!(a.neighborhood_blend, 0.85);
        assert_eq!(a.market_blend, 0.35);
        assert_eq!(a.furnished.anchor, AnchorPolicy::Furnished);
        assert!(a.furnished.all_property_types);
        assert_eq!(a.furnished.unfurnished_pct, 0.107);
        assert_eq!(a.apartment.ground_floor_premium, 0.11);
        assert_eq!(a.apartment.down_cap, 0.35);
        assert_eq!(a.stories.stories_cap, 0.15);
        assert_eq!(settings.model.batch_chunk_size, 10_000);
        assert!(settings.model.model_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let settings = settings_from(&[
            ("PRICE_NEIGHBORHOOD_BLEND", "0.5"),
            ("PRICE_FURNISHED_ANCHOR", "midpoint"),
            ("PRICE_FURNISHED_ALL_TYPES", "false"),
            ("PRICE_MODEL_PATH", "/srv/models/latest.onnx"),
            ("PRICE_BATCH_CHUNK", "256"),
            ("PRICE_MODEL_SESSIONS", "3"),
        ])
        .unwrap();
        assert_eq!(settings.model.session_pool, 3);
        assert_eq!(settings.adjustment.neighborhood_blend, 0.5);
        assert_eq!(settings.adjustment.furnished.anchor, AnchorPolicy::Midpoint);
        assert!(!settings.adjustment.furnished.all_property_types);
        assert_eq!(
            settings.model.model_path,
            Some(PathBuf::from("/srv/models/latest.onnx"))
        );
        assert_eq!(settings.model.batch_chunk_size, 256);
    }

    #[test]
    fn test_unparseable_value_names_variable() {
        let err = settings_from(&[("PRICE_MARKET_BLEND", "lots")]).unwrap_err();
        assert!(matches!(err, EstimateError::Config(_)));
        assert!(err.to_string().contains("PRICE_MARKET_BLEND"));
    }

    #[test]
    fn test_out_of_range_blend_rejected() {
        let err = settings_from(&[("PRICE_NEIGHBORHOOD_BLEND", "1.5")]).unwrap_err();
        assert!(err.to_string().contains("PRICE_NEIGHBORHOOD_BLEND"));

        let err = settings_from(&[("PRICE_BATCH_CHUNK", "0")]).unwrap_err();
        assert!(err.to_string().contains("PRICE_BATCH_CHUNK"));

        let err = settings_from(&[("PRICE_MODEL_SESSIONS", "0")]).unwrap_err();
        assert!(err.to_string().contains("PRICE_MODEL_SESSIONS"));
    }

    #[test]
    fn test_anchor_policy_parse() {
        assert_eq!(
            "furnished-anchor".parse::<AnchorPolicy>(),
            Ok(AnchorPolicy::Furnished)
        );
        assert_eq!(" Midpoint ".parse::<AnchorPolicy>(), Ok(AnchorPolicy::Midpoint));
        assert!("median".parse::<AnchorPolicy>().is_err());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let settings = settings_from(&[("PRICE_MODEL_PATH", "  "), ("PRICE_MARKET_BLEND", "")])
            .unwrap();
        assert!(settings.model.model_path.is_none());
        assert_eq!(settings.adjustment.market_blend, 0.35);
    }
}
