//! Model inference interface.
//!
//! [`Regressor`] is the seam between the adjustment layer and whatever produces
//! raw log-price predictions. [`OnnxRegressor`] runs the trained artifact through
//! ONNX Runtime; [`LazyModel`] loads it at most once per process; [`ModelGateway`]
//! builds feature frames, chunks batches and maps outputs back to price scale.

use crate::artifact::resolve_model_path;
use crate::config::ModelSettings;
use crate::error::EstimateError;
use crate::features::{build_frame, Column, ColumnKind, FeatureFrame, FeatureRow, ListingRecord};
use crate::Result;
use anyhow::Context;
use once_cell::sync::OnceCell;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::{DynValue, Tensor};
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Instant;
use tracing::{debug, info};

/// Anything that maps a feature frame to one log1p-price per row.
pub trait Regressor: Send + Sync {
    /// Raw model outputs (log space), one per row, in row order.
    fn predict_raw(&self, frame: &FeatureFrame) -> Result<Vec<f32>>;
}

/// In-process regressor backed by a per-row function.
///
/// Useful for analytical baselines and for exercising the pipeline without an
/// artifact on disk.
pub struct FnRegressor<F> {
    f: F,
}

impl<F> FnRegressor<F>
where
    F: Fn(&FeatureRow) -> f32 + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Regressor for FnRegressor<F>
where
    F: Fn(&FeatureRow) -> f32 + Send + Sync,
{
    fn predict_raw(&self, frame: &FeatureFrame) -> Result<Vec<f32>> {
        Ok(frame.rows.iter().map(&self.f).collect())
    }
}

/// Fixed set of exclusively borrowed slots.
///
/// A caller takes the first free slot, starting from a rotating offset, and
/// only waits when every slot is busy.
pub struct SlotPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SlotPool<T> {
    pub fn new(items: Vec<T>) -> Result<Self> {
        if items.is_empty() {
            anyhow::bail!("pool needs at least one slot");
        }
        Ok(Self {
            slots: items.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run `f` with exclusive access to one slot.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        for offset in 0..self.slots.len() {
            let slot = &self.slots[(start + offset) % self.slots.len()];
            match slot.try_lock() {
                Ok(mut guard) => return Ok(f(&mut *guard)),
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => anyhow::bail!("model session lock poisoned"),
            }
        }
        let mut guard = self.slots[start]
            .lock()
            .map_err(|_| anyhow::anyhow!("model session lock poisoned"))?;
        Ok(f(&mut *guard))
    }
}

/// Regressor running an ONNX export of the trained pipeline.
pub struct OnnxRegressor {
    /// ONNX Runtime sessions over the same artifact; each run borrows one
    sessions: SlotPool<Session>,

    /// Model inputs, in the order the session declares them
    inputs: Vec<Column>,

    /// Name of the prediction output
    output_name: String,
}

impl OnnxRegressor {
    /// Load an artifact and check its inputs against the feature contract.
    ///
    /// Fails if the model declares an input the feature frame does not produce,
    /// or declares no outputs.
    pub fn load(model_path: &Path, settings: &ModelSettings) -> Result<Self> {
        let sessions = (0..settings.session_pool.max(1))
            .map(|_| Self::open_session(model_path, settings))
            .collect::<Result<Vec<_>>>()?;
        let session = &sessions[0];

        let inputs = session
            .inputs
            .iter()
            .map(|input| {
                Column::from_name(&input.name).ok_or_else(|| {
                    anyhow::anyhow!(
                        "model input `{}` is not part of the feature contract",
                        input.name
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if inputs.is_empty() {
            anyhow::bail!("model declares no inputs");
        }

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| anyhow::anyhow!("model declares no outputs"))?;

        Ok(Self {
            sessions: SlotPool::new(sessions)?,
            inputs,
            output_name,
        })
    }

    fn open_session(model_path: &Path, settings: &ModelSettings) -> Result<Session> {
        Session::builder()?
            .with_optimization_level(if settings.optimize_graph {
                GraphOptimizationLevel::Level3
            } else {
                GraphOptimizationLevel::Level1
            })?
            .with_intra_threads(settings.intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("loading ONNX model {}", model_path.display()))
    }

    /// Number of sessions that can run concurrently.
    pub fn concurrency(&self) -> usize {
        self.sessions.len()
    }

    /// Model inputs as feature columns.
    pub fn inputs(&self) -> &[Column] {
        &self.inputs
    }

    /// Build one `(n, 1)` tensor per declared model input.
    fn prepare_inputs(
        &self,
        frame: &FeatureFrame,
    ) -> Result<Vec<(Cow<'static, str>, SessionInputValue<'static>)>> {
        let mut feed = Vec::with_capacity(self.inputs.len());
        for column in &self.inputs {
            let value: DynValue = match column.kind() {
                ColumnKind::Numeric => {
                    Tensor::from_array(frame.numeric_tensor(*column)?)?.into_dyn()
                }
                ColumnKind::Categorical => {
                    Tensor::from_string_array(&frame.text_tensor(*column)?)?.into_dyn()
                }
            };
            feed.push((Cow::Borrowed(column.name()), SessionInputValue::from(value)));
        }
        Ok(feed)
    }
}

impl Regressor for OnnxRegressor {
    fn predict_raw(&self, frame: &FeatureFrame) -> Result<Vec<f32>> {
        let feed = self.prepare_inputs(frame)?;

        self.sessions.with(|session| -> Result<Vec<f32>> {
            let outputs = session.run(feed)?;
            let output = outputs
                .get(&self.output_name)
                .ok_or_else(|| anyhow::anyhow!("model output `{}` missing", self.output_name))?;
            let tensor_data = output.try_extract_tensor::<f32>()?;
            Ok(tensor_data.1.to_vec())
        })?
    }
}

/// A loaded artifact together with where it came from.
pub struct LoadedModel {
    pub path: PathBuf,
    pub regressor: Arc<dyn Regressor>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel").field("path", &self.path).finish()
    }
}

type Loader = Box<dyn Fn() -> std::result::Result<LoadedModel, EstimateError> + Send + Sync>;

/// Model handle that loads on first use, exactly once.
///
/// Callers racing the first load block on the single in-flight load. A failed
/// load leaves the handle empty; the error goes to the caller that triggered it.
pub struct LazyModel {
    cell: OnceCell<LoadedModel>,
    loader: Loader,
}

impl LazyModel {
    /// Resolve and load the ONNX artifact described by `settings` on first use.
    pub fn from_settings(settings: ModelSettings) -> Self {
        Self::with_loader(move || {
            let path = resolve_model_path(&settings)?;
            let started = Instant::now();
            let regressor = OnnxRegressor::load(&path, &settings)
                .map_err(|e| EstimateError::Config(format!("{e:#}")))?;
            info!(
                path = %path.display(),
                inputs = regressor.inputs().len(),
                sessions = regressor.concurrency(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "loaded price model"
            );
            Ok(LoadedModel {
                path,
                regressor: Arc::new(regressor),
            })
        })
    }

    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> std::result::Result<LoadedModel, EstimateError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Handle around an already constructed regressor.
    pub fn preloaded(path: impl Into<PathBuf>, regressor: Arc<dyn Regressor>) -> Self {
        Self {
            cell: OnceCell::with_value(LoadedModel {
                path: path.into(),
                regressor,
            }),
            loader: Box::new(|| {
                Err(EstimateError::Config(
                    "preloaded model handle has no loader".to_string(),
                ))
            }),
        }
    }

    pub fn get(&self) -> std::result::Result<&LoadedModel, EstimateError> {
        self.cell.get_or_try_init(|| (self.loader)())
    }

    /// Path of the loaded artifact, if loading already happened.
    pub fn loaded_path(&self) -> Option<&Path> {
        self.cell.get().map(|m| m.path.as_path())
    }
}

/// Single and batch prediction in price scale.
pub struct ModelGateway {
    model: LazyModel,
    chunk_size: usize,
}

impl ModelGateway {
    pub fn new(model: LazyModel, chunk_size: usize) -> Self {
        Self {
            model,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn model(&self) -> &LazyModel {
        &self.model
    }

    pub fn predict_one(&self, record: &ListingRecord) -> std::result::Result<f64, EstimateError> {
        let ys = self.predict_batch(std::slice::from_ref(record))?;
        ys.first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("model returned no prediction").into())
    }

    /// Predict every record, `chunk_size` rows per model invocation, in input order.
    ///
    /// Outputs are mapped back from log space with `expm1` at the model's
    /// `f32` precision.
    pub fn predict_batch(
        &self,
        records: &[ListingRecord],
    ) -> std::result::Result<Vec<f64>, EstimateError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.get()?;

        let mut prices = Vec::with_capacity(records.len());
        for (i, chunk) in records.chunks(self.chunk_size).enumerate() {
            let frame = build_frame(chunk);
            let raw = model
                .regressor
                .predict_raw(&frame)
                .with_context(|| format!("model invocation failed on chunk {i}"))?;
            if raw.len() != chunk.len() {
                return Err(anyhow::anyhow!(
                    "model returned {} predictions for {} rows",
                    raw.len(),
                    chunk.len()
                )
                .into());
            }
            debug!(chunk = i, rows = chunk.len(), "model chunk predicted");
            prices.extend(raw.into_iter().map(|y| f64::from(y.exp_m1())));
        }
        Ok(prices)
    }
}
