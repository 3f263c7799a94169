//! Model lifecycle: load a persisted network or fall back to a fresh one
//!
//! ```text
//! Unloaded --(artifact decoded)--------------> Ready
//!          \--(missing / corrupt / mismatch)--> FallbackReady
//! ```
//!
//! Both ready states are terminal. Startup never fails because of the
//! artifact: whatever goes wrong while loading it, an untrained RGB network is
//! installed instead so the service can still answer requests.

pub mod artifact;
pub mod registry;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use burn::tensor::backend::Backend;
use serde::Serialize;
use tracing::{error, info, warn};

pub use artifact::{
    load_artifact, save_artifact, ArtifactDescriptor, LayerBlock, ARTIFACT_MAGIC, ARTIFACT_VERSION,
};
pub use registry::{CustomLayer, LayerFactory, LayerRegistry, ATTENTION_GATE_TAG, MULTI_BRANCH_TAG};

use crate::classes::NUM_CLASSES;
use crate::model::{HssanConfig, HssanNetwork, HssanVariant};
use crate::utils::error::{HssanError, Result};

/// Default location of the persisted model
pub const DEFAULT_MODEL_PATH: &str = "model/hssan_rgb_model.bin";

/// Where the model lifecycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Unloaded,
    /// A persisted artifact was loaded
    Ready,
    /// The artifact was unusable; an untrained network is serving instead
    FallbackReady,
}

impl ModelStatus {
    pub fn is_ready(self) -> bool {
        !matches!(self, ModelStatus::Unloaded)
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelStatus::Unloaded => write!(f, "unloaded"),
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::FallbackReady => write!(f, "fallback"),
        }
    }
}

/// Settings for [`ModelState`]
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Artifact to load at startup
    pub artifact_path: PathBuf,

    /// Expected network shape; also the template for the fallback network
    pub network: HssanConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(DEFAULT_MODEL_PATH),
            network: HssanConfig::rgb(NUM_CLASSES),
        }
    }
}

impl LifecycleConfig {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            ..Self::default()
        }
    }

    pub fn with_network(mut self, network: HssanConfig) -> Self {
        self.network = network;
        self
    }

    /// The network built when the artifact cannot be used: always RGB
    pub fn fallback_network(&self) -> HssanConfig {
        self.network
            .clone()
            .with_variant(HssanVariant::Rgb)
            .with_channels(3)
    }
}

struct Slot<B: Backend> {
    status: ModelStatus,
    network: Option<HssanNetwork<B>>,
}

/// Process-wide handle to the serving network
///
/// Created once at startup and shared by reference (an `Arc` in the server).
/// The mutex only guards installation and handle cloning; forward passes run
/// on clones without holding it.
pub struct ModelState<B: Backend> {
    config: LifecycleConfig,
    registry: LayerRegistry,
    device: B::Device,
    slot: Mutex<Slot<B>>,
}

impl<B: Backend> ModelState<B> {
    /// New, still unloaded state using the built-in layer registry
    pub fn new(config: LifecycleConfig, device: B::Device) -> Self {
        Self::with_registry(config, LayerRegistry::with_builtin_layers(), device)
    }

    pub fn with_registry(config: LifecycleConfig, registry: LayerRegistry, device: B::Device) -> Self {
        Self {
            config,
            registry,
            device,
            slot: Mutex::new(Slot {
                status: ModelStatus::Unloaded,
                network: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<B>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the artifact or install the fallback network
    ///
    /// Runs once; later calls return the status reached by the first one.
    /// Only an invalid fallback configuration makes this fail.
    pub fn initialize(&self) -> Result<ModelStatus> {
        let mut slot = self.lock();
        if slot.status.is_ready() {
            return Ok(slot.status);
        }

        let path = &self.config.artifact_path;
        let loaded = if !path.exists() {
            warn!(path = %path.display(), "artifact not found, serving an untrained RGB network");
            None
        } else {
            match self.load_persisted(path) {
                Ok(network) => Some(network),
                Err(err) => {
                    error!(
                        path = %path.display(),
                        error = %err,
                        "failed to load artifact, serving an untrained RGB network"
                    );
                    None
                }
            }
        };

        let (network, status) = match loaded {
            Some(network) => (network, ModelStatus::Ready),
            None => (
                self.config.fallback_network().init::<B>(&self.device)?,
                ModelStatus::FallbackReady,
            ),
        };

        info!(
            status = %status,
            variant = %network.variant(),
            num_classes = network.num_classes(),
            params = network.num_params(),
            "model ready"
        );

        slot.network = Some(network);
        slot.status = status;
        Ok(status)
    }

    fn load_persisted(&self, path: &Path) -> Result<HssanNetwork<B>> {
        let network = catch_unwind(AssertUnwindSafe(|| {
            load_artifact::<B>(path, &self.registry, &self.device)
        }))
        .map_err(|_| HssanError::artifact(path, "decoding the artifact panicked"))??;

        let expected = &self.config.network;
        if network.num_classes() != expected.num_classes {
            return Err(HssanError::artifact(
                path,
                format!(
                    "artifact predicts {} classes, expected {}",
                    network.num_classes(),
                    expected.num_classes
                ),
            ));
        }
        if network.input_shape() != expected.input_shape() {
            return Err(HssanError::artifact(
                path,
                format!(
                    "artifact expects input {:?}, expected {:?}",
                    network.input_shape(),
                    expected.input_shape()
                ),
            ));
        }

        Ok(network)
    }

    pub fn status(&self) -> ModelStatus {
        self.lock().status
    }

    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Handle to the serving network; shares weights with the stored one
    pub fn current_network(&self) -> Result<HssanNetwork<B>> {
        self.lock().network.clone().ok_or(HssanError::ModelNotReady)
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, Tensor};
    use burn_ndarray::NdArray;
    use std::fs;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn template(num_classes: usize) -> HssanConfig {
        HssanConfig::rgb(num_classes).with_height(16).with_width(16)
    }

    fn state_for(path: &Path, num_classes: usize) -> ModelState<TestBackend> {
        let config = LifecycleConfig::new(path).with_network(template(num_classes));
        ModelState::new(config, Default::default())
    }

    #[test]
    fn test_not_ready_before_initialize() {
        let dir = tempdir().unwrap();
        let state = state_for(&dir.path().join("model.bin"), 7);

        assert_eq!(state.status(), ModelStatus::Unloaded);
        assert!(!state.is_ready());
        assert!(matches!(
            state.current_network(),
            Err(HssanError::ModelNotReady)
        ));
    }

    #[test]
    fn test_missing_artifact_falls_back() {
        let dir = tempdir().unwrap();
        let state = state_for(&dir.path().join("missing.bin"), 7);

        assert_eq!(state.initialize().unwrap(), ModelStatus::FallbackReady);
        assert!(state.is_ready());

        let network = state.current_network().unwrap();
        assert_eq!(network.variant(), HssanVariant::Rgb);
        assert_eq!(network.classifier_width(), 7);
    }

    #[test]
    fn test_corrupt_artifact_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"\x00\x01garbage").unwrap();

        let state = state_for(&path, 7);
        assert_eq!(state.initialize().unwrap(), ModelStatus::FallbackReady);
        assert_eq!(state.current_network().unwrap().num_classes(), 7);
    }

    #[test]
    fn test_saved_artifact_is_loaded() {
        let device = Default::default();
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let saved = template(7).init::<TestBackend>(&device).unwrap();
        save_artifact(&saved, &path).unwrap();

        let state = state_for(&path, 7);
        assert_eq!(state.initialize().unwrap(), ModelStatus::Ready);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 16, 16, 3],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let expected = saved.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = state
            .current_network()
            .unwrap()
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        for (a, b) in expected.iter().zip(actual.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_class_count_mismatch_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let saved = template(3).init::<TestBackend>(&Default::default()).unwrap();
        save_artifact(&saved, &path).unwrap();

        let state = state_for(&path, 7);
        assert_eq!(state.initialize().unwrap(), ModelStatus::FallbackReady);
        assert_eq!(state.current_network().unwrap().classifier_width(), 7);
    }

    #[test]
    fn test_missing_registry_entry_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let saved = template(7).init::<TestBackend>(&Default::default()).unwrap();
        save_artifact(&saved, &path).unwrap();

        let config = LifecycleConfig::new(&path).with_network(template(7));
        let state =
            ModelState::<TestBackend>::with_registry(config, LayerRegistry::new(), Default::default());
        assert_eq!(state.initialize().unwrap(), ModelStatus::FallbackReady);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let state = state_for(&dir.path().join("missing.bin"), 7);

        assert_eq!(state.initialize().unwrap(), ModelStatus::FallbackReady);
        let first = state.current_network().unwrap().num_params();

        // A later artifact is ignored: no hot reload
        let path = state.config().artifact_path.clone();
        save_artifact(&template(7).init::<TestBackend>(&Default::default()).unwrap(), &path)
            .unwrap();
        assert_eq!(state.initialize().unwrap(), ModelStatus::FallbackReady);
        assert_eq!(state.current_network().unwrap().num_params(), first);
    }

    #[test]
    fn test_fallback_is_always_rgb() {
        let config = LifecycleConfig::default().with_network(HssanConfig::spectral(102));
        let fallback = config.fallback_network();
        assert_eq!(fallback.variant, HssanVariant::Rgb);
        assert_eq!(fallback.input_shape(), [224, 224, 3]);
        assert_eq!(fallback.num_classes, 102);
    }
}
