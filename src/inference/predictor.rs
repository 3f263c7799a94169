//! Inference Predictor Module
//!
//! Turns raw image bytes into a ranked list of flower predictions:
//! decode -> RGB -> resize -> scale to [0, 1] -> forward pass -> top-k.

use std::cmp::Ordering;
use std::panic::{catch_unwind, AssertUnwindSafe};

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DEFAULT_TOP_K;
use crate::classes::ClassRegistry;
use crate::lifecycle::ModelState;
use crate::model::config::DEFAULT_IMAGE_SIZE;
use crate::model::HssanNetwork;
use crate::utils::error::{HssanError, Result};
use crate::utils::logging::StepTimer;

/// Decode bytes of any supported format, guessing the format from the content
fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| HssanError::Decode(e.to_string()))
}

/// Resize an image to exactly the target dimensions
fn resize_image(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    image.resize_exact(width, height, FilterType::Triangle)
}

/// Flatten to HWC layout with intensities scaled to [0, 1]
fn scale_image(image: &DynamicImage) -> Vec<f32> {
    image
        .to_rgb8()
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect()
}

/// One ranked prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted class index
    pub class_index: usize,

    /// Display name of the class
    pub class_name: String,

    /// Probability assigned to the class
    pub confidence: f32,
}

/// Descending by confidence, NaN last
fn by_confidence(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// The `k` most probable classes, most probable first
///
/// Ties keep ascending class order. Indices past the end of `registry` are
/// named `"Unknown"`. Returns `min(k, probabilities.len())` entries.
pub fn rank_top_k(
    probabilities: &[f32],
    k: usize,
    registry: &ClassRegistry,
) -> Vec<PredictionResult> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| by_confidence(a.1, b.1).then(a.0.cmp(&b.0)));

    indexed
        .into_iter()
        .take(k)
        .map(|(class_index, confidence)| PredictionResult {
            class_index,
            class_name: registry.name(class_index).to_string(),
            confidence,
        })
        .collect()
}

/// Preprocessing and prediction settings
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    /// Side length of the square network input
    pub image_size: u32,

    /// Number of predictions returned by [`InferenceEngine::classify`]
    pub top_k: usize,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_IMAGE_SIZE as u32,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl InferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure image size
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    /// Configure the number of ranked predictions
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Decode image bytes into a `[1, size, size, 3]` tensor in [0, 1]
    ///
    /// Grayscale and alpha images are converted to three channels.
    pub fn preprocess<B: Backend>(&self, bytes: &[u8], device: &B::Device) -> Result<Tensor<B, 4>> {
        let image = decode_image(bytes)?;
        debug!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "decoded image"
        );

        let resized = resize_image(&image, self.image_size, self.image_size);
        let size = self.image_size as usize;
        let data = TensorData::new(scale_image(&resized), [1, size, size, 3]);

        Ok(Tensor::from_data(data, device))
    }

    /// Run the network on one preprocessed input
    ///
    /// Returns `num_classes` probabilities. Shape mismatches, backend panics
    /// and non-finite outputs are reported as [`HssanError::Prediction`].
    pub fn predict<B: Backend>(
        &self,
        network: &HssanNetwork<B>,
        input: Tensor<B, 4>,
    ) -> Result<Vec<f32>> {
        let [batch, height, width, channels] = input.dims();
        if batch != 1 || [height, width, channels] != network.input_shape() {
            return Err(HssanError::Prediction(format!(
                "input shape {:?} does not match the network input [1, {:?}]",
                [batch, height, width, channels],
                network.input_shape()
            )));
        }

        let probabilities = catch_unwind(AssertUnwindSafe(|| {
            network.forward(input).into_data().to_vec::<f32>()
        }))
        .map_err(|panic| HssanError::Prediction(panic_message(panic.as_ref())))?
        .map_err(|e| HssanError::Prediction(format!("{:?}", e)))?;

        if probabilities.len() != network.num_classes() {
            return Err(HssanError::Prediction(format!(
                "expected {} probabilities, got {}",
                network.num_classes(),
                probabilities.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(HssanError::Prediction(
                "network produced non-finite probabilities".to_string(),
            ));
        }

        Ok(probabilities)
    }

    /// Full pipeline: readiness check, preprocessing, prediction, ranking
    ///
    /// The network is never invoked when the bytes fail to decode.
    pub fn classify<B: Backend>(
        &self,
        state: &ModelState<B>,
        registry: &ClassRegistry,
        bytes: &[u8],
    ) -> Result<Vec<PredictionResult>> {
        let network = state.current_network()?;
        let timer = StepTimer::start("classify");

        let input = self.preprocess::<B>(bytes, state.device())?;
        let probabilities = self.predict(&network, input)?;
        let predictions = rank_top_k(&probabilities, self.top_k, registry);

        let elapsed = timer.finish();
        if let Some(best) = predictions.first() {
            debug!(
                class = %best.class_name,
                confidence = best.confidence,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "classified image"
            );
        }

        Ok(predictions)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("forward pass panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("forward pass panicked: {}", message)
    } else {
        "forward pass panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleConfig;
    use crate::model::HssanConfig;
    use burn_ndarray::NdArray;
    use image::{GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    type TestBackend = NdArray;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn small_state(num_classes: usize) -> ModelState<TestBackend> {
        let config = LifecycleConfig::new("does/not/exist.bin")
            .with_network(HssanConfig::rgb(num_classes).with_height(16).with_width(16));
        let state = ModelState::new(config, Default::default());
        state.initialize().unwrap();
        state
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let engine = InferenceEngine::new();
        let bytes = encode(DynamicImage::ImageRgb8(gradient(50, 100)), ImageFormat::Png);

        let tensor = engine
            .preprocess::<TestBackend>(&bytes, &Default::default())
            .unwrap();
        assert_eq!(tensor.dims(), [1, 224, 224, 3]);

        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_preprocess_converts_color_modes() {
        let engine = InferenceEngine::new().with_image_size(32);
        let device = Default::default();

        let gray: GrayImage = ImageBuffer::from_pixel(7, 3, Luma([255u8]));
        let rgba: RgbaImage = ImageBuffer::from_pixel(300, 20, Rgba([0u8, 0, 0, 10]));
        let inputs = [
            encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png),
            encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png),
            encode(DynamicImage::ImageRgb8(gradient(64, 48)), ImageFormat::Jpeg),
        ];

        for bytes in inputs {
            let tensor = engine.preprocess::<TestBackend>(&bytes, &device).unwrap();
            assert_eq!(tensor.dims(), [1, 32, 32, 3]);
        }
    }

    #[test]
    fn test_preprocess_scales_white_to_one() {
        let engine = InferenceEngine::new().with_image_size(8);
        let white: RgbImage = ImageBuffer::from_pixel(5, 5, Rgb([255u8, 255, 255]));
        let bytes = encode(DynamicImage::ImageRgb8(white), ImageFormat::Png);

        let values = engine
            .preprocess::<TestBackend>(&bytes, &Default::default())
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(values.iter().all(|&v| v > 0.99 && v <= 1.0));
    }

    #[test]
    fn test_corrupt_bytes_fail_to_decode() {
        let engine = InferenceEngine::new();
        for bytes in [&b"not an image"[..], &[][..], &[0x89, b'P', b'N', b'G'][..]] {
            let result = engine.preprocess::<TestBackend>(bytes, &Default::default());
            assert!(matches!(result, Err(HssanError::Decode(_))));
        }
    }

    #[test]
    fn test_rank_top_k_scenario() {
        let registry = ClassRegistry::from_names(["a", "b", "c", "d"]);
        let ranked = rank_top_k(&[0.7, 0.2, 0.05, 0.05], 2, &registry);

        assert_eq!(ranked.len(), 2);
        assert_eq!((ranked[0].class_index, ranked[0].confidence), (0, 0.7));
        assert_eq!((ranked[1].class_index, ranked[1].confidence), (1, 0.2));
        assert_eq!(ranked[1].class_name, "b");
    }

    #[test]
    fn test_rank_top_k_ties_and_lengths() {
        let registry = ClassRegistry::from_names(["a", "b"]);
        let probs = [0.1, 0.3, 0.3, 0.3];

        let ranked = rank_top_k(&probs, 10, &registry);
        assert_eq!(ranked.len(), 4);
        let order: Vec<usize> = ranked.iter().map(|r| r.class_index).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
        // Registry shorter than the probability vector
        assert_eq!(ranked[1].class_name, "Unknown");

        assert!(rank_top_k(&probs, 0, &registry).is_empty());
        assert!(rank_top_k(&[], 3, &registry).is_empty());
    }

    #[test]
    fn test_rank_top_k_nan_ranks_last() {
        let registry = ClassRegistry::flowers();
        let ranked = rank_top_k(&[f32::NAN, 0.2, 0.8], 3, &registry);
        let order: Vec<usize> = ranked.iter().map(|r| r.class_index).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_predict_returns_probabilities() {
        let state = small_state(6);
        let network = state.current_network().unwrap();
        let engine = InferenceEngine::new().with_image_size(16);

        let bytes = encode(DynamicImage::ImageRgb8(gradient(40, 30)), ImageFormat::Png);
        let input = engine.preprocess::<TestBackend>(&bytes, state.device()).unwrap();
        let probs = engine.predict(&network, input).unwrap();

        assert_eq!(probs.len(), 6);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_predict_rejects_mismatched_input() {
        let state = small_state(6);
        let network = state.current_network().unwrap();
        let input = Tensor::<TestBackend, 4>::zeros([1, 16, 16, 4], state.device());

        let result = InferenceEngine::new().predict(&network, input);
        assert!(matches!(result, Err(HssanError::Prediction(_))));
    }

    #[test]
    fn test_classify_end_to_end() {
        let state = small_state(102);
        let engine = InferenceEngine::new().with_image_size(16);
        let bytes = encode(DynamicImage::ImageRgb8(gradient(20, 20)), ImageFormat::Png);

        let predictions = engine
            .classify(&state, &ClassRegistry::flowers(), &bytes)
            .unwrap();
        assert_eq!(predictions.len(), DEFAULT_TOP_K);
        assert!(predictions
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
        assert!(predictions.iter().all(|p| p.class_index < 102));
    }

    #[test]
    fn test_classify_checks_readiness_then_decoding() {
        let engine = InferenceEngine::new().with_image_size(16);
        let registry = ClassRegistry::flowers();

        let unloaded = ModelState::<TestBackend>::new(
            LifecycleConfig::new("does/not/exist.bin"),
            Default::default(),
        );
        assert!(matches!(
            engine.classify(&unloaded, &registry, b"garbage"),
            Err(HssanError::ModelNotReady)
        ));

        // A wrong image size would fail in predict, so Decode proves it never ran
        let state = small_state(5);
        let result = engine.with_image_size(64).classify(&state, &registry, b"garbage");
        assert!(matches!(result, Err(HssanError::Decode(_))));
    }
}
