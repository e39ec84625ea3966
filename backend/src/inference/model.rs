use std::sync::Arc;

use ndarray::Array4;
use shared::{CastingClass, PredictResponse};

#[cfg(feature = "torch")]
pub use self::torch::TorchModel;

/// Height and width the casting model was trained on.
pub const IMAGE_SIZE: usize = 300;

/// NHWC input: one single-channel 300x300 image of raw 0-255 intensities.
pub type InputTensor = Array4<f32>;

pub const INPUT_SHAPE: [usize; 4] = [1, IMAGE_SIZE, IMAGE_SIZE, 1];

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("Input tensor has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: Vec<usize>,
    },
    #[error("Model error: {0}")]
    Model(String),
    #[error("Model returned no output")]
    EmptyOutput,
    #[error("Model output {0} is outside [0, 1]")]
    OutputOutOfRange(f32),
    #[error("Inference worker failed: {0}")]
    Worker(String),
}

/// The loaded, read-only classifier. `infer` returns the raw sigmoid output,
/// the probability of the `ok_front` class.
pub trait Classifier: Send + Sync {
    fn infer(&self, input: &InputTensor) -> Result<f32, InferenceError>;
}

impl<C: Classifier + ?Sized> Classifier for Arc<C> {
    fn infer(&self, input: &InputTensor) -> Result<f32, InferenceError> {
        (**self).infer(input)
    }
}

pub fn check_input_shape(input: &InputTensor) -> Result<(), InferenceError> {
    if input.shape() != INPUT_SHAPE {
        return Err(InferenceError::ShapeMismatch {
            expected: INPUT_SHAPE,
            actual: input.shape().to_vec(),
        });
    }
    Ok(())
}

pub fn check_output(raw: f32) -> Result<f32, InferenceError> {
    if !(0.0..=1.0).contains(&raw) {
        return Err(InferenceError::OutputOutOfRange(raw));
    }
    Ok(raw)
}

/// Label and display confidence derived from one raw model output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: CastingClass,
    pub raw_confidence: f32,
    pub confidence: f64,
}

impl Prediction {
    /// Outputs at or below 0.5 are `def_front`; the reported confidence is the
    /// probability mass of whichever class was chosen.
    pub fn from_raw(raw_confidence: f32) -> Self {
        let raw = f64::from(raw_confidence);
        let class = if raw <= 0.5 {
            CastingClass::Defective
        } else {
            CastingClass::Ok
        };
        let confidence = if class.is_defective() { 1.0 - raw } else { raw };
        Self {
            class,
            raw_confidence,
            confidence,
        }
    }

    pub fn is_defective(&self) -> bool {
        self.class.is_defective()
    }
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        PredictResponse {
            is_defective: prediction.is_defective(),
            confidence: prediction.confidence,
        }
    }
}

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::Mutex;

    use tch::{CModule, Device, Kind, Tensor};

    use super::{
        Classifier, IMAGE_SIZE, InferenceError, InputTensor, check_input_shape, check_output,
    };

    /// TorchScript export of the casting model, executed through libtorch.
    pub struct TorchModel {
        module: Mutex<CModule>,
        device: Device,
    }

    impl TorchModel {
        pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let module = CModule::load_on_device(model_path, device).map_err(|e| {
                InferenceError::Load {
                    path: model_path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            log::info!("Loaded model from {} on {:?}", model_path.display(), device);
            Ok(Self {
                module: Mutex::new(module),
                device,
            })
        }

        pub fn device(&self) -> Device {
            self.device
        }
    }

    impl Classifier for TorchModel {
        fn infer(&self, input: &InputTensor) -> Result<f32, InferenceError> {
            check_input_shape(input)?;
            let side = IMAGE_SIZE as i64;
            let values: Vec<f32> = input.iter().copied().collect();
            let tensor = Tensor::from_slice(&values)
                .f_view([1, side, side, 1])
                .map_err(|e| InferenceError::Model(e.to_string()))?
                .to_device(self.device);

            let module = self
                .module
                .lock()
                .map_err(|_| InferenceError::Model("model mutex poisoned".to_string()))?;
            let output = tch::no_grad(|| module.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Model(e.to_string()))?;
            drop(module);

            let output_flat = output.to_kind(Kind::Float).view([-1]);
            let output_vec = Vec::<f32>::try_from(&output_flat)
                .map_err(|e| InferenceError::Model(e.to_string()))?;
            let raw = output_vec.first().copied().ok_or(InferenceError::EmptyOutput)?;
            check_output(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn low_output_is_defective() {
        let prediction = Prediction::from_raw(0.2);
        assert!(prediction.is_defective());
        assert_eq!(prediction.class, CastingClass::Defective);
        assert_close(prediction.confidence, 0.8);
    }

    #[test]
    fn high_output_is_ok() {
        let prediction = Prediction::from_raw(0.9);
        assert!(!prediction.is_defective());
        assert_eq!(prediction.class, CastingClass::Ok);
        assert_close(prediction.confidence, 0.9);
    }

    #[test]
    fn exact_half_is_defective() {
        let prediction = Prediction::from_raw(0.5);
        assert!(prediction.is_defective());
        assert_eq!(prediction.confidence, 0.5);
    }

    #[test]
    fn extremes_map_to_full_confidence() {
        assert_eq!(Prediction::from_raw(0.0).confidence, 1.0);
        assert_eq!(Prediction::from_raw(1.0).confidence, 1.0);
        assert!(Prediction::from_raw(0.0).is_defective());
        assert!(!Prediction::from_raw(1.0).is_defective());
    }

    #[test]
    fn confidence_stays_within_half_and_one() {
        for step in 0..=1000 {
            let raw = step as f32 / 1000.0;
            let prediction = Prediction::from_raw(raw);
            assert!(
                (0.5..=1.0).contains(&prediction.confidence),
                "raw {raw} gave confidence {}",
                prediction.confidence
            );
        }
    }

    #[test]
    fn response_mirrors_prediction() {
        let response = PredictResponse::from(Prediction::from_raw(0.75));
        assert!(!response.is_defective);
        assert_close(response.confidence, 0.75);
    }

    #[test]
    fn rejects_out_of_range_output() {
        assert!(matches!(
            check_output(1.5),
            Err(InferenceError::OutputOutOfRange(_))
        ));
        assert!(matches!(
            check_output(-0.1),
            Err(InferenceError::OutputOutOfRange(_))
        ));
        assert!(check_output(f32::NAN).is_err());
        assert_eq!(check_output(0.3).unwrap(), 0.3);
    }

    #[test]
    fn rejects_wrong_input_shape() {
        let input = InputTensor::zeros((1, 299, 300, 1));
        let err = check_input_shape(&input).unwrap_err();
        assert!(err.to_string().contains("299"));
        assert!(check_input_shape(&InputTensor::zeros(INPUT_SHAPE)).is_ok());
    }
}
