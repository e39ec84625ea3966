use shared::{ErrorKind, PredictResponse};

use super::model::{Classifier, InferenceError, Prediction};
use super::preprocess::{DecodeError, Preprocessor, decode_base64, strip_data_url};

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Invalid request: {0}")]
    Request(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::Request(_) => ErrorKind::Request,
            PredictError::Decode(_) => ErrorKind::Decode,
            PredictError::Image(_) => ErrorKind::Image,
            PredictError::Inference(_) => ErrorKind::Inference,
        }
    }
}

/// One request's worth of work: decode, preprocess, classify.
pub struct Detector {
    classifier: Box<dyn Classifier>,
    preprocessor: Preprocessor,
}

impl Detector {
    pub fn new(classifier: Box<dyn Classifier>, preprocessor: Preprocessor) -> Self {
        Self {
            classifier,
            preprocessor,
        }
    }

    pub fn classify(&self, image_bytes: &[u8]) -> Result<Prediction, PredictError> {
        let image = image::load_from_memory(image_bytes)?;
        log::debug!(
            "Decoded {}x{} {:?} image",
            image.width(),
            image.height(),
            image.color()
        );
        let tensor = self.preprocessor.prepare(&image);
        let raw = self.classifier.infer(&tensor)?;
        Ok(Prediction::from_raw(raw))
    }

    pub fn predict(&self, image_data: &str) -> Result<PredictResponse, PredictError> {
        let payload = strip_data_url(image_data)?;
        let image_bytes = decode_base64(payload)?;
        let prediction = self.classify(&image_bytes)?;
        log::info!(
            "Predicted {} (raw {:.4}, confidence {:.4})",
            prediction.class,
            prediction.raw_confidence,
            prediction.confidence
        );
        Ok(prediction.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::{StubClassifier, encode_png, gray_image};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::sync::Arc;

    fn detector(stub: Arc<StubClassifier>) -> Detector {
        Detector::new(Box::new(stub), Preprocessor::default())
    }

    #[test]
    fn predicts_from_plain_base64() {
        let stub = Arc::new(StubClassifier::returning(0.2));
        let b64 = STANDARD.encode(encode_png(&gray_image(64, 64, 128)));
        let response = detector(stub.clone()).predict(&b64).unwrap();
        assert!(response.is_defective);
        assert!((response.confidence - 0.8).abs() < 1e-6);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn data_url_and_plain_payload_agree() {
        let stub = Arc::new(StubClassifier::returning(0.7));
        let detector = detector(stub);
        let b64 = STANDARD.encode(encode_png(&gray_image(32, 48, 90)));
        let plain = detector.predict(&b64).unwrap();
        let wrapped = detector
            .predict(&format!("data:image/png;base64,{b64}"))
            .unwrap();
        assert_eq!(plain, wrapped);
    }

    #[test]
    fn classifier_sees_unnormalized_pixels() {
        let stub = Arc::new(StubClassifier::returning(0.9));
        let split = image::GrayImage::from_fn(300, 300, |x, _| {
            image::Luma([if x < 150 { 0 } else { 255 }])
        });
        let bytes = encode_png(&image::DynamicImage::ImageLuma8(split));
        detector(stub.clone()).classify(&bytes).unwrap();
        let (min, max) = stub.observed_range().unwrap();
        assert_eq!(min, 0.0);
        assert_eq!(max, 255.0);
        assert_eq!(stub.observed_shape().unwrap(), vec![1, 300, 300, 1]);
    }

    #[test]
    fn garbage_bytes_are_an_image_error() {
        let stub = Arc::new(StubClassifier::returning(0.9));
        let b64 = STANDARD.encode(b"definitely not an image");
        let err = detector(stub.clone()).predict(&b64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Image);
        assert_eq!(stub.calls(), 0);
    }

    #[test]
    fn bad_base64_is_a_decode_error() {
        let stub = Arc::new(StubClassifier::returning(0.9));
        let err = detector(stub).predict("aGVsbG8").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn classifier_failure_is_an_inference_error() {
        let stub = Arc::new(StubClassifier::failing("weights exploded"));
        let b64 = STANDARD.encode(encode_png(&gray_image(10, 10, 0)));
        let err = detector(stub).predict(&b64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(err.to_string().contains("weights exploded"));
    }
}
