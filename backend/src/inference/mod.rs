pub mod detector;
pub mod model;
pub mod preprocess;

pub use detector::{Detector, PredictError};
pub use model::{Classifier, InferenceError, InputTensor, Prediction};
pub use preprocess::{Preprocessor, ResizeFilter};
