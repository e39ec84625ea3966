use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PredictRequest {
    /// Base64 image, optionally wrapped in a `data:image/...;base64,` URL.
    pub image: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub is_defective: bool,
    pub confidence: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Request,
    Decode,
    Image,
    Inference,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

/// Training classes of the casting model, in label-index order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum CastingClass {
    #[strum(serialize = "def_front")]
    #[serde(rename = "def_front")]
    Defective,
    #[strum(serialize = "ok_front")]
    #[serde(rename = "ok_front")]
    Ok,
}

impl CastingClass {
    pub fn is_defective(&self) -> bool {
        matches!(self, CastingClass::Defective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn predict_response_uses_camel_case_keys() {
        let response = PredictResponse {
            is_defective: true,
            confidence: 0.75,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["isDefective"], serde_json::json!(true));
        assert_eq!(value["confidence"], serde_json::json!(0.75));
        assert!(value.get("is_defective").is_none());
    }

    #[test]
    fn error_response_carries_kind() {
        let response = ErrorResponse {
            error: "Invalid padding".into(),
            kind: ErrorKind::Decode,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error"], "Invalid padding");
        assert_eq!(value["kind"], "decode");
    }

    #[test]
    fn casting_class_names_match_training_labels() {
        assert_eq!(CastingClass::Defective.to_string(), "def_front");
        assert_eq!(CastingClass::from_str("ok_front").unwrap(), CastingClass::Ok);
        assert!(CastingClass::Defective.is_defective());
        assert!(!CastingClass::Ok.is_defective());
    }
}
