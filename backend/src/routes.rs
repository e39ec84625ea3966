use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use log::{error, warn};
use shared::{ErrorResponse, HealthResponse, PredictRequest};

use crate::inference::{Detector, InferenceError, PredictError};

pub fn configure_routes(cfg: &mut web::ServiceConfig, max_payload_bytes: usize) {
    let json_config = web::JsonConfig::default()
        .limit(max_payload_bytes)
        .error_handler(|err, _req| {
            warn!("Rejected prediction request body: {}", err);
            PredictError::Request(err.to_string()).into()
        });

    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::resource("/predict")
                .app_data(json_config)
                .route(web::post().to(predict)),
        );
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
        })
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::healthy())
}

async fn predict(
    detector: web::Data<Detector>,
    body: web::Json<PredictRequest>,
) -> Result<HttpResponse, PredictError> {
    let request = body.into_inner();
    let detector = detector.into_inner();

    let result = web::block(move || detector.predict(&request.image))
        .await
        .map_err(|e| PredictError::Inference(InferenceError::Worker(e.to_string())))?;

    match result {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => {
            error!("Prediction failed ({}): {}", e.kind(), e);
            Err(e)
        }
    }
}
