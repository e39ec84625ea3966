use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use casting_backend::config::{CorsConfig, ServerConfig};
use casting_backend::inference::model::{INPUT_SHAPE, TorchModel};
use casting_backend::inference::{Classifier, Detector, InputTensor, Prediction, Preprocessor};
use casting_backend::routes::configure_routes;
use std::env;

fn build_cors(config: &CorsConfig) -> Cors {
    let cors = if config.allow_any_origin {
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(config.max_age)
}

fn startup_error(message: String) -> std::io::Error {
    log::error!("{}", message);
    std::io::Error::other(message)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = ServerConfig::load()
        .map_err(|e| startup_error(format!("Configuration error: {}", e)))?;
    log::info!("Configuration: {:?}", config);

    log::info!("Loading model from {}", config.model_path.display());
    let model = TorchModel::load(&config.model_path)
        .map_err(|e| startup_error(format!("Model loading failed: {}", e)))?;

    if config.warmup {
        let raw = model
            .infer(&InputTensor::zeros(INPUT_SHAPE))
            .map_err(|e| startup_error(format!("Model warm-up failed: {}", e)))?;
        let prediction = Prediction::from_raw(raw);
        log::info!(
            "Warm-up on a blank image on {:?}: raw {:.4} ({})",
            model.device(),
            raw,
            prediction.class
        );
    }

    let detector = web::Data::new(Detector::new(
        Box::new(model),
        Preprocessor::new(config.resize_filter),
    ));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}:{}", bind_address.0, bind_address.1);

    let cors_config = config.cors.clone();
    let max_payload_bytes = config.max_payload_bytes;
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .wrap(middleware::Logger::default())
            .app_data(detector.clone())
            .configure(|cfg| configure_routes(cfg, max_payload_bytes))
    });
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    server.bind(bind_address)?.run().await
}
