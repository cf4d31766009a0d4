use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, Error, HttpRequest, HttpResponse, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapter::Adapter;
use crate::config::ApiConfig;
use crate::features::FEATURE_ORDER;
use crate::models::{
    ErrorResponse, HealthResponse, InfoResponse, ModelInfo, PredictionRequest, PredictionResponse,
};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Registers every route; shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/info").route(web::get().to(api_info)));
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    let detail = err.to_string();
    warn!(error = %detail, "Rejected prediction request body");
    InternalError::from_response(err, HttpResponse::BadRequest().json(ErrorResponse { detail }))
        .into()
}

pub async fn predict(
    adapter: web::Data<Adapter>,
    request: web::Json<PredictionRequest>,
) -> Result<HttpResponse, Error> {
    let request_id = Uuid::new_v4();
    let features = request.into_inner().features;
    info!(%request_id, features = ?features, "Received prediction request");

    // Inference is CPU-bound, keep it off the async workers.
    let result = web::block(move || adapter.predict(features))
        .await
        .map_err(|e| {
            error!(%request_id, error = %e, "Prediction task failed");
            actix_web::error::ErrorInternalServerError("Inference error")
        })?;

    match result {
        Ok(predicted_price) => {
            info!(%request_id, predicted_price, "Predicted price: ${:.2}", predicted_price);
            Ok(HttpResponse::Ok().json(PredictionResponse { predicted_price }))
        }
        Err(e) => {
            warn!(%request_id, error = %e, "Prediction error");
            Ok(HttpResponse::BadRequest().json(ErrorResponse {
                detail: e.to_string(),
            }))
        }
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
    })
}

pub async fn api_info(adapter: web::Data<Adapter>, api: web::Data<ApiConfig>) -> HttpResponse {
    HttpResponse::Ok().json(InfoResponse {
        title: api.title.clone(),
        description: api.description.clone(),
        version: api.version.clone(),
        model: ModelInfo {
            path: adapter.source().display().to_string(),
            format: adapter.format(),
            convention: adapter.convention(),
            objective: adapter.objective(),
        },
        features: FEATURE_ORDER.to_vec(),
    })
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}
