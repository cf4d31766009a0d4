use serde::{Deserialize, Serialize};

use crate::adapter::Convention;
use crate::artifact::ArtifactFormat;
use crate::booster::Objective;
use crate::features::FeatureInput;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PredictionRequest {
    pub features: FeatureInput,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    /// In $100,000 units
    pub predicted_price: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub format: ArtifactFormat,
    pub convention: Convention,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<Objective>,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub title: String,
    pub description: String,
    pub version: String,
    pub model: ModelInfo,
    pub features: Vec<&'static str>,
}
