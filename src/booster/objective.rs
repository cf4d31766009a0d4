//! Learning objectives and their output transforms

use serde::Serialize;

/// How raw margins map to predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Margin is the prediction
    Identity,
    /// Sigmoid of the margin
    Logistic,
    /// Exponential of the margin (log-link models)
    Exponential,
}

impl Objective {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reg:squarederror"
            | "reg:linear"
            | "reg:squaredlogerror"
            | "reg:pseudohubererror"
            | "reg:absoluteerror"
            | "reg:quantileerror"
            | "binary:logitraw" => Some(Objective::Identity),
            "reg:logistic" | "binary:logistic" => Some(Objective::Logistic),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Some(Objective::Exponential),
            _ => None,
        }
    }

    /// `base_score` is stored in output space; trees add to margin space.
    pub fn base_margin(self, base_score: f32) -> f32 {
        match self {
            Objective::Identity => base_score,
            Objective::Logistic => (base_score / (1.0 - base_score)).ln(),
            Objective::Exponential => base_score.ln(),
        }
    }

    pub fn transform(self, margin: f32) -> f32 {
        match self {
            Objective::Identity => margin,
            Objective::Logistic => 1.0 / (1.0 + (-margin).exp()),
            Objective::Exponential => margin.exp(),
        }
    }
}
