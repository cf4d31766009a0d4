//! House price prediction service
//!
//! Loads a pretrained regression artifact once and serves single-row
//! predictions over the California Housing feature set.

pub mod adapter;
pub mod artifact;
pub mod booster;
pub mod config;
pub mod error;
pub mod features;
pub mod handlers;
pub mod models;
pub mod onnx;

pub use adapter::{Adapter, Convention};
pub use artifact::{ArtifactFormat, LoaderOptions};
pub use crate::config::AppConfig;
pub use error::{AdapterError, Attempt};
pub use features::{FeatureInput, FEATURE_COUNT, FEATURE_ORDER};
