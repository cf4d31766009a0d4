#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use house_price_api::{Adapter, LoaderOptions};
use tempfile::TempDir;

pub const MODEL_FILE: &str = "best_house_price_model.json";

/// `house_model.json` re-expressed as an `ai.onnx.ml` tree ensemble.
pub const ONNX_ENSEMBLE: &str = "house_model.onnx";
/// `2 * MedInc + 0.5` as MatMul + Add.
pub const ONNX_LINEAR: &str = "linear.onnx";
/// A Relu graph whose input carries no tensor type.
pub const ONNX_UNTYPED: &str = "untyped_input.onnx";

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn fixture_path() -> PathBuf {
    fixture("house_model.json")
}

pub fn fixture_bytes() -> Vec<u8> {
    fs::read(fixture_path()).expect("fixture model")
}

/// A scratch working directory with the fixture model at
/// `notebook/best_house_price_model.json`.
pub fn workspace_with_model() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let notebook = dir.path().join("notebook");
    fs::create_dir(&notebook).unwrap();
    fs::write(notebook.join(MODEL_FILE), fixture_bytes()).unwrap();
    dir
}

pub fn fixture_adapter() -> Adapter {
    let opts = LoaderOptions::in_dir(env!("CARGO_MANIFEST_DIR")).with_explicit_path(fixture_path());
    Adapter::initialize(&opts).expect("fixture adapter")
}

pub fn onnx_adapter(name: &str) -> Adapter {
    let opts = LoaderOptions::in_dir(env!("CARGO_MANIFEST_DIR")).with_explicit_path(fixture(name));
    Adapter::initialize(&opts).expect("onnx fixture adapter")
}

pub fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-5, "{} != {}", a, b);
}
