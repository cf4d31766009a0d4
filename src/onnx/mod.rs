//! ONNX graphs, run through tract
//!
//! Graphs made of standard operators are optimized and run by tract. A graph
//! consisting of a single `ai.onnx.ml` `TreeEnsembleRegressor`, as written by
//! the gradient-boosting converters, is translated into the native tree
//! evaluator instead, since tract does not implement that operator.

mod tree_ensemble;

use std::path::Path;

use ndarray::Array2;
use tract_core::model::{Graph, TypedFact};
use tract_core::ops::TypedOp;
use tract_core::plan::SimplePlan;
use tract_onnx::pb::GraphProto;
use tract_onnx::prelude::*;
use tracing::debug;

use crate::booster::{Booster, DMatrix, Objective};
use crate::features::FEATURE_COUNT;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug)]
enum Runner {
    Graph(Plan),
    TreeEnsemble(Booster),
}

/// A runnable ONNX regression model with a `[1, 8]` input
#[derive(Debug)]
pub struct OnnxRegressor {
    runner: Runner,
}

impl OnnxRegressor {
    pub fn load(path: &Path) -> TractResult<Self> {
        let onnx = tract_onnx::onnx();
        let proto = onnx.proto_model_for_path(path)?;
        let graph = proto
            .graph
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("model has no graph"))?;
        check_inputs(graph)?;

        if let Some(node) = tree_ensemble::find(graph)? {
            let booster = tree_ensemble::translate(node)?;
            debug!(trees = booster.num_trees(), "Translated tree ensemble operator");
            return Ok(Self {
                runner: Runner::TreeEnsemble(booster),
            });
        }

        // Reparsed from the path so external tensor data next to it resolves.
        let plan = onnx
            .model_for_path(path)?
            .with_input_fact(0, f32::fact([1, FEATURE_COUNT]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self {
            runner: Runner::Graph(plan),
        })
    }

    /// Output transform of a translated tree ensemble; `None` for plain graphs.
    pub fn objective(&self) -> Option<Objective> {
        match &self.runner {
            Runner::Graph(_) => None,
            Runner::TreeEnsemble(booster) => Some(booster.objective()),
        }
    }

    /// Runs the model on `rows` and returns the first output value.
    pub fn run(&self, rows: &Array2<f32>) -> TractResult<f32> {
        match &self.runner {
            Runner::Graph(plan) => run_plan(plan, rows),
            Runner::TreeEnsemble(booster) => booster
                .predict(&DMatrix::from_dense(rows.clone()))?
                .first()
                .copied()
                .ok_or_else(|| anyhow::anyhow!("model produced no rows")),
        }
    }
}

fn run_plan(plan: &Plan, rows: &Array2<f32>) -> TractResult<f32> {
    let (n, m) = rows.dim();
    let data: Vec<f32> = rows.iter().copied().collect();
    let tensor = Tensor::from_shape(&[n, m], &data)?;

    let result = plan.run(tvec!(tensor.into()))?;
    let output = result
        .first()
        .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?
        .cast_to::<f32>()?;
    output
        .as_slice::<f32>()?
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("model produced an empty output"))
}

/// Every graph input that is not an initializer must carry a tensor type.
/// tract aborts on untyped inputs instead of returning an error.
fn check_inputs(graph: &GraphProto) -> TractResult<()> {
    for input in &graph.input {
        if graph.initializer.iter().any(|init| init.name == input.name) {
            continue;
        }
        let typed = input
            .r#type
            .as_ref()
            .map_or(false, |t| t.value.is_some());
        if !typed {
            anyhow::bail!("graph input {:?} has no tensor type", input.name);
        }
    }
    Ok(())
}
