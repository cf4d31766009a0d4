//! Schema of the native JSON model dump
//!
//! Only the fields needed for inference are modelled; everything else in the
//! document (training parameters, tree statistics) is ignored by serde.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};

use super::objective::Objective;
use super::{Booster, BoosterArtifact, Comparison, EstimatorWrapper, ModelFormatError, Node, Tree};

/// Attribute written by the high-level regressor wrapper when it saves itself.
const WRAPPER_ATTRIBUTE: &str = "scikit_learn";

#[derive(Debug, Deserialize)]
pub(super) struct ModelDocument {
    learner: Learner,
    #[serde(default)]
    version: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct Learner {
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveSection,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name")]
enum GradientBooster {
    #[serde(rename = "gbtree")]
    GbTree { model: TreeEnsemble },
    #[serde(rename = "dart")]
    Dart {
        gbtree: NestedGbTree,
        weight_drop: Vec<f32>,
    },
}

#[derive(Debug, Deserialize)]
struct NestedGbTree {
    model: TreeEnsemble,
}

#[derive(Debug, Deserialize)]
struct TreeEnsemble {
    trees: Vec<TreeSection>,
    #[serde(default)]
    tree_info: Vec<i32>,
}

#[derive(Debug, Deserialize)]
struct TreeSection {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    #[serde(deserialize_with = "flags")]
    default_left: Vec<bool>,
    #[serde(default)]
    split_type: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: Param,
    #[serde(default)]
    num_class: Option<Param>,
    num_feature: Param,
    #[serde(default)]
    num_target: Option<Param>,
}

#[derive(Debug, Deserialize)]
struct ObjectiveSection {
    name: String,
}

/// Model parameters are written as strings ("5E-1", "[5E-1]", "8"), older
/// dumps sometimes as plain numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Param {
    Number(f64),
    Text(String),
}

impl Param {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Param::Number(n) => Some(*n),
            Param::Text(s) => s
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .next()
                .and_then(|first| first.trim().parse().ok()),
        }
    }

    fn as_count(&self, field: &str) -> Result<usize, ModelFormatError> {
        self.as_f64()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .map(|n| n as usize)
            .ok_or_else(|| ModelFormatError::invalid(format!("{} is not a count: {:?}", field, self)))
    }
}

fn flags<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    let raw = Vec::<Flag>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|flag| match flag {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        })
        .collect())
}

impl ModelDocument {
    pub(super) fn into_artifact(self) -> Result<BoosterArtifact, ModelFormatError> {
        let learner = self.learner;
        let params = &learner.learner_model_param;

        if let Some(num_class) = &params.num_class {
            if num_class.as_count("num_class")? > 1 {
                return Err(ModelFormatError::invalid("multi-class models are not supported"));
            }
        }
        if let Some(num_target) = &params.num_target {
            if num_target.as_count("num_target")? > 1 {
                return Err(ModelFormatError::invalid("multi-target models are not supported"));
            }
        }
        let num_features = params.num_feature.as_count("num_feature")?;

        let objective = Objective::from_name(&learner.objective.name).ok_or_else(|| {
            ModelFormatError::invalid(format!("unsupported objective {}", learner.objective.name))
        })?;
        let base_score = params
            .base_score
            .as_f64()
            .ok_or_else(|| ModelFormatError::invalid("base_score is not a number"))?
            as f32;

        let (ensemble, weights) = match learner.gradient_booster {
            GradientBooster::GbTree { model } => (model, None),
            GradientBooster::Dart {
                gbtree,
                weight_drop,
            } => (gbtree.model, Some(weight_drop)),
        };

        if ensemble.tree_info.iter().any(|group| *group != 0) {
            return Err(ModelFormatError::invalid("multi-output tree groups are not supported"));
        }
        if let Some(weights) = &weights {
            if weights.len() != ensemble.trees.len() {
                return Err(ModelFormatError::invalid(format!(
                    "{} dart weights for {} trees",
                    weights.len(),
                    ensemble.trees.len()
                )));
            }
        }

        let trees = ensemble
            .trees
            .into_iter()
            .enumerate()
            .map(|(idx, section)| {
                let weight = weights.as_ref().map_or(1.0, |w| w[idx]);
                section.into_tree(weight, num_features).map_err(|e| match e {
                    ModelFormatError::Invalid(msg) => {
                        ModelFormatError::invalid(format!("tree {}: {}", idx, msg))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let booster = Booster {
            trees,
            base_margin: objective.base_margin(base_score),
            objective,
            num_features,
            feature_names: learner.feature_names,
            version: self.version,
        };

        match learner.attributes.get(WRAPPER_ATTRIBUTE) {
            Some(raw) => {
                let params: serde_json::Value = serde_json::from_str(raw)?;
                let estimator_type = params
                    .get("_estimator_type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("regressor")
                    .to_string();
                Ok(BoosterArtifact::Wrapper(EstimatorWrapper {
                    estimator_type,
                    params,
                    booster,
                }))
            }
            None => Ok(BoosterArtifact::Booster(booster)),
        }
    }
}

impl TreeSection {
    fn into_tree(self, weight: f32, num_features: usize) -> Result<Tree, ModelFormatError> {
        let n = self.left_children.len();
        if n == 0 {
            return Err(ModelFormatError::invalid("empty tree"));
        }
        if self.right_children.len() != n
            || self.split_indices.len() != n
            || self.split_conditions.len() != n
            || self.default_left.len() != n
        {
            return Err(ModelFormatError::invalid("node arrays differ in length"));
        }
        if self.split_type.iter().any(|t| *t != 0) {
            return Err(ModelFormatError::invalid("categorical splits are not supported"));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (self.left_children[i], self.right_children[i]);
            if left == -1 {
                nodes.push(Node::Leaf(self.split_conditions[i]));
                continue;
            }
            // Children are always stored after their parent, which also
            // guarantees the walk terminates.
            let in_range = |child: i32| child > i as i32 && (child as usize) < n;
            if !in_range(left) || !in_range(right) {
                return Err(ModelFormatError::invalid(format!(
                    "node {} has invalid children ({}, {})",
                    i, left, right
                )));
            }
            let feature = self.split_indices[i];
            if feature < 0 || feature as usize >= num_features {
                return Err(ModelFormatError::invalid(format!(
                    "node {} splits on feature {} of {}",
                    i, feature, num_features
                )));
            }
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: self.split_conditions[i],
                rule: Comparison::Lt,
                left: left as usize,
                right: right as usize,
                default_left: self.default_left[i],
            });
        }

        Ok(Tree::new(nodes, weight))
    }
}
