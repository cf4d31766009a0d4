//! Native gradient-boosted tree evaluation
//!
//! Reads the JSON model dump written by the boosting library's `save_model`
//! and evaluates the tree ensemble directly, without the library runtime.
//! Rows are handed over wrapped in a [`DMatrix`], mirroring the library's
//! own input convention for its low-level booster handle.

mod json;
mod objective;

use ndarray::{Array2, ArrayView1};
use thiserror::Error;

pub use objective::Objective;

#[derive(Debug, Error)]
pub enum ModelFormatError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

impl ModelFormatError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Dense input container for [`Booster::predict`]. NaN entries are missing.
#[derive(Debug, Clone)]
pub struct DMatrix {
    data: Array2<f32>,
}

impl DMatrix {
    pub fn from_dense(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn num_cols(&self) -> usize {
        self.data.ncols()
    }
}

/// Test applied at a split node; a row goes to the left child when it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Lt,
    Leq,
    Gt,
    Gte,
    Eq,
    Neq,
}

impl Comparison {
    fn holds(self, value: f32, threshold: f32) -> bool {
        match self {
            Comparison::Lt => value < threshold,
            Comparison::Leq => value <= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Gte => value >= threshold,
            Comparison::Eq => value == threshold,
            Comparison::Neq => value != threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Split {
        feature: usize,
        threshold: f32,
        rule: Comparison,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

/// Nodes are stored root first, children after their parent.
#[derive(Debug, Clone)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    /// 1.0 for gbtree, the dropout weight for dart.
    weight: f32,
}

impl Tree {
    pub(crate) fn new(nodes: Vec<Node>, weight: f32) -> Self {
        Self { nodes, weight }
    }

    fn leaf_value(&self, row: ArrayView1<'_, f32>) -> f32 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    rule,
                    left,
                    right,
                    default_left,
                } => {
                    let value = row[*feature];
                    let go_left = if value.is_nan() {
                        *default_left
                    } else {
                        rule.holds(value, *threshold)
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Low-level inference handle over a tree ensemble
#[derive(Debug, Clone)]
pub struct Booster {
    trees: Vec<Tree>,
    base_margin: f32,
    objective: Objective,
    num_features: usize,
    feature_names: Vec<String>,
    version: Vec<u32>,
}

impl Booster {
    /// `base_margin` is already in margin space.
    pub(crate) fn from_trees(
        trees: Vec<Tree>,
        base_margin: f32,
        objective: Objective,
        num_features: usize,
    ) -> Self {
        Self {
            trees,
            base_margin,
            objective,
            num_features,
            feature_names: Vec::new(),
            version: Vec::new(),
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Feature names recorded at training time, empty if none were saved.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Library version that wrote the dump.
    pub fn version(&self) -> &[u32] {
        &self.version
    }

    /// One prediction per row of `dmat`.
    pub fn predict(&self, dmat: &DMatrix) -> Result<Vec<f32>, ModelFormatError> {
        if dmat.num_cols() < self.num_features {
            return Err(ModelFormatError::invalid(format!(
                "model expects {} columns, got {}",
                self.num_features,
                dmat.num_cols()
            )));
        }

        Ok(dmat
            .data
            .rows()
            .into_iter()
            .map(|row| {
                let margin = self
                    .trees
                    .iter()
                    .fold(self.base_margin, |acc, tree| {
                        acc + tree.weight * tree.leaf_value(row)
                    });
                self.objective.transform(margin)
            })
            .collect())
    }
}

/// The regressor wrapper as saved by the high-level estimator API
#[derive(Debug, Clone)]
pub struct EstimatorWrapper {
    pub estimator_type: String,
    /// Wrapper hyper-parameters, kept verbatim.
    pub params: serde_json::Value,
    booster: Booster,
}

impl EstimatorWrapper {
    pub fn get_booster(self) -> Booster {
        self.booster
    }
}

/// Result of reading a JSON model dump
#[derive(Debug, Clone)]
pub enum BoosterArtifact {
    Booster(Booster),
    Wrapper(EstimatorWrapper),
}

impl BoosterArtifact {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelFormatError> {
        let doc: json::ModelDocument = serde_json::from_slice(bytes)?;
        doc.into_artifact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single stump on MedInc: < 5.0 -> 1.0, else 3.0. Missing goes right.
    const STUMP: &str = r#"{
        "learner": {
            "attributes": {},
            "feature_names": [],
            "feature_types": [],
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": {"num_trees": "1", "num_parallel_tree": "1"},
                    "tree_info": [0],
                    "trees": [{
                        "id": 0,
                        "base_weights": [0.0, 1.0, 3.0],
                        "left_children": [1, -1, -1],
                        "right_children": [2, -1, -1],
                        "parents": [2147483647, 0, 0],
                        "split_indices": [0, 0, 0],
                        "split_conditions": [5.0, 1.0, 3.0],
                        "split_type": [0, 0, 0],
                        "default_left": [0, 0, 0],
                        "categories": [],
                        "categories_nodes": [],
                        "categories_segments": [],
                        "categories_sizes": [],
                        "loss_changes": [1.0, 0.0, 0.0],
                        "sum_hessian": [2.0, 1.0, 1.0],
                        "tree_param": {"num_deleted": "0", "num_feature": "8", "num_nodes": "3", "size_leaf_vector": "1"}
                    }]
                }
            },
            "learner_model_param": {"base_score": "5E-1", "num_class": "0", "num_feature": "8", "num_target": "1"},
            "objective": {"name": "reg:squarederror", "reg_loss_param": {"scale_pos_weight": "1"}}
        },
        "version": [2, 0, 3]
    }"#;

    fn row(values: [f32; 8]) -> DMatrix {
        DMatrix::from_dense(Array2::from_shape_vec((1, 8), values.to_vec()).unwrap())
    }

    fn stump() -> Booster {
        match BoosterArtifact::from_slice(STUMP.as_bytes()).unwrap() {
            BoosterArtifact::Booster(b) => b,
            other => panic!("unexpected artifact {:?}", other),
        }
    }

    #[test]
    fn test_stump_split() {
        let booster = stump();
        assert_eq!(booster.num_trees(), 1);
        assert_eq!(booster.version(), &[2, 0, 3]);
        assert_eq!(booster.predict(&row([4.9, 0., 0., 0., 0., 0., 0., 0.])).unwrap(), vec![1.5]);
        // strict less-than
        assert_eq!(booster.predict(&row([5.0, 0., 0., 0., 0., 0., 0., 0.])).unwrap(), vec![3.5]);
    }

    #[test]
    fn test_missing_follows_default_direction() {
        let booster = stump();
        let nan = row([f32::NAN, 0., 0., 0., 0., 0., 0., 0.]);
        assert_eq!(booster.predict(&nan).unwrap(), vec![3.5]);
    }

    #[test]
    fn test_too_few_columns() {
        let narrow = DMatrix::from_dense(Array2::zeros((1, 3)));
        assert!(stump().predict(&narrow).is_err());
    }

    #[test]
    fn test_wrapper_attribute_detected() {
        let wrapped = STUMP.replace(
            r#""attributes": {}"#,
            r#""attributes": {"scikit_learn": "{\"_estimator_type\": \"regressor\", \"n_estimators\": 1}"}"#,
        );
        match BoosterArtifact::from_slice(wrapped.as_bytes()).unwrap() {
            BoosterArtifact::Wrapper(w) => {
                assert_eq!(w.estimator_type, "regressor");
                assert_eq!(w.params["n_estimators"], 1);
                assert_eq!(w.get_booster().num_trees(), 1);
            }
            other => panic!("expected wrapper, got {:?}", other),
        }
    }

    #[test]
    fn test_dart_weights_scale_trees() {
        let mut doc: serde_json::Value = serde_json::from_str(STUMP).unwrap();
        let gbtree = doc["learner"]["gradient_booster"].take();
        doc["learner"]["gradient_booster"] =
            serde_json::json!({"name": "dart", "gbtree": gbtree, "weight_drop": [0.5]});
        let dart = doc.to_string();
        let booster = match BoosterArtifact::from_slice(dart.as_bytes()).unwrap() {
            BoosterArtifact::Booster(b) => b,
            other => panic!("unexpected artifact {:?}", other),
        };
        assert_eq!(booster.predict(&row([0.0; 8])).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_rejects_unsupported_models() {
        let multiclass = STUMP.replace("reg:squarederror", "multi:softprob");
        assert!(BoosterArtifact::from_slice(multiclass.as_bytes()).is_err());

        let categorical = STUMP.replace(r#""split_type": [0, 0, 0]"#, r#""split_type": [1, 0, 0]"#);
        assert!(BoosterArtifact::from_slice(categorical.as_bytes()).is_err());

        let wide = STUMP.replace(r#""split_indices": [0, 0, 0]"#, r#""split_indices": [9, 0, 0]"#);
        assert!(BoosterArtifact::from_slice(wide.as_bytes()).is_err());

        assert!(BoosterArtifact::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_logistic_base_score() {
        let logistic = STUMP
            .replace("reg:squarederror", "binary:logistic")
            .replace(r#""split_conditions": [5.0, 1.0, 3.0]"#, r#""split_conditions": [5.0, 0.0, 0.0]"#);
        let booster = match BoosterArtifact::from_slice(logistic.as_bytes()).unwrap() {
            BoosterArtifact::Booster(b) => b,
            other => panic!("unexpected artifact {:?}", other),
        };
        assert_eq!(booster.objective(), Objective::Logistic);
        let out = booster.predict(&row([0.0; 8])).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_comparison_rules() {
        // x0 <= 2.0 -> 10.0, else 20.0
        let tree = Tree::new(
            vec![
                Node::Split {
                    feature: 0,
                    threshold: 2.0,
                    rule: Comparison::Leq,
                    left: 1,
                    right: 2,
                    default_left: true,
                },
                Node::Leaf(10.0),
                Node::Leaf(20.0),
            ],
            1.0,
        );
        let booster = Booster::from_trees(vec![tree], 0.0, Objective::Identity, 1);
        assert_eq!(booster.predict(&row([2.0, 0., 0., 0., 0., 0., 0., 0.])).unwrap(), vec![10.0]);
        assert_eq!(booster.predict(&row([2.5, 0., 0., 0., 0., 0., 0., 0.])).unwrap(), vec![20.0]);
        assert_eq!(booster.predict(&row([f32::NAN, 0., 0., 0., 0., 0., 0., 0.])).unwrap(), vec![10.0]);

        assert!(Comparison::Gte.holds(2.0, 2.0));
        assert!(!Comparison::Gt.holds(2.0, 2.0));
        assert!(Comparison::Neq.holds(1.0, 2.0));
        assert!(Comparison::Eq.holds(2.0, 2.0));
    }
}
