//! `ai.onnx.ml` `TreeEnsembleRegressor` translation
//!
//! The operator stores every tree of the ensemble in flat, parallel
//! `nodes_*` attributes keyed by `(tree id, node id)`, with leaf weights in
//! the `target_*` attributes. Each tree is rebuilt root first so it can be
//! walked by the native evaluator.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tract_onnx::pb::{AttributeProto, GraphProto, NodeProto};
use tract_onnx::prelude::TractResult;

use crate::booster::{Booster, Comparison, Node, Objective, Tree};
use crate::features::FEATURE_COUNT;

const OP_TYPE: &str = "TreeEnsembleRegressor";

/// Returns the tree ensemble node when the graph uses one. The operator has
/// to be the whole graph.
pub(super) fn find(graph: &GraphProto) -> TractResult<Option<&NodeProto>> {
    let Some(node) = graph.node.iter().find(|n| n.op_type == OP_TYPE) else {
        return Ok(None);
    };
    if graph.node.len() != 1 {
        anyhow::bail!(
            "{} must be the only node in the graph, found {} nodes",
            OP_TYPE,
            graph.node.len()
        );
    }
    Ok(Some(node))
}

fn attribute<'a>(node: &'a NodeProto, name: &str) -> Option<&'a AttributeProto> {
    node.attribute.iter().find(|a| a.name == name)
}

fn ints<'a>(node: &'a NodeProto, name: &str) -> TractResult<&'a [i64]> {
    attribute(node, name)
        .map(|a| a.ints.as_slice())
        .ok_or_else(|| anyhow::anyhow!("{} is missing attribute {}", OP_TYPE, name))
}

fn floats<'a>(node: &'a NodeProto, name: &str) -> TractResult<&'a [f32]> {
    attribute(node, name)
        .map(|a| a.floats.as_slice())
        .ok_or_else(|| anyhow::anyhow!("{} is missing attribute {}", OP_TYPE, name))
}

fn strings(node: &NodeProto, name: &str) -> TractResult<Vec<String>> {
    let attr = attribute(node, name)
        .ok_or_else(|| anyhow::anyhow!("{} is missing attribute {}", OP_TYPE, name))?;
    attr.strings
        .iter()
        .map(|s| String::from_utf8(s.clone()).map_err(Into::into))
        .collect()
}

fn string_or(node: &NodeProto, name: &str, default: &str) -> TractResult<String> {
    match attribute(node, name) {
        Some(attr) => Ok(String::from_utf8(attr.s.clone())?),
        None => Ok(default.to_string()),
    }
}

enum Mode {
    Branch(Comparison),
    Leaf,
}

fn mode(name: &str) -> TractResult<Mode> {
    Ok(match name {
        "BRANCH_LEQ" => Mode::Branch(Comparison::Leq),
        "BRANCH_LT" => Mode::Branch(Comparison::Lt),
        "BRANCH_GTE" => Mode::Branch(Comparison::Gte),
        "BRANCH_GT" => Mode::Branch(Comparison::Gt),
        "BRANCH_EQ" => Mode::Branch(Comparison::Eq),
        "BRANCH_NEQ" => Mode::Branch(Comparison::Neq),
        "LEAF" => Mode::Leaf,
        other => anyhow::bail!("unknown node mode {}", other),
    })
}

/// Builds a booster equivalent to the operator's attributes.
pub(super) fn translate(node: &NodeProto) -> TractResult<Booster> {
    if let Some(n_targets) = attribute(node, "n_targets") {
        if n_targets.i > 1 {
            anyhow::bail!("multi-target tree ensembles are not supported");
        }
    }

    let tree_ids = ints(node, "nodes_treeids")?;
    let node_ids = ints(node, "nodes_nodeids")?;
    let feature_ids = ints(node, "nodes_featureids")?;
    let thresholds = floats(node, "nodes_values")?;
    let modes = strings(node, "nodes_modes")?;
    let true_ids = ints(node, "nodes_truenodeids")?;
    let false_ids = ints(node, "nodes_falsenodeids")?;
    let tracks_true = attribute(node, "nodes_missing_value_tracks_true")
        .map(|a| a.ints.as_slice())
        .unwrap_or(&[]);

    let n = tree_ids.len();
    if [
        node_ids.len(),
        feature_ids.len(),
        thresholds.len(),
        modes.len(),
        true_ids.len(),
        false_ids.len(),
    ]
    .iter()
    .any(|len| *len != n)
        || !(tracks_true.is_empty() || tracks_true.len() == n)
    {
        anyhow::bail!("node attributes differ in length");
    }
    if n == 0 {
        anyhow::bail!("tree ensemble has no nodes");
    }

    let leaf_weights = leaf_weights(node)?;

    let mut by_key = HashMap::with_capacity(n);
    let mut trees: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        if by_key.insert((tree_ids[i], node_ids[i]), i).is_some() {
            anyhow::bail!("tree {} lists node {} twice", tree_ids[i], node_ids[i]);
        }
        trees.entry(tree_ids[i]).or_default().push(i);
    }

    let mut built = Vec::with_capacity(trees.len());
    for (tree_id, members) in &trees {
        let mut children = HashSet::new();
        for &i in members {
            if let Mode::Branch(_) = mode(&modes[i])? {
                children.insert(true_ids[i]);
                children.insert(false_ids[i]);
            }
        }
        let roots: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| !children.contains(&node_ids[i]))
            .collect();
        let &[root] = roots.as_slice() else {
            anyhow::bail!("tree {} has {} root nodes", tree_id, roots.len());
        };

        // Breadth-first renumbering puts every child after its parent.
        let mut order = vec![root];
        let mut position = HashMap::from([(root, 0usize)]);
        let mut queue = VecDeque::from([root]);
        while let Some(i) = queue.pop_front() {
            if let Mode::Branch(_) = mode(&modes[i])? {
                for child_id in [true_ids[i], false_ids[i]] {
                    let child = *by_key.get(&(*tree_id, child_id)).ok_or_else(|| {
                        anyhow::anyhow!("tree {} has no node {}", tree_id, child_id)
                    })?;
                    if position.insert(child, order.len()).is_some() {
                        anyhow::bail!("tree {} reaches node {} twice", tree_id, child_id);
                    }
                    order.push(child);
                    queue.push_back(child);
                }
            }
        }

        let mut nodes = Vec::with_capacity(order.len());
        for &i in &order {
            nodes.push(match mode(&modes[i])? {
                Mode::Leaf => Node::Leaf(
                    leaf_weights
                        .get(&(*tree_id, node_ids[i]))
                        .copied()
                        .unwrap_or(0.0),
                ),
                Mode::Branch(rule) => {
                    let feature = feature_ids[i];
                    if feature < 0 || feature as usize >= FEATURE_COUNT {
                        anyhow::bail!(
                            "tree {} node {} splits on feature {} of {}",
                            tree_id,
                            node_ids[i],
                            feature,
                            FEATURE_COUNT
                        );
                    }
                    let tracks = tracks_true.get(i).map_or(false, |t| *t != 0);
                    Node::Split {
                        feature: feature as usize,
                        threshold: thresholds[i],
                        rule,
                        left: position[&by_key[&(*tree_id, true_ids[i])]],
                        right: position[&by_key[&(*tree_id, false_ids[i])]],
                        // NaN != x holds, so NEQ always sends missing values true.
                        default_left: tracks || rule == Comparison::Neq,
                    }
                }
            });
        }
        built.push(nodes);
    }

    let weight = match string_or(node, "aggregate_function", "SUM")?.as_str() {
        "SUM" => 1.0,
        "AVERAGE" => 1.0 / built.len() as f32,
        other => anyhow::bail!("unsupported aggregate function {}", other),
    };
    let objective = match string_or(node, "post_transform", "NONE")?.as_str() {
        "NONE" => Objective::Identity,
        "LOGISTIC" => Objective::Logistic,
        other => anyhow::bail!("unsupported post transform {}", other),
    };
    let base_margin = match attribute(node, "base_values").map(|a| a.floats.as_slice()) {
        None | Some([]) => 0.0,
        Some([base]) => *base,
        Some(values) => anyhow::bail!("{} base values for a single target", values.len()),
    };

    let trees = built
        .into_iter()
        .map(|nodes| Tree::new(nodes, weight))
        .collect();
    Ok(Booster::from_trees(trees, base_margin, objective, FEATURE_COUNT))
}

/// Sums the target weights attached to each leaf.
fn leaf_weights(node: &NodeProto) -> TractResult<HashMap<(i64, i64), f32>> {
    let tree_ids = ints(node, "target_treeids")?;
    let node_ids = ints(node, "target_nodeids")?;
    let target_ids = ints(node, "target_ids")?;
    let weights = floats(node, "target_weights")?;
    if node_ids.len() != tree_ids.len()
        || target_ids.len() != tree_ids.len()
        || weights.len() != tree_ids.len()
    {
        anyhow::bail!("target attributes differ in length");
    }

    let mut sums = HashMap::new();
    for i in 0..tree_ids.len() {
        if target_ids[i] != 0 {
            anyhow::bail!("multi-target tree ensembles are not supported");
        }
        *sums.entry((tree_ids[i], node_ids[i])).or_insert(0.0) += weights[i];
    }
    Ok(sums)
}
