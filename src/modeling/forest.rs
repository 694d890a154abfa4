use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::config::ForestSection;
use crate::modeling::{DurationModel, FeatureImportance, ModelKind};
use crate::models::*;

const N_PREDICTORS: usize = 3;

/// Enforcement and property type are unordered factors; ward is numeric.
const CATEGORICAL: [bool; N_PREDICTORS] = [true, true, false];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_features: usize,
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
}

impl From<&ForestSection> for ForestParams {
    fn from(section: &ForestSection) -> Self {
        ForestParams {
            n_trees: section.n_trees,
            max_features: section.max_features,
            min_samples_leaf: section.min_samples_leaf,
            max_depth: section.max_depth,
        }
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::from(&ForestSection::default())
    }
}

fn feature_row(predictors: &Predictors) -> [u32; N_PREDICTORS] {
    [
        predictors.enforcement_proceedings.code() as u32,
        predictors.property_type.code() as u32,
        predictors.property_ward,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitRule {
    /// Numeric: values `<=` the threshold go left.
    Threshold(f64),
    /// Categorical: listed levels go left, every other level goes right.
    Levels(Vec<u32>),
}

impl SplitRule {
    fn goes_left(&self, value: u32) -> bool {
        match self {
            SplitRule::Threshold(t) => (value as f64) <= *t,
            SplitRule::Levels(levels) => levels.contains(&value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionLeaf {
    pub value: f64,
    pub n_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionNode {
    pub feature: usize,
    pub rule: SplitRule,
    pub left: Box<TreeNode>,
    pub right: Box<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Node(RegressionNode),
    Leaf(RegressionLeaf),
}

impl TreeNode {
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 0,
            TreeNode::Node(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }

    fn predict(&self, x: &[u32; N_PREDICTORS]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf(leaf) => return leaf.value,
                TreeNode::Node(split) => {
                    node = if split.rule.goes_left(x[split.feature]) {
                        &split.left
                    } else {
                        &split.right
                    };
                }
            }
        }
    }
}

/// One CART regression tree grown on a bootstrap sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: TreeNode,
    /// Sum-of-squares decrease credited to each predictor.
    impurity_decrease: [f64; N_PREDICTORS],
}

impl RegressionTree {
    fn fit(x: &[[u32; N_PREDICTORS]], y: &[f64], params: &ForestParams, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = y.len();
        let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

        let mut builder = TreeBuilder {
            x,
            y,
            params,
            impurity_decrease: [0.0; N_PREDICTORS],
        };
        let root = builder.build(bootstrap, 0, &mut rng);

        RegressionTree {
            root,
            impurity_decrease: builder.impurity_decrease,
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }
}

struct TreeBuilder<'a> {
    x: &'a [[u32; N_PREDICTORS]],
    y: &'a [f64],
    params: &'a ForestParams,
    impurity_decrease: [f64; N_PREDICTORS],
}

struct CandidateSplit {
    feature: usize,
    rule: SplitRule,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> TreeNode {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let mean = sum / n.max(1) as f64;
        let sse: f64 = indices.iter().map(|&i| (self.y[i] - mean).powi(2)).sum();

        let leaf = TreeNode::Leaf(RegressionLeaf { value: mean, n_samples: n });

        if n < 2 * self.params.min_samples_leaf
            || self.params.max_depth.is_some_and(|max| depth >= max)
            || sse < 1e-10
        {
            return leaf;
        }

        let m = self.params.max_features.clamp(1, N_PREDICTORS);
        let mut features = rand::seq::index::sample(rng, N_PREDICTORS, m).into_vec();
        features.sort_unstable();

        let mut best: Option<CandidateSplit> = None;
        for feature in features {
            if let Some(candidate) = self.best_split_for_feature(feature, &indices, sum) {
                if best.as_ref().is_none_or(|b| candidate.gain > b.gain) {
                    best = Some(candidate);
                }
            }
        }

        let Some(split) = best else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| split.rule.goes_left(self.x[i][split.feature]));

        self.impurity_decrease[split.feature] += split.gain;

        let left = self.build(left, depth + 1, rng);
        let right = self.build(right, depth + 1, rng);

        TreeNode::Node(RegressionNode {
            feature: split.feature,
            rule: split.rule,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// Numeric features scan thresholds in value order. Factor levels are
    /// ordered by their mean response first, which makes the prefix scan the
    /// optimal subset split.
    fn best_split_for_feature(&self, feature: usize, indices: &[usize], total: f64) -> Option<CandidateSplit> {
        let mut groups: BTreeMap<u32, (usize, f64)> = BTreeMap::new();
        for &i in indices {
            let entry = groups.entry(self.x[i][feature]).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += self.y[i];
        }
        if groups.len() < 2 {
            return None;
        }

        let mut ordered: Vec<(u32, usize, f64)> = groups.into_iter().map(|(v, (c, s))| (v, c, s)).collect();
        if CATEGORICAL[feature] {
            ordered.sort_by(|a, b| (a.2 / a.1 as f64).total_cmp(&(b.2 / b.1 as f64)).then(a.0.cmp(&b.0)));
        }

        let n = indices.len();
        let parent = total * total / n as f64;
        let min_leaf = self.params.min_samples_leaf;

        let mut best: Option<(usize, f64)> = None;
        let (mut n_left, mut sum_left) = (0usize, 0.0);
        for k in 0..ordered.len() - 1 {
            n_left += ordered[k].1;
            sum_left += ordered[k].2;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let sum_right = total - sum_left;
            let gain = sum_left * sum_left / n_left as f64 + sum_right * sum_right / n_right as f64 - parent;
            if gain > 1e-12 && best.is_none_or(|(_, g)| gain > g) {
                best = Some((k, gain));
            }
        }

        let (k, gain) = best?;
        let rule = if CATEGORICAL[feature] {
            let mut levels: Vec<u32> = ordered[..=k].iter().map(|g| g.0).collect();
            levels.sort_unstable();
            SplitRule::Levels(levels)
        } else {
            SplitRule::Threshold((ordered[k].0 as f64 + ordered[k + 1].0 as f64) / 2.0)
        };

        Some(CandidateSplit { feature, rule, gain })
    }
}

/// Bagged regression trees with per-node predictor sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    params: ForestParams,
    trees: Vec<RegressionTree>,
    n_train: usize,
}

impl RandomForestModel {
    /// Tree seeds come from `rng` in tree order, so the fitted forest depends
    /// only on the seed and not on how rayon schedules the builds.
    pub fn fit<R: Rng>(train: &[AnalysisRecord], params: &ForestParams, rng: &mut R) -> Result<Self> {
        if train.is_empty() {
            return Err(PipelineError::EmptyTrainingSet);
        }
        if params.n_trees == 0 {
            return Err(PipelineError::ModelFit("forest needs at least one tree".to_string()));
        }

        let x: Vec<[u32; N_PREDICTORS]> = train.iter().map(|r| feature_row(&r.predictors())).collect();
        let y: Vec<f64> = train.iter().map(|r| r.duration()).collect();
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| rng.r#gen::<u64>()).collect();

        let trees: Vec<RegressionTree> = seeds
            .par_iter()
            .map(|&seed| RegressionTree::fit(&x, &y, params, seed))
            .collect();

        let max_depth = trees.iter().map(|t| t.depth()).max().unwrap_or(0);
        info!(
            "Fitted random forest: {} trees on {} rows (deepest tree {})",
            trees.len(),
            train.len(),
            max_depth
        );

        Ok(RandomForestModel {
            params: params.clone(),
            trees,
            n_train: train.len(),
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}

impl DurationModel for RandomForestModel {
    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }

    fn n_train(&self) -> usize {
        self.n_train
    }

    fn predict(&self, predictors: &Predictors) -> Result<f64> {
        let x = feature_row(predictors);
        let total: f64 = self.trees.iter().map(|t| t.root.predict(&x)).sum();
        Ok(total / self.trees.len().max(1) as f64)
    }

    fn feature_importance(&self) -> Vec<FeatureImportance> {
        let n_trees = self.trees.len().max(1) as f64;
        PREDICTOR_NAMES
            .iter()
            .enumerate()
            .map(|(p, name)| FeatureImportance {
                feature: name.to_string(),
                importance: self.trees.iter().map(|t| t.impurity_decrease[p]).sum::<f64>() / n_trees,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::record;

    /// Hospitals take 40 days, everything else 5; enforcement and ward are noise.
    fn step_training() -> Vec<AnalysisRecord> {
        let types = [PropertyType::HighRise, PropertyType::LowRise, PropertyType::Hospital];
        let mut records = Vec::new();
        for id in 0..90i64 {
            let property_type = types[(id % 3) as usize];
            let enforcement = if id % 2 == 0 {
                EnforcementProceedings::Yes
            } else {
                EnforcementProceedings::No
            };
            let days = if property_type == PropertyType::Hospital { 40 } else { 5 };
            let open = chrono::NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
            let closed = open + chrono::Days::new(days);
            records.push(record(
                id,
                property_type,
                (id % 7) as u32 + 1,
                enforcement,
                &open.to_string(),
                &closed.to_string(),
            ));
        }
        records
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        }
    }

    fn predictors(property_type: PropertyType) -> Predictors {
        Predictors {
            enforcement_proceedings: EnforcementProceedings::No,
            property_type,
            property_ward: 3,
        }
    }

    #[test]
    fn test_learns_categorical_step() {
        let mut rng = StdRng::seed_from_u64(853);
        let forest = RandomForestModel::fit(&step_training(), &small_params(), &mut rng).unwrap();

        let hospital = forest.predict(&predictors(PropertyType::Hospital)).unwrap();
        let high_rise = forest.predict(&predictors(PropertyType::HighRise)).unwrap();
        assert!((hospital - 40.0).abs() < 1e-9, "hospital predicted {}", hospital);
        assert!((high_rise - 5.0).abs() < 1e-9, "high rise predicted {}", high_rise);
        assert_eq!(forest.n_trees(), 25);
    }

    #[test]
    fn test_importance_credits_the_informative_predictor() {
        let mut rng = StdRng::seed_from_u64(853);
        let forest = RandomForestModel::fit(&step_training(), &small_params(), &mut rng).unwrap();
        let importance = forest.feature_importance();

        assert_eq!(importance[1].feature, COL_PROPERTY_TYPE);
        assert!(importance[1].importance > 0.0);
        assert!(importance[0].importance.abs() < 1e-9);
        assert!(importance[2].importance.abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let train = step_training();
        let a = RandomForestModel::fit(&train, &small_params(), &mut StdRng::seed_from_u64(7)).unwrap();
        let b = RandomForestModel::fit(&train, &small_params(), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unseen_level_goes_right_without_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let forest = RandomForestModel::fit(&step_training(), &small_params(), &mut rng).unwrap();
        let prediction = forest.predict(&predictors(PropertyType::Detention)).unwrap();
        assert!(prediction.is_finite());
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        fn leaves(node: &TreeNode, out: &mut Vec<usize>) {
            match node {
                TreeNode::Leaf(leaf) => out.push(leaf.n_samples),
                TreeNode::Node(split) => {
                    leaves(&split.left, out);
                    leaves(&split.right, out);
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(3);
        let forest = RandomForestModel::fit(&step_training(), &small_params(), &mut rng).unwrap();
        for tree in &forest.trees {
            let mut sizes = Vec::new();
            leaves(&tree.root, &mut sizes);
            assert!(sizes.iter().all(|&n| n >= 5), "{:?}", sizes);
        }
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let params = ForestParams {
            n_trees: 5,
            max_depth: Some(1),
            ..ForestParams::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let forest = RandomForestModel::fit(&step_training(), &params, &mut rng).unwrap();
        assert!(forest.trees.iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn test_empty_training_set() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            RandomForestModel::fit(&[], &small_params(), &mut rng),
            Err(PipelineError::EmptyTrainingSet)
        ));
    }
}
