//! Random Forest and the shared parallel tree ensemble

use crate::error::{Result, WranglerError};
use crate::training::decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures, Splitter};
use crate::training::models::{
    check_fit_input, display_option, hyperparameters, ClassIndex, Classifier, Hyperparameters,
};
use ndarray::{Array1, Array2};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration shared by forests and bagging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
    pub splitter: Splitter,
    pub bootstrap: bool,
    pub random_state: u64,
}

/// Trees fitted in parallel and averaged at prediction time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub config: TreeEnsembleConfig,
    trees: Vec<DecisionTreeClassifier>,
    class_index: ClassIndex,
}

impl TreeEnsemble {
    pub fn new(config: TreeEnsembleConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            class_index: ClassIndex::default(),
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.n_estimators == 0 {
            return Err(WranglerError::InvalidInput("n_estimators must be greater than zero".to_string()));
        }
        self.class_index = ClassIndex::fit(y)?;
        let encoded = self.class_index.encode(y)?;
        let n_classes = self.class_index.len();
        let n_samples = x.nrows();

        // Seeds are drawn up front so results do not depend on thread scheduling
        let mut master = ChaCha8Rng::seed_from_u64(self.config.random_state);
        let seeds: Vec<u64> = (0..self.config.n_estimators).map(|_| master.next_u64()).collect();

        let config = &self.config;
        let trees = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let weights = if config.bootstrap {
                    let mut counts = vec![0.0; n_samples];
                    for _ in 0..n_samples {
                        counts[rng.gen_range(0..n_samples)] += 1.0;
                    }
                    counts
                } else {
                    vec![1.0; n_samples]
                };

                let mut tree = DecisionTreeClassifier::new()
                    .with_min_samples_split(config.min_samples_split)
                    .with_min_samples_leaf(config.min_samples_leaf)
                    .with_max_features(config.max_features)
                    .with_criterion(config.criterion)
                    .with_splitter(config.splitter)
                    .with_random_state(rng.next_u64());
                tree.max_depth = config.max_depth;
                tree.fit_encoded(x, &encoded, n_classes, &weights)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        Ok(())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(WranglerError::ModelNotFitted);
        }
        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba_encoded(x))
            .collect::<Result<Vec<_>>>()?;

        let mut total = Array2::zeros((x.nrows(), self.class_index.len()));
        for proba in &per_tree {
            total += proba;
        }
        Ok(total / self.trees.len() as f64)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(self.class_index.decode_argmax(&proba))
    }

    pub fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Random Forest classifier: bootstrapped CART trees with sqrt features per split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    ensemble: TreeEnsemble,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestClassifier {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            ensemble: TreeEnsemble::new(TreeEnsembleConfig {
                n_estimators,
                max_depth: None,
                min_samples_split: 2,
                min_samples_leaf: 1,
                max_features: MaxFeatures::Sqrt,
                criterion: Criterion::Gini,
                splitter: Splitter::Best,
                bootstrap: true,
                random_state: 42,
            }),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.ensemble.config.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.ensemble.config.max_features = max_features;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.ensemble.config.random_state = seed;
        self
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        self.ensemble.fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.ensemble.predict(x)
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.ensemble.predict_proba(x)
    }

    fn classes(&self) -> &[usize] {
        self.ensemble.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        forest_hyperparameters(&self.ensemble.config)
    }
}

pub(crate) fn forest_hyperparameters(config: &TreeEnsembleConfig) -> Hyperparameters {
    hyperparameters([
        ("bootstrap", &if config.bootstrap { "True" } else { "False" }),
        ("criterion", &config.criterion),
        ("max_depth", &display_option(config.max_depth)),
        ("max_features", &config.max_features),
        ("min_samples_leaf", &config.min_samples_leaf),
        ("min_samples_split", &config.min_samples_split),
        ("n_estimators", &config.n_estimators),
        ("n_jobs", &-1),
        ("random_state", &config.random_state),
    ])
}
