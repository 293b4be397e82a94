//! Stacking ensemble

use crate::ensemble::{aligned_proba, estimator_names, NamedEstimator};
use crate::error::{Result, WranglerError};
use crate::training::cross_validation::StratifiedKFold;
use crate::training::linear_models::LogisticRegression;
use crate::training::models::{check_fit_input, hyperparameters, ClassIndex, Classifier, Hyperparameters};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Configuration for stacking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingConfig {
    /// Folds used to build out-of-fold meta-features
    pub n_folds: usize,
    /// Append the original features to the meta-features
    pub passthrough: bool,
    pub final_max_iter: usize,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            passthrough: false,
            final_max_iter: 1000,
        }
    }
}

/// Stacking classifier
///
/// Base estimators produce out-of-fold class probabilities over stratified,
/// non-shuffled folds; a logistic regression learns from them. For two classes
/// only the positive-class column of each base estimator is kept. The base
/// estimators are then refitted on all rows for prediction.
pub struct StackingClassifier {
    config: StackingConfig,
    estimators: Vec<NamedEstimator>,
    fitted: Vec<Box<dyn Classifier>>,
    final_estimator: Option<LogisticRegression>,
    class_index: ClassIndex,
}

impl StackingClassifier {
    pub fn new(estimators: Vec<NamedEstimator>, config: StackingConfig) -> Self {
        Self {
            config,
            estimators,
            fitted: Vec::new(),
            final_estimator: None,
            class_index: ClassIndex::default(),
        }
    }

    fn columns_per_estimator(&self) -> usize {
        if self.class_index.len() == 2 {
            1
        } else {
            self.class_index.len()
        }
    }

    /// Probability block of one estimator, trimmed to the stacked columns
    fn meta_block(&self, model: &dyn Classifier, x: &Array2<f64>) -> Result<Array2<f64>> {
        let proba = aligned_proba(model, x, self.class_index.classes())?;
        if self.class_index.len() == 2 {
            Ok(proba.slice(s![.., 1..]).to_owned())
        } else {
            Ok(proba)
        }
    }

    fn with_passthrough(&self, meta: Array2<f64>, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.config.passthrough {
            Ok(ndarray::concatenate(Axis(1), &[meta.view(), x.view()])?)
        } else {
            Ok(meta)
        }
    }

    fn meta_features(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.fitted.is_empty() {
            return Err(WranglerError::ModelNotFitted);
        }
        let width = self.columns_per_estimator();
        let mut meta = Array2::zeros((x.nrows(), width * self.fitted.len()));
        for (e, model) in self.fitted.iter().enumerate() {
            let block = self.meta_block(model.as_ref(), x)?;
            meta.slice_mut(s![.., e * width..(e + 1) * width]).assign(&block);
        }
        self.with_passthrough(meta, x)
    }

    fn final_estimator(&self) -> Result<&LogisticRegression> {
        self.final_estimator.as_ref().ok_or(WranglerError::ModelNotFitted)
    }
}

impl Classifier for StackingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.estimators.is_empty() {
            return Err(WranglerError::InvalidInput("No base estimators provided".to_string()));
        }
        self.class_index = ClassIndex::fit_at_least_two(y)?;

        let splits = StratifiedKFold::new(self.config.n_folds).split(y)?;

        let width = self.columns_per_estimator();
        let mut meta = Array2::zeros((x.nrows(), width * self.estimators.len()));

        for (e, estimator) in self.estimators.iter().enumerate() {
            for split in &splits {
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train = y.select(Axis(0), &split.train_indices);
                let x_val = x.select(Axis(0), &split.test_indices);

                let mut model = estimator.build();
                model.fit(&x_train, &y_train)?;
                let block = self.meta_block(model.as_ref(), &x_val)?;
                for (local, &row) in split.test_indices.iter().enumerate() {
                    meta.slice_mut(s![row, e * width..(e + 1) * width]).assign(&block.row(local));
                }
            }
        }
        let meta = self.with_passthrough(meta, x)?;

        let mut final_estimator = LogisticRegression::new().with_max_iter(self.config.final_max_iter);
        final_estimator.fit(&meta, y)?;

        let mut fitted = Vec::with_capacity(self.estimators.len());
        for estimator in &self.estimators {
            let mut model = estimator.build();
            model.fit(x, y)?;
            fitted.push(model);
        }

        self.fitted = fitted;
        self.final_estimator = Some(final_estimator);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let meta = self.meta_features(x)?;
        self.final_estimator()?.predict(&meta)
    }

    fn has_predict_proba(&self) -> bool {
        true
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let meta = self.meta_features(x)?;
        self.final_estimator()?.predict_proba(&meta)
    }

    fn classes(&self) -> &[usize] {
        self.class_index.classes()
    }

    fn hyperparameters(&self) -> Hyperparameters {
        hyperparameters([
            ("cv", &self.config.n_folds),
            ("estimators", &estimator_names(&self.estimators)),
            ("final_estimator", &"LogisticRegression"),
            ("n_jobs", &-1),
            ("passthrough", &self.config.passthrough),
        ])
    }
}
