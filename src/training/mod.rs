//! Model training module
//!
//! Classification estimators behind one [`Classifier`] trait, the ordered
//! algorithm catalog, per-algorithm evaluation and session orchestration:
//! - Linear models (logistic, ridge, SGD, perceptron, linear SVC)
//! - Decision trees, Random Forest, Extra Trees, AdaBoost
//! - Gradient boosting (classic, histogram, XGBoost, LightGBM, CatBoost styles)
//! - Support Vector Machines, K-Nearest Neighbors, Naive Bayes, MLP
//! - Metrics and stratified cross-validation

pub mod adaboost;
pub mod catboost;
pub mod cross_validation;
pub mod decision_tree;
mod engine;
mod evaluator;
pub mod extra_trees;
pub mod gradient_boosting;
pub mod knn;
pub mod lightgbm;
pub mod linear_models;
pub mod metrics;
pub mod models;
pub mod naive_bayes;
pub mod neural_network;
pub mod random_forest;
mod registry;
pub mod sgd;
pub mod svm;
pub mod xgboost;

pub use engine::{select_best, ProgressEvent, SessionSummary, TrainEngine, TrainingSession};
pub use evaluator::{EvaluationResult, EvaluationStatus, Evaluator};
pub use models::{ClassIndex, Classifier, Hyperparameters};
pub use registry::{AlgorithmRegistry, AlgorithmSpec, EstimatorFn, CATALOG};

pub use adaboost::AdaBoostClassifier;
pub use catboost::{CatBoostClassifier, CatBoostConfig};
pub use cross_validation::{cross_val_f1, CVResults, CVSplit, StratifiedKFold};
pub use decision_tree::{Criterion, DecisionTreeClassifier, MaxFeatures, Splitter};
pub use extra_trees::ExtraTreesClassifier;
pub use gradient_boosting::{GradientBoostingClassifier, HistGradientBoostingClassifier};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
pub use lightgbm::{LightGBMClassifier, LightGBMConfig};
pub use linear_models::{LogisticRegression, RidgeClassifier};
pub use naive_bayes::GaussianNaiveBayes;
pub use neural_network::{MLPClassifier, MLPConfig};
pub use random_forest::RandomForestClassifier;
pub use sgd::{Perceptron, SGDClassifier, SGDConfig, SGDLoss};
pub use svm::{Gamma, KernelType, LinearSVC, SVMConfig, SVC};
pub use xgboost::{XGBoostClassifier, XGBoostConfig};
