//! URL phishing signals: lexical analysis plus DNS, TLS and redirect probing,
//! folded into a fixed 18-field feature vector for a binary classifier.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod lexical;
pub mod probe;
pub mod student_model;
pub mod training;
pub mod types;

pub use batch::{BatchExtractor, BatchOutput, CancelHandle};
pub use config::{BatchConfig, Config, ProbeConfig, TrainingConfig, TrustRoots};
pub use engine::ThreatEngine;
pub use error::AppError;
pub use features::FeatureExtractor;
pub use lexical::{LexicalFeatures, ParsedUrl};
pub use probe::{NetworkProbe, ReputationProbe};
pub use student_model::{Classifier, StudentModel};
pub use training::{stratified_split, train_and_evaluate, ClassificationReport, Split, TrainingSet};
pub use types::{FeatureVector, Label, Prediction, ProbeResult, ScoreResponse, FEATURE_NAMES};
