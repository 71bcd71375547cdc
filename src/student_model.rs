use crate::{
    config::TrainingConfig,
    error::AppError,
    types::{FeatureVector, Label, FEATURE_COUNT, FEATURE_NAMES},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The classifier contract the training and inference adapters depend on.
pub trait Classifier: Send + Sync {
    fn train(&mut self, features: &[FeatureVector], labels: &[Label]) -> Result<(), AppError>;

    /// Class probabilities indexed by [`Label::index`].
    fn predict_probability(&self, features: &FeatureVector) -> [f64; 2];

    fn predict(&self, features: &FeatureVector) -> Label {
        let [benign, suspicious] = self.predict_probability(features);
        if suspicious > benign {
            Label::Suspicious
        } else {
            Label::Benign
        }
    }
}

/// Logistic regression over standardised features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub feature_names: Vec<String>,
    pub version: String,
    pub training_samples: u64,
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip, default = "TrainingConfig::default")]
    hyperparameters: TrainingConfig,
}

impl StudentModel {
    pub fn new(hyperparameters: TrainingConfig) -> Self {
        Self {
            weights: vec![0.0; FEATURE_COUNT],
            bias: 0.0,
            means: vec![0.0; FEATURE_COUNT],
            scales: vec![1.0; FEATURE_COUNT],
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            version: "v1.0.0".to_string(),
            training_samples: 0,
            trained_at: None,
            hyperparameters,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let model: StudentModel = serde_json::from_str(&content)?;

        if model.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(AppError::ModelInference(format!(
                "model at {} was trained on a different feature schema",
                path.display()
            )));
        }
        if [&model.weights, &model.means, &model.scales]
            .iter()
            .any(|v| v.len() != FEATURE_COUNT)
        {
            return Err(AppError::ModelInference(format!(
                "model at {} has malformed parameter vectors",
                path.display()
            )));
        }

        debug!(
            "Loaded student model from {}: version {}, {} samples",
            path.display(),
            model.version,
            model.training_samples
        );
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!(
            "Saved student model to {}: version {}, {} samples",
            path.display(),
            self.version,
            self.training_samples
        );
        Ok(())
    }

    /// Features ordered by absolute weight, strongest first.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut importance: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .zip(&self.weights)
            .map(|(feature, weight)| (feature.clone(), weight.abs()))
            .collect();

        importance.sort_by(|a, b| b.1.total_cmp(&a.1));
        importance
    }

    fn standardise(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut values = features.values();
        for (i, value) in values.iter_mut().enumerate() {
            *value = (*value - self.means[i]) / self.scales[i];
        }
        values
    }

    fn score(&self, standardised: &[f64; FEATURE_COUNT]) -> f64 {
        let linear: f64 = self.bias
            + self
                .weights
                .iter()
                .zip(standardised)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(linear)
    }

    fn fit_scaling(&mut self, features: &[FeatureVector]) {
        let n = features.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        for vector in features {
            for (mean, value) in means.iter_mut().zip(vector.values()) {
                *mean += value / n;
            }
        }

        let mut variances = [0.0; FEATURE_COUNT];
        for vector in features {
            for (i, value) in vector.values().iter().enumerate() {
                variances[i] += (value - means[i]).powi(2) / n;
            }
        }

        self.means = means.to_vec();
        // Constant features keep unit scale
        self.scales = variances
            .iter()
            .map(|v| if *v > f64::EPSILON { v.sqrt() } else { 1.0 })
            .collect();
    }
}

impl Classifier for StudentModel {
    fn train(&mut self, features: &[FeatureVector], labels: &[Label]) -> Result<(), AppError> {
        if features.is_empty() {
            return Err(AppError::InvalidInput("cannot train on an empty sample set".to_string()));
        }
        if features.len() != labels.len() {
            return Err(AppError::InvalidInput(format!(
                "{} feature vectors but {} labels",
                features.len(),
                labels.len()
            )));
        }

        self.fit_scaling(features);
        let inputs: Vec<[f64; FEATURE_COUNT]> =
            features.iter().map(|f| self.standardise(f)).collect();
        let targets: Vec<f64> = labels.iter().map(|l| l.index() as f64).collect();

        let TrainingConfig {
            epochs,
            learning_rate,
            l2,
            ..
        } = self.hyperparameters;
        let n = inputs.len() as f64;
        self.weights = vec![0.0; FEATURE_COUNT];
        self.bias = 0.0;

        for _ in 0..epochs {
            let mut weight_gradient = [0.0; FEATURE_COUNT];
            let mut bias_gradient = 0.0;

            for (x, target) in inputs.iter().zip(&targets) {
                let error = self.score(x) - target;
                bias_gradient += error;
                for (gradient, value) in weight_gradient.iter_mut().zip(x) {
                    *gradient += error * value;
                }
            }

            for (weight, gradient) in self.weights.iter_mut().zip(weight_gradient) {
                *weight -= learning_rate * (gradient / n + l2 * *weight);
            }
            self.bias -= learning_rate * bias_gradient / n;
        }

        self.training_samples = features.len() as u64;
        self.trained_at = Some(Utc::now());
        info!(
            "Trained student model on {} samples ({} epochs)",
            self.training_samples, epochs
        );
        Ok(())
    }

    fn predict_probability(&self, features: &FeatureVector) -> [f64; 2] {
        let suspicious = self.score(&self.standardise(features));
        [1.0 - suspicious, suspicious]
    }
}

impl Default for StudentModel {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(has_ip: i64, has_login: i64, dns_resolves: i64) -> FeatureVector {
        FeatureVector {
            url_length: 30,
            has_ip,
            has_login,
            dns_resolves,
            ..FeatureVector::fallback()
        }
    }

    fn separable() -> (Vec<FeatureVector>, Vec<Label>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..10 {
            features.push(sample(1, 1, 0));
            labels.push(Label::Suspicious);
            features.push(sample(0, 0, 1));
            labels.push(Label::Benign);
        }
        (features, labels)
    }

    #[test]
    fn test_untrained_model_is_undecided() {
        let model = StudentModel::default();
        let probabilities = model.predict_probability(&sample(1, 1, 0));
        assert!((probabilities[0] - 0.5).abs() < 1e-12);
        assert_eq!(model.predict(&sample(1, 1, 0)), Label::Benign);
    }

    #[test]
    fn test_learns_separable_data() {
        let (features, labels) = separable();
        let mut model = StudentModel::default();
        model.train(&features, &labels).unwrap();

        assert_eq!(model.predict(&sample(1, 1, 0)), Label::Suspicious);
        assert_eq!(model.predict(&sample(0, 0, 1)), Label::Benign);
        assert_eq!(model.training_samples, 20);
        assert!(model.trained_at.is_some());

        let [benign, suspicious] = model.predict_probability(&sample(1, 1, 0));
        assert!((benign + suspicious - 1.0).abs() < 1e-9);
        assert!(suspicious > 0.9);
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let mut model = StudentModel::default();
        assert!(model.train(&[], &[]).is_err());
        assert!(model.train(&[sample(0, 0, 0)], &[]).is_err());
    }

    #[test]
    fn test_constant_features_do_not_blow_up() {
        let features = vec![sample(0, 0, 0); 4];
        let labels = vec![Label::Benign, Label::Suspicious, Label::Benign, Label::Suspicious];
        let mut model = StudentModel::default();
        model.train(&features, &labels).unwrap();
        assert!(model.weights.iter().all(|w| w.is_finite()));
        assert!(model.bias.is_finite());
    }

    #[test]
    fn test_feature_importance_is_sorted() {
        let (features, labels) = separable();
        let mut model = StudentModel::default();
        model.train(&features, &labels).unwrap();

        let importance = model.feature_importance();
        assert_eq!(importance.len(), FEATURE_COUNT);
        assert!(importance.windows(2).all(|w| w[0].1 >= w[1].1));
    }
}
