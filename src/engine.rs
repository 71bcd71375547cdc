use crate::{
    features::FeatureExtractor,
    probe::{NetworkProbe, ReputationProbe},
    student_model::Classifier,
    types::{FeatureVector, Prediction, ScoreResponse},
};
use std::{sync::Arc, time::Instant};
use tracing::info;

/// Scores URLs against a model loaded once and shared read-only.
pub struct ThreatEngine<C, P = NetworkProbe> {
    extractor: Arc<FeatureExtractor<P>>,
    model: Arc<C>,
}

impl<C: Classifier, P: ReputationProbe> ThreatEngine<C, P> {
    pub fn new(extractor: Arc<FeatureExtractor<P>>, model: Arc<C>) -> Self {
        Self { extractor, model }
    }

    pub fn model(&self) -> &C {
        &self.model
    }

    pub fn score_features(&self, features: &FeatureVector) -> Prediction {
        let label = self.model.predict(features);
        let probabilities = self.model.predict_probability(features);
        Prediction {
            label,
            confidence: probabilities[label.index()].clamp(0.0, 1.0),
        }
    }

    pub async fn score_url(&self, url: &str) -> ScoreResponse {
        let start_time = Instant::now();
        let features = self.extractor.extract(url).await;
        let prediction = self.score_features(&features);

        info!(
            "Scored {:?}: {} (confidence {:.3}, {:.1}ms)",
            url,
            prediction.label,
            prediction.confidence,
            start_time.elapsed().as_secs_f64() * 1000.0
        );

        ScoreResponse {
            url: url.to_string(),
            prediction,
            features,
        }
    }
}
