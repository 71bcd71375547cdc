use crate::{
    batch::BatchExtractor,
    config::TrainingConfig,
    error::{validation_error, AppError},
    probe::ReputationProbe,
    student_model::Classifier,
    types::{FeatureVector, Label},
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Feature vectors paired with labels, in input URL order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<Label>,
}

impl TrainingSet {
    pub fn from_parts(features: Vec<FeatureVector>, labels: Vec<Label>) -> Result<Self, AppError> {
        if features.is_empty() {
            return Err(validation_error("training set is empty"));
        }
        if features.len() != labels.len() {
            return Err(AppError::InvalidInput(format!(
                "{} feature vectors but {} labels",
                features.len(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Validates the caller's inputs, then probes every URL through `batch`.
    pub async fn extract<P: ReputationProbe>(
        batch: &BatchExtractor<P>,
        urls: &[String],
        labels: &[i64],
    ) -> Result<Self, AppError> {
        if urls.len() != labels.len() {
            return Err(AppError::InvalidInput(format!(
                "{} URLs but {} labels",
                urls.len(),
                labels.len()
            )));
        }
        if urls.is_empty() {
            return Err(validation_error("no URLs to extract"));
        }
        let labels = labels
            .iter()
            .map(|&label| Label::try_from(label))
            .collect::<Result<Vec<_>, _>>()?;

        let output = batch.extract_all(urls).await?;
        Self::from_parts(output.vectors, labels)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> TrainingSet {
        TrainingSet {
            features: indices.iter().map(|&i| self.features[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: TrainingSet,
    pub test: TrainingSet,
}

/// Splits `set` so each label keeps its proportion in both partitions.
/// The same seed always gives the same split.
pub fn stratified_split(
    set: &TrainingSet,
    test_fraction: f64,
    seed: u64,
) -> Result<Split, AppError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(validation_error("test_fraction must lie strictly between 0 and 1"));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_indices = Vec::new();
    let mut test_indices = Vec::new();
    let mut present_labels = 0;

    for label in Label::ALL {
        let mut indices: Vec<usize> = (0..set.len()).filter(|&i| set.labels[i] == label).collect();
        if indices.is_empty() {
            continue;
        }
        if indices.len() < 2 {
            return Err(AppError::InvalidInput(format!(
                "label {} has only {} sample, at least 2 are needed to stratify",
                label,
                indices.len()
            )));
        }
        present_labels += 1;

        indices.shuffle(&mut rng);
        let n_test =
            ((indices.len() as f64 * test_fraction).round() as usize).clamp(1, indices.len() - 1);
        let train = indices.split_off(n_test);
        test_indices.extend(indices);
        train_indices.extend(train);
    }

    if present_labels < 2 {
        return Err(validation_error("stratified split needs both labels present"));
    }

    // Keep original sample order inside each partition
    train_indices.sort_unstable();
    test_indices.sort_unstable();

    Ok(Split {
        train: set.subset(&train_indices),
        test: set.subset(&test_indices),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    /// Indexed by [`Label::index`].
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn compute(expected: &[Label], predicted: &[Label]) -> Result<Self, AppError> {
        if expected.len() != predicted.len() {
            return Err(AppError::InvalidInput(format!(
                "{} expected labels but {} predictions",
                expected.len(),
                predicted.len()
            )));
        }

        let classes = Label::ALL.map(|label| {
            let true_positive = expected
                .iter()
                .zip(predicted)
                .filter(|(e, p)| **e == label && **p == label)
                .count();
            let predicted_positive = predicted.iter().filter(|p| **p == label).count();
            let support = expected.iter().filter(|e| **e == label).count();

            let precision = ratio(true_positive, predicted_positive);
            let recall = ratio(true_positive, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            }
        });

        let correct = expected.iter().zip(predicted).filter(|(e, p)| e == p).count();
        let total = expected.len();

        let macro_avg = average(&classes, |_| 1.0 / classes.len() as f64, total);
        let weighted_avg = average(
            &classes,
            |c| if total > 0 { c.support as f64 / total as f64 } else { 0.0 },
            total,
        );

        Ok(Self {
            classes,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
        })
    }

    pub fn class(&self, label: Label) -> &ClassMetrics {
        &self.classes[label.index()]
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn average(
    classes: &[ClassMetrics; 2],
    weight: impl Fn(&ClassMetrics) -> f64,
    support: usize,
) -> ClassMetrics {
    let weighted = |metric: fn(&ClassMetrics) -> f64| {
        classes.iter().map(|c| weight(c) * metric(c)).sum::<f64>()
    };
    ClassMetrics {
        precision: weighted(|c| c.precision),
        recall: weighted(|c| c.recall),
        f1: weighted(|c| c.f1),
        support,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for label in Label::ALL {
            let m = self.class(label);
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label.index(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub test_samples: usize,
    pub report: ClassificationReport,
}

/// Stratified split, fit on the train partition, evaluate on the held-out one.
pub fn train_and_evaluate<C: Classifier>(
    classifier: &mut C,
    set: &TrainingSet,
    config: &TrainingConfig,
) -> Result<TrainingReport, AppError> {
    let split = stratified_split(set, config.test_fraction, config.seed)?;
    classifier.train(&split.train.features, &split.train.labels)?;

    let predicted: Vec<Label> = split
        .test
        .features
        .iter()
        .map(|f| classifier.predict(f))
        .collect();
    let report = ClassificationReport::compute(&split.test.labels, &predicted)?;

    info!(
        "Trained on {} samples, evaluated on {}: accuracy {:.3}",
        split.train.len(),
        split.test.len(),
        report.accuracy
    );

    Ok(TrainingReport {
        train_samples: split.train.len(),
        test_samples: split.test.len(),
        report,
    })
}
