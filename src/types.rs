use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const FEATURE_COUNT: usize = 18;

/// Canonical feature order. Classifier inputs and persisted models use it.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "url_length",
    "num_dots",
    "num_hyphens",
    "num_slashes",
    "has_at_symbol",
    "has_https",
    "has_login",
    "has_verify",
    "has_secure",
    "has_bank",
    "has_boleto",
    "has_nfe",
    "has_cartao",
    "ends_with_br",
    "has_ip",
    "dns_resolves",
    "ssl_valid",
    "num_redirects",
];

/// Fixed-schema numeric summary of one URL.
///
/// `Default` and [`FeatureVector::fallback`] are the same all-zero vector, the
/// only shape produced when extraction fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub url_length: i64,
    pub num_dots: i64,
    pub num_hyphens: i64,
    pub num_slashes: i64,
    pub has_at_symbol: i64,
    pub has_https: i64,
    pub has_login: i64,
    pub has_verify: i64,
    pub has_secure: i64,
    pub has_bank: i64,
    pub has_boleto: i64,
    pub has_nfe: i64,
    pub has_cartao: i64,
    pub ends_with_br: i64,
    pub has_ip: i64,
    pub dns_resolves: i64,
    pub ssl_valid: i64,
    pub num_redirects: i64,
}

impl FeatureVector {
    pub fn fallback() -> Self {
        Self::default()
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }

    fn raw(&self) -> [i64; FEATURE_COUNT] {
        [
            self.url_length,
            self.num_dots,
            self.num_hyphens,
            self.num_slashes,
            self.has_at_symbol,
            self.has_https,
            self.has_login,
            self.has_verify,
            self.has_secure,
            self.has_bank,
            self.has_boleto,
            self.has_nfe,
            self.has_cartao,
            self.ends_with_br,
            self.has_ip,
            self.dns_resolves,
            self.ssl_valid,
            self.num_redirects,
        ]
    }

    /// Values in [`FEATURE_NAMES`] order, as classifier input.
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        self.raw().map(|v| v as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> {
        FEATURE_NAMES.into_iter().zip(self.raw())
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.iter().find(|(feature, _)| *feature == name).map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Benign = 0,
    Suspicious = 1,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Benign, Label::Suspicious];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<i64> for Label {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Label::Benign),
            1 => Ok(Label::Suspicious),
            other => Err(AppError::InvalidInput(format!(
                "label must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Benign => write!(f, "benign"),
            Label::Suspicious => write!(f, "suspicious"),
        }
    }
}

/// Outcome of the three network sub-probes for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub dns_resolves: bool,
    pub ssl_valid: bool,
    /// `-1` when the redirect chain could not be measured.
    pub num_redirects: i64,
}

impl ProbeResult {
    pub const UNDETERMINED_REDIRECTS: i64 = -1;

    pub fn unreachable() -> Self {
        Self {
            dns_resolves: false,
            ssl_valid: false,
            num_redirects: Self::UNDETERMINED_REDIRECTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub url: String,
    pub prediction: Prediction,
    pub features: FeatureVector,
}
