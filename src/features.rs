use crate::{
    config::ProbeConfig,
    error::AppError,
    lexical::LexicalFeatures,
    probe::{NetworkProbe, ReputationProbe},
    types::{FeatureVector, ProbeResult},
};
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Turns one URL into a complete [`FeatureVector`].
pub struct FeatureExtractor<P = NetworkProbe> {
    probe: P,
}

impl FeatureExtractor<NetworkProbe> {
    pub fn from_config(config: &ProbeConfig) -> Result<Self, AppError> {
        Ok(Self::new(NetworkProbe::new(config)?))
    }
}

impl<P: ReputationProbe> FeatureExtractor<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Never fails: anything the sub-probes did not absorb collapses the
    /// whole vector to [`FeatureVector::fallback`].
    pub async fn extract(&self, url: &str) -> FeatureVector {
        match self.try_extract(url).await {
            Ok(features) => features,
            Err(e) => {
                warn!("Feature extraction failed for {:?}, using fallback vector: {}", url, e);
                FeatureVector::fallback()
            }
        }
    }

    async fn try_extract(&self, url: &str) -> Result<FeatureVector, AppError> {
        let lexical = panic::catch_unwind(|| LexicalFeatures::analyze(url))
            .map_err(|_| AppError::FeatureExtraction("lexical analysis panicked".to_string()))?;

        let probe = AssertUnwindSafe(self.probe.probe(&lexical.host, url))
            .catch_unwind()
            .await
            .map_err(|_| AppError::FeatureExtraction("reputation probe panicked".to_string()))?;

        let features = assemble(&lexical, &probe)?;
        debug!("Extracted features for {:?}: {:?}", url, features);
        Ok(features)
    }
}

/// Combines lexical and network signals into the 18-field schema.
pub fn assemble(lexical: &LexicalFeatures, probe: &ProbeResult) -> Result<FeatureVector, AppError> {
    if probe.num_redirects < ProbeResult::UNDETERMINED_REDIRECTS {
        return Err(AppError::FeatureExtraction(format!(
            "redirect count {} below sentinel",
            probe.num_redirects
        )));
    }

    Ok(FeatureVector {
        url_length: count(lexical.url_length, "url_length")?,
        num_dots: count(lexical.num_dots, "num_dots")?,
        num_hyphens: count(lexical.num_hyphens, "num_hyphens")?,
        num_slashes: count(lexical.num_slashes, "num_slashes")?,
        has_at_symbol: flag(lexical.has_at_symbol),
        has_https: flag(lexical.has_https),
        has_login: flag(lexical.has_login),
        has_verify: flag(lexical.has_verify),
        has_secure: flag(lexical.has_secure),
        has_bank: flag(lexical.has_bank),
        has_boleto: flag(lexical.has_boleto),
        has_nfe: flag(lexical.has_nfe),
        has_cartao: flag(lexical.has_cartao),
        ends_with_br: flag(lexical.ends_with_br),
        has_ip: flag(lexical.has_ip),
        dns_resolves: flag(probe.dns_resolves),
        ssl_valid: flag(probe.ssl_valid),
        num_redirects: probe.num_redirects,
    })
}

fn count(value: usize, name: &str) -> Result<i64, AppError> {
    i64::try_from(value)
        .map_err(|_| AppError::FeatureExtraction(format!("{} out of range: {}", name, value)))
}

fn flag(value: bool) -> i64 {
    i64::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl ReputationProbe for Unreachable {
        async fn probe(&self, _host: &str, _url: &str) -> ProbeResult {
            ProbeResult::unreachable()
        }
    }

    struct Panicking;

    #[async_trait]
    impl ReputationProbe for Panicking {
        async fn probe(&self, _host: &str, _url: &str) -> ProbeResult {
            panic!("probe exploded");
        }
    }

    struct Recording(std::sync::Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl ReputationProbe for Recording {
        async fn probe(&self, host: &str, url: &str) -> ProbeResult {
            self.0.lock().unwrap().push((host.to_string(), url.to_string()));
            ProbeResult {
                dns_resolves: true,
                ssl_valid: true,
                num_redirects: 2,
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_network_keeps_lexical_fields() {
        let extractor = FeatureExtractor::new(Unreachable);
        let features = extractor.extract("http://192.168.1.1/login").await;

        assert_eq!(features.has_ip, 1);
        assert_eq!(features.has_login, 1);
        assert_eq!(features.has_https, 0);
        assert_eq!(features.url_length, 24);
        assert_eq!(features.dns_resolves, 0);
        assert_eq!(features.ssl_valid, 0);
        assert_eq!(features.num_redirects, -1);
    }

    #[tokio::test]
    async fn test_empty_url_is_schema_complete() {
        let extractor = FeatureExtractor::new(Unreachable);
        let features = extractor.extract("").await;

        assert_eq!(features.url_length, 0);
        assert_eq!(features.num_redirects, -1);
        assert_eq!(features.iter().count(), 18);
    }

    #[tokio::test]
    async fn test_probe_panic_falls_back_to_zero_vector() {
        let extractor = FeatureExtractor::new(Panicking);
        let features = extractor.extract("https://secure-bank-verify.com.br").await;
        assert!(features.is_fallback());
    }

    #[tokio::test]
    async fn test_probe_receives_parsed_host() {
        let extractor = FeatureExtractor::new(Recording(Default::default()));
        let features = extractor.extract("https://user@banco.com.br:8443/boleto").await;

        assert_eq!(features.dns_resolves, 1);
        assert_eq!(features.ssl_valid, 1);
        assert_eq!(features.num_redirects, 2);
        assert_eq!(features.has_boleto, 1);

        let calls = extractor.probe.0.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[("banco.com.br".to_string(), "https://user@banco.com.br:8443/boleto".to_string())]
        );
    }

    #[tokio::test]
    async fn test_scheme_less_input_targets_whole_path() {
        let extractor = FeatureExtractor::new(Recording(Default::default()));
        let features = extractor.extract("pagamento.com.br/boleto?id=1").await;

        assert_eq!(features.ends_with_br, 0);
        assert_eq!(features.has_boleto, 1);

        let calls = extractor.probe.0.lock().unwrap();
        assert_eq!(calls[0].0, "pagamento.com.br/boleto");
    }

    #[test]
    fn test_repeated_extraction_is_identical() {
        let extractor = FeatureExtractor::new(Unreachable);
        let url = "https://nfe-boleto.example.com.br/@cartao";
        let first = tokio_test::block_on(extractor.extract(url));
        let second = tokio_test::block_on(extractor.extract(url));
        assert_eq!(first, second);
        assert_eq!(first.has_nfe, 1);
        assert_eq!(first.has_at_symbol, 1);
    }

    #[test]
    fn test_assemble_rejects_corrupt_redirect_count() {
        let lexical = LexicalFeatures::analyze("http://example.com");
        let probe = ProbeResult {
            num_redirects: -7,
            ..ProbeResult::unreachable()
        };
        assert!(assemble(&lexical, &probe).is_err());
    }

    #[test]
    fn test_assemble_distinguishes_zero_from_undetermined() {
        let lexical = LexicalFeatures::analyze("http://example.com");
        let measured = ProbeResult {
            dns_resolves: true,
            ssl_valid: false,
            num_redirects: 0,
        };
        assert_eq!(assemble(&lexical, &measured).unwrap().num_redirects, 0);
        assert_eq!(
            assemble(&lexical, &ProbeResult::unreachable()).unwrap().num_redirects,
            -1
        );
    }
}
