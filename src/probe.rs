use crate::{
    config::{ProbeConfig, TrustRoots},
    error::AppError,
    types::ProbeResult,
};
use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    system_conf, TokioAsyncResolver,
};
use reqwest::{header::LOCATION, redirect::Policy, Client, StatusCode};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::{
    rustls::{self, pki_types::ServerName, ClientConfig, RootCertStore},
    TlsConnector,
};
use tracing::debug;
use url::Url;

/// Network reputation of one URL. Implementations absorb every failure into
/// the [`ProbeResult`] sentinels.
#[async_trait]
pub trait ReputationProbe: Send + Sync + 'static {
    async fn probe(&self, host: &str, url: &str) -> ProbeResult;
}

pub struct NetworkProbe {
    config: ProbeConfig,
    resolver: TokioAsyncResolver,
    tls: TlsConnector,
    client: Client,
}

impl NetworkProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self, AppError> {
        Self::with_roots(config, load_trust_roots(config.trust_roots))
    }

    /// Same as [`NetworkProbe::new`] but validates TLS peers against `roots`.
    pub fn with_roots(config: &ProbeConfig, roots: RootCertStore) -> Result<Self, AppError> {
        let resolver = build_resolver(config.dns_timeout());

        let tls_config =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(roots)
                .with_no_client_auth();

        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(Policy::none())
            // Same direct path as the DNS and TLS sub-probes
            .no_proxy()
            .build()?;

        Ok(Self {
            config: config.clone(),
            resolver,
            tls: TlsConnector::from(Arc::new(tls_config)),
            client,
        })
    }

    /// Forward resolution of `host`; any failure counts as "does not resolve".
    pub async fn resolve_dns(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }

        match bounded(self.config.dns_timeout(), async {
            self.resolver.lookup_ip(host).await.map_err(AppError::from)
        })
        .await
        {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(e) => {
                debug!("DNS probe failed for {}: {}", host, e);
                false
            }
        }
    }

    /// TLS handshake on the configured port, validated against the probe's
    /// trust roots.
    pub async fn check_tls(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }

        match bounded(self.config.tls_timeout(), self.handshake(host)).await {
            Ok(has_certificate) => has_certificate,
            Err(e) => {
                debug!("TLS probe failed for {}: {}", host, e);
                false
            }
        }
    }

    async fn handshake(&self, host: &str) -> Result<bool, AppError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| AppError::Tls(format!("invalid server name {}: {}", host, e)))?;

        let stream = TcpStream::connect((host, self.config.tls_port)).await?;
        let tls_stream = self.tls.connect(server_name, stream).await?;

        let (_, session) = tls_stream.get_ref();
        Ok(session
            .peer_certificates()
            .map_or(false, |chain| !chain.is_empty()))
    }

    /// Number of redirect responses before the final response, or `-1` when
    /// the chain cannot be measured.
    pub async fn count_redirects(&self, url: &str) -> i64 {
        match bounded(self.config.http_timeout(), self.follow_redirects(url)).await {
            Ok(hops) => hops,
            Err(e) => {
                debug!("Redirect probe failed for {}: {}", url, e);
                ProbeResult::UNDETERMINED_REDIRECTS
            }
        }
    }

    async fn follow_redirects(&self, url: &str) -> Result<i64, AppError> {
        let mut current = Url::parse(url)?;
        let mut hops: u32 = 0;

        loop {
            let response = self.client.get(current.clone()).send().await?;

            if !is_redirect(response.status()) {
                return Ok(i64::from(hops));
            }

            let Some(location) = response.headers().get(LOCATION) else {
                return Ok(i64::from(hops));
            };

            if hops >= self.config.max_redirects {
                return Err(AppError::InvalidInput(format!(
                    "exceeded {} redirects",
                    self.config.max_redirects
                )));
            }

            let location = location.to_str().map_err(|e| {
                AppError::InvalidInput(format!("unreadable Location header: {}", e))
            })?;

            // Handle relative URLs
            current = current.join(location)?;
            hops += 1;
        }
    }
}

#[async_trait]
impl ReputationProbe for NetworkProbe {
    async fn probe(&self, host: &str, url: &str) -> ProbeResult {
        let (dns_resolves, ssl_valid, num_redirects) = tokio::join!(
            self.resolve_dns(host),
            self.check_tls(host),
            self.count_redirects(url),
        );

        debug!(
            "Probed {}: dns={} tls={} redirects={}",
            url, dns_resolves, ssl_valid, num_redirects
        );

        ProbeResult {
            dns_resolves,
            ssl_valid,
            num_redirects,
        }
    }
}

fn build_resolver(dns_timeout: Duration) -> TokioAsyncResolver {
    let (config, mut opts) = system_conf::read_system_conf().unwrap_or_else(|e| {
        debug!("System resolver config unavailable ({}), using defaults", e);
        (ResolverConfig::default(), ResolverOpts::default())
    });
    opts.timeout = dns_timeout;
    opts.attempts = 1;

    TokioAsyncResolver::tokio(config, opts)
}

fn load_trust_roots(source: TrustRoots) -> RootCertStore {
    let mut roots = RootCertStore::empty();

    if source == TrustRoots::System {
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            debug!("Skipping unreadable system certificate source: {}", e);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!("Loaded {} system trust roots ({} ignored)", added, ignored);
    }

    if roots.is_empty() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    roots
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn bounded<T, F>(limit: Duration, future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    timeout(limit, future)
        .await
        .map_err(|_| AppError::Io(std::io::ErrorKind::TimedOut.into()))?
}
