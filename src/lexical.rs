use std::sync::OnceLock;

use regex::Regex;
use url::{ParseError, Url};

const KEYWORDS: [&str; 7] = ["login", "verify", "secure", "bank", "boleto", "nfe", "cartao"];

fn ip_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://(\d{1,3}\.){3}\d{1,3}").expect("static IPv4 URL pattern")
    })
}

/// Best-effort structural view of a URL string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub path: String,
    /// False when the parser rejected the input outright.
    pub parsed: bool,
}

impl ParsedUrl {
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) => Self {
                scheme: url.scheme().to_string(),
                host: url.host_str().map(strip_brackets).unwrap_or_default(),
                path: url.path().to_string(),
                parsed: true,
            },
            // "example.com.br/login": no scheme, so everything is path
            Err(ParseError::RelativeUrlWithoutBase) => Self {
                scheme: String::new(),
                host: String::new(),
                path: raw
                    .split(|c| c == '?' || c == '#')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                parsed: true,
            },
            Err(_) => Self::default(),
        }
    }

    /// Host, or the whole path when the authority is empty.
    pub fn host_guess(&self) -> &str {
        if self.host.is_empty() {
            &self.path
        } else {
            &self.host
        }
    }
}

fn strip_brackets(host: &str) -> String {
    host.trim_start_matches('[').trim_end_matches(']').to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalFeatures {
    pub url_length: usize,
    pub num_dots: usize,
    pub num_hyphens: usize,
    pub num_slashes: usize,
    pub has_at_symbol: bool,
    pub has_https: bool,
    pub has_login: bool,
    pub has_verify: bool,
    pub has_secure: bool,
    pub has_bank: bool,
    pub has_boleto: bool,
    pub has_nfe: bool,
    pub has_cartao: bool,
    pub ends_with_br: bool,
    pub has_ip: bool,
    /// Target for the DNS and TLS sub-probes.
    pub host: String,
}

impl LexicalFeatures {
    pub fn analyze(url: &str) -> Self {
        let parsed = ParsedUrl::parse(url);
        let lowered = url.to_lowercase();
        let [has_login, has_verify, has_secure, has_bank, has_boleto, has_nfe, has_cartao] =
            KEYWORDS.map(|keyword| lowered.contains(keyword));

        let host = parsed.host_guess().to_string();
        let ends_with_br = if parsed.parsed {
            host.to_lowercase().ends_with(".br")
        } else {
            lowered.ends_with(".br")
        };

        Self {
            url_length: url.chars().count(),
            num_dots: url.matches('.').count(),
            num_hyphens: url.matches('-').count(),
            num_slashes: url.matches('/').count(),
            has_at_symbol: url.contains('@'),
            has_https: parsed.scheme == "https",
            has_login,
            has_verify,
            has_secure,
            has_bank,
            has_boleto,
            has_nfe,
            has_cartao,
            ends_with_br,
            has_ip: ip_url_pattern().is_match(url),
            host,
        }
    }
}
