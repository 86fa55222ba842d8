//! Environment-driven service configuration.

use anyhow::{Context, Result};
use axum::http::Method;
use regex::Regex;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Exact origins allowed for cross-origin requests; `*` means any.
    pub allowed_origins: Vec<String>,
    /// Optional regex matched against the full origin (e.g. preview
    /// deploy subdomains).
    pub allowed_origin_regex: Option<Regex>,
    pub max_upload_bytes: usize,
    pub ocr_text_limit: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("BIND_ADDR", DEFAULT_BIND_ADDR);
        let allowed_origins = parse_origins(&env_or("ALLOWED_ORIGINS", "*"));
        let allowed_origin_regex = match std::env::var("ALLOWED_ORIGIN_REGEX") {
            Ok(pattern) => {
                Some(Regex::new(&pattern).context("invalid ALLOWED_ORIGIN_REGEX")?)
            }
            Err(_) => None,
        };
        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.parse().context("invalid MAX_UPLOAD_BYTES")?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let ocr_text_limit = match std::env::var("OCR_TEXT_LIMIT") {
            Ok(raw) => raw.parse().context("invalid OCR_TEXT_LIMIT")?,
            Err(_) => crate::textnorm::DEFAULT_TEXT_LIMIT,
        };

        Ok(Self {
            bind_addr,
            allowed_origins,
            allowed_origin_regex,
            max_upload_bytes,
            ocr_text_limit,
        })
    }

    fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Build the CORS layer for the configured origin rules.
    ///
    /// Credentialed CORS cannot use wildcard methods/headers, so the
    /// non-wildcard branch lists methods and mirrors request headers.
    pub fn cors_layer(&self) -> CorsLayer {
        if self.allows_any_origin() {
            return CorsLayer::permissive();
        }

        let origins = self.allowed_origins.clone();
        let pattern = self.allowed_origin_regex.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin, _| {
                origin
                    .to_str()
                    .map(|o| origin_allowed(&origins, pattern.as_ref(), o))
                    .unwrap_or(false)
            }))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// An origin passes if it matches the exact list or the optional pattern.
fn origin_allowed(origins: &[String], pattern: Option<&Regex>, origin: &str) -> bool {
    origins.iter().any(|allowed| allowed == origin)
        || pattern.map(|re| re.is_match(origin)).unwrap_or(false)
}
