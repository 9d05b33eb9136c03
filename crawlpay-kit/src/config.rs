//! Crawler configuration.
//!
//! Everything is fixed for the length of a run. The budget ceiling in
//! particular is never renegotiated mid-crawl.

use bon::Builder;
use crawlpay_core::{
    keys::{KeyError, KeyMaterial},
    signature::DEFAULT_VALIDITY_SECS,
    types::{AmountValue, Currency},
};
use url::Url;

use crate::decision::BudgetPolicy;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8787/";
pub const DEFAULT_CRAWLER_ID: &str = "crawlpay-crawler";
pub const DEFAULT_CEILING: u64 = 50;

/// Invalid or missing crawler configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("No signing key configured; set CRAWLPAY_SIGNING_SEED or CRAWLPAY_SIGNING_KEY_PEM")]
    MissingKey,
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

#[derive(Builder, Debug, Clone)]
pub struct CrawlerConfig {
    /// Identifier sent as `crawlerId` with every settlement claim.
    #[builder(into, default = DEFAULT_CRAWLER_ID.to_string())]
    pub crawler_id: String,
    /// Signed `GET` target returning the resource listing.
    pub listing_url: Url,
    /// Signed `POST` target for settlement claims.
    pub settle_url: Url,
    /// Highest amount the crawler will pay for one resource.
    #[builder(into)]
    pub ceiling: AmountValue,
    /// Only pay in this currency, when set.
    pub currency: Option<Currency>,
    /// Seconds each request signature stays valid.
    #[builder(default = DEFAULT_VALIDITY_SECS)]
    pub validity_secs: u64,
}

fn env_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|v| {
            v.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
                name,
                reason: err.to_string(),
            })
        })
        .transpose()
}

impl CrawlerConfig {
    /// Configuration for a server rooted at `server_url`.
    ///
    /// The listing and settlement endpoints are `resources` and `settle`
    /// relative to it.
    pub fn for_server(
        server_url: &Url,
        ceiling: impl Into<AmountValue>,
    ) -> Result<Self, url::ParseError> {
        Ok(CrawlerConfig::builder()
            .listing_url(server_url.join("resources")?)
            .settle_url(server_url.join("settle")?)
            .ceiling(ceiling)
            .build())
    }

    /// Read configuration from `CRAWLPAY_*` environment variables.
    ///
    /// - `CRAWLPAY_SERVER_URL` (default `http://127.0.0.1:8787/`)
    /// - `CRAWLPAY_CRAWLER_ID` (default `crawlpay-crawler`)
    /// - `CRAWLPAY_BUDGET_CEILING` (default 50)
    /// - `CRAWLPAY_BUDGET_CURRENCY` (default: any)
    /// - `CRAWLPAY_VALIDITY_SECS` (default 300)
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url = parse_env::<Url>("CRAWLPAY_SERVER_URL")?;
        let server_url = match server_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_SERVER_URL).map_err(|err| ConfigError::Invalid {
                name: "CRAWLPAY_SERVER_URL",
                reason: err.to_string(),
            })?,
        };
        let join = |path: &str| {
            server_url.join(path).map_err(|err| ConfigError::Invalid {
                name: "CRAWLPAY_SERVER_URL",
                reason: err.to_string(),
            })
        };

        let ceiling = parse_env::<AmountValue>("CRAWLPAY_BUDGET_CEILING")?
            .unwrap_or(AmountValue(DEFAULT_CEILING));

        Ok(CrawlerConfig::builder()
            .maybe_crawler_id(env_var("CRAWLPAY_CRAWLER_ID"))
            .listing_url(join("resources")?)
            .settle_url(join("settle")?)
            .ceiling(ceiling)
            .maybe_currency(parse_env::<Currency>("CRAWLPAY_BUDGET_CURRENCY")?)
            .maybe_validity_secs(parse_env("CRAWLPAY_VALIDITY_SECS")?)
            .build())
    }

    pub fn budget(&self) -> BudgetPolicy {
        BudgetPolicy::builder()
            .ceiling(self.ceiling)
            .maybe_currency(self.currency.clone())
            .build()
    }
}

/// The crawler's signing key.
///
/// `CRAWLPAY_SIGNING_SEED` holds a base64 32-byte Ed25519 seed;
/// `CRAWLPAY_SIGNING_KEY_PEM` names a PKCS#8 PEM file. `CRAWLPAY_KEY_ID`
/// overrides the default thumbprint key id.
pub fn signing_key_from_env() -> Result<KeyMaterial, ConfigError> {
    let material = if let Some(seed) = env_var("CRAWLPAY_SIGNING_SEED") {
        KeyMaterial::from_seed_base64(&seed)?
    } else if let Some(path) = env_var("CRAWLPAY_SIGNING_KEY_PEM") {
        let pem = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        KeyMaterial::from_pkcs8_pem(&pem)?
    } else {
        return Err(ConfigError::MissingKey);
    };

    Ok(match env_var("CRAWLPAY_KEY_ID") {
        Some(key_id) => material.with_key_id(key_id),
        None => material,
    })
}

#[cfg(test)]
mod tests {
    use url_macro::url;

    use super::*;

    #[test]
    fn test_for_server_joins_endpoints() {
        let config = CrawlerConfig::for_server(&url!("http://127.0.0.1:8787/"), 50u64).unwrap();

        assert_eq!(config.listing_url.as_str(), "http://127.0.0.1:8787/resources");
        assert_eq!(config.settle_url.as_str(), "http://127.0.0.1:8787/settle");
        assert_eq!(config.ceiling, AmountValue(50));
        assert_eq!(config.crawler_id, DEFAULT_CRAWLER_ID);
        assert_eq!(config.validity_secs, 300);
    }

    #[test]
    fn test_budget_from_config() {
        let config = CrawlerConfig::builder()
            .listing_url(url!("http://localhost/resources"))
            .settle_url(url!("http://localhost/settle"))
            .ceiling(20u64)
            .currency("usd".parse().unwrap())
            .build();

        let budget = config.budget();
        assert_eq!(budget.ceiling, AmountValue(20));
        assert_eq!(budget.currency.unwrap().as_str(), "USD");
    }
}
