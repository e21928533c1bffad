use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dwfs_core::cache::{DEFAULT_TTL, ResponseCache};
use dwfs_core::transport::DEFAULT_MAX_TRIES;
use dwfs_core::{DEFAULT_BASE_URL, DEFAULT_POLL_TRIES, DwClient, PathCodec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsConfig {
    pub auth_token: String,
    pub api_url: String,
    pub root_dir: String,
    pub path_prefix: String,
    pub cache_ttl: Duration,
    pub max_tries: u32,
    pub poll_tries: u32,
    pub compatibility_mode: bool,
}

impl ContentsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_token = lookup("DW_AUTH_TOKEN")
            .filter(|value| !value.trim().is_empty())
            .context("DW_AUTH_TOKEN is not set")?;
        let api_url = lookup("DW_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let root_dir = lookup("DW_ROOT_DIR").unwrap_or_default();
        let path_prefix = lookup("DW_PATH_PREFIX").unwrap_or_default();
        let cache_ttl = Duration::from_secs(read_u64(
            &lookup,
            "DW_CACHE_TTL_SECS",
            DEFAULT_TTL.as_secs(),
        ));
        let max_tries = read_u32(&lookup, "DW_MAX_TRIES", DEFAULT_MAX_TRIES);
        let poll_tries = read_u32(&lookup, "DW_POLL_TRIES", DEFAULT_POLL_TRIES);
        let compatibility_mode = read_bool(&lookup, "DW_COMPATIBILITY_MODE", false);

        Ok(Self {
            auth_token,
            api_url,
            root_dir,
            path_prefix,
            cache_ttl,
            max_tries,
            poll_tries,
            compatibility_mode,
        })
    }

    pub fn build_client(&self) -> anyhow::Result<DwClient> {
        let client = DwClient::with_base_url(&self.api_url, self.auth_token.clone())
            .with_context(|| format!("failed to build API client for {}", self.api_url))?;
        Ok(client
            .with_cache(Arc::new(ResponseCache::new(self.cache_ttl)))
            .with_max_tries(self.max_tries)
            .with_poll_tries(self.poll_tries))
    }

    pub fn codec(&self) -> PathCodec {
        PathCodec::new(&self.path_prefix, &self.root_dir)
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn read_u32<F>(lookup: &F, name: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    u32::try_from(read_u64(lookup, name, u64::from(default))).unwrap_or(default)
}
