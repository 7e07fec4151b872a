//! Cover art download.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

/// Cover images larger than this are truncated garbage or not covers at all.
const MAX_ARTWORK_BYTES: u64 = 10 * 1024 * 1024;

pub trait ArtworkFetcher: Send + Sync {
    /// Download `url` into `target`.
    fn fetch(&self, url: &str, target: &Path) -> Result<()>;
}

pub struct HttpArtworkFetcher {
    agent: ureq::Agent,
}

impl HttpArtworkFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("tracksync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Default for HttpArtworkFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtworkFetcher for HttpArtworkFetcher {
    fn fetch(&self, url: &str, target: &Path) -> Result<()> {
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("Failed to request {}", url))?;
        let mut reader = response.into_reader().take(MAX_ARTWORK_BYTES);
        let mut file = File::create(target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        io::copy(&mut reader, &mut file)
            .with_context(|| format!("Failed to download {}", url))?;
        Ok(())
    }
}
