//! Generation orchestration.
//!
//! Wires the pipeline together: fetch the delegation feed, normalize the
//! ranges, build the lookup table, render the PAC artifact. Each run builds
//! its own table from its own inputs; nothing is shared or cached between
//! runs.

use ipnet::Ipv4Net;
use log::info;

use crate::error::{PacError, Result};
use crate::feed::FeedSource;
use crate::normalize::normalize;
use crate::pac::{self, Balance};
use crate::table::{LookupTable, DEFAULT_BUCKET_COUNT, DEFAULT_MASK_STEP};

/// Generator configuration record.
pub struct GeneratorOptions {
    /// Proxy directive strings, in rotation order
    pub proxies: Vec<String>,
    /// Directive-selection policy
    pub balance: Balance,
    /// Addresses, CIDR networks, or hostnames that bypass the proxy
    pub no_proxy: Vec<String>,
    /// Hash table width
    pub bucket_count: u32,
    /// Fragmentation step
    pub step: u8,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            proxies: vec!["SOCKS 127.0.0.1:8964".to_string()],
            balance: Balance::No,
            no_proxy: vec!["192.168.0.0/24".to_string()],
            bucket_count: DEFAULT_BUCKET_COUNT,
            step: DEFAULT_MASK_STEP,
        }
    }
}

impl GeneratorOptions {
    /// Create options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the proxy directive list.
    pub fn with_proxies(mut self, proxies: Vec<String>) -> Self {
        self.proxies = proxies;
        self
    }

    /// Set the balance policy.
    pub fn with_balance(mut self, balance: Balance) -> Self {
        self.balance = balance;
        self
    }

    /// Set the bypass list.
    pub fn with_no_proxy(mut self, no_proxy: Vec<String>) -> Self {
        self.no_proxy = no_proxy;
        self
    }

    /// Set the hash table width.
    pub fn with_bucket_count(mut self, bucket_count: u32) -> Self {
        self.bucket_count = bucket_count;
        self
    }

    /// Set the fragmentation step.
    pub fn with_step(mut self, step: u8) -> Self {
        self.step = step;
        self
    }

    /// Validate the record before any pipeline work.
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(PacError::ConfigError("step must be at least 1".into()));
        }
        if self.bucket_count == 0 {
            return Err(PacError::ConfigError(
                "bucket count must be at least 1".into(),
            ));
        }
        if self.proxies.is_empty() {
            return Err(PacError::ConfigError(
                "at least one proxy directive is required".into(),
            ));
        }
        Ok(())
    }
}

/// PAC generator: feed source plus configuration.
pub struct Generator {
    options: GeneratorOptions,
    feed: FeedSource,
}

impl Generator {
    /// Create a generator, validating the options up front.
    pub fn new(options: GeneratorOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            feed: FeedSource::new(),
        })
    }

    /// Replace the feed source.
    pub fn with_feed(mut self, feed: FeedSource) -> Self {
        self.feed = feed;
        self
    }

    /// The configured options.
    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Fetch the raw network list from the configured feed.
    pub fn fetch(&self) -> Result<Vec<Ipv4Net>> {
        self.feed.fetch()
    }

    /// Normalize raw networks and build the lookup table.
    pub fn build_table(&self, networks: Vec<Ipv4Net>) -> Result<LookupTable> {
        let raw_count = networks.len();
        let merged = normalize(networks);
        info!(
            "normalized {} raw ranges into {} covering ranges",
            raw_count,
            merged.len()
        );

        let table = LookupTable::build(&merged, self.options.step, self.options.bucket_count)?;
        let stats = table.stats();
        info!(
            "built table: {} entries in {} of {} buckets, {} probe steps, estimated cost {:.3}",
            stats.entries,
            stats.occupied_buckets,
            table.bucket_count(),
            stats.probe_steps,
            stats.estimated_cost
        );
        Ok(table)
    }

    /// Render the PAC artifact for a built table.
    pub fn render(&self, table: &LookupTable) -> Result<String> {
        pac::render(
            table,
            &self.options.proxies,
            self.options.balance,
            &self.options.no_proxy,
        )
    }

    /// Fetch, build, and render in one call.
    pub fn run(&self) -> Result<String> {
        let table = self.build_table(self.fetch()?)?;
        self.render(&table)
    }
}
