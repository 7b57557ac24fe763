use tracing::{debug, info};

use super::file_search::FileSearchSettings;
use super::orchestrator::{start_search, SearchHandle, SearchTarget};
use crate::cancel::CancellationToken;
use crate::config::SearchConfig;
use crate::coupon::CouponCode;
use crate::errors::SearchResult;

/// Coupon verification against the configured coupon files.
///
/// The engine holds a validated configuration and starts an independent
/// search for every coupon it is asked about. Searches share nothing, so one
/// engine can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    config: SearchConfig,
}

impl SearchEngine {
    /// Validates `config` (including that every coupon file exists) and
    /// builds an engine from it.
    pub fn new(config: SearchConfig) -> SearchResult<Self> {
        config.validate()?;
        debug!(
            "Engine ready: {} coupon files, coupon_min {}",
            config.coupon_files.len(),
            config.coupon_min
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Worker layout applied to each file
    pub fn settings(&self) -> FileSearchSettings {
        FileSearchSettings {
            producers: self.config.producers_per_file,
            consumers: self.config.consumers_per_file,
            queue_capacity_per_producer: self.config.queue_capacity_per_producer,
        }
    }

    /// Validates `code` and starts searching every coupon file for it.
    ///
    /// The search stops early when `cancel` fires; its verdict is then a
    /// rejection.
    pub fn search(&self, code: &str, cancel: &CancellationToken) -> SearchResult<SearchHandle> {
        let code = CouponCode::with_len_range(code, self.config.token_len_range())?;
        let target = SearchTarget::new(
            code.as_str(),
            self.config.coupon_files.clone(),
            self.config.coupon_min,
        )?;
        self.start(&target, cancel)
    }

    /// Starts a search for an explicit target with this engine's tuning.
    pub fn start(&self, target: &SearchTarget, cancel: &CancellationToken) -> SearchResult<SearchHandle> {
        start_search(target, self.settings(), self.config.max_workers.get(), cancel)
    }

    /// Searches for `code` and blocks until the verdict.
    pub fn check_coupon(&self, code: &str, cancel: &CancellationToken) -> SearchResult<bool> {
        let mut handle = self.search(code, cancel)?;
        let accepted = handle.evaluate()?;
        info!("Coupon {}", if accepted { "accepted" } else { "rejected" });
        Ok(accepted)
    }
}
