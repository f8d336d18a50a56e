//! Hot-swappable filter handle.
//!
//! A reload builds the complete new filter first and only then swaps the
//! pointer, so a bad config never replaces a working one. Callers that already
//! hold an `Arc<RbacFilter>` finish on the generation they started with.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use rbac_core::error::Result;

use crate::config::{self, RbacConfig};
use crate::filter::RbacFilter;
use crate::obs::RbacMetrics;

#[derive(Debug)]
pub struct EngineHandle {
    current: RwLock<Arc<RbacFilter>>,
    metrics: Arc<RbacMetrics>,
}

impl EngineHandle {
    pub fn new(cfg: &RbacConfig, metrics: Arc<RbacMetrics>) -> Result<Self> {
        let filter = RbacFilter::from_config(cfg, Arc::clone(&metrics))?;
        Ok(Self {
            current: RwLock::new(Arc::new(filter)),
            metrics,
        })
    }

    /// Current generation.
    pub fn load(&self) -> Arc<RbacFilter> {
        // A poisoned lock still holds a fully-built filter.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current generation, returning the previous one.
    pub fn swap(&self, next: RbacFilter) -> Arc<RbacFilter> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(next))
    }

    pub fn metrics(&self) -> &Arc<RbacMetrics> {
        &self.metrics
    }

    /// Rebuild from `cfg`. On error the current generation stays active.
    pub fn reload(&self, cfg: &RbacConfig) -> Result<()> {
        match RbacFilter::from_config(cfg, Arc::clone(&self.metrics)) {
            Ok(next) => {
                self.swap(next);
                self.metrics.reloads.inc(&[("result", "ok")]);
                info!("rbac rules reloaded");
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match config::load_from_file(path) {
            Ok(cfg) => self.reload(&cfg),
            Err(e) => {
                warn!(path = %path.display(), "rbac config could not be loaded");
                self.reject(e)
            }
        }
    }

    fn reject(&self, e: rbac_core::RbacError) -> Result<()> {
        self.metrics.reloads.inc(&[("result", "error")]);
        warn!(code = e.code().as_str(), error = %e, "rbac reload rejected; keeping previous rules");
        Err(e)
    }
}
