//! Shared application state for the decision service.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rbac_core::error::Result;

use crate::config::RbacConfig;
use crate::filter::RbacFilter;
use crate::obs::RbacMetrics;
use crate::reload::EngineHandle;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config_path: PathBuf,
    engines: EngineHandle,
    metrics: Arc<RbacMetrics>,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can report a bad config instead of panicking.
    pub fn new(cfg: &RbacConfig, config_path: impl Into<PathBuf>) -> Result<Self> {
        let metrics = Arc::new(RbacMetrics::default());
        let engines = EngineHandle::new(cfg, Arc::clone(&metrics))?;
        Ok(Self {
            inner: Arc::new(AppStateInner {
                config_path: config_path.into(),
                engines,
                metrics,
            }),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    pub fn engines(&self) -> &EngineHandle {
        &self.inner.engines
    }

    /// Current filter generation.
    pub fn filter(&self) -> Arc<RbacFilter> {
        self.inner.engines.load()
    }

    pub fn metrics(&self) -> Arc<RbacMetrics> {
        Arc::clone(&self.inner.metrics)
    }
}
