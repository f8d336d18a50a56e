//! Policy configuration loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use rbac_core::error::{RbacError, Result};

pub use schema::{
    Action, AuthenticatedSpec, HeaderMatchSpec, MatcherSpec, MetadataSpec, PolicyConfig,
    RbacConfig, RulesConfig, ServerSection, StringMatchSpec,
};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<RbacConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        RbacError::Internal(format!("read config failed ({}): {e}", path.display()))
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<RbacConfig> {
    let cfg: RbacConfig = serde_yaml::from_str(s)
        .map_err(|e| RbacError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
