//! Named policies.

use std::sync::Arc;

use rbac_core::error::{RbacError, Result};
use rbac_core::Attributes;

use crate::condition::{Condition, Expression};
use crate::config::schema::PolicyConfig;
use crate::expr::ExpressionBuilder;

/// A named condition. The name doubles as the effective policy id reported
/// when this policy decides a request.
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    condition: Condition,
}

impl Policy {
    pub fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }

    /// Compile `any(permissions) && any(principals) && condition?`.
    ///
    /// `builder` must be set when the policy carries an expression condition.
    pub fn compile(
        name: &str,
        cfg: &PolicyConfig,
        builder: Option<&Arc<dyn ExpressionBuilder>>,
    ) -> Result<Self> {
        let permissions = cfg
            .permissions
            .iter()
            .map(|m| Condition::compile(m, name))
            .collect::<Result<Vec<_>>>()?;
        let principals = cfg
            .principals
            .iter()
            .map(|m| Condition::compile(m, name))
            .collect::<Result<Vec<_>>>()?;

        let mut all = vec![Condition::Or(permissions), Condition::Or(principals)];

        if let Some(source) = &cfg.condition {
            let builder = builder.ok_or_else(|| {
                RbacError::Internal(format!(
                    "policy {name} has a condition but no expression builder was provided"
                ))
            })?;
            all.push(Condition::Expression(Expression::compile(source, builder, name)?));
        }

        Ok(Self::new(name, Condition::And(all)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn matches(&self, attrs: &Attributes<'_>) -> bool {
        self.condition.evaluate(attrs)
    }
}
