//! Jinja-style boolean conditions used by judgement stages

use jumeaux_config::{ConfigError, ConfigResult};
use minijinja::{Environment, Error, ErrorKind};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// Filter: whether `value` contains a match of `pattern`
fn regex_match(value: &str, pattern: &str) -> Result<bool, Error> {
    let re = Regex::new(pattern)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid regex: {}", e)))?;
    Ok(re.is_match(value))
}

/// A set of expressions of which any one being truthy satisfies the set
pub struct AnyCondition {
    env: Environment<'static>,
    expressions: Vec<String>,
}

impl AnyCondition {
    /// Compile-check every expression up front
    pub fn new(stage: &str, expressions: Vec<String>) -> ConfigResult<Self> {
        let mut env = Environment::new();
        env.add_filter("regex_match", regex_match);

        for source in &expressions {
            env.compile_expression(source)
                .map_err(|e| ConfigError::InvalidStageConfig {
                    stage: stage.to_string(),
                    reason: format!("invalid expression '{}': {}", source, e),
                })?;
        }

        Ok(Self { env, expressions })
    }

    /// Evaluate in order and stop at the first truthy expression
    ///
    /// An expression that fails to evaluate counts as false.
    pub fn any(&self, context: impl Serialize) -> bool {
        let context = minijinja::Value::from_serialize(&context);
        self.expressions.iter().any(|source| {
            match self
                .env
                .compile_expression(source)
                .and_then(|expr| expr.eval(&context))
            {
                Ok(value) => value.is_true(),
                Err(e) => {
                    warn!("Condition '{}' failed to evaluate: {}", source, e);
                    false
                }
            }
        })
    }
}
