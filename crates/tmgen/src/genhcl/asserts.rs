use super::Error;
use crate::config::AssertConfig;
use crate::errors::ErrorList;
use crate::eval::{type_name, EvalError, Evaluator};
use crate::info::Range;
use hcl::Value;

/// An evaluated `assert` block
#[derive(Debug, Clone, PartialEq)]
pub struct Assert {
    pub assertion: bool,
    pub message: String,
    pub warning: bool,
    pub range: Range,
}

impl Assert {
    /// A false assertion that is not a warning
    pub fn is_failure(&self) -> bool {
        !self.assertion && !self.warning
    }
}

/// Evaluate every assertion; evaluation errors of all of them are reported together
pub(super) fn eval_asserts(configs: &[AssertConfig], evaluator: &Evaluator) -> Result<Vec<Assert>, Error> {
    let mut errors = ErrorList::new();
    let asserts: Vec<Assert> = configs
        .iter()
        .filter_map(|config| errors.add_result(eval_assert(config, evaluator)))
        .collect();

    errors.finalize().map_err(Error::from_list)?;
    Ok(asserts)
}

fn eval_assert(config: &AssertConfig, evaluator: &Evaluator) -> Result<Assert, Error> {
    let assertion = evaluator
        .eval_bool(&config.assertion.expr)
        .map_err(|source| Error::Assert {
            field: "assertion",
            range: config.assertion.expr_range.clone(),
            source,
        });

    let message = evaluator
        .eval(&config.message.expr)
        .and_then(|value| match value {
            Value::String(message) => Ok(message),
            other => Err(EvalError::Type {
                expected: "string",
                found: type_name(&other),
            }),
        })
        .map_err(|source| Error::Assert {
            field: "message",
            range: config.message.expr_range.clone(),
            source,
        });

    let warning = match &config.warning {
        Some(warning) => evaluator
            .eval_bool(&warning.expr)
            .map_err(|source| Error::Assert {
                field: "warning",
                range: warning.expr_range.clone(),
                source,
            }),
        None => Ok(false),
    };

    match (assertion, message, warning) {
        (Ok(assertion), Ok(message), Ok(warning)) => Ok(Assert {
            assertion,
            message,
            warning,
            range: config.range.clone(),
        }),
        (assertion, message, warning) => Err(Error::from_list(
            [assertion.err(), message.err(), warning.err()]
                .into_iter()
                .flatten()
                .collect(),
        )),
    }
}
