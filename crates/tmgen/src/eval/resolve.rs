//! dependency ordered evaluation of named expressions
//!
//! Globals and `lets` may reference each other in any order: `global.a = global.b + 1` is valid
//! even when `b` is defined after `a`. Definitions are evaluated once everything they reference in
//! their own namespace is available; a round without progress means there is a cycle.
use super::{EvalError, Evaluator};
use crate::info::Range;
use crate::visit::{Reference, VisitReferences};
use indexmap::IndexMap;

/// A named expression that ends up as a namespace entry
#[derive(Debug, Clone)]
pub struct Definition {
    pub name: String,
    pub expr: hcl::Expression,
    pub range: Range,
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("{range}: evaluating {namespace}.{name}")]
    Eval {
        namespace: String,
        name: String,
        range: Range,
        #[source]
        source: EvalError,
    },
    #[error("{range}: {namespace}.{name} has a dependency cycle")]
    Cycle {
        namespace: String,
        name: String,
        range: Range,
    },
}

impl ResolveError {
    pub fn range(&self) -> &Range {
        match self {
            ResolveError::Eval { range, .. } | ResolveError::Cycle { range, .. } => range,
        }
    }
}

/// Evaluate `definitions` into `namespace` of `evaluator`
///
/// Later definitions of the same name replace earlier ones. The namespace is (re)set even when
/// there is nothing to define, so references to it resolve to an empty object.
#[tracing::instrument(level = "debug", skip(evaluator, definitions))]
pub fn resolve(
    evaluator: &mut Evaluator,
    namespace: &str,
    definitions: impl IntoIterator<Item = Definition>,
) -> Result<(), ResolveError> {
    let mut pending: IndexMap<String, Definition> = IndexMap::new();
    for definition in definitions {
        pending.insert(definition.name.clone(), definition);
    }

    let mut resolved = hcl::value::Map::new();
    evaluator.set_namespace(namespace, resolved.clone());

    while !pending.is_empty() {
        let mut progressed = false;

        let names: Vec<String> = pending.keys().cloned().collect();
        for name in names {
            let definition = &pending[&name];
            let dependencies = dependencies(&definition.expr, namespace);

            if dependencies.iter().any(|dep| dep.as_deref() == Some(name.as_str())) {
                return Err(cycle(namespace, definition));
            }

            let waiting = dependencies.iter().any(|dep| match dep {
                Some(dep) => pending.contains_key(dep),
                // the namespace as a whole
                None => pending.len() > 1,
            });
            if waiting {
                tracing::trace!(%name, "waiting for dependencies");
                continue;
            }

            let value = evaluator
                .eval(&definition.expr)
                .map_err(|source| ResolveError::Eval {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                    range: definition.range.clone(),
                    source,
                })?;

            tracing::trace!(%name, "resolved");
            resolved.insert(name.clone(), value);
            evaluator.set_namespace(namespace, resolved.clone());
            pending.shift_remove(&name);
            progressed = true;
        }

        if !progressed {
            if let Some((_, definition)) = pending.first() {
                return Err(cycle(namespace, definition));
            }
        }
    }

    Ok(())
}

/// Names of `namespace` referenced by `expr`, `None` for references to the whole namespace
fn dependencies(expr: &hcl::Expression, namespace: &str) -> Vec<Option<String>> {
    expr.references()
        .into_iter()
        .filter_map(|reference| match reference {
            Reference::Variable { root, path } if root == namespace => {
                Some(path.into_iter().next())
            }
            _ => None,
        })
        .collect()
}

fn cycle(namespace: &str, definition: &Definition) -> ResolveError {
    ResolveError::Cycle {
        namespace: namespace.to_string(),
        name: definition.name.clone(),
        range: definition.range.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_expression;
    use hcl::Value;
    use pretty_assertions::assert_eq;

    fn def(name: &str, expr: &str) -> Definition {
        Definition {
            name: name.to_string(),
            expr: parse_expression(expr).unwrap(),
            range: Range::default(),
        }
    }

    #[test]
    fn resolves_out_of_order() {
        let mut evaluator = Evaluator::new();
        resolve(
            &mut evaluator,
            "global",
            vec![
                def("a", r#""${global.b}-a""#),
                def("b", r#""${global.c}-b""#),
                def("c", r#""c""#),
            ],
        )
        .unwrap();

        let globals = evaluator.namespace("global").unwrap();
        assert_eq!(globals["a"], Value::from("c-b-a"));
        assert_eq!(globals.len(), 3);
    }

    #[test]
    fn later_definitions_override() {
        let mut evaluator = Evaluator::new();
        resolve(
            &mut evaluator,
            "let",
            vec![def("a", "1"), def("a", r#""two""#)],
        )
        .unwrap();

        assert_eq!(
            evaluator.namespace("let").unwrap()["a"],
            Value::from("two")
        );
    }

    #[test]
    fn cycles_are_reported() {
        let mut evaluator = Evaluator::new();
        let err = resolve(
            &mut evaluator,
            "global",
            vec![def("a", "global.b"), def("b", "global.a")],
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Cycle { .. }));

        let err = resolve(&mut evaluator, "global", vec![def("a", "global.a")]).unwrap_err();
        assert!(matches!(err, ResolveError::Cycle { name, .. } if name == "a"));
    }

    #[test]
    fn undefined_names_fail_evaluation() {
        let mut evaluator = Evaluator::new();
        let err = resolve(&mut evaluator, "global", vec![def("a", "global.nope")]).unwrap_err();
        assert!(matches!(err, ResolveError::Eval { name, .. } if name == "a"));
    }

    #[test]
    fn other_namespaces_are_usable() {
        let mut evaluator = Evaluator::new();
        resolve(&mut evaluator, "global", vec![def("a", "1")]).unwrap();
        resolve(&mut evaluator, "let", vec![def("b", r#""${global.a}-b""#)]).unwrap();

        assert_eq!(evaluator.namespace("let").unwrap()["b"], Value::from("1-b"));
    }
}
