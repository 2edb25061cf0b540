//! `tm_dynamic` expansion
//!
//! ```hcl
//! tm_dynamic "ingress" {
//!   for_each   = global.ports
//!   iterator   = port
//!   labels     = ["rule-${port.key}"]
//!   condition  = tm_length(global.ports) > 0
//!   attributes = { from = port.value }
//!   content {
//!     protocol = "tcp"
//!   }
//! }
//! ```
//!
//! generates one `ingress` block per element of `for_each`. Without `for_each` exactly one block is
//! generated. The iterator (named after the generated block type unless `iterator` is given)
//! exposes `key` and `value` of the current element.
use super::body::{copy_body, new_block};
use super::Error;
use crate::ast::{self, Attribute, Block};
use crate::errors::ErrorList;
use crate::eval::{type_name, Evaluator};
use hcl::{Expression, Identifier, ObjectKey, Structure, Value};

/// The validated parts of a `tm_dynamic` block
struct DynamicBlock<'a> {
    /// type of the generated blocks
    block_type: &'a str,
    attributes: Option<&'a Attribute>,
    for_each: Option<&'a Attribute>,
    iterator: Option<(String, &'a Attribute)>,
    labels: Option<&'a Attribute>,
    condition: Option<&'a Attribute>,
    content: Option<&'a ast::Body>,
}

impl<'a> DynamicBlock<'a> {
    /// Check the structure of `block`, reporting all problems at once
    fn parse(block: &'a Block) -> Result<Self, Error> {
        let mut errors = ErrorList::new();

        if block.labels.len() != 1 {
            errors.add(Error::DynamicLabel {
                range: block.labels_range.clone(),
            });
        }

        let mut dynamic = DynamicBlock {
            block_type: block.labels.first().map(String::as_str).unwrap_or_default(),
            attributes: None,
            for_each: None,
            iterator: None,
            labels: None,
            condition: None,
            content: None,
        };

        for attribute in &block.body.attributes {
            match attribute.name.as_str() {
                "attributes" => dynamic.attributes = Some(attribute),
                "for_each" => dynamic.for_each = Some(attribute),
                "labels" => dynamic.labels = Some(attribute),
                "condition" => dynamic.condition = Some(attribute),
                "iterator" => match &attribute.expr {
                    Expression::Variable(variable) => {
                        dynamic.iterator = Some((variable.to_string(), attribute))
                    }
                    _ => errors.add(Error::InvalidIterator {
                        range: attribute.expr_range.clone(),
                    }),
                },
                name => errors.add(Error::DynamicAttribute {
                    name: name.to_string(),
                    range: attribute.range.clone(),
                }),
            }
        }

        for nested in &block.body.blocks {
            if nested.ident != "content" {
                errors.add(Error::DynamicBlock {
                    name: nested.ident.clone(),
                    range: nested.range.clone(),
                });
                continue;
            }

            if dynamic.content.is_some() {
                errors.add(Error::DynamicMultipleContent {
                    range: nested.range.clone(),
                });
                continue;
            }

            dynamic.content = Some(&nested.body);
        }

        let has_content = block.body.blocks.iter().any(|b| b.ident == "content");
        if !has_content && dynamic.attributes.is_none() {
            errors.add(Error::DynamicMissingContent {
                range: block.body.range.clone(),
            });
        }

        if dynamic.for_each.is_none() {
            if let Some(iterator) = block.body.attribute("iterator") {
                errors.add(Error::IteratorWithoutForEach {
                    range: iterator.range.clone(),
                });
            }
        }

        errors.finalize().map_err(Error::from_list)?;
        Ok(dynamic)
    }
}

/// Expand a `tm_dynamic` block into `dest`
///
/// The condition is evaluated first; when false nothing else is evaluated. Expansion stops at the
/// first element that fails.
#[tracing::instrument(level = "trace", skip_all, fields(block_type = tracing::field::Empty))]
pub(super) fn append_dynamic_blocks(
    dest: &mut Vec<Structure>,
    block: &Block,
    evaluator: &mut Evaluator,
) -> Result<(), Error> {
    let dynamic = DynamicBlock::parse(block)?;
    tracing::Span::current().record("block_type", dynamic.block_type);

    if let Some(condition) = dynamic.condition {
        let condition = evaluator
            .eval_bool(&condition.expr)
            .map_err(|source| Error::DynamicCondition {
                range: condition.expr_range.clone(),
                source,
            })?;

        if !condition {
            tracing::trace!("condition is false, ignoring block");
            return Ok(());
        }
    }

    let Some(for_each) = dynamic.for_each else {
        tracing::trace!("no for_each, generating single block");
        return append_dynamic_block(dest, evaluator, &dynamic);
    };

    let collection = evaluator
        .eval(&for_each.expr)
        .map_err(|source| Error::ForEach {
            range: for_each.expr_range.clone(),
            source,
        })?;

    let elements: Vec<(Value, Value)> = match collection {
        Value::Array(values) => values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| (Value::Number(hcl::Number::from(idx as u64)), value))
            .collect(),
        Value::Object(object) => {
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
                .into_iter()
                .map(|(key, value)| (Value::String(key), value))
                .collect()
        }
        other => {
            return Err(Error::ForEachType {
                range: for_each.expr_range.clone(),
                found: type_name(&other),
            })
        }
    };

    let (iterator, iterator_range) = match &dynamic.iterator {
        Some((name, attribute)) => (name.clone(), attribute.expr_range.clone()),
        None => (dynamic.block_type.to_string(), block.labels_range.clone()),
    };

    let mut scope = evaluator
        .scoped(iterator.as_str())
        .map_err(|_| Error::IteratorInUse {
            name: iterator.clone(),
            range: iterator_range,
        })?;

    tracing::trace!(%iterator, count = elements.len(), "generating blocks");
    for (key, value) in elements {
        let mut values = hcl::value::Map::new();
        values.insert("key".to_string(), key);
        values.insert("value".to_string(), value);
        scope.set(values);

        append_dynamic_block(dest, &mut scope, &dynamic)?;
    }

    Ok(())
}

/// Generate one block
fn append_dynamic_block(
    dest: &mut Vec<Structure>,
    evaluator: &mut Evaluator,
    dynamic: &DynamicBlock,
) -> Result<(), Error> {
    let labels = match dynamic.labels {
        Some(labels) => eval_labels(labels, evaluator)?,
        None => vec![],
    };

    let mut structures = vec![];
    let mut attribute_names = vec![];

    if let Some(attributes) = dynamic.attributes {
        for (name, expr) in eval_attributes(attributes, evaluator)? {
            attribute_names.push(name.clone());
            structures.push(Structure::Attribute(hcl::Attribute::new(
                Identifier::unchecked(name),
                expr,
            )));
        }
    }

    if let Some(content) = dynamic.content {
        if let Some(conflict) = content
            .attributes
            .iter()
            .find(|attribute| attribute_names.contains(&attribute.name))
        {
            return Err(Error::AttributeConflict {
                name: conflict.name.clone(),
                range: conflict.range.clone(),
            });
        }

        copy_body(&mut structures, content, evaluator)?;
    }

    dest.push(Structure::Block(new_block(
        dynamic.block_type,
        labels,
        structures,
    )));
    Ok(())
}

fn eval_labels(labels: &Attribute, evaluator: &Evaluator) -> Result<Vec<String>, Error> {
    let value = evaluator.eval(&labels.expr).map_err(|source| Error::Labels {
        range: labels.expr_range.clone(),
        source,
    })?;

    let type_error = || Error::LabelsType {
        range: labels.expr_range.clone(),
    };

    let Value::Array(values) = value else {
        return Err(type_error());
    };

    values
        .into_iter()
        .map(|value| match value {
            Value::String(label) => Ok(label),
            _ => Err(type_error()),
        })
        .collect()
}

/// Names and partially evaluated values of `attributes`, in definition order
fn eval_attributes(
    attributes: &Attribute,
    evaluator: &Evaluator,
) -> Result<Vec<(String, Expression)>, Error> {
    let range = &attributes.expr_range;
    let expr = evaluator
        .partial_eval(&attributes.expr)
        .map_err(|source| Error::Attributes {
            range: range.clone(),
            source,
        })?;

    let object = match expr {
        Expression::Object(object) => object,
        other => {
            return Err(Error::AttributesType {
                range: range.clone(),
                found: expression_type(&other),
            })
        }
    };

    let mut result = vec![];
    for (key, value) in object {
        let name = match key {
            ObjectKey::Identifier(ident) => ident.to_string(),
            ObjectKey::Expression(Expression::String(name)) => name,
            other => {
                return Err(Error::AttributeKey {
                    key: format!("{other:?}"),
                    range: range.clone(),
                })
            }
        };

        if !is_valid_identifier(&name) {
            return Err(Error::AttributeName {
                name,
                range: range.clone(),
            });
        }

        result.push((name, value));
    }

    Ok(result)
}

fn expression_type(expr: &Expression) -> &'static str {
    match expr {
        Expression::Null => "null",
        Expression::Bool(_) => "bool",
        Expression::Number(_) => "number",
        Expression::String(_) | Expression::TemplateExpr(_) => "string",
        Expression::Array(_) => "list",
        Expression::Object(_) => "object",
        _ => "unknown expression",
    }
}

/// HCL identifier: a letter or `_`, followed by letters, digits, `_` and `-`
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn content(text: &str) -> ast::Body {
        let documents = hcl_documents!(text);
        let (source, block) = documents.blocks().next().expect("content block");
        Block::lower(source, block).body
    }

    fn evaluator() -> Evaluator {
        let mut globals = hcl::value::Map::new();
        globals.insert(
            "list".to_string(),
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        );
        let mut ports = hcl::value::Map::new();
        ports.insert("https".to_string(), Value::from("443"));
        ports.insert("http".to_string(), Value::from("80"));
        globals.insert("ports".to_string(), Value::Object(ports));
        globals.insert("off".to_string(), Value::Bool(false));

        let mut evaluator = Evaluator::new();
        evaluator.set_namespace("global", globals);
        evaluator
    }

    fn expand(text: &str) -> Result<hcl::Body, Error> {
        let body = content(text);
        let mut evaluator = evaluator();
        let mut structures = vec![];
        copy_body(&mut structures, &body, &mut evaluator)?;
        assert!(!evaluator.has_namespace("it"), "iterator must be removed");

        let body: hcl::Body = structures.into_iter().collect();
        Ok(parsed(&hcl::format::to_string(&body).expect("formattable")))
    }

    fn parsed(text: &str) -> hcl::Body {
        hcl::parse(text).expect("valid hcl")
    }

    #[test]
    fn for_each_over_list() {
        let body = expand(
            r#"content {
  tm_dynamic "block" {
    for_each = global.list
    iterator = it
    labels   = [it.value]
    content {
      v = it.key
    }
  }
}"#,
        )
        .unwrap();

        assert_eq!(
            body,
            parsed("block \"a\" {\n  v = 0\n}\nblock \"b\" {\n  v = 1\n}\n")
        );
    }

    #[test]
    fn objects_iterate_in_key_order() {
        let body = expand(
            r#"content {
  tm_dynamic "rule" {
    for_each   = global.ports
    attributes = { name = rule.key, port = rule.value }
  }
}"#,
        )
        .unwrap();

        assert_eq!(
            body,
            parsed(
                "rule {\n  name = \"http\"\n  port = \"80\"\n}\nrule {\n  name = \"https\"\n  port = \"443\"\n}\n"
            )
        );
    }

    #[test]
    fn without_for_each_generates_one_block() {
        let body = expand(
            r#"content {
  tm_dynamic "single" {
    labels     = ["x"]
    attributes = { a = var.kept }
  }
}"#,
        )
        .unwrap();

        assert_eq!(body, parsed("single \"x\" {\n  a = var.kept\n}\n"));
    }

    #[test]
    fn false_condition_skips_for_each() {
        let body = expand(
            r#"content {
  tm_dynamic "skipped" {
    condition  = global.off
    for_each   = global.not_defined
    attributes = {}
  }
}"#,
        )
        .unwrap();

        assert_eq!(body, hcl::Body::default());
    }

    #[test]
    fn attributes_conflict_with_content() {
        let err = expand(
            r#"content {
  tm_dynamic "conflict" {
    attributes = { x = 1 }
    content {
      x = 2
    }
  }
}"#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::AttributeConflict { name, .. } if name == "x"));
    }

    #[test]
    fn structural_errors_are_collected() {
        let err = expand(
            r#"content {
  tm_dynamic "a" "b" {
    iterator = it
    unknown  = 1
    other {}
  }
}"#,
        )
        .unwrap_err();

        let errors = err.errors();
        assert_eq!(errors.len(), 5, "{errors:#?}");
        assert!(matches!(errors[0], Error::DynamicLabel { .. }));
        assert!(matches!(errors[1], Error::DynamicAttribute { .. }));
        assert!(matches!(errors[2], Error::DynamicBlock { .. }));
        assert!(matches!(errors[3], Error::DynamicMissingContent { .. }));
        assert!(matches!(errors[4], Error::IteratorWithoutForEach { .. }));
    }

    #[test]
    fn iterator_must_be_a_variable() {
        let err = expand(
            r#"content {
  tm_dynamic "a" {
    for_each = global.list
    iterator = it.x
    content {}
  }
}"#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidIterator { .. }));
    }

    #[test]
    fn type_errors() {
        let err = expand(
            "content {\n  tm_dynamic \"a\" {\n    for_each = \"abc\"\n    content {}\n  }\n}",
        )
        .unwrap_err();
        assert!(matches!(err, Error::ForEachType { found: "string", .. }));

        let err = expand(
            "content {\n  tm_dynamic \"a\" {\n    labels = [1]\n    content {}\n  }\n}",
        )
        .unwrap_err();
        assert!(matches!(err, Error::LabelsType { .. }));

        let err = expand(
            "content {\n  tm_dynamic \"a\" {\n    attributes = [1]\n  }\n}",
        )
        .unwrap_err();
        assert!(matches!(err, Error::AttributesType { found: "list", .. }));

        let err = expand(
            "content {\n  tm_dynamic \"a\" {\n    attributes = { \"not valid\" = 1 }\n  }\n}",
        )
        .unwrap_err();
        assert!(matches!(err, Error::AttributeName { name, .. } if name == "not valid"));
    }

    #[test]
    fn failing_iteration_stops_and_releases_the_iterator() {
        let body = content(
            r#"content {
  tm_dynamic "block" {
    for_each = global.list
    iterator = it
    labels   = [it.value == "b" ? undefined.fail : it.value]
    content {}
  }
}"#,
        );

        let mut evaluator = evaluator();
        let mut structures = vec![];
        let err = copy_body(&mut structures, &body, &mut evaluator).unwrap_err();

        assert!(matches!(err, Error::Labels { .. }));
        assert_eq!(structures.len(), 1, "only the block of the first element");
        assert!(!evaluator.has_namespace("it"));
    }

    #[test]
    fn nested_iterators_must_differ() {
        let err = expand(
            r#"content {
  tm_dynamic "outer" {
    for_each = global.list
    iterator = it
    content {
      tm_dynamic "inner" {
        for_each = global.list
        iterator = it
        content {}
      }
    }
  }
}"#,
        )
        .unwrap_err();

        assert!(matches!(err, Error::IteratorInUse { name, .. } if name == "it"));
    }

    #[test]
    fn identifiers() {
        assert!(is_valid_identifier("a_b-c1"));
        assert!(!is_valid_identifier("1a"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a b"));
    }
}
