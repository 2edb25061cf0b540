use super::{dynamic, Error};
use crate::ast::{self, BlockKind};
use crate::eval::Evaluator;
use hcl::{Identifier, Structure};

/// Copy `src` into `dest`, partially evaluating every attribute
///
/// Attributes are copied in source order, followed by the blocks. References to unknown namespaces
/// are kept as written.
pub(super) fn copy_body(
    dest: &mut Vec<Structure>,
    src: &ast::Body,
    evaluator: &mut Evaluator,
) -> Result<(), Error> {
    for attribute in &src.attributes {
        tracing::trace!(name = %attribute.name, "evaluating attribute");

        let expr = evaluator
            .partial_eval(&attribute.expr)
            .map_err(|source| Error::Attribute {
                range: attribute.expr_range.clone(),
                source,
            })?;

        dest.push(Structure::Attribute(hcl::Attribute::new(
            Identifier::unchecked(attribute.name.as_str()),
            expr,
        )));
    }

    for block in &src.blocks {
        append_block(dest, block, evaluator)?;
    }

    Ok(())
}

fn append_block(dest: &mut Vec<Structure>, block: &ast::Block, evaluator: &mut Evaluator) -> Result<(), Error> {
    match block.kind {
        BlockKind::Dynamic => dynamic::append_dynamic_blocks(dest, block, evaluator),
        BlockKind::Plain => {
            let mut structures = vec![];
            copy_body(&mut structures, &block.body, evaluator)?;
            dest.push(Structure::Block(new_block(
                &block.ident,
                block.labels.iter().cloned(),
                structures,
            )));
            Ok(())
        }
    }
}

pub(super) fn new_block(
    ident: &str,
    labels: impl IntoIterator<Item = String>,
    structures: Vec<Structure>,
) -> hcl::Block {
    hcl::Block::builder(Identifier::unchecked(ident))
        .add_labels(labels)
        .add_structures(structures)
        .build()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::Body;
    use crate::hcl_documents;
    use hcl::Value;
    use pretty_assertions::assert_eq;

    fn content(text: &str) -> Body {
        let documents = hcl_documents!(text);
        let (source, block) = documents.blocks().next().expect("content block");
        ast::Block::lower(source, block).body
    }

    fn render(body: &Body, evaluator: &mut Evaluator) -> String {
        let mut structures = vec![];
        copy_body(&mut structures, body, evaluator).unwrap();
        hcl::format::to_string(&structures.into_iter().collect::<hcl::Body>()).unwrap()
    }

    #[test]
    fn nested_blocks_keep_labels_and_order() {
        let mut globals = hcl::value::Map::new();
        globals.insert("name".to_string(), Value::from("vpc"));
        let mut evaluator = Evaluator::new();
        evaluator.set_namespace("global", globals);

        let body = content(
            r#"content {
  z = global.name
  a = local.other
  resource "aws_vpc" "main" {
    tags = [global.name]
  }
}"#,
        );

        let rendered = render(&body, &mut evaluator);
        assert_eq!(
            hcl::parse(&rendered).unwrap(),
            hcl::parse(
                r#"
                z = "vpc"
                a = local.other
                resource "aws_vpc" "main" {
                  tags = ["vpc"]
                }
                "#
            )
            .unwrap()
        );
        assert!(rendered.starts_with("z = "));
    }

    #[test]
    fn attribute_errors_point_to_the_expression() {
        let mut evaluator = Evaluator::new();
        evaluator.set_namespace("global", hcl::value::Map::new());

        let body = content("content {\n  a = 1\n  b = global.missing\n}");
        let mut structures = vec![];
        let err = copy_body(&mut structures, &body, &mut evaluator).unwrap_err();

        assert_eq!(err.range().map(|range| range.start.line), Some(3));
    }
}
