//! parsed configuration tree
//!
//! Generation works on hcl-rs expressions (they can be evaluated) but needs hcl-edit spans for
//! diagnostics. This module lowers hcl-edit bodies into a tree that keeps both.
use crate::hcl_documents::Source;
use crate::info::Range;
use hcl::template::{Directive, Element, Template};
use hcl::{Expression, ObjectKey, Operation, TemplateExpr, Traversal, TraversalOperator};
use hcl_edit::Span;

/// Block type that expands into zero or more blocks
pub const DYNAMIC_BLOCK: &str = "tm_dynamic";

/// Parse a standalone expression
pub fn parse_expression(text: &str) -> Result<Expression, hcl_edit::parser::Error> {
    let expr: hcl_edit::expr::Expression = text.parse()?;
    Ok(lower_expression(expr))
}

/// Convert an hcl-edit expression into an hcl-rs expression
///
/// The conversion attaches a traversal of a unary operand to the operation itself: `!global.a`
/// arrives as `(!global).a`. Such traversals are moved back onto the operand. Templates are
/// re-rendered with `!(global.a)` since hcl-rs parses them again when evaluating.
pub fn lower_expression(expr: hcl_edit::expr::Expression) -> Expression {
    let mut expr = expr.into();
    normalize(&mut expr, false);
    expr
}

/// Returns whether anything was rewritten
fn normalize(expr: &mut Expression, parenthesize: bool) -> bool {
    let mut changed = false;
    if let Some(operation) = hoist_unary(expr, parenthesize) {
        *expr = operation;
        changed = true;
    }

    let nested = match expr {
        Expression::Array(values) => normalize_all(values.iter_mut(), parenthesize),
        Expression::Object(object) => {
            let mut changed = false;
            let mut items = hcl::Object::new();
            for (key, mut value) in std::mem::take(object) {
                let key = match key {
                    ObjectKey::Expression(mut key) => {
                        changed |= normalize(&mut key, parenthesize);
                        ObjectKey::Expression(key)
                    }
                    key => key,
                };
                changed |= normalize(&mut value, parenthesize);
                items.insert(key, value);
            }
            *object = items;
            changed
        }
        Expression::TemplateExpr(template_expr) => normalize_template_expr(template_expr),
        Expression::Traversal(traversal) => {
            let mut changed = normalize(&mut traversal.expr, parenthesize);
            for operator in traversal.operators.iter_mut() {
                if let TraversalOperator::Index(index) = operator {
                    changed |= normalize(index, parenthesize);
                }
            }
            changed
        }
        Expression::FuncCall(call) => normalize_all(call.args.iter_mut(), parenthesize),
        Expression::Parenthesis(inner) => normalize(inner, parenthesize),
        Expression::Conditional(cond) => {
            let cond = cond.as_mut();
            normalize_all(
                [&mut cond.cond_expr, &mut cond.true_expr, &mut cond.false_expr],
                parenthesize,
            )
        }
        Expression::Operation(operation) => match operation.as_mut() {
            Operation::Unary(unop) => normalize(&mut unop.expr, parenthesize),
            Operation::Binary(binop) => {
                normalize_all([&mut binop.lhs_expr, &mut binop.rhs_expr], parenthesize)
            }
        },
        Expression::ForExpr(forexpr) => {
            let forexpr = forexpr.as_mut();
            let mut changed = normalize(&mut forexpr.collection_expr, parenthesize);
            changed |= normalize(&mut forexpr.value_expr, parenthesize);
            if let Some(key_expr) = forexpr.key_expr.as_mut() {
                changed |= normalize(key_expr, parenthesize);
            }
            if let Some(cond_expr) = forexpr.cond_expr.as_mut() {
                changed |= normalize(cond_expr, parenthesize);
            }
            changed
        }
        _ => false,
    };

    changed || nested
}

fn normalize_all<'a>(exprs: impl IntoIterator<Item = &'a mut Expression>, parenthesize: bool) -> bool {
    exprs
        .into_iter()
        .fold(false, |changed, expr| normalize(expr, parenthesize) | changed)
}

/// `(!a).b` becomes `!a.b`, or `!(a.b)` when `parenthesize` is set
fn hoist_unary(expr: &mut Expression, parenthesize: bool) -> Option<Expression> {
    let Expression::Traversal(traversal) = expr else {
        return None;
    };
    let is_unary = matches!(
        &traversal.expr,
        Expression::Operation(operation) if matches!(operation.as_ref(), Operation::Unary(_))
    );
    if !is_unary {
        return None;
    }

    let operators = std::mem::take(&mut traversal.operators);
    let mut operation = std::mem::replace(&mut traversal.expr, Expression::Null);
    if let Expression::Operation(operation) = &mut operation {
        if let Operation::Unary(unop) = operation.as_mut() {
            let operand = std::mem::replace(&mut unop.expr, Expression::Null);
            let operand = Expression::from(Traversal::new(operand, operators));
            unop.expr = if parenthesize {
                Expression::Parenthesis(Box::new(operand))
            } else {
                operand
            };
        }
    }
    Some(operation)
}

fn normalize_template_expr(template_expr: &mut TemplateExpr) -> bool {
    let Ok(mut template) = Template::from_expr(template_expr) else {
        return false;
    };
    if !normalize_template(&mut template) {
        return false;
    }

    match template_expr {
        TemplateExpr::QuotedString(quoted) => *quoted = template.to_string(),
        TemplateExpr::Heredoc(heredoc) => heredoc.template = template.to_string(),
    }
    true
}

fn normalize_template(template: &mut Template) -> bool {
    let mut changed = false;
    for element in template.elements_mut() {
        changed |= match element {
            Element::Interpolation(interpolation) => normalize(&mut interpolation.expr, true),
            Element::Directive(directive) => match directive {
                Directive::If(ifdir) => {
                    let mut changed = normalize(&mut ifdir.cond_expr, true);
                    changed |= normalize_template(&mut ifdir.true_template);
                    if let Some(false_template) = ifdir.false_template.as_mut() {
                        changed |= normalize_template(false_template);
                    }
                    changed
                }
                Directive::For(fordir) => {
                    normalize(&mut fordir.collection_expr, true)
                        | normalize_template(&mut fordir.template)
                }
            },
            Element::Literal(_) => false,
        };
    }
    changed
}

#[derive(Debug, Clone, Default)]
pub struct Body {
    /// attributes in source order
    pub attributes: Vec<Attribute>,
    /// nested blocks in source order
    pub blocks: Vec<Block>,
    pub range: Range,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub expr: Expression,
    pub range: Range,
    /// range of the value expression only
    pub expr_range: Range,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub ident: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub range: Range,
    /// range of the labels, or of the identifier when there are none
    pub labels_range: Range,
}

/// The closed set of block kinds generation knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// copied as is
    Plain,
    /// `tm_dynamic`: expanded by [crate::genhcl]
    Dynamic,
}

impl Body {
    pub fn lower(source: &Source, body: &hcl_edit::structure::Body) -> Self {
        let mut lowered = Body {
            range: source.range(body.span()),
            ..Default::default()
        };

        for structure in body.iter() {
            match structure {
                hcl_edit::structure::Structure::Attribute(attribute) => lowered
                    .attributes
                    .push(Attribute::lower(source, attribute)),
                hcl_edit::structure::Structure::Block(block) => {
                    lowered.blocks.push(Block::lower(source, block))
                }
            }
        }

        lowered
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }
}

impl Attribute {
    pub fn lower(source: &Source, attribute: &hcl_edit::structure::Attribute) -> Self {
        Self {
            name: attribute.key.value().as_str().to_string(),
            expr: lower_expression(attribute.value.clone()),
            range: source.range(attribute.span()),
            expr_range: source.range(attribute.value.span()),
        }
    }
}

impl Block {
    pub fn lower(source: &Source, block: &hcl_edit::structure::Block) -> Self {
        let ident = block.ident.value().as_str().to_string();
        let kind = if ident == DYNAMIC_BLOCK {
            BlockKind::Dynamic
        } else {
            BlockKind::Plain
        };

        let labels_span = match (block.labels.first(), block.labels.last()) {
            (Some(first), Some(last)) => match (first.span(), last.span()) {
                (Some(start), Some(end)) => Some(start.start..end.end),
                _ => None,
            },
            _ => block.ident.span(),
        };

        Self {
            kind,
            labels: block
                .labels
                .iter()
                .map(|label| label.as_str().to_string())
                .collect(),
            body: Body::lower(source, &block.body),
            range: source.range(block.span()),
            labels_range: source.range(labels_span),
            ident,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hcl_documents;
    use pretty_assertions::assert_eq;

    fn lower_first_block(documents: &hcl_documents::HclDocuments) -> Block {
        let (source, block) = documents.blocks().next().expect("one block");
        Block::lower(source, block)
    }

    #[test]
    fn lowering_keeps_order_and_kinds() {
        let documents = hcl_documents!(
            r#"content {
  b = 1
  a = 2
  tm_dynamic "x" {
    attributes = {}
  }
  plain "l1" "l2" {}
}"#
        );

        let block = lower_first_block(&documents);
        let names: Vec<_> = block.body.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        let kinds: Vec<_> = block.body.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Dynamic, BlockKind::Plain]);
        assert_eq!(block.body.blocks[1].labels, vec!["l1", "l2"]);
    }

    use hcl::expr::UnaryOperator;

    fn unary(operator: UnaryOperator, expr: Expression) -> Expression {
        Expression::Operation(Box::new(Operation::Unary(hcl::expr::UnaryOp::new(
            operator, expr,
        ))))
    }

    fn global(name: &str) -> Expression {
        Expression::from(Traversal::new(
            hcl::Variable::unchecked("global"),
            [TraversalOperator::GetAttr(hcl::Identifier::unchecked(name))],
        ))
    }

    #[test]
    fn unary_operators_apply_to_the_whole_traversal() {
        assert_eq!(
            parse_expression("!global.t").unwrap(),
            unary(UnaryOperator::Not, global("t"))
        );
        assert_eq!(
            parse_expression("-global.n").unwrap(),
            unary(UnaryOperator::Neg, global("n"))
        );

        let Expression::Conditional(cond) = parse_expression("!global.t ? 1 : 2").unwrap() else {
            panic!("expected a conditional");
        };
        assert_eq!(cond.cond_expr, unary(UnaryOperator::Not, global("t")));
    }

    #[test]
    fn nested_unary_operators() {
        assert_eq!(
            parse_expression("!!global.t").unwrap(),
            unary(
                UnaryOperator::Not,
                unary(UnaryOperator::Not, global("t"))
            )
        );
    }

    #[test]
    fn unary_operators_in_templates_are_parenthesized() {
        let Expression::TemplateExpr(template) = parse_expression(r#""x${!global.t}""#).unwrap()
        else {
            panic!("expected a template");
        };
        assert_eq!(template.to_string(), "x${!(global.t)}");
    }

    #[test]
    fn attributes_are_normalized() {
        let documents = hcl_documents!("content {\n  a = -global.n\n}");
        let block = lower_first_block(&documents);
        assert_eq!(
            block.body.attributes[0].expr,
            unary(UnaryOperator::Neg, global("n"))
        );
    }

    #[test]
    fn ranges_point_into_source() {
        let documents = hcl_documents!("\n\ncontent {\n  a = 1\n}\n");
        let block = lower_first_block(&documents);

        assert_eq!(block.range.start.line, 3);
        assert_eq!(block.body.attributes[0].range.start.line, 4);
    }
}
