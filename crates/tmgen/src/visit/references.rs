use super::Visit;
use hcl::{
    template::{Directive, Element},
    Expression, ObjectKey, Operation, Template, TraversalOperator,
};

/// A name an expression depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A free variable (not bound by an enclosing `for`)
    ///
    /// `path` holds the leading attribute accesses, `global.a.b[0]` has the path `["a", "b"]`.
    Variable { root: String, path: Vec<String> },
    /// A function call by name
    Function(String),
}

/// Recursively visit all free variables and function calls
pub trait VisitReferences {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>);

    fn references(&self) -> Vec<Reference> {
        let mut references = vec![];
        self.visit_references(&mut |reference: &Reference| references.push(reference.clone()));
        references
    }
}

impl VisitReferences for Expression {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        walk_expression(self, &mut vec![], visitor)
    }
}

impl VisitReferences for Template {
    fn visit_references(&self, visitor: &mut dyn Visit<Reference>) {
        walk_template(self, &mut vec![], visitor)
    }
}

fn visit_variable(
    root: &str,
    operators: &[TraversalOperator],
    bound: &[String],
    visitor: &mut dyn Visit<Reference>,
) {
    if bound.iter().any(|name| name == root) {
        return;
    }

    let path = operators
        .iter()
        .map_while(|operator| match operator {
            TraversalOperator::GetAttr(ident) => Some(ident.to_string()),
            _ => None,
        })
        .collect();

    visitor.visit(&Reference::Variable {
        root: root.to_string(),
        path,
    });
}

fn walk_expression(expr: &Expression, bound: &mut Vec<String>, visitor: &mut dyn Visit<Reference>) {
    match expr {
        Expression::Variable(variable) => visit_variable(variable.as_str(), &[], bound, visitor),
        Expression::Traversal(traversal) => {
            if let Expression::Variable(variable) = &traversal.expr {
                visit_variable(variable.as_str(), &traversal.operators, bound, visitor);
            } else {
                walk_expression(&traversal.expr, bound, visitor);
            }

            for operator in &traversal.operators {
                if let TraversalOperator::Index(index) = operator {
                    walk_expression(index, bound, visitor);
                }
            }
        }
        Expression::Array(array) => {
            for expr in array {
                walk_expression(expr, bound, visitor);
            }
        }
        Expression::Object(object) => {
            for (key, value) in object.iter() {
                if let ObjectKey::Expression(key) = key {
                    walk_expression(key, bound, visitor);
                }
                walk_expression(value, bound, visitor);
            }
        }
        Expression::TemplateExpr(template_expr) => {
            // unparseable templates are reported when they get evaluated
            if let Ok(template) = Template::from_expr(template_expr) {
                walk_template(&template, bound, visitor);
            }
        }
        Expression::FuncCall(call) => {
            visitor.visit(&Reference::Function(call.name.to_string()));
            for arg in &call.args {
                walk_expression(arg, bound, visitor);
            }
        }
        Expression::Parenthesis(expr) => walk_expression(expr, bound, visitor),
        Expression::Conditional(cond) => {
            walk_expression(&cond.cond_expr, bound, visitor);
            walk_expression(&cond.true_expr, bound, visitor);
            walk_expression(&cond.false_expr, bound, visitor);
        }
        Expression::Operation(operation) => match operation.as_ref() {
            Operation::Binary(binop) => {
                walk_expression(&binop.lhs_expr, bound, visitor);
                walk_expression(&binop.rhs_expr, bound, visitor);
            }
            Operation::Unary(unop) => walk_expression(&unop.expr, bound, visitor),
        },
        Expression::ForExpr(forexpr) => {
            walk_expression(&forexpr.collection_expr, bound, visitor);

            let scope = bound.len();
            if let Some(key_var) = &forexpr.key_var {
                bound.push(key_var.to_string());
            }
            bound.push(forexpr.value_var.to_string());

            if let Some(key_expr) = &forexpr.key_expr {
                walk_expression(key_expr, bound, visitor);
            }
            walk_expression(&forexpr.value_expr, bound, visitor);
            if let Some(cond_expr) = &forexpr.cond_expr {
                walk_expression(cond_expr, bound, visitor);
            }

            bound.truncate(scope);
        }
        _ => {}
    }
}

fn walk_template(template: &Template, bound: &mut Vec<String>, visitor: &mut dyn Visit<Reference>) {
    for element in template.elements() {
        match element {
            Element::Interpolation(interpolation) => {
                walk_expression(&interpolation.expr, bound, visitor);
            }
            Element::Directive(directive) => match directive {
                Directive::If(ifdir) => {
                    walk_expression(&ifdir.cond_expr, bound, visitor);
                    walk_template(&ifdir.true_template, bound, visitor);
                    if let Some(false_template) = &ifdir.false_template {
                        walk_template(false_template, bound, visitor);
                    }
                }
                Directive::For(fordir) => {
                    walk_expression(&fordir.collection_expr, bound, visitor);

                    let scope = bound.len();
                    if let Some(key_var) = &fordir.key_var {
                        bound.push(key_var.to_string());
                    }
                    bound.push(fordir.value_var.to_string());
                    walk_template(&fordir.template, bound, visitor);
                    bound.truncate(scope);
                }
            },
            Element::Literal(_) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_expression;
    use pretty_assertions::assert_eq;

    fn roots(expr: &str) -> Vec<String> {
        let expr = parse_expression(expr).expect("valid expression");
        expr.references()
            .iter()
            .map(|reference| match reference {
                Reference::Variable { root, .. } => root.clone(),
                Reference::Function(name) => name.clone(),
            })
            .collect()
    }

    fn var(root: &str, path: &[&str]) -> Reference {
        Reference::Variable {
            root: root.to_string(),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn traversal_paths() {
        let expr = parse_expression("global.a.b[0].c").unwrap();
        assert_eq!(expr.references(), vec![var("global", &["a", "b"])]);
    }

    #[test]
    fn index_expressions_are_visited() {
        assert_eq!(roots("local.a[global.idx]"), vec!["local", "global"]);
    }

    #[test]
    fn for_variables_are_bound() {
        assert_eq!(
            roots("[for k, v in global.list : k + v + other.x]"),
            vec!["global", "other"]
        );
        assert_eq!(
            roots("{ for v in global.list : v => v if v != outer }"),
            vec!["global", "outer"]
        );
    }

    #[test]
    fn templates_and_functions() {
        assert_eq!(
            roots(r#""a ${tm_upper(global.str)} %{ for x in local.xs }${x}%{ endfor }""#),
            vec!["tm_upper", "global", "local"]
        );
    }

    #[test]
    fn object_keys() {
        assert_eq!(roots("{ (global.key) = 1, plain = var.x }"), vec!["global", "var"]);
    }
}
