//! partial evaluation
//!
//! Every sub-expression that only depends on known namespaces and native functions is replaced by
//! its value. Everything else (references to unknown namespaces such as `var.x` or `local.y`,
//! unknown functions, variables bound by `for` expressions) is kept as written, with its own known
//! parts replaced.
//!
//! The output never contains a reference to a known namespace: either a reference is part of a
//! resolvable sub-expression, or it is the head of a traversal that continues with an unresolvable
//! index, in which case the known prefix is evaluated and spliced in as a literal.
//!
//! The expression is walked once, bottom up. Each node reports what keeps it from being resolved
//! ([Pending]), so a node is evaluated by hcl-rs only once its children are literals.
use super::{eval_in, expr_to_string, EvalError, Evaluator, Function};
use crate::stdlib;
use hcl::eval::{Context, Evaluate};
use hcl::template::{Directive, Element};
use hcl::{
    Expression, Identifier, ObjectKey, Operation, Template, TemplateExpr, Traversal,
    TraversalOperator,
};

/// What keeps a partially evaluated expression from being resolved
#[derive(Debug, Default)]
struct Pending {
    /// variables of enclosing `for` expressions that are referenced
    bound: Vec<String>,
    /// references an unknown namespace or function, so it is never resolved
    opaque: bool,
    /// raised unless an enclosing `for` expression resolves the whole expression
    error: Option<EvalError>,
}

impl Pending {
    fn bound(name: &str) -> Self {
        Pending {
            bound: vec![name.to_string()],
            ..Default::default()
        }
    }

    fn opaque() -> Self {
        Pending {
            opaque: true,
            ..Default::default()
        }
    }

    fn is_resolvable(&self) -> bool {
        !self.opaque && self.bound.is_empty()
    }

    fn add(&mut self, other: Pending) {
        for name in other.bound {
            if !self.bound.contains(&name) {
                self.bound.push(name);
            }
        }
        self.opaque |= other.opaque;
        if self.error.is_none() {
            self.error = other.error;
        }
    }

    /// Forget the variables of a `for` expression or directive
    fn release(&mut self, names: &[String]) {
        self.bound.retain(|name| !names.contains(name));
    }

    /// Raise the pending error once nothing can resolve the expression anymore
    fn check(mut self) -> Result<Self, EvalError> {
        match self.error.take() {
            Some(error) if self.opaque => Err(error),
            error => {
                self.error = error;
                Ok(self)
            }
        }
    }
}

impl Evaluator {
    /// Partially evaluate an expression
    ///
    /// The input is never modified, the result is a new expression.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn partial_eval(&self, expr: &Expression) -> Result<Expression, EvalError> {
        self.partial_eval_in(&self.context(), expr)
    }

    pub(super) fn partial_eval_in(
        &self,
        ctx: &Context,
        expr: &Expression,
    ) -> Result<Expression, EvalError> {
        let mut expr = expr.clone();
        let pending = self.partial_in_place(ctx, &mut expr, &mut vec![])?;
        if let Some(error) = pending.error {
            return Err(error);
        }

        tracing::trace!(expr = %expr_to_string(&expr), "partially evaluated");
        Ok(expr)
    }

    fn pending_variable(&self, name: &str, bound: &[String]) -> Pending {
        if bound.iter().any(|bound| bound == name) {
            Pending::bound(name)
        } else if self.has_namespace(name) {
            Pending::default()
        } else {
            Pending::opaque()
        }
    }

    fn resolve(&self, ctx: &Context, expr: &Expression) -> Result<Expression, EvalError> {
        eval_in(ctx, expr).map(Expression::from)
    }

    /// Partially evaluate `expr` and report what is left unresolved
    ///
    /// `bound` holds the variables of enclosing `for` expressions, which are unknown here.
    fn partial_in_place(
        &self,
        ctx: &Context,
        expr: &mut Expression,
        bound: &mut Vec<String>,
    ) -> Result<Pending, EvalError> {
        if is_literal(expr) {
            return Ok(Pending::default());
        }

        let mut pending = Pending::default();
        let mut replacement = None;
        match expr {
            Expression::Variable(variable) => {
                pending = self.pending_variable(variable.as_str(), bound)
            }
            Expression::Traversal(traversal) => {
                pending = self.partial_traversal(ctx, traversal, bound)?
            }
            Expression::Array(array) => {
                for expr in array.iter_mut() {
                    pending.add(self.partial_in_place(ctx, expr, bound)?);
                }
            }
            Expression::Object(object) => {
                let mut items = hcl::Object::new();
                for (key, mut value) in std::mem::take(object) {
                    let key = match key {
                        ObjectKey::Expression(mut key) => {
                            pending.add(self.partial_in_place(ctx, &mut key, bound)?);
                            ObjectKey::Expression(key)
                        }
                        key => key,
                    };
                    pending.add(self.partial_in_place(ctx, &mut value, bound)?);
                    items.insert(key, value);
                }
                *object = items;
            }
            Expression::TemplateExpr(template_expr) => {
                pending = self.partial_template_expr(ctx, template_expr, bound)?
            }
            Expression::FuncCall(call) => {
                for arg in call.args.iter_mut() {
                    pending.add(self.partial_in_place(ctx, arg, bound)?);
                }

                let name = call.name.to_string();
                let known_args = pending.is_resolvable();
                match self.functions.get(&name) {
                    Some(Function::Native(_)) => {}
                    Some(Function::Host(func)) if known_args => {
                        let args = literal_values(&call.args)?;
                        tracing::trace!(function = %name, "calling host function");
                        let value = func(&args).map_err(|message| EvalError::Function {
                            name: name.clone(),
                            message,
                        })?;
                        replacement = Some(Expression::from(value));
                    }
                    Some(Function::Macro(func)) if known_args => {
                        let args = literal_values(&call.args)?;
                        tracing::trace!(function = %name, "expanding function");
                        let mut expansion = func(&args).map_err(|message| EvalError::Function {
                            name: name.clone(),
                            message,
                        })?;
                        pending = self.partial_in_place(ctx, &mut expansion, bound)?;
                        replacement = Some(expansion);
                    }
                    // unknown to hcl-rs, so never resolvable
                    _ => pending.opaque = true,
                }

                let unresolved = replacement.is_none() && !pending.is_resolvable();
                if unresolved && name.starts_with(stdlib::PREFIX) && pending.error.is_none() {
                    let message = if self.functions.contains_key(&name) {
                        "all arguments must be known"
                    } else {
                        "unknown function"
                    };
                    pending.error = Some(EvalError::Function {
                        name,
                        message: message.to_string(),
                    });
                }
            }
            Expression::Parenthesis(inner) => pending = self.partial_in_place(ctx, inner, bound)?,
            Expression::Conditional(cond) => {
                pending.add(self.partial_in_place(ctx, &mut cond.cond_expr, bound)?);
                pending.add(self.partial_in_place(ctx, &mut cond.true_expr, bound)?);
                pending.add(self.partial_in_place(ctx, &mut cond.false_expr, bound)?);
            }
            Expression::Operation(operation) => match operation.as_mut() {
                Operation::Binary(binop) => {
                    pending.add(self.partial_in_place(ctx, &mut binop.lhs_expr, bound)?);
                    pending.add(self.partial_in_place(ctx, &mut binop.rhs_expr, bound)?);
                }
                Operation::Unary(unop) => {
                    pending = self.partial_in_place(ctx, &mut unop.expr, bound)?
                }
            },
            Expression::ForExpr(forexpr) => {
                pending.add(self.partial_in_place(ctx, &mut forexpr.collection_expr, bound)?);

                let names = loop_variables(forexpr.key_var.as_ref(), &forexpr.value_var);
                let scope = bound.len();
                bound.extend(names.iter().cloned());

                let result = (|| -> Result<Pending, EvalError> {
                    let mut body = Pending::default();
                    if let Some(key_expr) = forexpr.key_expr.as_mut() {
                        body.add(self.partial_in_place(ctx, key_expr, bound)?);
                    }
                    body.add(self.partial_in_place(ctx, &mut forexpr.value_expr, bound)?);
                    if let Some(cond_expr) = forexpr.cond_expr.as_mut() {
                        body.add(self.partial_in_place(ctx, cond_expr, bound)?);
                    }
                    Ok(body)
                })();

                bound.truncate(scope);
                let mut body = result?;
                body.release(&names);
                pending.add(body);
            }
            _ => pending.opaque = true,
        }

        if let Some(replacement) = replacement {
            *expr = replacement;
        }

        let pending = pending.check()?;
        if pending.is_resolvable() && !is_literal(expr) {
            *expr = self.resolve(ctx, expr)?;
            return Ok(Pending::default());
        }

        Ok(pending)
    }

    fn partial_traversal(
        &self,
        ctx: &Context,
        traversal: &mut Traversal,
        bound: &mut Vec<String>,
    ) -> Result<Pending, EvalError> {
        let mut pending = match &mut traversal.expr {
            Expression::Variable(variable) => self.pending_variable(variable.as_str(), bound),
            expr => self.partial_in_place(ctx, expr, bound)?,
        };
        let known_root = pending.is_resolvable();

        // resolved indexes are literals, the known prefix ends at the first unresolved one
        let mut prefix = 0;
        for operator in traversal.operators.iter_mut() {
            if let TraversalOperator::Index(index) = operator {
                pending.add(self.partial_in_place(ctx, index, bound)?);
            }
            if pending.is_resolvable() {
                prefix += 1;
            }
        }

        if known_root && !pending.is_resolvable() && (prefix > 0 || !is_literal(&traversal.expr)) {
            // evaluate the longest known prefix, e.g. `global.obj` of `global.obj[var.key]`
            let head = if prefix == 0 {
                traversal.expr.clone()
            } else {
                Expression::from(Traversal::new(
                    traversal.expr.clone(),
                    traversal.operators[..prefix].to_vec(),
                ))
            };

            traversal.expr = self.resolve(ctx, &head)?;
            traversal.operators.drain(..prefix);
        }

        Ok(pending)
    }

    fn partial_template_expr(
        &self,
        ctx: &Context,
        template_expr: &mut TemplateExpr,
        bound: &mut Vec<String>,
    ) -> Result<Pending, EvalError> {
        let mut template =
            Template::from_expr(template_expr).map_err(|source| EvalError::Template {
                expr: format!("{template_expr:?}"),
                source,
            })?;

        let pending = self.partial_template(ctx, &mut template, bound)?;

        match template_expr {
            TemplateExpr::QuotedString(quoted) => *quoted = template.to_string(),
            TemplateExpr::Heredoc(heredoc) => heredoc.template = template.to_string(),
        }

        Ok(pending)
    }

    fn partial_template(
        &self,
        ctx: &Context,
        template: &mut Template,
        bound: &mut Vec<String>,
    ) -> Result<Pending, EvalError> {
        let mut pending = Pending::default();
        for element in template.elements_mut() {
            let mut literal = None;
            match element {
                Element::Interpolation(interpolation) => {
                    pending.add(self.partial_in_place(ctx, &mut interpolation.expr, bound)?);
                    literal = inline_literal(&interpolation.expr);
                }
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        pending.add(self.partial_in_place(ctx, &mut ifdir.cond_expr, bound)?);
                        pending.add(self.partial_template(ctx, &mut ifdir.true_template, bound)?);
                        if let Some(false_template) = ifdir.false_template.as_mut() {
                            pending.add(self.partial_template(ctx, false_template, bound)?);
                        }
                    }
                    Directive::For(fordir) => {
                        pending.add(self.partial_in_place(ctx, &mut fordir.collection_expr, bound)?);

                        let names = loop_variables(fordir.key_var.as_ref(), &fordir.value_var);
                        let scope = bound.len();
                        bound.extend(names.iter().cloned());
                        let result = self.partial_template(ctx, &mut fordir.template, bound);
                        bound.truncate(scope);

                        let mut body = result?;
                        body.release(&names);
                        pending.add(body);
                    }
                },
                Element::Literal(_) => {}
            }

            if let Some(literal) = literal {
                *element = Element::Literal(literal);
            }
        }

        Ok(pending)
    }
}

fn loop_variables(key_var: Option<&Identifier>, value_var: &Identifier) -> Vec<String> {
    key_var
        .into_iter()
        .chain(std::iter::once(value_var))
        .map(|name| name.to_string())
        .collect()
}

/// Whether an expression is a plain value (no references, no operations)
pub fn is_literal(expr: &Expression) -> bool {
    match expr {
        Expression::Null | Expression::Bool(_) | Expression::Number(_) | Expression::String(_) => {
            true
        }
        Expression::Array(array) => array.iter().all(is_literal),
        Expression::Object(object) => object.iter().all(|(key, value)| {
            let key_is_literal = match key {
                ObjectKey::Identifier(_) => true,
                ObjectKey::Expression(key) => matches!(key, Expression::String(_)),
                _ => false,
            };
            key_is_literal && is_literal(value)
        }),
        _ => false,
    }
}

fn literal_value(expr: &Expression) -> Result<hcl::Value, EvalError> {
    expr.evaluate(&Context::new())
        .map_err(|source| EvalError::Eval {
            expr: expr_to_string(expr),
            source,
        })
}

fn literal_values(args: &[Expression]) -> Result<Vec<hcl::Value>, EvalError> {
    args.iter().map(literal_value).collect()
}

/// Text of a resolved interpolation that can be written into a template as is
///
/// Only values that need no escaping are inlined, everything else stays an interpolation.
fn inline_literal(expr: &Expression) -> Option<String> {
    let text = match expr {
        Expression::String(s) => s.clone(),
        Expression::Number(n) => n.to_string(),
        Expression::Bool(b) => b.to_string(),
        _ => return None,
    };

    let needs_escaping = text
        .chars()
        .any(|c| matches!(c, '"' | '\\' | '$' | '%' | '{' | '}') || c.is_control());

    (!needs_escaping).then_some(text)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::parse_expression;
    use hcl::Value;
    use pretty_assertions::assert_eq;

    fn evaluator() -> Evaluator {
        let mut globals = hcl::value::Map::new();
        globals.insert("str".to_string(), Value::from("mineiros.io"));
        globals.insert("num".to_string(), Value::Number(hcl::Number::from(10u64)));
        globals.insert(
            "list".to_string(),
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        );
        let mut obj = hcl::value::Map::new();
        obj.insert("a".to_string(), Value::from("b"));
        globals.insert("obj".to_string(), Value::Object(obj));

        let mut terramate = hcl::value::Map::new();
        terramate.insert("path".to_string(), Value::from("/my/project"));

        let mut evaluator = Evaluator::new();
        evaluator.set_namespace("global", globals);
        evaluator.set_namespace("terramate", terramate);
        evaluator
    }

    fn partial(evaluator: &Evaluator, expr: &str) -> Expression {
        evaluator
            .partial_eval(&parse_expression(expr).expect("valid expression"))
            .expect("partial evaluation succeeds")
    }

    fn expr(expr: &str) -> Expression {
        parse_expression(expr).expect("valid expression")
    }

    #[test]
    fn known_references_become_literals() {
        let evaluator = evaluator();
        assert_eq!(
            partial(&evaluator, "global.str"),
            Expression::String("mineiros.io".to_string())
        );
        assert_eq!(partial(&evaluator, "global.num + 1"), expr("11"));
    }

    #[test]
    fn unknown_references_are_kept() {
        let evaluator = evaluator();
        assert_eq!(partial(&evaluator, "var.name"), expr("var.name"));
        assert_eq!(partial(&evaluator, "local.a[0].b"), expr("local.a[0].b"));
        assert_eq!(partial(&evaluator, "unknown_fn(1)"), expr("unknown_fn(1)"));
    }

    #[test]
    fn mixed_expressions() {
        let evaluator = evaluator();
        assert_eq!(
            partial(&evaluator, "var.x + global.num"),
            expr("var.x + 10")
        );
        assert_eq!(
            partial(&evaluator, r#"[global.str, var.y]"#),
            expr(r#"["mineiros.io", var.y]"#)
        );
        assert_eq!(
            partial(&evaluator, "unknown_fn(global.num, local.z)"),
            expr("unknown_fn(10, local.z)")
        );
    }

    #[test]
    fn known_prefix_of_traversal_is_spliced() {
        let evaluator = evaluator();
        let obj = evaluator.namespace("global").unwrap()["obj"].clone();
        assert_eq!(
            partial(&evaluator, "global.obj[var.key]"),
            Expression::from(Traversal::new(
                Expression::from(obj),
                vec![TraversalOperator::Index(expr("var.key"))],
            ))
        );
    }

    #[test]
    fn for_variables_stay_unresolved() {
        let evaluator = evaluator();
        assert_eq!(
            partial(&evaluator, "[for x in var.list : x + global.num]"),
            expr("[for x in var.list : x + 10]")
        );
        assert_eq!(
            partial(&evaluator, "[for x in global.list : x]"),
            expr(r#"["a", "b"]"#)
        );
    }

    #[test]
    fn templates() {
        let evaluator = evaluator();
        assert_eq!(
            partial(&evaluator, r#""a ${global.str}""#),
            Expression::String("a mineiros.io".to_string())
        );

        let Expression::TemplateExpr(template) = partial(&evaluator, r#""${var.x} ${global.str}""#)
        else {
            panic!("expected a template");
        };
        let TemplateExpr::QuotedString(template) = *template else {
            panic!("expected a quoted template");
        };
        assert_eq!(template, "${var.x} mineiros.io");
    }

    #[test]
    fn object_keys_are_evaluated() {
        let evaluator = evaluator();
        let Expression::Object(object) = partial(&evaluator, "{ (global.str) = var.x }") else {
            panic!("expected an object");
        };

        let (key, value) = object.iter().next().unwrap();
        assert_eq!(
            key,
            &ObjectKey::Expression(Expression::String("mineiros.io".to_string()))
        );
        assert_eq!(value, &expr("var.x"));
    }

    #[test]
    fn unary_operators_keep_their_operand() {
        let evaluator = evaluator();
        assert_eq!(
            partial(&evaluator, "[-global.num, var.x]"),
            Expression::Array(vec![
                Expression::Number(hcl::Number::from(-10i64)),
                expr("var.x"),
            ])
        );
        assert_eq!(partial(&evaluator, "!var.flag"), expr("!var.flag"));
        assert_eq!(
            partial(&evaluator, "-global.num > var.min ? 1 : 2"),
            partial(&evaluator, "-10 > var.min ? 1 : 2")
        );
    }

    #[test]
    fn prefixed_functions_need_known_arguments() {
        let mut evaluator = evaluator();
        crate::stdlib::register(&mut evaluator);
        evaluator.set_host_function("tm_shout", |args: &[Value]| Ok(args[0].clone()));

        assert_eq!(
            partial(&evaluator, "tm_upper(global.str)"),
            Expression::String("MINEIROS.IO".to_string())
        );
        assert_eq!(
            partial(&evaluator, "[for s in global.list : tm_upper(s)]"),
            expr(r#"["A", "B"]"#)
        );

        for source in [
            "tm_upper(var.name)",
            "tm_shout(var.name)",
            "tm_missing(1)",
            "[for s in var.list : tm_upper(s)]",
            "[for s in global.list : tm_shout(s)]",
            r#""${tm_upper(local.x)}""#,
        ] {
            assert!(
                matches!(
                    evaluator.partial_eval(&expr(source)),
                    Err(EvalError::Function { .. })
                ),
                "{source}"
            );
        }
    }

    #[test]
    fn macro_expansion_is_partially_evaluated() {
        let mut evaluator = evaluator();
        evaluator.set_macro_function(
            crate::stdlib::name("hcl_expression"),
            crate::stdlib::hcl_expression,
        );

        assert_eq!(
            partial(&evaluator, r#"tm_hcl_expression("var.x + global.num")"#),
            expr("var.x + 10")
        );
        assert_eq!(
            partial(&evaluator, r#"tm_hcl_expression("global.num") + 1"#),
            expr("11")
        );
        assert!(evaluator
            .partial_eval(&expr("tm_hcl_expression(var.text)"))
            .is_err());
        assert!(evaluator
            .partial_eval(&expr(r#"tm_hcl_expression("1 +")"#))
            .is_err());
    }

    #[test]
    fn unknown_key_of_known_namespace_fails() {
        let evaluator = evaluator();
        assert!(evaluator.partial_eval(&expr("global.missing")).is_err());
    }

    #[test]
    fn input_is_not_modified() {
        let evaluator = evaluator();
        let input = expr("var.x + global.num");
        let _ = evaluator.partial_eval(&input).unwrap();
        assert_eq!(input, expr("var.x + global.num"));
    }

    #[test]
    fn full_resolution_matches_eval() {
        let evaluator = evaluator();
        for source in [
            "global.num * 2",
            r#""${global.str}/${terramate.path}""#,
            "{ for k, v in global.obj : v => k }",
            "global.list[*]",
            "length(global.list) > 1 ? global.list[0] : null",
        ] {
            let input = expr(source);
            let Ok(value) = evaluator.eval(&input) else {
                // `length` is not registered, the evaluation must fail consistently
                assert!(evaluator.partial_eval(&input).is_ok());
                continue;
            };
            assert_eq!(
                evaluator.partial_eval(&input).unwrap(),
                Expression::from(value),
                "{source}"
            );
        }
    }
}
