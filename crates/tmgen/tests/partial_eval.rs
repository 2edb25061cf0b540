//! Partial evaluation properties
//!
//! For arbitrary expressions mixing known globals with unknown terraform variables:
//! - no reference to a known namespace survives
//! - every reference to an unknown namespace survives
//! - expressions without unknown references become literals
use proptest::prelude::*;
use tmgen::ast::parse_expression;
use tmgen::eval::{expr_to_string, Evaluator};

const NUMBERS: &[&str] = &["a", "b", "c"];
const VARIABLES: &[&str] = &["x", "y"];

fn number(n: u64) -> hcl::Value {
    hcl::Value::Number(hcl::Number::from(n))
}

fn evaluator() -> Evaluator {
    let mut globals = hcl::value::Map::new();
    for (n, name) in NUMBERS.iter().enumerate() {
        globals.insert(name.to_string(), number(n as u64 + 1));
    }
    globals.insert("t".to_string(), hcl::Value::Bool(true));
    globals.insert("s".to_string(), hcl::Value::from("key"));
    globals.insert("list".to_string(), hcl::Value::Array(vec![number(4), number(5)]));
    let mut obj = hcl::value::Map::new();
    obj.insert("key".to_string(), number(6));
    obj.insert("other".to_string(), number(7));
    globals.insert("obj".to_string(), hcl::Value::Object(obj));

    let mut evaluator = Evaluator::new();
    evaluator.set_namespace("global", globals);
    tmgen::stdlib::register(&mut evaluator);
    evaluator
}

fn known_leaf() -> BoxedStrategy<String> {
    prop_oneof![
        (0u32..100).prop_map(|n| n.to_string()),
        prop::sample::select(NUMBERS).prop_map(|name| format!("global.{name}")),
        Just("global.obj[global.s]".to_string()),
        Just("global.list[1]".to_string()),
        Just("tm_length(global.list)".to_string()),
    ]
    .boxed()
}

fn unknown_leaf() -> BoxedStrategy<String> {
    prop_oneof![
        prop::sample::select(VARIABLES).prop_map(|name| format!("var.{name}")),
        Just("global.obj[var.k]".to_string()),
        Just("max(global.a, var.x)".to_string()),
    ]
    .boxed()
}

/// Numeric expressions as source text
fn numeric() -> BoxedStrategy<String> {
    let leaf = prop_oneof![
        3 => known_leaf(),
        1 => unknown_leaf(),
    ];
    combine(leaf.boxed())
}

/// Numeric expressions without unknown references
fn known_numeric() -> BoxedStrategy<String> {
    combine(known_leaf())
}

fn boolean(numeric: BoxedStrategy<String>, flag: &'static str) -> BoxedStrategy<String> {
    prop_oneof![
        (numeric.clone(), numeric).prop_map(|(l, r)| format!("{l} > {r}")),
        Just("!global.t".to_string()),
        Just(format!("!{flag}")),
    ]
    .prop_recursive(2, 8, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("{l} && {r}")),
            inner.prop_map(|expr| format!("!({expr})")),
        ]
    })
    .boxed()
}

fn combine(leaf: BoxedStrategy<String>) -> BoxedStrategy<String> {
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(lhs, rhs)| format!("{lhs} + {rhs}")),
            inner.clone().prop_map(|expr| format!("-({expr})")),
            inner.clone().prop_map(|expr| format!("({expr})")),
            (inner.clone(), inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(l, r, t, f)| format!("({l} > {r} ? {t} : {f})")),
            inner.prop_map(|expr| format!("[for n in global.list : n + ({expr})][0]")),
        ]
    })
    .boxed()
}

fn expression() -> impl Strategy<Value = String> {
    prop_oneof![
        numeric(),
        boolean(numeric(), "var.flag"),
        numeric().prop_map(|expr| format!("\"p-${{{expr}}}\"")),
        numeric().prop_map(|expr| format!("<<EOT\nh-${{{expr}}}\nEOT\n")),
        prop::collection::vec(numeric(), 0..4).prop_map(|items| format!("[{}]", items.join(", "))),
        (numeric(), numeric())
            .prop_map(|(known, other)| format!("{{ (global.s) = {known}, (var.k) = {other} }}")),
        numeric().prop_map(|expr| format!("[for k, v in global.obj : v + ({expr}) if !global.t]")),
        numeric().prop_map(|expr| format!("{{ for v in var.list : v => {expr} }}")),
    ]
}

proptest! {
    #[test]
    fn known_references_are_replaced(text in expression()) {
        let expr = parse_expression(&text).unwrap();
        let partial = evaluator().partial_eval(&expr).unwrap();
        let rendered = expr_to_string(&partial);

        prop_assert!(!rendered.contains("global."), "{} became {}", text, rendered);
    }

    #[test]
    fn unknown_references_are_kept(text in expression()) {
        let expr = parse_expression(&text).unwrap();
        let partial = evaluator().partial_eval(&expr).unwrap();
        let rendered = expr_to_string(&partial);

        prop_assert_eq!(
            rendered.matches("var.").count(),
            text.matches("var.").count(),
            "{} became {}", text, rendered
        );
    }

    #[test]
    fn fully_known_expressions_become_literals(text in known_numeric()) {
        let expr = parse_expression(&text).unwrap();
        let partial = evaluator().partial_eval(&expr).unwrap();

        prop_assert!(tmgen::eval::is_literal(&partial), "{} became {:?}", text, partial);
    }

    #[test]
    fn known_boolean_expressions_become_literals(text in boolean(known_numeric(), "global.t")) {
        let expr = parse_expression(&text).unwrap();
        let partial = evaluator().partial_eval(&expr).unwrap();

        prop_assert!(tmgen::eval::is_literal(&partial), "{} became {:?}", text, partial);
    }
}
