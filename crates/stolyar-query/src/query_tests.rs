//! Query compilation and matching tests against the miniscript grammar.

use stolyar_engine::{Parser, Tree};

use crate::{Query, QueryError};

fn parse(text: &str) -> Tree {
    let mut parser = Parser::new();
    parser.set_language(stolyar_langs::miniscript());
    parser.parse(text, None).expect("parse")
}

fn query(source: &str) -> Query {
    Query::new(&stolyar_langs::miniscript(), source).expect("query compiles")
}

/// All texts captured under `name`, across matches, in match order.
fn captured(query: &Query, tree: &Tree, source: &str, name: &str) -> Vec<String> {
    let index = query.capture_index(name).expect("capture exists");
    query
        .tree_matches(tree, source)
        .iter()
        .flat_map(|m| m.nodes_for_capture(index))
        .map(|node| node.utf8_text(source).to_string())
        .collect()
}

#[test]
fn function_captures_in_tree_order() {
    let source = "foo(1,2); bar();";
    let tree = parse(source);
    let q = query("(call_expression function: (identifier) @fn)");
    assert_eq!(captured(&q, &tree, source, "fn"), vec!["foo", "bar"]);
}

#[test]
fn eq_predicate_filters_matches() {
    let source = "foo(1,2); bar();";
    let tree = parse(source);
    let q = query(r#"(call_expression function: (identifier) @fn (#eq? @fn "foo"))"#);
    assert_eq!(captured(&q, &tree, source, "fn"), vec!["foo"]);
}

#[test]
fn not_eq_predicate_inverts() {
    let source = "foo(1,2); bar();";
    let tree = parse(source);
    let q = query(r#"(call_expression function: (identifier) @fn (#not-eq? @fn "foo"))"#);
    assert_eq!(captured(&q, &tree, source, "fn"), vec!["bar"]);
}

#[test]
fn match_predicate_runs_a_regex() {
    let source = "foo(1,2); bar(); baz(3);";
    let tree = parse(source);
    let q = query(r#"(call_expression function: (identifier) @fn (#match? @fn "^ba"))"#);
    assert_eq!(captured(&q, &tree, source, "fn"), vec!["bar", "baz"]);

    let q = query(r#"(call_expression function: (identifier) @fn (#not-match? @fn "^ba"))"#);
    assert_eq!(captured(&q, &tree, source, "fn"), vec!["foo"]);
}

#[test]
fn field_constraint_distinguishes_slots() {
    let source = "let x = y;";
    let tree = parse(source);
    let q = query("(let_declaration name: (identifier) @n)");
    assert_eq!(captured(&q, &tree, source, "n"), vec!["x"]);

    let q = query("(let_declaration value: (identifier) @v)");
    assert_eq!(captured(&q, &tree, source, "v"), vec!["y"]);
}

#[test]
fn wildcard_matches_any_named_node() {
    let source = "let x = foo(1);";
    let tree = parse(source);
    let q = query("(let_declaration value: (_) @v)");
    assert_eq!(captured(&q, &tree, source, "v"), vec!["foo(1)"]);
}

#[test]
fn anonymous_literals_match_tokens() {
    let source = "foo(1); bar();";
    let tree = parse(source);
    // Every expression statement carries its semicolon token.
    let q = query(r#"(expression_statement (call_expression) ";")"#);
    assert_eq!(q.tree_matches(&tree, source).len(), 2);
}

#[test]
fn zero_or_more_quantifier_matches_empty_and_full_lists() {
    let source = "foo(1,2); bar();";
    let tree = parse(source);
    let q = query("(arguments (number)* @nums)");
    let matches = q.tree_matches(&tree, source);
    assert_eq!(matches.len(), 2);
    assert_eq!(captured(&q, &tree, source, "nums"), vec!["1", "2"]);
}

#[test]
fn one_or_more_quantifier_requires_a_match() {
    let source = "foo(1,2); bar();";
    let tree = parse(source);
    let q = query("(arguments (number)+ @nums)");
    let matches = q.tree_matches(&tree, source);
    assert_eq!(matches.len(), 1);
    assert_eq!(captured(&q, &tree, source, "nums"), vec!["1", "2"]);
}

#[test]
fn optional_quantifier_matches_with_and_without() {
    let source = "foo(1); bar();";
    let tree = parse(source);
    let q = query("(call_expression arguments: (arguments (number)? @n))");
    assert_eq!(q.tree_matches(&tree, source).len(), 2);
    assert_eq!(captured(&q, &tree, source, "n"), vec!["1"]);
}

#[test]
fn multiple_patterns_report_their_index_in_preorder() {
    let source = "foo(1);";
    let tree = parse(source);
    let q = query("(identifier) @id (number) @num");
    assert_eq!(q.pattern_count(), 2);
    let matches = q.tree_matches(&tree, source);
    assert_eq!(matches.len(), 2);
    // The identifier precedes the number in pre-order.
    assert_eq!(matches[0].pattern_index, 0);
    assert_eq!(matches[1].pattern_index, 1);
}

#[test]
fn nested_patterns_match_whole_shapes() {
    let source = "foo(bar(1));";
    let tree = parse(source);
    let q = query(
        "(call_expression function: (identifier) @outer \
         arguments: (arguments (call_expression function: (identifier) @inner)))",
    );
    let matches = q.tree_matches(&tree, source);
    assert_eq!(matches.len(), 1);
    assert_eq!(captured(&q, &tree, source, "outer"), vec!["foo"]);
    assert_eq!(captured(&q, &tree, source, "inner"), vec!["bar"]);
}

#[test]
fn capture_names_are_in_declaration_order() {
    let q = query("(call_expression function: (identifier) @fn) (number) @num");
    assert_eq!(q.capture_names(), &["fn".to_string(), "num".to_string()]);
    assert_eq!(q.capture_index("fn"), Some(0));
    assert_eq!(q.capture_index("num"), Some(1));
    assert_eq!(q.capture_index("nope"), None);
}

// --- compile errors ------------------------------------------------------

#[test]
fn unknown_node_kind_fails_at_compile_time() {
    let err = Query::new(&stolyar_langs::miniscript(), "(no_such_kind)").unwrap_err();
    assert!(matches!(err, QueryError::UnknownNodeKind { .. }), "{err}");
}

#[test]
fn unknown_field_fails_at_compile_time() {
    let err =
        Query::new(&stolyar_langs::miniscript(), "(call_expression nope: (identifier))")
            .unwrap_err();
    assert!(matches!(err, QueryError::UnknownField { .. }), "{err}");
}

#[test]
fn unknown_predicate_fails_at_compile_time() {
    let err = Query::new(
        &stolyar_langs::miniscript(),
        r#"(identifier) @x (identifier (#frobnicate? @x "y"))"#,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::UnknownPredicate { .. }), "{err}");
}

#[test]
fn predicate_on_undefined_capture_fails() {
    let err = Query::new(
        &stolyar_langs::miniscript(),
        r#"(identifier (#eq? @ghost "x"))"#,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::CaptureNotFound { .. }), "{err}");
}

#[test]
fn bad_regex_fails_at_compile_time() {
    let err = Query::new(
        &stolyar_langs::miniscript(),
        r#"(identifier) @x (identifier (#match? @x "["))"#,
    )
    .unwrap_err();
    assert!(matches!(err, QueryError::InvalidRegex { .. }), "{err}");
}

#[test]
fn truncated_pattern_fails_at_compile_time() {
    let err = Query::new(&stolyar_langs::miniscript(), "(call_expression").unwrap_err();
    assert!(matches!(err, QueryError::UnexpectedEnd), "{err}");
}

#[test]
fn stray_token_fails_at_compile_time() {
    let err = Query::new(&stolyar_langs::miniscript(), "($)").unwrap_err();
    assert!(matches!(err, QueryError::UnexpectedToken { .. }), "{err}");
}
