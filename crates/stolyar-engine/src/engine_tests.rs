//! End-to-end engine tests against the bundled demo grammars.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use proptest::prelude::*;

use stolyar_core::{InputEdit, Length, Point};

use crate::external::{ExternalMatch, ExternalScanner};
use crate::node::Node;
use crate::parser::{ParseError, Parser};
use crate::tree::Tree;

fn parse(language: stolyar_core::Language, text: &str) -> Tree {
    let mut parser = Parser::new();
    parser.set_language(language);
    parser.parse(text, None).expect("parse is infallible here")
}

fn point_at(text: &str, byte: usize) -> Point {
    Length::of_str(&text[..byte]).extent
}

/// Build the edit replacing `old[start..old_end]` such that the replacement
/// ends at `new_end` in the new text.
fn edit_for(old: &str, new: &str, start: usize, old_end: usize, new_end: usize) -> InputEdit {
    InputEdit {
        start_byte: start as u32,
        old_end_byte: old_end as u32,
        new_end_byte: new_end as u32,
        start_point: point_at(old, start),
        old_end_point: point_at(old, old_end),
        new_end_point: point_at(new, new_end),
    }
}

/// Check the span invariants: the root covers the whole source, and
/// every node's visible children lie inside it, in order, without overlap.
fn check_span_invariants(tree: &Tree, len: usize) {
    let root = tree.root_node();
    assert_eq!(root.end_byte(), len, "root must span the whole source");
    fn check(node: Node<'_>) {
        let mut cursor = node.start_byte();
        for child in node.children() {
            assert!(child.start_byte() >= cursor, "children out of order");
            assert!(child.end_byte() <= node.end_byte(), "child escapes parent");
            cursor = child.end_byte();
            check(child);
        }
    }
    check(root);
}

// --- plain parsing -------------------------------------------------------

#[test]
fn parses_calls_with_fields() {
    let tree = parse(stolyar_langs::miniscript(), "foo(1,2); bar();");
    insta::assert_snapshot!(
        tree.to_sexp(),
        @"(program (expression_statement (call_expression function: (identifier) arguments: (arguments (number) (number)))) (expression_statement (call_expression function: (identifier) arguments: (arguments))))"
    );
    check_span_invariants(&tree, 16);
    assert!(!tree.root_node().has_error());
}

#[test]
fn parses_let_with_keyword() {
    let tree = parse(stolyar_langs::miniscript(), "let x = 1;");
    insta::assert_snapshot!(
        tree.to_sexp(),
        @"(program (let_declaration name: (identifier) value: (number)))"
    );

    let declaration = tree.root_node().child(0).unwrap();
    let keyword = declaration.child(0).unwrap();
    assert_eq!(keyword.kind(), "let");
    assert!(keyword.is_keyword());
    assert!(!keyword.is_named());
}

#[test]
fn comments_are_extras() {
    let source = indoc::indoc! {"
        // greeting
        foo();
    "};
    let tree = parse(stolyar_langs::miniscript(), source);
    let sexp = tree.to_sexp();
    assert!(sexp.contains("(comment)"), "sexp: {sexp}");
    assert!(!tree.root_node().has_error());
    check_span_invariants(&tree, source.len());
}

#[test]
fn empty_source_parses_to_empty_program() {
    let tree = parse(stolyar_langs::miniscript(), "");
    assert_eq!(tree.to_sexp(), "(program)");
    assert_eq!(tree.root_node().end_byte(), 0);
}

#[test]
fn trailing_trivia_is_covered_by_the_root() {
    let source = "foo();   \n";
    let tree = parse(stolyar_langs::miniscript(), source);
    check_span_invariants(&tree, source.len());
}

#[test]
fn idempotent_parsing_yields_identical_shapes() {
    let source = "let a = foo(1, bar(2));";
    let first = parse(stolyar_langs::miniscript(), source);
    let second = parse(stolyar_langs::miniscript(), source);
    assert_eq!(first.to_sexp(), second.to_sexp());
}

// --- node and cursor -----------------------------------------------------

#[test]
fn node_navigation_and_fields() {
    let source = "foo(1,2);";
    let tree = parse(stolyar_langs::miniscript(), source);
    let root = tree.root_node();
    assert_eq!(root.kind(), "program");

    let statement = root.child(0).unwrap();
    let call = statement.child(0).unwrap();
    assert_eq!(call.kind(), "call_expression");

    let callee = call.child_by_field_name("function").unwrap();
    assert_eq!(callee.kind(), "identifier");
    assert_eq!(callee.utf8_text(source), "foo");

    let arguments = call.child_by_field_name("arguments").unwrap();
    assert_eq!(arguments.kind(), "arguments");
    assert_eq!(arguments.named_child_count(), 2);
    assert_eq!(arguments.named_child(0).unwrap().utf8_text(source), "1");

    assert_eq!(callee.parent().unwrap(), call);
    assert_eq!(call.parent().unwrap(), statement);
    assert_eq!(root.parent(), None);
}

#[test]
fn cursor_walks_preorder_and_restarts() {
    let tree = parse(stolyar_langs::miniscript(), "foo(1); bar(2);");
    let mut cursor = tree.walk();
    assert_eq!(cursor.node().kind(), "program");
    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "expression_statement");
    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "call_expression");
    assert!(cursor.goto_first_child());
    assert_eq!(cursor.node().kind(), "identifier");
    assert_eq!(cursor.field_name(), Some("function"));
    assert!(!cursor.goto_first_child());
    assert!(cursor.goto_next_sibling());
    assert_eq!(cursor.node().kind(), "arguments");
    assert!(cursor.goto_parent());
    assert_eq!(cursor.node().kind(), "call_expression");

    cursor.reset();
    assert_eq!(cursor.node().kind(), "program");
    assert_eq!(cursor.depth(), 0);

    // The lazy pre-order sequence visits every visible node once.
    let via_iterator: Vec<String> = tree
        .preorder()
        .map(|node| node.kind().to_string())
        .collect();
    assert_eq!(via_iterator[0], "program");
    assert_eq!(
        via_iterator.iter().filter(|k| *k == "call_expression").count(),
        2
    );
}

// --- GLR ambiguity -------------------------------------------------------

#[test]
fn ambiguous_grammar_parses_cleanly() {
    let tree = parse(stolyar_langs::arith(), "1+2+3");
    assert!(!tree.root_node().has_error());
    check_span_invariants(&tree, 5);
    let numbers = tree
        .preorder()
        .filter(|node| node.kind() == "number")
        .count();
    assert_eq!(numbers, 3);
}

#[test]
fn deeply_ambiguous_input_stays_bounded() {
    let source = "1+2+3+4+5+6+7+8";
    let tree = parse(stolyar_langs::arith(), source);
    assert!(!tree.root_node().has_error());
    check_span_invariants(&tree, source.len());
}

// --- error recovery ------------------------------------------------------

#[test]
fn missing_semicolon_is_fabricated() {
    let tree = parse(stolyar_langs::miniscript(), "let x = 1");
    let sexp = tree.to_sexp();
    assert!(sexp.contains("MISSING"), "sexp: {sexp}");
    assert!(tree.root_node().has_error());
    check_span_invariants(&tree, 9);
}

#[test]
fn missing_close_paren_is_fabricated() {
    let tree = parse(stolyar_langs::miniscript(), "foo(1,2; bar();");
    let sexp = tree.to_sexp();
    assert!(sexp.contains("MISSING") || sexp.contains("ERROR"), "sexp: {sexp}");
    check_span_invariants(&tree, 15);
}

#[test]
fn garbage_input_still_yields_a_full_tree() {
    for source in ["###@@@", "foo(((((", ")(", "let let let", "\u{1F980} crab"] {
        let tree = parse(stolyar_langs::miniscript(), source);
        check_span_invariants(&tree, source.len());
        assert!(tree.root_node().has_error(), "source: {source}");
    }
}

#[test]
fn skipped_tokens_become_error_nodes() {
    let source = "foo(); @ bar();";
    let tree = parse(stolyar_langs::miniscript(), source);
    let sexp = tree.to_sexp();
    assert!(sexp.contains("ERROR"), "sexp: {sexp}");
    assert!(sexp.matches("(call_expression").count() >= 2, "sexp: {sexp}");
    check_span_invariants(&tree, source.len());
}

// --- incremental parsing -------------------------------------------------

fn reparse_after(
    old_text: &str,
    new_text: &str,
    start: usize,
    old_end: usize,
    new_end: usize,
) -> (Tree, Tree) {
    let mut parser = Parser::new();
    parser.set_language(stolyar_langs::miniscript());
    let mut old_tree = parser.parse(old_text, None).expect("initial parse");
    old_tree.edit(&edit_for(old_text, new_text, start, old_end, new_end));
    let new_tree = parser
        .parse(new_text, Some(&old_tree))
        .expect("incremental parse");
    (old_tree, new_tree)
}

#[test]
fn incremental_reparse_matches_fresh_parse() {
    let old_text = "foo(1,2); bar();";
    let new_text = "foo(42,2); bar();";
    let (_, incremental) = reparse_after(old_text, new_text, 4, 5, 6);

    let fresh = parse(stolyar_langs::miniscript(), new_text);
    assert_eq!(incremental.to_sexp(), fresh.to_sexp());
    check_span_invariants(&incremental, new_text.len());
}

#[test]
fn incremental_reparse_after_deleting_a_statement() {
    let old_text = "foo(1,2); bar();";
    let new_text = " bar();";
    let (_, incremental) = reparse_after(old_text, new_text, 0, 9, 0);
    let fresh = parse(stolyar_langs::miniscript(), new_text);
    assert_eq!(incremental.to_sexp(), fresh.to_sexp());
}

#[test]
fn incremental_reparse_after_inserting_a_statement() {
    let old_text = "foo(1,2); bar();";
    let new_text = "foo(1,2); baz(9); bar();";
    let (_, incremental) = reparse_after(old_text, new_text, 9, 9, 17);
    let fresh = parse(stolyar_langs::miniscript(), new_text);
    assert_eq!(incremental.to_sexp(), fresh.to_sexp());
}

#[test]
fn edit_keeps_the_candidate_tree_span_consistent() {
    let old_text = "foo(1,2); bar();";
    let new_text = "foo(1,2); extra(); bar();";
    let mut parser = Parser::new();
    parser.set_language(stolyar_langs::miniscript());
    let mut tree = parser.parse(old_text, None).expect("parse");
    tree.edit(&edit_for(old_text, new_text, 9, 9, 18));
    assert_eq!(tree.len(), new_text.len());
    assert_eq!(tree.root_node().end_byte(), new_text.len());
}

// --- changed ranges ------------------------------------------------------

#[test]
fn changed_ranges_cover_the_edit_and_spare_the_rest() {
    let old_text = "foo(1,2); bar();";
    let new_text = "foo(42,2); bar();";
    let (old_tree, new_tree) = reparse_after(old_text, new_text, 4, 5, 6);

    let ranges = old_tree.changed_ranges(&new_tree);
    assert!(!ranges.is_empty());
    // Sorted and non-overlapping.
    for pair in ranges.windows(2) {
        assert!(pair[0].end_byte <= pair[1].start_byte);
    }
    // The edited literal is covered.
    assert!(
        ranges
            .iter()
            .any(|r| r.start_byte <= 4 && r.end_byte >= 6),
        "ranges: {ranges:?}"
    );
    // The untouched second statement is spared.
    assert!(
        ranges.iter().all(|r| r.end_byte <= 10),
        "ranges: {ranges:?}"
    );
}

#[test]
fn identical_reparse_reports_no_changes() {
    let text = "foo(1,2); bar();";
    let first = parse(stolyar_langs::miniscript(), text);
    let second = parse(stolyar_langs::miniscript(), text);
    assert_eq!(first.changed_ranges(&second), vec![]);
}

// --- cancellation and misuse --------------------------------------------

#[test]
fn parse_without_language_is_an_error() {
    let mut parser = Parser::new();
    assert!(matches!(parser.parse("x", None), Err(ParseError::NoLanguage)));
}

#[test]
fn cancellation_flag_aborts_the_parse() {
    let mut parser = Parser::new();
    parser.set_language(stolyar_langs::miniscript());
    let flag = Arc::new(AtomicBool::new(true));
    parser.set_cancellation_flag(Some(flag));
    assert!(matches!(
        parser.parse("foo();", None),
        Err(ParseError::Cancelled)
    ));
}

// --- shared trees across threads ----------------------------------------

#[test]
fn clones_are_traversable_from_multiple_threads() {
    let tree = parse(stolyar_langs::miniscript(), "foo(1,2); bar(); let x = foo;");
    let expected = tree.preorder().count();
    let a = tree.clone();
    let b = tree.clone();
    std::thread::scope(|scope| {
        let ta = scope.spawn(move || a.preorder().count());
        let tb = scope.spawn(move || b.preorder().count());
        assert_eq!(ta.join().expect("thread a"), expected);
        assert_eq!(tb.join().expect("thread b"), expected);
    });
    // The original is still whole after the clones dropped.
    assert_eq!(tree.preorder().count(), expected);
}

// --- external scanner ----------------------------------------------------

mod external_scanner {
    use super::*;
    use stolyar_core::{
        GrammarTable, Language, LexRule, ParseAction, ParseState, Production, SymbolInfo,
    };

    fn symbol(name: &str, terminal: bool, external: bool) -> SymbolInfo {
        SymbolInfo {
            name: name.to_string(),
            named: true,
            visible: true,
            terminal,
            extra: false,
            keyword: false,
            external,
        }
    }

    /// doc -> chunk, where `chunk` is produced by the external scanner.
    fn raw_language() -> Language {
        let end = SymbolInfo {
            name: "end".to_string(),
            named: false,
            visible: false,
            terminal: true,
            extra: false,
            keyword: false,
            external: false,
        };
        let table = GrammarTable {
            name: "rawdoc".to_string(),
            symbols: vec![end, symbol("chunk", true, true), symbol("doc", false, false)],
            fields: vec![],
            productions: vec![Production {
                symbol: 2,
                child_count: 1,
                field_slots: vec![],
                dynamic_precedence: 0,
            }],
            states: vec![
                ParseState::default(),
                ParseState {
                    actions: vec![(1, vec![ParseAction::Shift { state: 2 }])],
                    gotos: vec![(2, 3)],
                    external: true,
                },
                ParseState {
                    actions: vec![(0, vec![ParseAction::Reduce { production: 0 }])],
                    gotos: vec![],
                    external: false,
                },
                ParseState {
                    actions: vec![(0, vec![ParseAction::Accept])],
                    gotos: vec![],
                    external: false,
                },
            ],
            start_state: 1,
            lexical: Vec::<LexRule>::new(),
            trivia_pattern: None,
            word_token: None,
            external_symbols: vec![1],
        };
        Language::from_table(table).expect("rawdoc table is valid")
    }

    struct ChunkScanner {
        scans: u32,
    }

    impl ExternalScanner for ChunkScanner {
        fn scan(&mut self, text: &str, position: usize, valid: &[bool]) -> Option<ExternalMatch> {
            if !valid.first().copied().unwrap_or(false) || position >= text.len() {
                return None;
            }
            self.scans += 1;
            Some(ExternalMatch {
                index: 0,
                length: (text.len() - position) as u32,
            })
        }

        fn serialize(&self) -> Vec<u8> {
            self.scans.to_le_bytes().to_vec()
        }

        fn deserialize(&mut self, bytes: &[u8]) {
            self.scans = match bytes.try_into() {
                Ok(raw) => u32::from_le_bytes(raw),
                Err(_) => 0,
            };
        }
    }

    #[test]
    fn external_tokens_flow_through_the_parse() {
        let mut parser = Parser::new();
        parser.set_language(raw_language());
        parser.set_external_scanner(Some(Box::new(ChunkScanner { scans: 0 })));
        let tree = parser.parse("anything at all", None).expect("parse");
        assert_eq!(tree.to_sexp(), "(doc (chunk))");
        assert_eq!(tree.root_node().end_byte(), 15);
        assert!(!tree.root_node().has_error());
    }
}

// --- property: incremental equivalence -----------------------------------

const STATEMENT_POOL: [&str; 5] = [
    "foo(1,2);",
    "bar();",
    "let x = 1;",
    "baz(qux);",
    "s(\"hi\");\n",
];

fn join(indices: &[usize]) -> String {
    indices.iter().map(|i| STATEMENT_POOL[*i]).collect()
}

fn boundaries(indices: &[usize]) -> Vec<usize> {
    let mut out = vec![0];
    let mut at = 0;
    for i in indices {
        at += STATEMENT_POOL[*i].len();
        out.push(at);
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn incremental_equals_fresh_for_statement_edits(
        statements in proptest::collection::vec(0usize..STATEMENT_POOL.len(), 0..5),
        replacement in 0usize..STATEMENT_POOL.len(),
        slot in 0usize..6,
    ) {
        let old_text = join(&statements);
        let bounds = boundaries(&statements);

        // Replace one statement, or insert at a boundary.
        let (start, old_end, inserted) = if statements.is_empty() {
            (0, 0, STATEMENT_POOL[replacement])
        } else if slot < statements.len() {
            (bounds[slot], bounds[slot + 1], STATEMENT_POOL[replacement])
        } else {
            let at = bounds[slot % bounds.len()];
            (at, at, STATEMENT_POOL[replacement])
        };
        let mut new_text = String::new();
        new_text.push_str(&old_text[..start]);
        new_text.push_str(inserted);
        new_text.push_str(&old_text[old_end..]);
        let new_end = start + inserted.len();

        let mut parser = Parser::new();
        parser.set_language(stolyar_langs::miniscript());
        let mut old_tree = parser.parse(&old_text, None).expect("parse old");
        old_tree.edit(&edit_for(&old_text, &new_text, start, old_end, new_end));
        let incremental = parser
            .parse(&new_text, Some(&old_tree))
            .expect("incremental parse");
        let fresh = parser.parse(&new_text, None).expect("fresh parse");

        prop_assert_eq!(incremental.to_sexp(), fresh.to_sexp());
        prop_assert_eq!(incremental.root_node().end_byte(), new_text.len());
    }
}
