//! Bundled demo grammars.
//!
//! These exist so tests and examples have real grammar tables to drive the
//! engine with; they are built once per process through the SLR construction
//! in [`builder`] and cached. `arith` is deliberately ambiguous (its table
//! keeps the shift/reduce conflict on `+`), which exercises the GLR
//! split/merge paths; `miniscript` is a small deterministic statement
//! language with fields, a keyword, comments as extras, and hidden rules.

use std::sync::OnceLock;

use stolyar_core::Language;

mod builder;

pub use builder::{BuildError, GrammarBuilder};

/// Ambiguous binary expressions: `expr -> expr "+" expr | number`.
pub fn arith() -> Language {
    static CACHE: OnceLock<Language> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            let mut g = GrammarBuilder::new("arith");
            g.token("number", "[0-9]+");
            g.literal("+");
            g.rule("program", &["expression"]);
            g.rule("expression", &["expression", "+", "expression"]);
            g.rule("expression", &["number"]);
            g.build().expect("arith grammar is valid")
        })
        .clone()
}

/// Statements, calls with `function:`/`arguments:` fields, a `let` keyword,
/// line comments as extras, and hidden `_expression`/`_statements` rules.
pub fn miniscript() -> Language {
    static CACHE: OnceLock<Language> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            let mut g = GrammarBuilder::new("miniscript");
            g.token("identifier", "[A-Za-z_][A-Za-z0-9_]*");
            g.token("number", "[0-9]+(\\.[0-9]+)?");
            g.token("string", "\"[^\"\\n]*\"");
            g.extra_token("comment", "//[^\\n]*");
            g.literal("(");
            g.literal(")");
            g.literal(",");
            g.literal(";");
            g.literal("=");
            g.keyword("let");
            g.word("identifier");

            g.rule("program", &[]);
            g.rule("program", &["_statements"]);
            g.rule("_statements", &["_statements", "_statement"]);
            g.rule("_statements", &["_statement"]);
            g.rule("_statement", &["expression_statement"]);
            g.rule("_statement", &["let_declaration"]);
            g.rule("expression_statement", &["_expression", ";"]);
            g.rule_with_fields(
                "let_declaration",
                &["let", "identifier", "=", "_expression", ";"],
                &[None, Some("name"), None, Some("value"), None],
            );
            g.rule("_expression", &["call_expression"]);
            g.rule("_expression", &["identifier"]);
            g.rule("_expression", &["number"]);
            g.rule("_expression", &["string"]);
            g.rule_with_fields(
                "call_expression",
                &["_expression", "arguments"],
                &[Some("function"), Some("arguments")],
            );
            g.rule("arguments", &["(", ")"]);
            g.rule("arguments", &["(", "_argument_list", ")"]);
            g.rule("_argument_list", &["_argument_list", ",", "_expression"]);
            g.rule("_argument_list", &["_expression"]);
            g.build().expect("miniscript grammar is valid")
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn languages_build_and_cache() {
        let a = arith();
        let b = arith();
        assert_eq!(a.name(), "arith");
        assert_eq!(a.symbol_count(), b.symbol_count());

        let m = miniscript();
        assert_eq!(m.name(), "miniscript");
        assert!(m.symbol_for_name("call_expression", true).is_some());
        assert!(m.symbol_for_name("_expression", false).is_some());
        assert!(m.field_id("function").is_some());
        assert_eq!(m.word_token(), m.symbol_for_name("identifier", true));
    }

    #[test]
    fn miniscript_keyword_is_extracted() {
        let m = miniscript();
        let kw = m.keyword_for_text("let").expect("let is a keyword");
        assert!(m.is_keyword(kw));
        assert_eq!(m.keyword_for_text("letter"), None);
    }

    #[test]
    fn miniscript_comment_is_extra() {
        let m = miniscript();
        let comment = m.symbol_for_name("comment", true).unwrap();
        assert!(m.is_extra(comment));
        assert!(m.extras().contains(&comment));
    }
}
