//! Recursive-descent compiler from pattern source to `PatternData`.
//!
//! All validation happens here: node kinds and fields are resolved against
//! the language, predicate regexes are compiled, and capture references are
//! checked — a malformed pattern never survives to match time.

use indexmap::IndexSet;
use regex_automata::dfa::dense;
use stolyar_core::Language;

use crate::QueryError;
use crate::lexer::{Token, TokenKind, lex, token_text};
use crate::pattern::{PatternData, Predicate, Quantifier, Step, StepKind};

pub(crate) struct ParseOutput {
    pub patterns: Vec<PatternData>,
    pub capture_names: IndexSet<String>,
}

pub(crate) fn parse_query(language: &Language, source: &str) -> Result<ParseOutput, QueryError> {
    let tokens = lex(source);
    let mut parser = PatternParser {
        language,
        source,
        tokens,
        at: 0,
        capture_names: IndexSet::new(),
    };
    let mut patterns = Vec::new();
    while !parser.is_done() {
        patterns.push(parser.pattern()?);
    }
    Ok(ParseOutput {
        patterns,
        capture_names: parser.capture_names,
    })
}

struct PatternParser<'q> {
    language: &'q Language,
    source: &'q str,
    tokens: Vec<Token>,
    at: usize,
    capture_names: IndexSet<String>,
}

impl<'q> PatternParser<'q> {
    fn is_done(&self) -> bool {
        self.at >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.at)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek2_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.at + 1).map(|t| t.kind)
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.span.start).unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Result<Token, QueryError> {
        let token = self
            .tokens
            .get(self.at)
            .cloned()
            .ok_or(QueryError::UnexpectedEnd)?;
        self.at += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, QueryError> {
        let offset = self.offset();
        let token = self.bump()?;
        if token.kind != kind {
            return Err(QueryError::UnexpectedToken { offset });
        }
        Ok(token)
    }

    /// One top-level pattern: a parenthesized node with optional suffixes.
    fn pattern(&mut self) -> Result<PatternData, QueryError> {
        let mut predicates = Vec::new();
        let root = self.node(&mut predicates)?;
        Ok(PatternData { root, predicates })
    }

    /// `( kind child* )` with suffixes, or `(_ ...)`.
    fn node(&mut self, predicates: &mut Vec<Predicate>) -> Result<Step, QueryError> {
        self.expect(TokenKind::LParen)?;
        let offset = self.offset();
        let head = self.bump()?;
        let mut step = match head.kind {
            TokenKind::Underscore => Step::new(StepKind::Wildcard { named_only: true }),
            TokenKind::Ident => {
                let name = token_text(self.source, &head);
                let symbol = self
                    .language
                    .symbol_for_name(name, true)
                    .ok_or_else(|| QueryError::UnknownNodeKind {
                        name: name.to_string(),
                        offset,
                    })?;
                Step::new(StepKind::Named(symbol))
            }
            _ => return Err(QueryError::UnexpectedToken { offset }),
        };

        loop {
            match self.peek_kind() {
                Some(TokenKind::RParen) => {
                    self.at += 1;
                    break;
                }
                Some(_) => {
                    if let Some(child) = self.child_item(predicates)? {
                        step.children.push(child);
                    }
                }
                None => return Err(QueryError::UnexpectedEnd),
            }
        }

        self.suffixes(&mut step)?;
        Ok(step)
    }

    /// A child inside a node body: a field-prefixed or bare node, string,
    /// wildcard — or an inline predicate, which produces no step.
    fn child_item(
        &mut self,
        predicates: &mut Vec<Predicate>,
    ) -> Result<Option<Step>, QueryError> {
        let field = if self.peek_kind() == Some(TokenKind::Ident)
            && self.peek2_kind() == Some(TokenKind::Colon)
        {
            let offset = self.offset();
            let token = self.bump()?;
            self.bump()?; // colon
            let name = token_text(self.source, &token);
            let field =
                self.language
                    .field_id(name)
                    .ok_or_else(|| QueryError::UnknownField {
                        name: name.to_string(),
                        offset,
                    })?;
            Some(field)
        } else {
            None
        };

        let offset = self.offset();
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                if self.peek2_kind() == Some(TokenKind::PredicateName) {
                    if field.is_some() {
                        return Err(QueryError::UnexpectedToken { offset });
                    }
                    self.predicate(predicates)?;
                    return Ok(None);
                }
                let mut step = self.node(predicates)?;
                step.field = field;
                Ok(Some(step))
            }
            Some(TokenKind::String) => {
                let token = self.bump()?;
                let text = unescape(token_text(self.source, &token));
                let symbol = self
                    .language
                    .symbol_for_name(&text, false)
                    .ok_or_else(|| QueryError::UnknownNodeKind {
                        name: text.clone(),
                        offset,
                    })?;
                let mut step = Step::new(StepKind::Anonymous(symbol));
                step.field = field;
                self.suffixes(&mut step)?;
                Ok(Some(step))
            }
            Some(TokenKind::Underscore) => {
                self.at += 1;
                let mut step = Step::new(StepKind::Wildcard { named_only: false });
                step.field = field;
                self.suffixes(&mut step)?;
                Ok(Some(step))
            }
            Some(_) => Err(QueryError::UnexpectedToken { offset }),
            None => Err(QueryError::UnexpectedEnd),
        }
    }

    /// Quantifiers and captures following a node, string, or wildcard.
    fn suffixes(&mut self, step: &mut Step) -> Result<(), QueryError> {
        loop {
            match self.peek_kind() {
                Some(TokenKind::Star) => {
                    self.at += 1;
                    step.quantifier = Quantifier::ZeroOrMore;
                }
                Some(TokenKind::Plus) => {
                    self.at += 1;
                    step.quantifier = Quantifier::OneOrMore;
                }
                Some(TokenKind::Question) => {
                    self.at += 1;
                    step.quantifier = Quantifier::ZeroOrOne;
                }
                Some(TokenKind::Capture) => {
                    let token = self.bump()?;
                    let name = token_text(self.source, &token)
                        .trim_start_matches('@')
                        .to_string();
                    let (index, _) = self.capture_names.insert_full(name);
                    step.captures.push(index as u32);
                }
                _ => return Ok(()),
            }
        }
    }

    /// `(#eq? @cap "text")` and friends.
    fn predicate(&mut self, predicates: &mut Vec<Predicate>) -> Result<(), QueryError> {
        self.expect(TokenKind::LParen)?;
        let offset = self.offset();
        let name_token = self.expect(TokenKind::PredicateName)?;
        let name = token_text(self.source, &name_token).to_string();

        let capture_offset = self.offset();
        let capture_token = self.expect(TokenKind::Capture)?;
        let capture_name = token_text(self.source, &capture_token).trim_start_matches('@');
        let capture = self
            .capture_names
            .get_index_of(capture_name)
            .ok_or_else(|| QueryError::CaptureNotFound {
                name: capture_name.to_string(),
                offset: capture_offset,
            })? as u32;

        let value_token = self.expect(TokenKind::String)?;
        let value = unescape(token_text(self.source, &value_token));
        self.expect(TokenKind::RParen)?;

        let predicate = match name.as_str() {
            "#eq?" | "#not-eq?" => Predicate::TextEq {
                capture,
                negated: name == "#not-eq?",
                value,
            },
            "#match?" | "#not-match?" => {
                let dfa = dense::DFA::new(&value).map_err(|err| QueryError::InvalidRegex {
                    pattern: value.clone(),
                    message: err.to_string(),
                })?;
                Predicate::TextMatch {
                    capture,
                    dfa: Box::new(dfa),
                    negated: name == "#not-match?",
                }
            }
            _ => return Err(QueryError::UnknownPredicate { name, offset }),
        };
        predicates.push(predicate);
        Ok(())
    }
}

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => break,
            }
        } else {
            out.push(ch);
        }
    }
    out
}
