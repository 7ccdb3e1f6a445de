//! Table-driven tokenization.
//!
//! The lexer is stateless over the source text: every call starts from a
//! byte/point position and the current parse state, consults the state's
//! valid terminal set (plus extras), and returns one token subtree. Leading
//! trivia is absorbed into the token's padding so the tree stays dense.
//!
//! Resolution order: external scanner (when the state asks for it), then
//! table terminals by longest match / highest rule precedence, then keyword
//! extraction through the word token. When nothing valid matches, recovery
//! lexing retries with every terminal in the grammar; if even that fails, a
//! single character is wrapped as an error token so the parser can always
//! advance.

use stolyar_core::{Language, Length, StateId, Symbol};
use tracing::trace;

use crate::external::{ExternalScanner, ExternalState};
use crate::subtree::Subtree;

pub(crate) struct Lexer<'a> {
    text: &'a str,
    language: Language,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str, language: Language) -> Self {
        Self { text, language }
    }

    pub fn text_len(&self) -> Length {
        Length::of_str(self.text)
    }

    /// Lex one token at `position` for `state`.
    pub fn lex(
        &self,
        position: Length,
        state: StateId,
        scanner: Option<&mut Box<dyn ExternalScanner>>,
        external_state: Option<&ExternalState>,
    ) -> Subtree {
        let lang = &self.language;
        let padding_bytes = lang.trivia_len(self.text, position.bytes as usize);
        let content_start = position.bytes as usize + padding_bytes as usize;
        let padding = Length::of_str(
            &self.text[position.bytes as usize..content_start],
        );

        // External tokens take priority in states that declare them.
        if lang.has_external_tokens(state) {
            if let Some(scanner) = scanner {
                if let Some(token) =
                    self.lex_external(content_start, padding, state, scanner, external_state)
                {
                    return token;
                }
            }
        }

        if content_start >= self.text.len() {
            return Subtree::new_eof(padding, state);
        }

        let valid = lang.valid_terminals(state);
        let extras = lang.extras();
        let candidates = valid.iter().chain(extras.iter()).copied();
        if let Some(token) = self.best_match(candidates, content_start, padding, state) {
            return token;
        }

        // Recovery: any terminal at all, so the parser can decide how to
        // wrap whatever text is here.
        let all = lang.lexable_terminals().collect::<Vec<_>>();
        if let Some(token) = self.best_match(all.into_iter(), content_start, padding, state) {
            return token;
        }

        // Last resort: one character becomes an error leaf.
        let ch_len = self.text[content_start..]
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1);
        let size = Length::of_str(&self.text[content_start..content_start + ch_len]);
        trace!(offset = content_start, "no token matched, emitting error byte");
        Subtree::new_error_leaf(padding, size, 0)
    }

    /// One character wrapped as an error leaf, for recovery steps that must
    /// make byte progress. `None` at end of input.
    pub fn one_char_error(&self, position: Length) -> Option<Subtree> {
        let padding_bytes = self.language.trivia_len(self.text, position.bytes as usize);
        let content_start = position.bytes as usize + padding_bytes as usize;
        let ch = self.text[content_start..].chars().next()?;
        let padding = Length::of_str(&self.text[position.bytes as usize..content_start]);
        let size = Length::of_str(&self.text[content_start..content_start + ch.len_utf8()]);
        Some(Subtree::new_error_leaf(padding, size, 0))
    }

    fn best_match(
        &self,
        candidates: impl Iterator<Item = Symbol>,
        content_start: usize,
        padding: Length,
        state: StateId,
    ) -> Option<Subtree> {
        let lang = &self.language;
        let mut best: Option<(Symbol, u32)> = None;
        for symbol in candidates {
            let Some(end) = lang.lex_match(symbol, self.text, content_start) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_sym, best_end)) => {
                    end > best_end
                        || (end == best_end
                            && lang.lex_precedence(symbol) > lang.lex_precedence(best_sym))
                }
            };
            if better {
                best = Some((symbol, end));
            }
        }
        let (mut symbol, end) = best?;
        let text = &self.text[content_start..end as usize];

        // Keyword extraction: a word-token match whose text is a keyword
        // valid in this state is re-labeled as that keyword.
        let mut keyword = false;
        if Some(symbol) == lang.word_token() {
            if let Some(kw) = lang.keyword_for_text(text) {
                if !lang.actions(state, kw).is_empty() {
                    symbol = kw;
                    keyword = true;
                }
            }
        }

        let keyword = keyword || lang.is_keyword(symbol);
        let size = Length::of_str(text);
        let lookahead = u32::from((end as usize) < self.text.len());
        Some(Subtree::new_leaf(
            lang, symbol, padding, size, lookahead, state, keyword,
        ))
    }

    fn lex_external(
        &self,
        content_start: usize,
        padding: Length,
        state: StateId,
        scanner: &mut Box<dyn ExternalScanner>,
        external_state: Option<&ExternalState>,
    ) -> Option<Subtree> {
        let lang = &self.language;
        let old_state = external_state.cloned().unwrap_or_default();
        scanner.deserialize(&old_state.0);

        let externals = lang.external_symbols();
        let valid: Vec<bool> = externals
            .iter()
            .map(|symbol| !lang.actions(state, *symbol).is_empty())
            .collect();
        if !valid.iter().any(|v| *v) {
            return None;
        }

        let matched = scanner.scan(self.text, content_start, &valid)?;
        let symbol = *externals.get(matched.index as usize)?;
        let end = content_start + matched.length as usize;
        if end > self.text.len() || !self.text.is_char_boundary(end) {
            return None;
        }
        let new_state = ExternalState(scanner.serialize());
        let state_changed = new_state != old_state;
        let size = Length::of_str(&self.text[content_start..end]);
        trace!(
            symbol = lang.symbol_name(symbol),
            bytes = matched.length,
            "external token"
        );
        Some(Subtree::new_external_leaf(
            lang,
            symbol,
            padding,
            size,
            0,
            state,
            new_state,
            state_changed,
        ))
    }
}
