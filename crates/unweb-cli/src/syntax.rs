//! Lexical JavaScript/TypeScript analysis backing fingerprinting.
//!
//! unweb-core treats comment stripping and declaration scanning as an
//! injected collaborator; this is the CLI's implementation. It is a
//! lexer-level approximation, not a parser: strings, template literals,
//! and escapes are respected so comment markers inside them survive, but
//! regex literals containing `//` may confuse it on pathological input.
//! Fingerprinting only needs determinism, which this has.

use std::sync::LazyLock;

use regex::Regex;
use unweb_core::ast::SyntaxAnalyzer;

/// String/template-aware lexical analyzer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalAnalyzer;

#[derive(Clone, Copy, PartialEq)]
enum State {
    Code,
    LineComment,
    BlockComment,
    Single,
    Double,
    Template,
}

impl SyntaxAnalyzer for LexicalAnalyzer {
    fn strip_comments(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let mut state = State::Code;
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match state {
                State::Code => match c {
                    '/' if chars.peek() == Some(&'/') => {
                        chars.next();
                        state = State::LineComment;
                    },
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        state = State::BlockComment;
                    },
                    '\'' => {
                        state = State::Single;
                        out.push(c);
                    },
                    '"' => {
                        state = State::Double;
                        out.push(c);
                    },
                    '`' => {
                        state = State::Template;
                        out.push(c);
                    },
                    _ => out.push(c),
                },
                State::LineComment => {
                    if c == '\n' {
                        out.push(c);
                        state = State::Code;
                    }
                },
                State::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        state = State::Code;
                    }
                },
                State::Single | State::Double | State::Template => {
                    out.push(c);
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if (state == State::Single && c == '\'')
                        || (state == State::Double && c == '"')
                        || (state == State::Template && c == '`')
                        || (state != State::Template && c == '\n')
                    {
                        state = State::Code;
                    }
                },
            }
        }
        out
    }

    fn declaration_names(&self, source: &str) -> Vec<String> {
        #[allow(clippy::unwrap_used)]
        static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\b(?:function\s*\*?|class|const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)")
                .unwrap()
        });
        #[allow(clippy::unwrap_used)]
        static EXPORT_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\bexports\.([A-Za-z_$][A-Za-z0-9_$]*)\s*=").unwrap()
        });

        let stripped = self.strip_comments(source);
        let mut names: Vec<String> = DECLARATION
            .captures_iter(&stripped)
            .map(|capture| capture[1].to_string())
            .collect();
        names.extend(
            EXPORT_ASSIGN
                .captures_iter(&stripped)
                .map(|capture| capture[1].to_string()),
        );
        names
    }
}
