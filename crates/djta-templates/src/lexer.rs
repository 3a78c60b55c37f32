use crate::span::Span;
use crate::tokens::Token;

const TAG_START: &str = "{%";
const TAG_END: &str = "%}";
const VARIABLE_START: &str = "{{";
const VARIABLE_END: &str = "}}";
const COMMENT_START: &str = "{#";
const COMMENT_END: &str = "#}";

pub struct Lexer<'src> {
    source: &'src str,
    start: usize,
    current: usize,
}

impl<'src> Lexer<'src> {
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            start: 0,
            current: 0,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.start = self.current;

            let token = match (self.peek(), self.peek_next()) {
                ('{', '%') => self.lex_construct(TAG_END, |content, span| Token::Tag {
                    content,
                    span,
                }),
                ('{', '{') => self.lex_construct(VARIABLE_END, |content, span| Token::Variable {
                    content,
                    span,
                }),
                ('{', '#') => self.lex_construct(COMMENT_END, |_, span| Token::Comment { span }),
                _ => self.lex_text(),
            };

            tokens.push(token);
        }

        tokens
    }

    fn lex_construct(&mut self, end: &str, token_fn: impl FnOnce(String, Span) -> Token) -> Token {
        self.consume_n(2);

        match self.consume_until(end) {
            Some(content) => {
                self.consume_n(2);
                token_fn(content, self.span_from_start())
            }
            None => {
                // No closing delimiter; the opener reads as literal text.
                self.current = self.start + 2;
                Token::Text {
                    span: self.span_from_start(),
                }
            }
        }
    }

    fn lex_text(&mut self) -> Token {
        while !self.is_at_end() {
            let rest = &self.source[self.current..];
            if rest.starts_with(TAG_START)
                || rest.starts_with(VARIABLE_START)
                || rest.starts_with(COMMENT_START)
            {
                break;
            }
            self.consume();
        }

        Token::Text {
            span: self.span_from_start(),
        }
    }

    fn span_from_start(&self) -> Span {
        Span::new(
            u32::try_from(self.start).unwrap_or(u32::MAX),
            u32::try_from(self.current - self.start).unwrap_or(u32::MAX),
        )
    }

    #[inline]
    fn peek(&self) -> char {
        self.source[self.current..].chars().next().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        let mut chars = self.source[self.current..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    fn consume(&mut self) {
        if let Some(ch) = self.source[self.current..].chars().next() {
            self.current += ch.len_utf8();
        }
    }

    fn consume_n(&mut self, count: usize) {
        for _ in 0..count {
            self.consume();
        }
    }

    fn consume_until(&mut self, delimiter: &str) -> Option<String> {
        let offset = self.current;

        while self.current < self.source.len() {
            if self.source[self.current..].starts_with(delimiter) {
                return Some(self.source[offset..self.current].trim().to_string());
            }
            self.consume();
        }

        None
    }
}
