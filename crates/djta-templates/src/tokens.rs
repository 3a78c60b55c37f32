use serde::Serialize;

use crate::span::Span;

/// Lexical unit of a template source.
///
/// `Tag` and `Variable` carry their inner content with the surrounding
/// delimiters and padding stripped; `Comment` and `Text` only record
/// where they sit in the source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Token {
    Tag { content: String, span: Span },
    Variable { content: String, span: Span },
    Comment { span: Span },
    Text { span: Span },
}

impl Token {
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Token::Tag { span, .. }
            | Token::Variable { span, .. }
            | Token::Comment { span }
            | Token::Text { span } => *span,
        }
    }
}
