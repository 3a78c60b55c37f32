//! Django-style template parsing for static analysis.
//!
//! This crate turns template source into a tree of nodes that can be
//! searched without rendering:
//!
//! 1. **Lexing**: source is split into tag, variable, comment, and
//!    text tokens
//! 2. **Parsing**: tokens become a [`NodeList`] tree in which
//!    `extends`, `include`, and `block` are first-class nodes and
//!    other paired tags collect labeled branches
//!
//! Tag shapes for the second step come from [`TagSpecs`]: Django's
//! built-in paired tags are known out of the box, and projects can
//! declare their own in `djta.toml`, `.djta.toml`, or
//! `pyproject.toml`.
//!
//! Parsing is strict: a malformed template is a [`ParseError`], not a
//! partial tree.

mod lexer;
pub mod nodelist;
mod parser;
mod quotes;
mod span;
mod tagspecs;
mod tokens;

pub use lexer::Lexer;
pub use nodelist::IncludeTarget;
pub use nodelist::Node;
pub use nodelist::NodeKind;
pub use nodelist::NodeList;
pub use nodelist::ParentRef;
pub use nodelist::TagBranch;
pub use nodelist::Template;
pub use parser::ParseError;
pub use parser::Parser;
pub use quotes::unquote;
pub use span::Span;
pub use tagspecs::EndTag;
pub use tagspecs::TagSpec;
pub use tagspecs::TagSpecError;
pub use tagspecs::TagSpecs;
pub use tokens::Token;

/// Lex and parse `source` into a node tree.
pub fn parse_template(source: &str, specs: &TagSpecs) -> Result<NodeList, ParseError> {
    let tokens = Lexer::new(source).tokenize();
    Parser::new(tokens, specs).parse()
}
