use camino::Utf8PathBuf;
use djta_templates::ParseError;
use thiserror::Error;

/// Errors surfaced while scanning a template and the templates it
/// composes with.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// A `{{ block.super }}` was reached inside an override whose
    /// chain has no ancestor definition for the block.
    #[error("Cannot read {{{{ block.super }}}} for block '{name}': the parent template does not define this block")]
    MissingSuperBlock { name: String },

    #[error("Template '{name}' could not be found")]
    TemplateNotFound { name: String },

    #[error("Template '{name}' could not be parsed")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },

    #[error("Template file '{path}' could not be read")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_super_block_names_the_block() {
        let err = AnalyzerError::MissingSuperBlock {
            name: "content".to_string(),
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"Cannot read {{ block.super }} for block 'content': the parent template does not define this block"
        );
    }

    #[test]
    fn parse_error_keeps_its_source() {
        let err = AnalyzerError::Parse {
            name: "broken.html".to_string(),
            source: ParseError::EmptyTag,
        };
        assert_eq!(err.to_string(), "Template 'broken.html' could not be parsed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
