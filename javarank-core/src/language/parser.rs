//! Language-agnostic parser interface

use thiserror::Error;

/// Declarations pulled out of one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUnit {
    /// Dotted package name, empty for the default package
    pub package: String,
    /// Top-level type names in source order
    pub type_names: Vec<String>,
    /// Import paths in source order. Wildcards keep the package path and
    /// static imports keep the member path.
    pub imports: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },
    #[error("parser produced no tree")]
    NoTree,
    #[error("failed to load grammar: {0}")]
    Grammar(String),
}

/// Parses source text into a [`ParsedUnit`].
///
/// Implementations are shared across worker threads.
pub trait SourceParser: Sync {
    fn parse(&self, source: &str) -> Result<ParsedUnit, ParseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedParser(ParsedUnit);

    impl SourceParser for FixedParser {
        fn parse(&self, _source: &str) -> Result<ParsedUnit, ParseError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_trait_object_dispatch() {
        let unit = ParsedUnit {
            package: "org.x".to_string(),
            type_names: vec!["A".to_string()],
            imports: vec![],
        };
        let parser: Box<dyn SourceParser> = Box::new(FixedParser(unit.clone()));
        assert_eq!(parser.parse("ignored"), Ok(unit));
    }

    #[test]
    fn test_syntax_error_message() {
        let err = ParseError::Syntax { line: 3, column: 7 };
        assert_eq!(err.to_string(), "syntax error at line 3, column 7");
    }
}
