//! Per-file name and import extraction
//!
//! Turns one Java source file into an [`ExtractionRecord`]: the fully
//! qualified name of its first declared type (when the file belongs to the
//! project) and the import paths it references. Parser failures never leave
//! this module; a file that cannot be read or parsed simply yields no FQN.

use crate::encoding::decode_source;
use crate::language::{JavaParser, ParsedUnit, SourceParser};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Facts extracted from a single source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Repository-relative path, forward slashes
    pub path: String,
    pub fqn: Option<String>,
    pub imports: Vec<String>,
}

impl ExtractionRecord {
    fn unparsed(path: &str) -> Self {
        ExtractionRecord {
            path: path.to_string(),
            fqn: None,
            imports: Vec::new(),
        }
    }
}

/// Extract with the default Java parser
pub fn extract(path: &str, contents: &str, package_prefix: &str) -> ExtractionRecord {
    extract_with(&JavaParser, path, contents, package_prefix)
}

/// Extract with an explicit parser collaborator
pub fn extract_with(
    parser: &dyn SourceParser,
    path: &str,
    contents: &str,
    package_prefix: &str,
) -> ExtractionRecord {
    match parser.parse(contents) {
        Ok(unit) => ExtractionRecord {
            path: path.to_string(),
            fqn: fqn_for(&unit, package_prefix),
            imports: unit.imports,
        },
        Err(e) => {
            debug!(path, error = %e, "skipping unparsable source");
            ExtractionRecord::unparsed(path)
        }
    }
}

/// Read, decode and extract one file below `root`
pub fn extract_file(
    parser: &dyn SourceParser,
    root: &Path,
    rel_path: &str,
    package_prefix: &str,
) -> ExtractionRecord {
    let bytes = match std::fs::read(root.join(rel_path)) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = rel_path, error = %e, "failed to read source");
            return ExtractionRecord::unparsed(rel_path);
        }
    };

    let (text, encoding) = decode_source(&bytes);
    if encoding != "UTF-8" {
        debug!(path = rel_path, encoding, "decoded non-UTF-8 source");
    }

    extract_with(parser, rel_path, &text, package_prefix)
}

/// `<package>.<FirstType>`, or the bare type name in the default package.
///
/// `None` when the package is outside the prefix or no type is declared.
pub fn fqn_for(unit: &ParsedUnit, package_prefix: &str) -> Option<String> {
    if !unit.package.starts_with(package_prefix) {
        return None;
    }

    let first = unit.type_names.first()?;
    if unit.package.is_empty() {
        Some(first.clone())
    } else {
        Some(format!("{}.{}", unit.package, first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ParseError;
    use encoding_rs::SHIFT_JIS;
    use tempfile::TempDir;

    struct FailingParser;

    impl SourceParser for FailingParser {
        fn parse(&self, _source: &str) -> Result<ParsedUnit, ParseError> {
            Err(ParseError::NoTree)
        }
    }

    #[test]
    fn test_extract_fqn_and_imports() {
        let source = r#"
package org.x.core;

import org.x.util.Strings;
import java.util.Map;

public class Engine {}
"#;
        let record = extract("src/org/x/core/Engine.java", source, "org.x");
        assert_eq!(record.fqn.as_deref(), Some("org.x.core.Engine"));
        assert_eq!(record.imports, vec!["org.x.util.Strings", "java.util.Map"]);
    }

    #[test]
    fn test_syntax_error_yields_no_fqn() {
        let source = "package org.x;\nimport org.x.B;\npublic class A { void f( }";
        let record = extract("A.java", source, "org.x");
        assert_eq!(record.fqn, None);
        assert!(record.imports.is_empty());
    }

    #[test]
    fn test_out_of_prefix_keeps_imports() {
        let source = "package com.other;\nimport org.x.A;\nclass Z {}";
        let record = extract("Z.java", source, "org.x");
        assert_eq!(record.fqn, None);
        assert_eq!(record.imports, vec!["org.x.A"]);
    }

    #[test]
    fn test_default_package_uses_type_name() {
        let record = extract("Main.java", "class Main {}", "");
        assert_eq!(record.fqn.as_deref(), Some("Main"));
    }

    #[test]
    fn test_no_type_declaration() {
        let record = extract(
            "package-info.java",
            "package org.x;\nimport org.x.A;\n",
            "org.x",
        );
        assert_eq!(record.fqn, None);
        assert_eq!(record.imports, vec!["org.x.A"]);
    }

    #[test]
    fn test_first_type_wins() {
        let record = extract("A.java", "package p;\nclass A {}\nclass B {}", "p");
        assert_eq!(record.fqn.as_deref(), Some("p.A"));
    }

    #[test]
    fn test_parser_error_is_contained() {
        let record = extract_with(&FailingParser, "A.java", "class A {}", "");
        assert_eq!(record, ExtractionRecord::unparsed("A.java"));
    }

    #[test]
    fn test_extract_shift_jis_file() {
        let dir = TempDir::new().unwrap();
        let source = "package org.x;\n// 日本語のコメント\npublic class Kanji {}\n";
        let (bytes, _, _) = SHIFT_JIS.encode(source);
        std::fs::write(dir.path().join("Kanji.java"), &bytes).unwrap();

        let record = extract_file(&JavaParser, dir.path(), "Kanji.java", "org.x");
        assert_eq!(record.fqn.as_deref(), Some("org.x.Kanji"));
    }

    #[test]
    fn test_missing_file_is_unparsed() {
        let dir = TempDir::new().unwrap();
        let record = extract_file(&JavaParser, dir.path(), "Gone.java", "");
        assert_eq!(record.fqn, None);
        assert!(record.imports.is_empty());
    }
}
