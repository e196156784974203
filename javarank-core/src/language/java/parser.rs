//! Java compilation-unit parser using tree-sitter

use std::cell::RefCell;

use tree_sitter::{Node, Parser};

use crate::language::parser::{ParseError, ParsedUnit, SourceParser};
use crate::language::tree_sitter_utils::{
    compact_text, find_first_error, find_named_child_of_kinds,
};

const NAME_KINDS: &[&str] = &["scoped_identifier", "identifier"];

const TYPE_DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

thread_local! {
    static JAVA_PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

/// Run `f` with this thread's Java parser, creating it on first use.
fn with_java_parser<R>(f: impl FnOnce(&mut Parser) -> R) -> Result<R, ParseError> {
    JAVA_PARSER.with(|slot| {
        let mut slot = slot.borrow_mut();
        let mut parser = match slot.take() {
            Some(parser) => parser,
            None => new_java_parser()?,
        };
        let result = f(&mut parser);
        *slot = Some(parser);
        Ok(result)
    })
}

fn new_java_parser() -> Result<Parser, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| ParseError::Grammar(e.to_string()))?;
    Ok(parser)
}

/// Java parser using tree-sitter
///
/// Stateless; each worker thread lazily builds its own `tree_sitter::Parser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaParser;

impl SourceParser for JavaParser {
    fn parse(&self, source: &str) -> Result<ParsedUnit, ParseError> {
        let tree = with_java_parser(|parser| parser.parse(source, None))?
            .ok_or(ParseError::NoTree)?;
        let root = tree.root_node();

        if root.has_error() {
            let position = find_first_error(root)
                .map(|node| node.start_position())
                .unwrap_or_else(|| root.start_position());
            return Err(ParseError::Syntax {
                line: position.row + 1,
                column: position.column + 1,
            });
        }

        let bytes = source.as_bytes();
        let mut unit = ParsedUnit::default();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_declaration" => {
                    if let Some(name) = dotted_name(child, bytes) {
                        unit.package = name;
                    }
                }
                "import_declaration" => {
                    if let Some(path) = dotted_name(child, bytes) {
                        unit.imports.push(path);
                    }
                }
                kind if TYPE_DECLARATION_KINDS.contains(&kind) => {
                    if let Some(name) = child
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(bytes).ok())
                    {
                        unit.type_names.push(name.to_string());
                    }
                }
                _ => {}
            }
        }

        Ok(unit)
    }
}

/// Dotted name of a package or import declaration.
///
/// For `import a.b.*;` the trailing asterisk is a sibling node, so the
/// result is the package path `a.b`.
fn dotted_name(declaration: Node<'_>, source: &[u8]) -> Option<String> {
    let name = find_named_child_of_kinds(declaration, NAME_KINDS)?;
    compact_text(name, source)
}
