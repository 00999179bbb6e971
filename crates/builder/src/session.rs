use crate::error::{BuilderError, Result};
use duchain::{Cursor, DiagnosticLevel, Problem, ProblemSource, Range};
use tree_sitter::{Node, Parser, Point, Tree};

/// Dialect configuration handed in by the host. The grammar itself accepts a
/// superset; the flags travel with the session so hosts can key rebuild
/// decisions on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LanguageFlags {
    pub c99: bool,
    pub c11: bool,
    pub gnu: bool,
}

/// One diagnostic emitted by the parse frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub range: Range,
}

impl ParseDiagnostic {
    /// Carry a parse diagnostic onto a top context's problem list unchanged;
    /// only the severity is mapped.
    pub fn into_problem(self) -> Problem {
        Problem::new(
            self.level.severity(),
            self.message,
            self.range,
            ProblemSource::Parser,
        )
    }
}

/// A parsed translation unit: the tree plus the diagnostics produced while
/// parsing it. Diagnostics never abort indexing.
pub struct ParsedDocument {
    pub tree: Tree,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParsedDocument {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }
}

/// Owns the parser state for one job. Jobs never share sessions.
pub struct ParseSession {
    parser: Parser,
    flags: LanguageFlags,
}

impl ParseSession {
    pub fn new(flags: LanguageFlags) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c::LANGUAGE.into())
            .map_err(|e| BuilderError::Language(e.to_string()))?;
        Ok(Self { parser, flags })
    }

    pub fn flags(&self) -> LanguageFlags {
        self.flags
    }

    pub fn parse(&mut self, content: &str) -> Result<ParsedDocument> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| BuilderError::ParseFailed("parser returned no tree".into()))?;
        let mut diagnostics = Vec::new();
        collect_diagnostics(tree.root_node(), &mut diagnostics);
        Ok(ParsedDocument { tree, diagnostics })
    }
}

fn collect_diagnostics(node: Node<'_>, out: &mut Vec<ParseDiagnostic>) {
    if node.is_error() {
        out.push(ParseDiagnostic {
            level: DiagnosticLevel::Error,
            message: "syntax error".to_string(),
            range: range_of(node),
        });
        return;
    }
    if node.is_missing() {
        out.push(ParseDiagnostic {
            level: DiagnosticLevel::Error,
            message: format!("missing {}", node.kind()),
            range: range_of(node),
        });
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_diagnostics(child, out);
    }
}

/// The parser reports zero-based points; were it one-based this is the one
/// place the subtraction would live (`Cursor::from_one_based`).
pub fn cursor_of(p: Point) -> Cursor {
    Cursor::new(p.row as u32, p.column as u32)
}

pub fn range_of(node: Node<'_>) -> Range {
    Range::new(cursor_of(node.start_position()), cursor_of(node.end_position()))
}

pub fn node_text<'a>(node: Node<'_>, content: &'a str) -> &'a str {
    content.get(node.byte_range()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_simple_unit() {
        let mut session = ParseSession::new(LanguageFlags::default()).unwrap();
        let parsed = session.parse("int main(void) { return 0; }").unwrap();
        assert_eq!(parsed.root().kind(), "translation_unit");
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn syntax_errors_surface_as_error_diagnostics() {
        let mut session = ParseSession::new(LanguageFlags::default()).unwrap();
        let parsed = session.parse("int main( { return 0 }").unwrap();
        assert!(!parsed.diagnostics.is_empty());
        assert!(parsed
            .diagnostics
            .iter()
            .all(|d| d.level == DiagnosticLevel::Error));
    }

    #[test]
    fn node_ranges_are_zero_based() {
        let mut session = ParseSession::new(LanguageFlags::default()).unwrap();
        let parsed = session.parse("int x;\nint y;\n").unwrap();
        let root = parsed.root();
        let second = root.named_child(1).unwrap();
        assert_eq!(range_of(second).start, Cursor::new(1, 0));
    }
}
