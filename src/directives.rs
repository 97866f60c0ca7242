//! Dependency-fetch ("grab") directives embedded in script comments.
//!
//! ```text
//! //@grab bounds
//! //@grab shared/text-utils as text
//! ```

use crate::errors::{FilterError, Result};
use crate::parser::Parser;
use itertools::Itertools;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabDirective {
    pub coordinate: String,
    pub alias: String,
    pub line: usize,
}

/// Collect every grab directive in `source`, in order of appearance.
pub fn scan(source: &str) -> Result<Vec<GrabDirective>> {
    let mut out = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        if let Some(d) = parse_line(line, idx + 1)? {
            out.push(d);
        }
    }
    if let Some(dup) = out.iter().map(|d| d.alias.as_str()).duplicates().next() {
        return Err(FilterError::ScriptCompile(format!("module alias '{dup}' is grabbed twice")));
    }
    Ok(out)
}

fn parse_line(line: &str, line_no: usize) -> Result<Option<GrabDirective>> {
    let mut p = Parser::new(line);
    p.skip_inline_ws();
    if !p.consume_str("//") {
        return Ok(None);
    }
    p.skip_inline_ws();
    if !p.consume_keyword("@grab") {
        return Ok(None);
    }
    let bad = |msg: &str| FilterError::ScriptCompile(format!("line {line_no}: {msg}"));

    p.skip_inline_ws();
    let coordinate = p.take_token();
    if coordinate.is_empty() {
        return Err(bad("@grab needs a module coordinate"));
    }
    p.skip_inline_ws();
    let alias = if p.consume_keyword("as") {
        p.skip_inline_ws();
        p.parse_identifier().map_err(|_| bad("expected an alias after 'as'"))?
    } else {
        default_alias(coordinate).ok_or_else(|| {
            bad(&format!("cannot derive an alias from '{coordinate}'; add 'as <name>'"))
        })?
    };
    p.skip_inline_ws();
    if !p.at_line_end() {
        return Err(bad("unexpected text after @grab directive"));
    }
    Ok(Some(GrabDirective { coordinate: coordinate.to_string(), alias, line: line_no }))
}

/// Last `/` or `:` separated segment, if it is a usable identifier.
fn default_alias(coordinate: &str) -> Option<String> {
    let last = coordinate.rsplit(['/', ':']).next()?;
    let mut p = Parser::new(last);
    let ident = p.parse_identifier().ok()?;
    p.eof().then_some(ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_directives_with_and_without_alias() {
        let src = "//@grab bounds\n  // @grab shared/text_utils as text\n// plain comment\npayload < 1";
        let found = scan(src).unwrap();
        assert_eq!(
            found,
            vec![
                GrabDirective { coordinate: "bounds".into(), alias: "bounds".into(), line: 1 },
                GrabDirective {
                    coordinate: "shared/text_utils".into(),
                    alias: "text".into(),
                    line: 2
                },
            ]
        );
    }

    #[test]
    fn coordinate_segments_give_the_alias() {
        assert_eq!(scan("//@grab org:helpers").unwrap()[0].alias, "helpers");
        assert!(scan("//@grab org:helpers:1.0").is_err());
        assert_eq!(scan("//@grab org:helpers:1.0 as h").unwrap()[0].alias, "h");
    }

    #[test]
    fn malformed_directives_are_compile_errors() {
        assert!(matches!(scan("//@grab"), Err(FilterError::ScriptCompile(_))));
        assert!(matches!(scan("//@grab a as"), Err(FilterError::ScriptCompile(_))));
        assert!(matches!(scan("//@grab a b c"), Err(FilterError::ScriptCompile(_))));
        assert!(matches!(scan("//@grab a\n//@grab x/a"), Err(FilterError::ScriptCompile(_))));
    }

    #[test]
    fn lookalikes_are_ignored() {
        assert!(scan("//@grabbed nothing\nlet x = 1; // @grab later").unwrap().is_empty());
    }
}
