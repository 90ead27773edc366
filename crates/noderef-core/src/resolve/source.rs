//! Static version extraction from node source text.
//!
//! A small grammar over JavaScript/TypeScript source:
//!
//! - a description block starts at one of the [`DescriptionAnchor`]s, tried
//!   in order, and runs to its matching `}`;
//! - only depth-1 `key: value` entries of that block are read, so nested
//!   objects (credentials, properties) cannot shadow `name` or `version`;
//! - the version is the first [`VersionShape`] that matches, in priority order.
//!
//! Strings, template literals and comments are skipped while matching
//! braces and separators.

use super::ExtractError;
use crate::model::NodeVersion;
use regex_lite::Regex;
use std::ops::ControlFlow;
use std::sync::OnceLock;

/// Where a description object literal begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionAnchor {
    /// `this.description = {` (compiled classes).
    Instance,
    /// `description: INodeTypeDescription = {` (TypeScript class field).
    Typed,
    /// `const baseDescription = {` (versioned composite nodes).
    Base,
}

impl DescriptionAnchor {
    /// Anchors in the order they are tried.
    pub const ORDER: [Self; 3] = [Self::Instance, Self::Typed, Self::Base];

    fn regex(self) -> Option<&'static Regex> {
        static PATTERNS: OnceLock<[Option<Regex>; 3]> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                r"this\.description\s*=\s*\{",
                r"\bdescription\s*:\s*INodeTypeDescription\s*=\s*\{",
                r"\bbaseDescription\s*(?::\s*[\w.]+\s*)?=\s*\{",
            ]
            .map(|p| Regex::new(p).ok())
        });
        let index = match self {
            Self::Instance => 0,
            Self::Typed => 1,
            Self::Base => 2,
        };
        patterns[index].as_ref()
    }
}

/// The ways a description block can declare its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionShape {
    /// `defaultVersion: 2.3`
    DefaultVersion,
    /// `version: [1, 2, 2.1]`, highest element wins.
    VersionArray,
    /// `version: 2`
    VersionScalar,
}

impl VersionShape {
    /// Shapes in priority order; the first match wins.
    pub const PRIORITY: [Self; 3] = [Self::DefaultVersion, Self::VersionArray, Self::VersionScalar];

    fn matches(self, block: &DescriptionBlock) -> Option<NodeVersion> {
        match self {
            Self::DefaultVersion => block.get("defaultVersion").and_then(NodeVersion::parse),
            Self::VersionArray => block.get("version").and_then(parse_version_array),
            Self::VersionScalar => block.get("version").and_then(NodeVersion::parse),
        }
    }
}

/// A successful static extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticMatch {
    pub name: String,
    pub version: NodeVersion,
    pub anchor: DescriptionAnchor,
    pub shape: VersionShape,
}

/// Depth-1 entries of a description object literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionBlock {
    fields: Vec<(String, String)>,
}

impl DescriptionBlock {
    /// Raw value text of the first entry named `key`, comments removed.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Extract the node name and version from source text.
///
/// # Errors
/// Returns the most specific failure seen across all anchors.
pub fn extract_static(source: &str) -> Result<StaticMatch, ExtractError> {
    let mut failure = ExtractError::NoDescription;

    for anchor in DescriptionAnchor::ORDER {
        let Some(found) = anchor.regex().and_then(|re| re.find(source)) else {
            continue;
        };
        // The match ends just past the opening brace.
        let open = found.end() - 1;
        let Some(block) = parse_block(source, open) else {
            continue;
        };

        let Some(name) = block.get("name").and_then(string_literal) else {
            if matches!(failure, ExtractError::NoDescription) {
                failure = ExtractError::NoName;
            }
            continue;
        };
        let version = VersionShape::PRIORITY
            .into_iter()
            .find_map(|shape| shape.matches(&block).map(|v| (shape, v)));
        match version {
            Some((shape, version)) => {
                return Ok(StaticMatch {
                    name,
                    version,
                    anchor,
                    shape,
                })
            }
            None => failure = ExtractError::NoVersion,
        }
    }

    Err(failure)
}

/// Parse the object literal whose `{` is at byte offset `open`.
#[must_use]
pub fn parse_block(source: &str, open: usize) -> Option<DescriptionBlock> {
    let close = matching_close(source, open)?;
    let body = &source[open + 1..close];

    let fields = split_top_level(body)
        .into_iter()
        .filter_map(|entry| {
            let colon = top_level_colon(entry)?;
            let key = without_comments(&entry[..colon]);
            let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
            if key.is_empty() || key.starts_with("...") {
                return None;
            }
            let value = without_comments(&entry[colon + 1..]).trim().to_string();
            Some((key.to_string(), value))
        })
        .collect();

    Some(DescriptionBlock { fields })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Code,
    Literal,
    Comment,
}

/// Visit every char of `src` with its lexical context.
fn scan(src: &str, mut visit: impl FnMut(usize, char, Ctx) -> ControlFlow<()>) -> ControlFlow<()> {
    let mut chars = src.char_indices().peekable();
    // Last code char outside whitespace; decides whether `/` opens a regex.
    let mut last = None;

    while let Some((i, c)) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                last = Some(c);
                visit(i, c, Ctx::Literal)?;
                while let Some((j, d)) = chars.next() {
                    visit(j, d, Ctx::Literal)?;
                    if d == '\\' {
                        if let Some((k, e)) = chars.next() {
                            visit(k, e, Ctx::Literal)?;
                        }
                    } else if d == c {
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                visit(i, c, Ctx::Comment)?;
                while let Some(&(j, d)) = chars.peek() {
                    if d == '\n' {
                        break;
                    }
                    chars.next();
                    visit(j, d, Ctx::Comment)?;
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                visit(i, c, Ctx::Comment)?;
                if let Some((j, d)) = chars.next() {
                    visit(j, d, Ctx::Comment)?;
                }
                let mut prev = '\0';
                for (j, d) in chars.by_ref() {
                    visit(j, d, Ctx::Comment)?;
                    if prev == '*' && d == '/' {
                        break;
                    }
                    prev = d;
                }
            }
            '/' if starts_regex(last) => {
                last = Some('/');
                visit(i, c, Ctx::Literal)?;
                let mut in_class = false;
                while let Some(&(j, d)) = chars.peek() {
                    if d == '\n' {
                        break;
                    }
                    chars.next();
                    visit(j, d, Ctx::Literal)?;
                    match d {
                        '\\' => {
                            if let Some((k, e)) = chars.next() {
                                visit(k, e, Ctx::Literal)?;
                            }
                        }
                        '[' => in_class = true,
                        ']' => in_class = false,
                        '/' if !in_class => break,
                        _ => {}
                    }
                }
            }
            _ => {
                if !c.is_whitespace() {
                    last = Some(c);
                }
                visit(i, c, Ctx::Code)?;
            }
        }
    }

    ControlFlow::Continue(())
}

/// A `/` after one of these (or at the start) begins a regex literal, not a
/// division.
fn starts_regex(last: Option<char>) -> bool {
    matches!(
        last,
        None | Some('(' | ',' | '=' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | ';')
    )
}

fn matching_close(src: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut close = None;
    let _ = scan(&src[open..], |i, c, ctx| {
        if ctx != Ctx::Code {
            return ControlFlow::Continue(());
        }
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    close = Some(open + i);
                    return ControlFlow::Break(());
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    });
    close
}

/// Split on commas that sit at nesting depth 0.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let _ = scan(body, |i, c, ctx| {
        if ctx == Ctx::Code {
            match c {
                '{' | '[' | '(' => depth += 1,
                '}' | ']' | ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        ControlFlow::Continue(())
    });
    parts.push(&body[start..]);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

fn top_level_colon(entry: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut colon = None;
    let _ = scan(entry, |i, c, ctx| {
        if ctx == Ctx::Code {
            match c {
                '{' | '[' | '(' => depth += 1,
                '}' | ']' | ')' => depth = depth.saturating_sub(1),
                ':' if depth == 0 => {
                    colon = Some(i);
                    return ControlFlow::Break(());
                }
                _ => {}
            }
        }
        ControlFlow::Continue(())
    });
    colon
}

fn without_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let _ = scan(text, |_, c, ctx| {
        if ctx != Ctx::Comment {
            out.push(c);
        }
        ControlFlow::Continue(())
    });
    out
}

/// The contents of a plain quoted string literal. Interpolated template
/// literals and expressions are not literals.
fn string_literal(value: &str) -> Option<String> {
    let value = value.trim();
    let quote = value.chars().next().filter(|q| matches!(q, '"' | '\'' | '`'))?;
    let inner = value.strip_prefix(quote)?.strip_suffix(quote)?;
    if inner.is_empty() || inner.contains(quote) || (quote == '`' && inner.contains("${")) {
        return None;
    }
    Some(inner.to_string())
}

/// `[1, 2, 2.1]` → `2.1`. Every element must be a numeric literal.
fn parse_version_array(value: &str) -> Option<NodeVersion> {
    let inner = value.trim().strip_prefix('[')?.strip_suffix(']')?;
    let versions = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(NodeVersion::parse)
        .collect::<Option<Vec<_>>>()?;
    NodeVersion::max_of(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPILED: &str = r#"
"use strict";
Object.defineProperty(exports, "__esModule", { value: true });
exports.Slack = void 0;
class Slack {
    constructor() {
        this.description = {
            displayName: 'Slack',
            name: 'slack',
            icon: 'file:slack.svg',
            group: ['output'],
            // bumped for the block kit rewrite
            version: [2, 2.1, 2.2],
            subtitle: '={{$parameter["operation"] + ": " + $parameter["resource"]}}',
            credentials: [{ name: 'slackApi', required: true }],
            properties: [{ displayName: 'Resource', name: 'resource', type: 'options', default: 'message' }],
        };
    }
}
exports.Slack = Slack;
"#;

    const VERSIONED: &str = r"
class Set extends n8n_workflow_1.VersionedNodeType {
    constructor() {
        const baseDescription = {
            displayName: 'Edit Fields (Set)',
            name: 'set',
            icon: 'fa:pen',
            group: ['input'],
            description: 'Modify, add, or remove item fields',
            defaultVersion: 3.4,
        };
        const nodeVersions = {
            1: new SetV1_node_1.SetV1(baseDescription),
            3: new SetV2_node_1.SetV2({ ...baseDescription, version: [3, 3.1, 3.2] }),
        };
        super(nodeVersions, baseDescription);
    }
}
";

    #[test]
    fn test_version_array_from_instance_description() {
        let found = extract_static(COMPILED).unwrap();
        assert_eq!(found.name, "slack");
        assert_eq!(found.version.to_string(), "2.2");
        assert_eq!(found.anchor, DescriptionAnchor::Instance);
        assert_eq!(found.shape, VersionShape::VersionArray);
    }

    #[test]
    fn test_default_version_from_base_description() {
        let found = extract_static(VERSIONED).unwrap();
        assert_eq!(found.name, "set");
        assert_eq!(found.version.to_string(), "3.4");
        assert_eq!(found.anchor, DescriptionAnchor::Base);
        assert_eq!(found.shape, VersionShape::DefaultVersion);
    }

    #[test]
    fn test_default_version_outranks_version_array() {
        let src = "this.description = { name: 'merge', version: [3, 3.1, 3.2], defaultVersion: 3.4 };";
        let found = extract_static(src).unwrap();
        assert_eq!(found.version.to_string(), "3.4");
        assert_eq!(found.shape, VersionShape::DefaultVersion);
    }

    #[test]
    fn test_scalar_version_typescript_field() {
        let src = r#"
export class HttpBin implements INodeType {
    description: INodeTypeDescription = {
        displayName: "HttpBin",
        name: "httpBin",
        version: 1,
        defaults: { name: "HttpBin" },
    };
}"#;
        let found = extract_static(src).unwrap();
        assert_eq!(found.name, "httpBin");
        assert_eq!(found.version.to_string(), "1");
        assert_eq!(found.anchor, DescriptionAnchor::Typed);
        assert_eq!(found.shape, VersionShape::VersionScalar);
    }

    #[test]
    fn test_nested_name_does_not_shadow() {
        // `defaults.name` and `credentials[].name` live at depth 2.
        let src = "this.description = { defaults: { name: 'Shadow' }, credentials: [{ name: 'api' }], name: 'real', version: 1 };";
        assert_eq!(extract_static(src).unwrap().name, "real");
    }

    #[test]
    fn test_strings_with_braces_and_commas() {
        let src = r#"this.description = { subtitle: '={{ "a,b}" }}', name: 'odd', /* version: 9, */ version: 2 };"#;
        let found = extract_static(src).unwrap();
        assert_eq!(found.name, "odd");
        assert_eq!(found.version.to_string(), "2");
    }

    #[test]
    fn test_instance_anchor_without_version_falls_back_to_base() {
        let src = "
            this.description = { name: 'wrapper', version: versionDescription.version };
            const baseDescription = { name: 'wrapped', defaultVersion: 2.1 };
        ";
        let found = extract_static(src).unwrap();
        assert_eq!(found.name, "wrapped");
        assert_eq!(found.anchor, DescriptionAnchor::Base);
    }

    #[test]
    fn test_failures() {
        assert!(matches!(
            extract_static("module.exports = 1;"),
            Err(ExtractError::NoDescription)
        ));
        assert!(matches!(
            extract_static("this.description = { name: nameVar, version: 1 };"),
            Err(ExtractError::NoName)
        ));
        assert!(matches!(
            extract_static("this.description = { name: 'x', version: computeVersion() };"),
            Err(ExtractError::NoVersion)
        ));
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(string_literal("'slack'"), Some("slack".to_string()));
        assert_eq!(string_literal("`plain`"), Some("plain".to_string()));
        assert_eq!(string_literal("`${prefix}x`"), None);
        assert_eq!(string_literal("name"), None);
    }

    #[test]
    fn test_parse_version_array() {
        assert_eq!(parse_version_array("[1, 1.1, 2,]").unwrap().to_string(), "2");
        assert!(parse_version_array("[1, x]").is_none());
        assert!(parse_version_array("[]").is_none());
    }

    #[test]
    fn test_regex_literals_are_not_strings() {
        let found =
            extract_static("this.description = { hint: /['}]/, name: 'x', version: 2 };").unwrap();
        assert_eq!(found.name, "x");
        assert_eq!(found.version.to_string(), "2");

        let src = r"
            this.description = {
                displayName: 'Regex',
                name: 'regex',
                pattern: /^[a-z\/'{]+$/i,
                ratio: width / 2,
                version: [1, 1.5],
            };";
        let found = extract_static(src).unwrap();
        assert_eq!(found.name, "regex");
        assert_eq!(found.version.to_string(), "1.5");
    }
}
