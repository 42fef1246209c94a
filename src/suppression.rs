//! Inline suppression directives.
//!
//! Directives live in ordinary Python comments:
//! - `x = eval(s)  # skylos: disable-line=no-eval` - this line only
//! - `# skylos: disable-next-line` - the next line holding code, every rule
//! - `# skylos: disable-statement=max-nesting-depth` - the whole statement starting here
//! - `# skylos: disable=no-print` ... `# skylos: enable=no-print` - a region, closed by
//!   `enable`, by dedenting out of the enclosing block, or by end of file
//! - `# pragma: no skylos` - legacy spelling of `disable-line=all`

use crate::diagnostics::{Diagnostic, Severity, Span, INVALID_SUPPRESSION_ID, RULE_FAILURE_ID};
use crate::rules::RuleRegistry;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

lazy_static::lazy_static! {
    static ref RULE_ID: Regex = Regex::new(r"^[a-z][a-z0-9]*(?:-[a-z0-9]+)*$").unwrap();
}

const DIRECTIVE_PREFIX: &str = "skylos:";
const LEGACY_PRAGMA: &str = "pragma: no skylos";

/// Which rules a directive applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    All,
    Rule(String),
}

impl Selector {
    pub fn matches(&self, rule_id: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Rule(id) => id == rule_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DisableLine,
    DisableNextLine,
    DisableStatement,
    Disable,
    Enable,
}

impl Action {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "disable-line" => Some(Action::DisableLine),
            "disable-next-line" => Some(Action::DisableNextLine),
            "disable-statement" => Some(Action::DisableStatement),
            "disable" => Some(Action::Disable),
            "enable" => Some(Action::Enable),
            _ => None,
        }
    }
}

/// A resolved exemption: findings of matching rules starting inside `start_line..=end_line` are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionDirective {
    pub selector: Selector,
    pub start_line: usize,
    pub end_line: usize,
    /// Line holding the directive comment.
    pub line: usize,
}

impl SuppressionDirective {
    pub fn covers(&self, rule_id: &str, line: usize) -> bool {
        self.selector.matches(rule_id) && (self.start_line..=self.end_line).contains(&line)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuppressionSyntaxError {
    #[error("suppression directive has no action")]
    MissingAction,
    #[error("unknown suppression action '{0}'")]
    UnknownAction(String),
    #[error("empty rule selector in suppression directive")]
    EmptySelector,
    #[error("'{0}' is not a valid rule id")]
    InvalidRuleId(String),
    #[error("suppression names unknown rule '{0}'")]
    UnknownRule(String),
    #[error("'enable' has no matching 'disable' for '{0}'")]
    UnmatchedEnable(String),
}

/// Per-line facts gathered by the comment scan.
#[derive(Debug, Clone, Copy, Default)]
struct LineInfo {
    /// Any non-comment, non-blank content, string contents included.
    has_code: bool,
    /// Leading whitespace width.
    indent: usize,
    /// The line begins inside a string opened on an earlier line.
    continues_string: bool,
}

#[derive(Debug, Clone)]
struct Comment {
    line: usize,
    text: String,
    /// Code precedes the comment on its line.
    trailing: bool,
}

/// Finds comments and per-line layout without being fooled by `#` inside string literals.
fn scan_comments(source: &str) -> (Vec<LineInfo>, Vec<Comment>) {
    let mut lines = Vec::new();
    let mut comments = Vec::new();
    // (quote char, triple-quoted)
    let mut open: Option<(char, bool)> = None;

    for (idx, line) in source.lines().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let mut info = LineInfo {
            has_code: open.is_some(),
            indent: chars.iter().take_while(|c| **c == ' ' || **c == '\t').count(),
            continues_string: open.is_some(),
        };

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if let Some((quote, triple)) = open {
                if c == '\\' {
                    i += 2;
                    continue;
                }
                if c == quote {
                    if !triple {
                        open = None;
                        i += 1;
                        continue;
                    }
                    if chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote) {
                        open = None;
                        i += 3;
                        continue;
                    }
                }
                i += 1;
                continue;
            }

            match c {
                '#' => {
                    comments.push(Comment {
                        line: idx + 1,
                        text: chars[i + 1..].iter().collect(),
                        trailing: info.has_code,
                    });
                    break;
                }
                '"' | '\'' => {
                    info.has_code = true;
                    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        open = Some((c, true));
                        i += 3;
                    } else {
                        open = Some((c, false));
                        i += 1;
                    }
                }
                c if !c.is_whitespace() => {
                    info.has_code = true;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        // A single-quoted string cannot span lines without an explicit continuation.
        if let Some((_, false)) = open {
            if !line.trim_end().ends_with('\\') {
                open = None;
            }
        }
        lines.push(info);
    }
    (lines, comments)
}

/// A parsed but not yet resolved directive.
struct ParsedDirective {
    action: Action,
    selectors: Vec<Selector>,
}

/// Parses the text of one comment. `Ok(None)` means the comment is not a directive.
///
/// Unknown ids are reported in `errors` but do not invalidate the rest of the selector list.
fn parse_directive(
    text: &str,
    registry: &RuleRegistry,
    errors: &mut Vec<SuppressionSyntaxError>,
) -> Option<ParsedDirective> {
    let text = text.trim();
    if text.contains(LEGACY_PRAGMA) {
        return Some(ParsedDirective {
            action: Action::DisableLine,
            selectors: vec![Selector::All],
        });
    }
    let body = text.strip_prefix(DIRECTIVE_PREFIX)?.trim();

    let (action_text, selector_text) = match body.split_once('=') {
        Some((action, selectors)) => (action.trim(), Some(selectors)),
        None => (body, None),
    };
    if action_text.is_empty() {
        errors.push(SuppressionSyntaxError::MissingAction);
        return None;
    }
    let Some(action) = Action::parse(action_text) else {
        errors.push(SuppressionSyntaxError::UnknownAction(action_text.to_string()));
        return None;
    };

    let Some(selector_text) = selector_text else {
        return Some(ParsedDirective {
            action,
            selectors: vec![Selector::All],
        });
    };

    let mut selectors = Vec::new();
    for raw in selector_text.split(',') {
        let id = raw.trim();
        if id.is_empty() {
            errors.push(SuppressionSyntaxError::EmptySelector);
            return None;
        }
        if id == "all" {
            selectors.push(Selector::All);
        } else if !RULE_ID.is_match(id) {
            errors.push(SuppressionSyntaxError::InvalidRuleId(id.to_string()));
            return None;
        } else if registry.contains(id) || id == RULE_FAILURE_ID {
            selectors.push(Selector::Rule(id.to_string()));
        } else {
            errors.push(SuppressionSyntaxError::UnknownRule(id.to_string()));
        }
    }
    if selectors.is_empty() {
        return None;
    }
    Some(ParsedDirective { action, selectors })
}

/// Suppression state of one unit: resolved exemptions plus directive errors.
#[derive(Debug, Clone, Default)]
pub struct Suppressions {
    directives: Vec<SuppressionDirective>,
    errors: Vec<(usize, SuppressionSyntaxError)>,
}

impl Suppressions {
    /// Scans `source` for directives.
    ///
    /// `statements` holds the `(start_line, end_line)` of every statement in the unit and is
    /// used to resolve `disable-statement`.
    pub fn scan(source: &str, statements: &[(usize, usize)], registry: &RuleRegistry) -> Self {
        let mut result = Self::default();
        if !source.contains("skylos") {
            return result;
        }

        let (lines, comments) = scan_comments(source);
        let last_line = lines.len().max(1);
        let next_code_line = |after: usize| -> Option<usize> {
            (after + 1..=lines.len()).find(|n| lines[n - 1].has_code)
        };

        // Open `disable` regions: index into `result.directives`.
        let mut open_regions: Vec<usize> = Vec::new();

        for comment in &comments {
            let mut errors = Vec::new();
            let parsed = parse_directive(&comment.text, registry, &mut errors);
            result
                .errors
                .extend(errors.into_iter().map(|e| (comment.line, e)));
            let Some(parsed) = parsed else {
                continue;
            };

            let line = comment.line;
            match parsed.action {
                Action::DisableLine => {
                    result.push_all(&parsed.selectors, line, line, line);
                }
                Action::DisableNextLine => {
                    let target = next_code_line(line).unwrap_or(line + 1);
                    result.push_all(&parsed.selectors, target, target, line);
                }
                Action::DisableStatement => {
                    let anchor = if comment.trailing {
                        line
                    } else {
                        next_code_line(line).unwrap_or(line + 1)
                    };
                    let end = statements
                        .iter()
                        .filter(|(start, _)| *start == anchor)
                        .map(|(_, end)| *end)
                        .max()
                        .unwrap_or(anchor);
                    result.push_all(&parsed.selectors, anchor, end.max(anchor), line);
                }
                Action::Disable => {
                    let indent = lines[line - 1].indent;
                    let end = (line + 1..=lines.len())
                        .find(|n| {
                            let info = lines[n - 1];
                            info.has_code && !info.continues_string && info.indent < indent
                        })
                        .map(|n| n - 1)
                        .unwrap_or(last_line);
                    for selector in &parsed.selectors {
                        open_regions.push(result.directives.len());
                        result.directives.push(SuppressionDirective {
                            selector: selector.clone(),
                            start_line: line,
                            end_line: end,
                            line,
                        });
                    }
                }
                Action::Enable => {
                    for selector in &parsed.selectors {
                        let mut closed = false;
                        open_regions.retain(|&i| {
                            let region = &mut result.directives[i];
                            let same = *selector == Selector::All || region.selector == *selector;
                            if same && region.end_line >= line {
                                region.end_line = line;
                                closed = true;
                                false
                            } else {
                                true
                            }
                        });
                        if !closed {
                            let name = match selector {
                                Selector::All => "all".to_string(),
                                Selector::Rule(id) => id.clone(),
                            };
                            result
                                .errors
                                .push((line, SuppressionSyntaxError::UnmatchedEnable(name)));
                        }
                    }
                }
            }
        }
        result
    }

    fn push_all(&mut self, selectors: &[Selector], start_line: usize, end_line: usize, line: usize) {
        for selector in selectors {
            self.directives.push(SuppressionDirective {
                selector: selector.clone(),
                start_line,
                end_line,
                line,
            });
        }
    }

    pub fn directives(&self) -> &[SuppressionDirective] {
        &self.directives
    }

    pub fn errors(&self) -> &[(usize, SuppressionSyntaxError)] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.errors.is_empty()
    }

    /// Whether a finding of `rule_id` starting on `line` is exempted.
    pub fn is_suppressed(&self, rule_id: &str, line: usize) -> bool {
        rule_id != INVALID_SUPPRESSION_ID && self.directives.iter().any(|d| d.covers(rule_id, line))
    }

    /// Drops suppressed diagnostics.
    pub fn apply(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if self.directives.is_empty() {
            return diagnostics;
        }
        diagnostics
            .into_iter()
            .filter(|d| !self.is_suppressed(&d.rule_id, d.span.start_line))
            .collect()
    }

    /// One `invalid-suppression` diagnostic per directive error.
    pub fn error_diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|(line, error)| {
                Diagnostic::new(
                    INVALID_SUPPRESSION_ID,
                    path,
                    Span::line(*line),
                    error.to_string(),
                    Severity::Information,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Suppressions {
        Suppressions::scan(source, &[], &RuleRegistry::builtin())
    }

    #[test]
    fn test_hash_inside_strings_is_not_a_comment() {
        let source = "a = '# skylos: disable-line'\nb = \"\"\"\n# skylos: disable\n\"\"\"\nc = 1  # real\n";
        let (lines, comments) = scan_comments(source);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].line, 5);
        assert_eq!(comments[0].text.trim(), "real");
        assert!(comments[0].trailing);
        assert!(lines[2].continues_string);
    }

    #[test]
    fn test_escaped_quote() {
        let source = "s = 'it\\'s # not a comment'  # skylos: disable-line\n";
        let (_, comments) = scan_comments(source);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text.trim(), "skylos: disable-line");
    }

    #[test]
    fn test_disable_line_defaults_to_all() {
        let s = scan("x = eval(y)  # skylos: disable-line\n");
        assert!(s.is_suppressed("no-eval", 1));
        assert!(s.is_suppressed("no-print", 1));
        assert!(!s.is_suppressed("no-eval", 2));
    }

    #[test]
    fn test_legacy_pragma() {
        let s = scan("def f():  # pragma: no skylos\n    pass\n");
        assert!(s.is_suppressed("too-many-parameters", 1));
        assert!(!s.is_suppressed("too-many-parameters", 2));
    }

    #[test]
    fn test_disable_next_line_skips_blank_and_comments() {
        let s = scan("# skylos: disable-next-line=no-eval\n\n# note\nx = eval(y)\n");
        assert!(s.is_suppressed("no-eval", 4));
        assert!(!s.is_suppressed("no-print", 4));
        assert!(!s.is_suppressed("no-eval", 2));
    }

    #[test]
    fn test_disable_statement_uses_statement_span() {
        let source = "# skylos: disable-statement=no-eval\nif x:\n    eval(a)\n    eval(b)\neval(c)\n";
        let s = Suppressions::scan(source, &[(2, 4), (3, 3), (4, 4), (5, 5)], &RuleRegistry::builtin());
        assert!(s.is_suppressed("no-eval", 3));
        assert!(s.is_suppressed("no-eval", 4));
        assert!(!s.is_suppressed("no-eval", 5));
    }

    #[test]
    fn test_disable_statement_without_statement_degrades_to_line() {
        let s = scan("x = 1  # skylos: disable-statement\ny = 2\n");
        assert!(s.is_suppressed("no-eval", 1));
        assert!(!s.is_suppressed("no-eval", 2));
    }

    #[test]
    fn test_disable_region_ends_at_dedent() {
        let source = "def f():\n    # skylos: disable=no-print\n    print(1)\n    print(2)\nprint(3)\n";
        let s = scan(source);
        assert!(s.is_suppressed("no-print", 3));
        assert!(s.is_suppressed("no-print", 4));
        assert!(!s.is_suppressed("no-print", 5));
    }

    #[test]
    fn test_disable_enable_pair() {
        let source = "# skylos: disable=no-print\nprint(1)\n# skylos: enable=no-print\nprint(2)\n";
        let s = scan(source);
        assert!(s.is_suppressed("no-print", 2));
        assert!(!s.is_suppressed("no-print", 4));
        assert!(s.errors().is_empty());
    }

    #[test]
    fn test_disable_until_eof() {
        let s = scan("# skylos: disable\nprint(1)\n\nprint(2)\n");
        assert!(s.is_suppressed("no-print", 4));
    }

    #[test]
    fn test_malformed_directives() {
        let s = scan(
            "# skylos: silence=no-eval\n# skylos: disable-line=\n# skylos: disable-line=No Eval\n# skylos:\n",
        );
        let errors: Vec<&SuppressionSyntaxError> = s.errors().iter().map(|(_, e)| e).collect();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], SuppressionSyntaxError::UnknownAction(_)));
        assert!(matches!(errors[1], SuppressionSyntaxError::EmptySelector));
        assert!(matches!(errors[2], SuppressionSyntaxError::InvalidRuleId(_)));
        assert!(matches!(errors[3], SuppressionSyntaxError::MissingAction));
        assert!(s.directives().is_empty());
    }

    #[test]
    fn test_unknown_rule_keeps_known_selectors() {
        let s = scan("x = eval(y)  # skylos: disable-line=no-eval,no-such-rule\n");
        assert!(s.is_suppressed("no-eval", 1));
        assert_eq!(
            s.errors(),
            &[(1, SuppressionSyntaxError::UnknownRule("no-such-rule".to_string()))]
        );
    }

    #[test]
    fn test_unmatched_enable() {
        let s = scan("# skylos: enable=no-print\nprint(1)\n");
        assert_eq!(s.errors().len(), 1);
        assert!(matches!(s.errors()[0].1, SuppressionSyntaxError::UnmatchedEnable(_)));
    }

    #[test]
    fn test_invalid_suppression_is_never_suppressed() {
        let s = scan("# skylos: disable\n# skylos: bogus\n");
        assert!(!s.is_suppressed(INVALID_SUPPRESSION_ID, 2));
        let diags = s.error_diagnostics(Path::new("a.py"));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule_id, INVALID_SUPPRESSION_ID);
        assert_eq!(diags[0].severity, Severity::Information);
        assert_eq!(diags[0].span.start_line, 2);
    }

    #[test]
    fn test_no_directives_fast_path() {
        let s = scan("print('hello')\n");
        assert!(s.is_empty());
    }
}
