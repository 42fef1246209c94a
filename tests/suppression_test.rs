use skylos_lint::analyzer::Analyzer;
use skylos_lint::config::{CliOptions, EffectiveConfig, Profile};
use skylos_lint::diagnostics::{Diagnostic, INVALID_SUPPRESSION_ID};
use skylos_lint::rules::RuleRegistry;
use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

fn analyze_source(content: &str, profile: Option<&str>) -> Vec<Diagnostic> {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("demo.py");
    let mut file = File::create(&file_path).unwrap();
    write!(file, "{}", content).unwrap();

    let registry = RuleRegistry::builtin();
    let profile = profile.map(|json| Profile::from_json(json).unwrap());
    let config =
        EffectiveConfig::resolve(&registry, profile.as_ref(), &CliOptions::default()).unwrap();
    let analyzer = Analyzer::new(registry, config).with_jobs(1);
    analyzer.analyze_path(dir.path()).unwrap().diagnostics
}

fn ids_and_lines(diagnostics: &[Diagnostic]) -> Vec<(String, usize)> {
    diagnostics
        .iter()
        .map(|d| (d.rule_id.clone(), d.span.start_line))
        .collect()
}

#[test]
fn test_analyze_respects_legacy_pragma() {
    let content = r#"
result = eval(user_input)
other = eval(user_input)   # pragma: no skylos
"#;
    let diags = analyze_source(content, None);
    assert_eq!(ids_and_lines(&diags), vec![("no-eval".to_string(), 2)]);
}

#[test]
fn test_disable_line_for_one_rule_only() {
    let content = "print(eval(x))  # skylos: disable-line=no-eval\n";
    let diags = analyze_source(content, Some(r#"{"rules": {"no-print": {"enable": true}}}"#));
    assert_eq!(ids_and_lines(&diags), vec![("no-print".to_string(), 1)]);
}

#[test]
fn test_disable_next_line() {
    let content = r#"
# skylos: disable-next-line=no-eval
a = eval(x)
b = eval(x)
"#;
    let diags = analyze_source(content, None);
    assert_eq!(ids_and_lines(&diags), vec![("no-eval".to_string(), 4)]);
}

#[test]
fn test_disable_statement_covers_whole_statement() {
    let content = r#"
# skylos: disable-statement=no-eval
if ready:
    a = eval(x)
    b = eval(y)
c = eval(z)
"#;
    let diags = analyze_source(content, None);
    assert_eq!(ids_and_lines(&diags), vec![("no-eval".to_string(), 6)]);
}

#[test]
fn test_disable_region_until_dedent() {
    let content = r#"
def handler():
    # skylos: disable=no-bare-except,no-empty-catch
    try:
        work()
    except:
        pass

try:
    work()
except:
    pass
"#;
    let diags = analyze_source(content, None);
    assert_eq!(
        ids_and_lines(&diags),
        vec![
            ("no-bare-except".to_string(), 11),
            ("no-empty-catch".to_string(), 11),
        ]
    );
}

#[test]
fn test_disable_enable_region() {
    let content = r#"
# skylos: disable=no-eval
a = eval(x)
# skylos: enable=no-eval
b = eval(x)
"#;
    let diags = analyze_source(content, None);
    assert_eq!(ids_and_lines(&diags), vec![("no-eval".to_string(), 5)]);
}

#[test]
fn test_directive_inside_string_is_ignored() {
    let content = r#"
doc = """
# skylos: disable
"""
a = eval(x)
"#;
    let diags = analyze_source(content, None);
    assert_eq!(ids_and_lines(&diags), vec![("no-eval".to_string(), 5)]);
}

#[test]
fn test_invalid_and_stale_directives_are_reported() {
    let content = r#"
a = eval(x)  # skylos: disable-line=no-evil
# skylos: enable=no-eval
b = 1  # skylos: mute
"#;
    let diags = analyze_source(content, None);
    assert_eq!(
        ids_and_lines(&diags),
        vec![
            (INVALID_SUPPRESSION_ID.to_string(), 2),
            (INVALID_SUPPRESSION_ID.to_string(), 3),
            (INVALID_SUPPRESSION_ID.to_string(), 4),
            ("no-eval".to_string(), 2),
        ]
    );
}

#[test]
fn test_invalid_suppression_cannot_be_suppressed() {
    let content = "# skylos: disable\nx = 1  # skylos: bogus-action\n";
    let diags = analyze_source(content, None);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].rule_id, INVALID_SUPPRESSION_ID);
}

#[test]
fn test_suppression_removes_exactly_one_diagnostic() {
    let unit = |header: &str, trailing: &str| {
        format!(
            "{}\nflag = eval(x) == None{}\nother = eval(y)\nprint(eval(z))\n",
            header, trailing
        )
    };
    let profile = Some(r#"{"rules": {"no-print": {"enable": true}}}"#);

    let baseline = analyze_source(&unit("# header", ""), profile);
    assert_eq!(
        ids_and_lines(&baseline),
        vec![
            ("compare-to-none".to_string(), 2),
            ("no-eval".to_string(), 2),
            ("no-eval".to_string(), 3),
            ("no-eval".to_string(), 4),
            ("no-print".to_string(), 4),
        ]
    );

    let mut expected = baseline.clone();
    expected.retain(|d| !(d.rule_id == "no-eval" && d.span.start_line == 2));
    assert_eq!(expected.len(), baseline.len() - 1);

    let once = analyze_source(&unit("# header", "  # skylos: disable-line=no-eval"), profile);
    assert_eq!(once, expected);

    // A second directive covering the same (rule, line) changes nothing.
    let twice = analyze_source(
        &unit(
            "# skylos: disable-next-line=no-eval",
            "  # skylos: disable-line=no-eval",
        ),
        profile,
    );
    assert_eq!(twice, expected);
}
