use script_filter::{
    compile, DirectoryResolver, FilterConfig, FilterError, Message, NoResolver, ScriptLanguage,
    ScriptedFilter, Settings,
};
use serde_json::json;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn settings(script: &str) -> Settings {
    Settings { script: Some(fixture(script)), ..Settings::default() }
}

#[test]
fn unparsable_variables_fail_before_any_message() {
    let s = Settings { variables: Some("threshold".into()), ..settings("script.expr") };
    assert!(matches!(FilterConfig::load(&s), Err(FilterError::Config(_))));

    assert!(matches!(compile(ScriptLanguage::Rhai, "true", "a=1,,b"), Err(FilterError::Config(_))));
}

#[test]
fn missing_script_is_a_load_error() {
    let err = FilterConfig::load(&settings("no-such-script.rhai")).unwrap_err();
    assert!(matches!(err, FilterError::ScriptLoad { .. }));
    assert!(err.is_startup());
    assert!(err.to_string().contains("no-such-script.rhai"));
}

#[test]
fn missing_variables_file_is_a_load_error() {
    let s = Settings { variables_location: Some(fixture("nope.properties")), ..settings("script.expr") };
    assert!(matches!(FilterConfig::load(&s), Err(FilterError::ScriptLoad { .. })));
}

#[test]
fn unknown_extension_needs_explicit_language() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.groovy");
    std::fs::write(&path, "payload.len() > 1").unwrap();

    let implicit = Settings { script: Some(path.clone()), ..Settings::default() };
    assert!(matches!(FilterConfig::load(&implicit), Err(FilterError::Config(_))));

    let explicit = Settings { language: Some(ScriptLanguage::Rhai), ..implicit };
    let config = FilterConfig::load(&explicit).unwrap();
    let filter = ScriptedFilter::initialize(config, &NoResolver).unwrap();
    assert!(filter.evaluate(&Message::new("ab")).unwrap());
}

#[test]
fn syntax_errors_are_compile_errors() {
    let config = FilterConfig::load(&settings("broken.expr")).unwrap();
    let err = ScriptedFilter::initialize(config, &NoResolver).unwrap_err();
    assert!(matches!(err, FilterError::ScriptCompile(_)), "{err}");
}

#[test]
fn unresolvable_module_is_a_compile_error() {
    let config = FilterConfig::load(&settings("missing-grab.rhai")).unwrap();
    let resolver = DirectoryResolver::new([fixture("modules")]);
    let err = ScriptedFilter::initialize(config, &resolver).unwrap_err();
    assert!(err.to_string().contains("sensors:nowhere"), "{err}");
}

#[test]
fn variables_file_and_inline_values_layer() {
    let s = Settings {
        variables_location: Some(fixture("limits.properties")),
        variables: Some("threshold=5".into()),
        ..settings("script.expr")
    };
    let config = FilterConfig::load(&s).unwrap();
    assert_eq!(config.variables.get("threshold"), Some(&json!(5)));
    assert_eq!(config.variables.get("unit"), Some(&json!("chars")));
}

#[test]
fn settings_file_feeds_the_filter() {
    let file = Settings::from_toml_file(&fixture("filter.toml")).unwrap();
    let s = file.merge(settings("script.expr"));
    let config = FilterConfig::load(&s).unwrap();
    assert_eq!(config.language, ScriptLanguage::Expr);
    assert_eq!(config.truthiness.falsy_strings().collect::<Vec<_>>(), vec!["", "false", "no"]);

    let filter = ScriptedFilter::initialize(config, &NoResolver).unwrap();
    assert!(!filter.evaluate(&Message::new("hello")).unwrap());
    assert!(filter.evaluate(&Message::new("hello world")).unwrap());
}

#[test]
fn falsy_strings_drive_string_verdicts() {
    let filter = compile(ScriptLanguage::Expr, "payload.status", "").unwrap();
    assert!(filter.evaluate(&Message::new(json!({"status": "ok"}))).unwrap());
    assert!(!filter.evaluate(&Message::new(json!({"status": "false"}))).unwrap());
    assert!(!filter.evaluate(&Message::new(json!({"status": ""}))).unwrap());
    assert!(!filter.evaluate(&Message::new(json!({}))).unwrap());
}
