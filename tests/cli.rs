use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn run(args: &[&str], stdin: &str) -> std::process::Output {
    run_with_env(args, &[], stdin)
}

fn run_with_env(args: &[&str], env: &[(&str, &str)], stdin: &str) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_sfilter"))
        .args(args)
        .envs(env.iter().copied())
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    // the child may exit before reading anything
    let _ = child.stdin.take().unwrap().write_all(stdin.as_bytes());
    child.wait_with_output().unwrap()
}

#[test]
fn filters_stdin_lines() {
    let script = fixture("script.rhai");
    let out = run(
        &["--script", script.to_str().unwrap(), "--variables", "threshold=5"],
        "hello\nhello world\nhi!\n",
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello world\n");
}

#[test]
fn grabs_modules_from_the_module_path() {
    let script = fixture("script-with-grab.expr");
    let modules = fixture("modules");
    let out = run(
        &["--script", script.to_str().unwrap(), "--module-path", modules.to_str().unwrap(), "--json"],
        "0.2\n0.3\n0.4\n",
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "0.2\n");
}

#[test]
fn bad_variables_exit_before_reading_input() {
    let script = fixture("script.expr");
    let out = run(&["--script", script.to_str().unwrap(), "--variables", "threshold"], "hello world\n");
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
}

#[test]
fn script_output_stays_off_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("noisy.rhai");
    std::fs::write(&script, "print(\"noise\"); debug(payload); payload.len() > 3").unwrap();
    let out = run(&["--script", script.to_str().unwrap(), "-v"], "hello world\nhi\n");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello world\n");
}

#[test]
fn invalid_json_lines_count_as_failures() {
    let script = fixture("script-with-grab.expr");
    let modules = fixture("modules");
    let out = run(
        &["--script", script.to_str().unwrap(), "--module-path", modules.to_str().unwrap(), "--json"],
        "0.2\nnot json\n0.4\n",
    );
    assert_eq!(out.status.code(), Some(2));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "0.2\n");
}

#[test]
fn falsy_strings_come_from_the_environment() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("status.expr");
    std::fs::write(&script, "payload.status").unwrap();
    let out = run_with_env(
        &["--script", script.to_str().unwrap(), "--json"],
        &[("SCRIPT_FILTER_FALSY", "no,off")],
        "{\"status\":\"ok\"}\n{\"status\":\"no\"}\n{\"status\":\"off\"}\n",
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "{\"status\":\"ok\"}\n");
}
