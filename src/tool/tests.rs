// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fs;

use indoc::indoc;
use tempfile::tempdir;

use super::{env::parse_env_output, *};

#[test]
fn test_success() {
    let invoker = ToolInvoker::new();
    assert!(invoker.run(&ToolCall::new("true")).is_ok());
}

#[test]
fn test_non_zero_exit_carries_code() {
    let invoker = ToolInvoker::new();
    let result = invoker.run(&ToolCall::new("sh").arg("-c").arg("exit 3"));
    match result {
        Err(ToolError::NonZeroExit {
            executable,
            exit_code,
        }) => {
            assert_eq!(executable, "sh");
            assert_eq!(exit_code, Some(3));
        }
        _ => panic!("expected a non-zero exit, got {result:?}"),
    }
}

#[test]
fn test_missing_executable() {
    let invoker = ToolInvoker::new();
    let result = invoker.run(&ToolCall::new("/this/tool/does/not/exist"));
    assert!(matches!(result, Err(ToolError::Spawn { .. })));
}

#[test]
fn test_dry_run_doesnt_run() {
    let invoker = ToolInvoker::new().dry_run(true);
    assert!(invoker.is_dry_run());
    assert!(invoker.run(&ToolCall::new("false")).is_ok());
}

#[test]
fn test_display() {
    let call = ToolCall::new("NDPPP").arg("/tmp/parset.abc").args(["a=1", "b=2"]);
    assert_eq!(call.to_string(), "NDPPP /tmp/parset.abc a=1 b=2");
    assert_eq!(call.get_args().len(), 3);
}

#[test]
fn test_working_dir_and_log_file() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("tool.log");
    let invoker = ToolInvoker::new();
    let call = ToolCall::new("sh")
        .arg("-c")
        .arg("echo to-stdout; echo to-stderr >&2; touch here")
        .working_dir(dir.path())
        .log_file(&log);
    invoker.run(&call).unwrap();

    assert!(dir.path().join("here").exists());
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("to-stdout"));
    assert!(contents.contains("to-stderr"));

    // Logs are appended to.
    invoker.run(&call).unwrap();
    let contents = fs::read_to_string(&log).unwrap();
    assert_eq!(contents.matches("to-stdout").count(), 2);
}

#[test]
fn test_init_script_environment() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("lofarinit.sh");
    fs::write(
        &script,
        indoc! {r#"
            RSM_IMAGING_TEST_VAR=from-init-script
            export RSM_IMAGING_TEST_VAR
            echo "this should not end up in the environment"
        "#},
    )
    .unwrap();

    let invoker = ToolInvoker::new();
    let call = ToolCall::new("sh")
        .arg("-c")
        .arg(r#"test "$RSM_IMAGING_TEST_VAR" = from-init-script"#)
        .init_script(Some(&script));
    invoker.run(&call).unwrap();

    let env = resolve_environment(&script).unwrap().unwrap();
    assert_eq!(env["RSM_IMAGING_TEST_VAR"], "from-init-script");
    assert!(env.contains_key("PATH"));
}

#[test]
fn test_missing_init_script_is_not_fatal() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("not-here.sh");
    assert!(resolve_environment(&script).unwrap().is_none());

    let invoker = ToolInvoker::new();
    let call = ToolCall::new("true").init_script(Some(&script));
    assert!(invoker.run(&call).is_ok());
}

#[test]
fn test_failing_init_script() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("broken.sh");
    fs::write(&script, "exit 7\n").unwrap();
    let result = resolve_environment(&script);
    assert!(matches!(result, Err(ToolError::InitScript { .. })));
}

#[test]
fn test_parse_env_output_applies_denylist() {
    let output = indoc! {"
        PATH=/usr/bin:/bin
        LOFARROOT=/opt/lofar
        module=() {  eval `/usr/bin/modulecmd bash $*`
        }
        BASH_FUNC_module%%=() {  eval `/usr/bin/modulecmd bash $*`
        EMPTY=
        EQUALS=a=b
        not a variable
    "};
    let env = parse_env_output(output);
    assert_eq!(env["PATH"], "/usr/bin:/bin");
    assert_eq!(env["LOFARROOT"], "/opt/lofar");
    assert_eq!(env["EMPTY"], "");
    assert_eq!(env["EQUALS"], "a=b");
    assert!(!env.contains_key("module"));
    assert!(!env.contains_key("BASH_FUNC_module%%"));
    assert_eq!(env.len(), 4);
}
