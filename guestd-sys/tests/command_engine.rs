// SPDX-License-Identifier: GPL-3.0-only

use std::fs::File;

use guestd_sys::{CommandOptions, CommandRunner, SysError};

mod common;

use common::TempDir;

fn sh(script: &str) -> Vec<&str> {
    vec!["sh", "-c", script]
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn captures_both_streams_beyond_pipe_capacity() {
    // Both writers run at once and each produces well over 64 KiB.
    let output = CommandRunner::default()
        .run_argv(&sh(
            "yes out | head -n 50000 & yes err | head -n 50000 >&2; wait",
        ))
        .expect("run writers");

    assert_eq!(output.stdout, "out\n".repeat(50000).into_bytes());
    assert_eq!(output.stderr, "err\n".repeat(50000).trim_end_matches('\n'));
}

#[test]
fn stdout_is_returned_verbatim() {
    let output = CommandRunner::default()
        .run_argv(&sh("printf 'a\\n\\n'"))
        .unwrap();
    assert_eq!(output.stdout, b"a\n\n");
    assert_eq!(output.stderr, "");
}

#[test]
fn stderr_loses_only_trailing_newlines() {
    let output = CommandRunner::default()
        .run_argv(&sh("printf 'line one\\nline two\\n\\n\\n' >&2"))
        .unwrap();
    assert_eq!(output.stderr, "line one\nline two");
}

#[test]
fn exit_codes_are_reported_exactly() {
    let runner = CommandRunner::default();
    for code in [0, 1, 2, 127, 255] {
        let output = runner
            .run_argv_allow_nonzero(&sh(&format!("exit {code}")))
            .unwrap();
        assert_eq!(output.code, code);
        assert_eq!(output.success(), code == 0);
    }
}

#[test]
fn nonzero_exit_carries_stderr() {
    let err = CommandRunner::default()
        .run_argv(&sh("echo 'disk on fire' >&2; exit 3"))
        .unwrap_err();

    match &err {
        SysError::NonZeroExit { code, stderr, .. } => {
            assert_eq!(*code, 3);
            assert_eq!(stderr, "disk on fire");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.stderr(), Some("disk on fire"));
    assert!(!err.is_fatal());
}

#[test]
fn missing_program_is_a_launch_failure() {
    let err = CommandRunner::default()
        .run("/nonexistent/guestd-no-such-tool", &["--help"])
        .unwrap_err();

    match err {
        SysError::LaunchFailure { program, reason } => {
            assert_eq!(program, "/nonexistent/guestd-no-such-tool");
            assert!(!reason.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn signal_death_is_not_an_exit_code() {
    let err = CommandRunner::default()
        .run_argv_allow_nonzero(&sh("echo dying >&2; kill -9 $$"))
        .unwrap_err();

    match err {
        SysError::Signalled { signal, stderr, .. } => {
            assert_eq!(signal, 9);
            assert_eq!(stderr, "dying");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fold_sends_stdout_to_stderr() {
    let output = CommandRunner::default()
        .run_with(
            CommandOptions::new().fold_stdout_on_stderr(),
            &sh("echo hello; echo world >&2"),
        )
        .unwrap();

    assert!(output.stdout.is_empty());
    assert_eq!(output.stderr, "hello\nworld");
}

#[test]
fn stdin_is_null_without_forwarding() {
    let output = CommandRunner::default().run("cat", &[] as &[&str]).unwrap();
    assert!(output.stdout.is_empty());
}

#[test]
fn forwards_files_of_any_size() {
    let temp = TempDir::new("guestd-command-engine");
    let runner = CommandRunner::new(true);

    for size in [0, 1, 4096, 3 * 65536 + 17] {
        let contents = pattern(size);
        let file = temp.file_with(&format!("input-{size}"), &contents);

        let output = runner
            .run_with_checked(CommandOptions::new().copy_to_stdin(file), &["cat"])
            .unwrap();
        assert_eq!(output.stdout.len(), size);
        assert_eq!(output.stdout, contents);
    }
}

#[test]
fn early_reader_exit_is_not_a_forwarding_error() {
    let temp = TempDir::new("guestd-command-engine");
    let contents = pattern(1024 * 1024);
    let file = temp.file_with("big", &contents);

    let output = CommandRunner::default()
        .run_with_checked(
            CommandOptions::new().copy_to_stdin(file),
            &["head", "-c", "10"],
        )
        .unwrap();
    assert_eq!(output.stdout, &contents[..10]);
}

#[test]
fn forwarding_read_errors_fail_the_call() {
    let temp = TempDir::new("guestd-command-engine");
    // Reading a directory fails with EISDIR.
    let dir = File::open(temp.path()).unwrap();

    let err = CommandRunner::default()
        .run_with(CommandOptions::new().copy_to_stdin(dir), &["cat"])
        .unwrap_err();
    assert!(matches!(err, SysError::StdinForward { .. }), "{err}");
}

#[test]
fn output_lines_follow_split_rules() {
    let output = CommandRunner::default()
        .run_argv(&sh("printf 'a\\nb\\n'"))
        .unwrap();
    assert_eq!(output.stdout_lines().unwrap(), vec!["a", "b"]);
}
