// SPDX-License-Identifier: GPL-3.0-only

//! External command execution
//!
//! Nearly every daemon action is a wrapper around a system tool. The runner
//! starts the tool without a shell (no quoting concerns), captures stdout
//! and stderr separately, and can feed a file opened inside the sysroot to
//! the tool's stdin.
//!
//! Both output pipes are drained at the same time, so a tool that fills one
//! pipe while the daemon is still reading the other cannot stall. When a
//! file is forwarded to stdin, a mover thread copies it across; the stdin
//! pipe's capacity provides the backpressure between mover and tool.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ChildStdin, Command, Stdio};
use std::thread;

use enumflags2::{BitFlags, bitflags};
use nix::fcntl::OFlag;
use tracing::debug;

use crate::error::{Result, SysError};
use crate::strings::split_lines;

/// Read size for the stdin mover
const FORWARD_CHUNK: usize = 64 * 1024;

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlag {
    /// Point the tool's stdout at the stderr pipe.
    ///
    /// For tools (parted, ntfsresize, ...) that print their error messages
    /// on stdout; the text then lands in [`CommandOutput::stderr`].
    FoldStdoutOnStderr = 1 << 0,
}

/// Per-call options for [`CommandRunner::run_with`]
#[derive(Debug, Default)]
pub struct CommandOptions {
    flags: BitFlags<CommandFlag>,
    stdin: Option<File>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold_stdout_on_stderr(mut self) -> Self {
        self.flags |= CommandFlag::FoldStdoutOnStderr;
        self
    }

    /// Stream `file` into the tool's stdin.
    ///
    /// The file is normally one opened through
    /// [`Sysroot::open`](crate::Sysroot::open), so the tool only ever sees
    /// guest data. Without this the tool's stdin is `/dev/null`.
    pub fn copy_to_stdin(mut self, file: File) -> Self {
        self.stdin = Some(file);
        self
    }

    pub fn flags(&self) -> BitFlags<CommandFlag> {
        self.flags
    }
}

/// What a tool printed and how it exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, 0..=255
    pub code: i32,
    /// Raw stdout bytes, exactly as written
    pub stdout: Vec<u8>,
    /// stderr with any trailing newlines removed
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn into_stdout_string(self) -> String {
        match String::from_utf8(self.stdout) {
            Ok(text) => text,
            Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
        }
    }

    pub fn stdout_lines(&self) -> Result<Vec<String>> {
        split_lines(&self.stdout_lossy())
    }
}

/// Starts external tools on behalf of the daemon.
///
/// The only state is the verbosity flag, which echoes each command line to
/// the log before it runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner {
    verbose: bool,
}

impl CommandRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Run `program args...`; a non-zero exit is an error.
    pub fn run<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<CommandOutput> {
        self.run_argv(&build_argv(program, args))
    }

    /// Run `program args...` and hand back whatever exit code it produced.
    pub fn run_allow_nonzero<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
    ) -> Result<CommandOutput> {
        self.run_argv_allow_nonzero(&build_argv(program, args))
    }

    /// Like [`CommandRunner::run`], with `argv[0]` as the program.
    pub fn run_argv<S: AsRef<OsStr>>(&self, argv: &[S]) -> Result<CommandOutput> {
        self.run_with_checked(CommandOptions::new(), argv)
    }

    pub fn run_argv_allow_nonzero<S: AsRef<OsStr>>(&self, argv: &[S]) -> Result<CommandOutput> {
        self.run_with(CommandOptions::new(), argv)
    }

    /// Run with options; a non-zero exit is an error.
    pub fn run_with_checked<S: AsRef<OsStr>>(
        &self,
        options: CommandOptions,
        argv: &[S],
    ) -> Result<CommandOutput> {
        let output = self.run_with(options, argv)?;
        if output.success() {
            return Ok(output);
        }

        Err(SysError::NonZeroExit {
            command: render(argv),
            code: output.code,
            stderr: output.stderr,
        })
    }

    /// Run with options and return any exit code.
    ///
    /// Fails on launch errors, signal deaths, stdin forwarding failures and
    /// pipe/spawn exhaustion (the last is fatal, see [`SysError::is_fatal`]).
    pub fn run_with<S: AsRef<OsStr>>(
        &self,
        options: CommandOptions,
        argv: &[S],
    ) -> Result<CommandOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(SysError::LaunchFailure {
                program: String::new(),
                reason: "empty argument list".to_string(),
            });
        };
        let program = program.as_ref();
        let rendered = render(argv);

        if self.verbose {
            debug!(command = %rendered, "running");
        }

        let fold = options.flags.contains(CommandFlag::FoldStdoutOnStderr);
        let (stderr_read, stderr_write) = pipe()?;
        let (stdout_read, child_stdout) = if fold {
            let shared = stderr_write
                .try_clone()
                .map_err(|error| SysError::fatal("duplicating stderr pipe", error))?;
            (None, shared)
        } else {
            let (read, write) = pipe()?;
            (Some(read), write)
        };

        let mut child = {
            let mut command = Command::new(program);
            command
                .args(args)
                .stdin(if options.stdin.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                })
                .stdout(Stdio::from(child_stdout))
                .stderr(Stdio::from(stderr_write));

            // The write ends go away with `command`, so EOF arrives once the
            // child (and anything it forked) closes them.
            command
                .spawn()
                .map_err(|error| spawn_error(program, error))?
        };

        let child_stdin = child.stdin.take();
        let captured = thread::scope(|scope| -> Result<Captured> {
            let stdout_reader = stdout_read
                .map(|read| {
                    thread::Builder::new()
                        .name("cmd-stdout".into())
                        .spawn_scoped(scope, move || drain(read))
                })
                .transpose();

            let mover = match (options.stdin, child_stdin) {
                (Some(source), Some(sink)) => Some(
                    thread::Builder::new()
                        .name("cmd-stdin".into())
                        .spawn_scoped(scope, move || forward(source, sink)),
                ),
                _ => None,
            }
            .transpose();

            let (stdout_reader, mover) = match (stdout_reader, mover) {
                (Ok(stdout_reader), Ok(mover)) => (stdout_reader, mover),
                (Err(error), _) | (_, Err(error)) => {
                    // Nobody is draining the pipes; the child must not be
                    // left blocked on them while the scope joins.
                    let _ = child.kill();
                    return Err(SysError::fatal("starting I/O thread", error));
                }
            };

            let stderr = drain(stderr_read);
            let stdout = match stdout_reader {
                Some(handle) => join(handle),
                None => Ok(Vec::new()),
            };
            let forwarded = match mover {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err("stdin thread panicked".to_string()))
                    .map(Some),
                None => Ok(None),
            };

            Ok(Captured {
                stdout,
                stderr,
                forwarded,
            })
        });

        let captured = match captured {
            Ok(captured) => captured,
            Err(error) => {
                let _ = child.wait();
                return Err(error);
            }
        };

        let status = child.wait().map_err(|error| {
            SysError::Io(io::Error::new(
                error.kind(),
                format!("{rendered}: waitpid: {error}"),
            ))
        })?;

        let stdout = captured.stdout.map_err(|error| read_error(&rendered, error))?;
        let stderr = captured.stderr.map_err(|error| read_error(&rendered, error))?;
        let stderr = trim_trailing_newlines(String::from_utf8_lossy(&stderr).into_owned());

        match captured.forwarded {
            Ok(Some(bytes)) => {
                if self.verbose {
                    debug!(command = %rendered, bytes, "forwarded file to stdin");
                }
            }
            Ok(None) => {}
            Err(reason) => {
                return Err(SysError::StdinForward {
                    command: rendered,
                    reason,
                });
            }
        }

        match status.code() {
            Some(code) => Ok(CommandOutput {
                code,
                stdout,
                stderr,
            }),
            None => Err(SysError::Signalled {
                command: rendered,
                signal: status.signal().unwrap_or_default(),
                stderr,
            }),
        }
    }
}

struct Captured {
    stdout: io::Result<Vec<u8>>,
    stderr: io::Result<Vec<u8>>,
    forwarded: std::result::Result<Option<u64>, String>,
}

/// Quote `arg` for display, backslash-escaping anything but `[A-Za-z0-9/._-]`.
pub fn shell_quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len());
    for c in arg.chars() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.')) {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
}

fn render<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| shell_quote(&arg.as_ref().to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_argv<'a, S: AsRef<OsStr>>(program: &'a str, args: &'a [S]) -> Vec<&'a OsStr> {
    std::iter::once(OsStr::new(program))
        .chain(args.iter().map(AsRef::as_ref))
        .collect()
}

fn pipe() -> Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|errno| SysError::fatal("creating pipe", io::Error::from(errno)))
}

fn spawn_error(program: &OsStr, error: io::Error) -> SysError {
    let launch = matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || matches!(
        error.raw_os_error(),
        Some(libc::ENOEXEC | libc::ENOTDIR | libc::ELOOP | libc::ENAMETOOLONG | libc::E2BIG)
    );

    if launch {
        SysError::LaunchFailure {
            program: program.to_string_lossy().into_owned(),
            reason: error.to_string(),
        }
    } else {
        SysError::fatal(format!("spawning {}", program.to_string_lossy()), error)
    }
}

fn read_error(command: &str, error: io::Error) -> SysError {
    SysError::Io(io::Error::new(
        error.kind(),
        format!("{command}: reading output: {error}"),
    ))
}

fn drain(pipe: OwnedFd) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    File::from(pipe).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Copy `source` into the tool's stdin until EOF.
///
/// A tool that exits without reading everything (`head`) closes the pipe
/// early; that is the tool's business and not an error here.
fn forward(mut source: File, mut sink: ChildStdin) -> std::result::Result<u64, String> {
    let mut buffer = vec![0u8; FORWARD_CHUNK];
    let mut total = 0u64;

    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(format!("read: {error}")),
        };

        match sink.write_all(&buffer[..read]) {
            Ok(()) => total += read as u64,
            Err(error) if error.kind() == io::ErrorKind::BrokenPipe => return Ok(total),
            Err(error) => return Err(format!("write: {error}")),
        }
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("I/O thread panicked")))
}

fn trim_trailing_newlines(mut text: String) -> String {
    let trimmed = text.trim_end_matches('\n').len();
    text.truncate(trimmed);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_only_trailing_newlines() {
        assert_eq!(trim_trailing_newlines("oops\n\n\n".into()), "oops");
        assert_eq!(trim_trailing_newlines("oops".into()), "oops");
        assert_eq!(trim_trailing_newlines("a\nb\n".into()), "a\nb");
        assert_eq!(trim_trailing_newlines("\n\n".into()), "");
        assert_eq!(trim_trailing_newlines(" x \n".into()), " x ");
    }

    #[test]
    fn quotes_unsafe_characters() {
        assert_eq!(shell_quote("/dev/sda1"), "/dev/sda1");
        assert_eq!(shell_quote("a b"), "a\\ b");
        assert_eq!(shell_quote("$(x)"), "\\$\\(x\\)");
    }

    #[test]
    fn renders_command_line() {
        assert_eq!(render(&["head", "-n", "10"]), "head -n 10");
    }

    #[test]
    fn empty_argv_is_a_launch_failure() {
        let err = CommandRunner::default()
            .run_argv::<&str>(&[])
            .unwrap_err();
        assert!(matches!(err, SysError::LaunchFailure { .. }));
    }

    #[test]
    fn fold_flag_is_recorded() {
        let options = CommandOptions::new().fold_stdout_on_stderr();
        assert!(options.flags().contains(CommandFlag::FoldStdoutOnStderr));
        assert!(CommandOptions::new().flags().is_empty());
    }
}
