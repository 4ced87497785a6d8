// SPDX-License-Identifier: GPL-3.0-only

//! First and last lines of guest files
//!
//! The file is opened inside the sysroot and streamed to the appliance's
//! own `head`/`tail` through stdin, so the tools never see a guest path.

use guestd_sys::{CommandOptions, DaemonContext};

use super::need_root;
use crate::error::{Result, ServiceError};

const DEFAULT_LINES: i64 = 10;

fn headtail(
    ctx: &DaemonContext,
    procedure: &'static str,
    program: &str,
    count: &str,
    path: &str,
) -> Result<Vec<String>> {
    need_root(ctx, procedure)?;

    let file = ctx
        .sysroot()
        .open(path)
        .map_err(|source| ServiceError::Path {
            path: path.to_string(),
            source,
        })?;

    let output = ctx
        .runner()
        .run_with_checked(CommandOptions::new().copy_to_stdin(file), &[program, "-n", count])?;

    Ok(output.stdout_lines()?)
}

pub fn head(ctx: &DaemonContext, path: &str) -> Result<Vec<String>> {
    headtail(ctx, "head", "head", &DEFAULT_LINES.to_string(), path)
}

/// Negative `lines` prints all but the last `-lines` lines.
pub fn head_n(ctx: &DaemonContext, lines: i64, path: &str) -> Result<Vec<String>> {
    headtail(ctx, "head_n", "head", &lines.to_string(), path)
}

pub fn tail(ctx: &DaemonContext, path: &str) -> Result<Vec<String>> {
    headtail(ctx, "tail", "tail", &DEFAULT_LINES.to_string(), path)
}

/// Negative `lines` prints from line `-lines` onwards.
pub fn tail_n(ctx: &DaemonContext, lines: i64, path: &str) -> Result<Vec<String>> {
    headtail(ctx, "tail_n", "tail", &tail_count(lines), path)
}

fn tail_count(lines: i64) -> String {
    if lines >= 0 {
        lines.to_string()
    } else {
        format!("+{}", lines.unsigned_abs())
    }
}
