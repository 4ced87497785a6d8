// SPDX-License-Identifier: GPL-3.0-only

//! Drive letter arithmetic
//!
//! Drives are named in bijective base 26, the same way spreadsheet columns
//! are: `a`..`z`, then `aa`..`zz`, then `aaa` and so on. Index 0 is `a`.

/// Turn a zero-based drive index into its letters (`27` -> `"ab"`).
pub fn drive_name(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index;

    loop {
        letters.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }

    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// The inverse of [`drive_name`] (`"ab"` -> `Some(27)`).
///
/// Any driver prefix (`sd`, `vd`, ...) and partition number must already be
/// stripped. Returns `None` for empty input, anything other than lowercase
/// ASCII letters, or a name too long to index.
pub fn drive_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }

    let mut value: usize = 0;
    for byte in letters.bytes() {
        if !byte.is_ascii_lowercase() {
            return None;
        }
        value = value
            .checked_mul(26)?
            .checked_add(usize::from(byte - b'a') + 1)?;
    }

    Some(value - 1)
}
