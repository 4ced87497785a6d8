// SPDX-License-Identifier: GPL-3.0-only

//! String-list building
//!
//! Handlers build argument vectors and multi-value results incrementally.
//! [`StringList`] owns every string appended to it until it is sealed, at
//! which point the finished list is handed to the caller and the builder is
//! empty again.

use std::fmt;

use crate::error::{Result, SysError};

/// Slots added each time the backing storage fills up
const GROW_BY: usize = 64;

#[derive(Debug, Default)]
pub struct StringList {
    items: Vec<String>,
}

impl StringList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a copy of `item`.
    pub fn append(&mut self, item: &str) -> Result<()> {
        self.append_owned(item.to_owned())
    }

    /// Append `item`, taking ownership of it.
    ///
    /// If the storage cannot grow, every string already appended is released
    /// and the builder is left empty.
    pub fn append_owned(&mut self, item: String) -> Result<()> {
        if self.items.len() == self.items.capacity()
            && let Err(error) = self.items.try_reserve_exact(GROW_BY)
        {
            self.discard();
            return Err(SysError::exhausted(
                "growing string list",
                std::io::Error::new(std::io::ErrorKind::OutOfMemory, error),
            ));
        }

        self.items.push(item);
        Ok(())
    }

    /// Append a formatted string (`list.append_fmt(format_args!("{n}"))`).
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.append_owned(fmt::format(args))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finish the list and hand it over. The builder is reset to empty.
    pub fn seal(&mut self) -> Vec<String> {
        std::mem::take(&mut self.items)
    }

    /// Release every string and the backing storage.
    pub fn discard(&mut self) {
        self.items = Vec::new();
    }
}

/// Split command output into lines.
///
/// The corner cases matter to callers that return the result verbatim:
///
/// - `""` gives `[]`
/// - `"\n"` gives `[""]`
/// - `"a\nb"` and `"a\nb\n"` give `["a", "b"]`
/// - `"a\nb\n\n"` gives `["a", "b", ""]`
pub fn split_lines(text: &str) -> Result<Vec<String>> {
    let mut lines = StringList::new();
    let mut rest = text;

    while !rest.is_empty() {
        match rest.split_once('\n') {
            Some((line, tail)) => {
                lines.append(line)?;
                rest = tail;
            }
            None => {
                lines.append(rest)?;
                break;
            }
        }
    }

    Ok(lines.seal())
}

/// Keep only the strings for which `keep` returns true.
pub fn filter_list<F>(strings: Vec<String>, mut keep: F) -> Vec<String>
where
    F: FnMut(&str) -> bool,
{
    strings.into_iter().filter(|s| keep(s)).collect()
}

/// Strip leading and trailing ASCII whitespace.
pub fn trim(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_ascii_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_hands_over_and_resets() {
        let mut list = StringList::new();
        list.append("a").unwrap();
        list.append_owned("b".to_string()).unwrap();

        assert_eq!(list.seal(), vec!["a", "b"]);
        assert!(list.is_empty());
        assert!(list.seal().is_empty());
    }

    #[test]
    fn seals_empty_and_single_lists() {
        assert!(StringList::new().seal().is_empty());

        let mut list = StringList::new();
        list.append("only").unwrap();
        assert_eq!(list.seal(), vec!["only"]);
    }

    #[test]
    fn grows_across_many_chunks() {
        let mut list = StringList::new();
        for i in 0..1000 {
            list.append_fmt(format_args!("item{i}")).unwrap();
        }

        let sealed = list.seal();
        assert_eq!(sealed.len(), 1000);
        assert_eq!(sealed[0], "item0");
        assert_eq!(sealed[GROW_BY], format!("item{GROW_BY}"));
        assert_eq!(sealed[999], "item999");
    }

    #[test]
    fn discard_releases_everything() {
        let mut list = StringList::new();
        list.append("x").unwrap();
        list.discard();
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn split_lines_corner_cases() {
        assert!(split_lines("").unwrap().is_empty());
        assert_eq!(split_lines("\n").unwrap(), vec![""]);
        assert_eq!(split_lines("a\nb").unwrap(), vec!["a", "b"]);
        assert_eq!(split_lines("a\nb\n").unwrap(), vec!["a", "b"]);
        assert_eq!(split_lines("a\nb\n\n").unwrap(), vec!["a", "b", ""]);
    }

    #[test]
    fn filters_keep_order() {
        let kept = filter_list(
            vec!["sdb".to_string(), "md0".to_string(), "sda".to_string()],
            |s| s.starts_with("sd"),
        );
        assert_eq!(kept, vec!["sdb", "sda"]);
        assert!(filter_list(Vec::new(), |_| true).is_empty());
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(trim("  \tvalue \n"), "value");
        assert_eq!(trim(""), "");
    }
}
