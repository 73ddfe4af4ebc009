//! Entry paths
//!
//! # path
//!
//! Entries are addressed by slash-separated paths made of one or more
//! directory segments followed by a title, e.g. `email/work/password`. The
//! directory segments map onto nested KDBX groups and the title onto the
//! entry's `Title` field.

use crate::error::KpassError;
use crate::Result;

pub const SEPARATOR: char = '/';
pub const WILDCARD: &str = "*";

/// Collapses empty segments and strips leading and trailing separators.
pub fn canonicalize<S>(path: S) -> String
where
    S: AsRef<str>,
{
    segments(path.as_ref()).collect::<Vec<_>>().join("/")
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Splits `path` into its directory components and its title.
pub fn split<S>(path: S) -> Result<(Vec<String>, String)>
where
    S: AsRef<str>,
{
    let path = path.as_ref();
    let mut parts = segments(path).map(ToOwned::to_owned).collect::<Vec<_>>();

    if parts.len() < 2 {
        return Err(KpassError::InvalidPath(path.to_owned()));
    }

    // len >= 2, so there is always a title
    let title = parts.pop().unwrap_or_default();

    Ok((parts, title))
}

/// The inverse of [`split`]; always yields a canonical path.
pub fn join<V, S>(components: V, title: S) -> String
where
    V: AsRef<[String]>,
    S: AsRef<str>,
{
    let components = components.as_ref();
    let mut path = components.join("/");
    path.push(SEPARATOR);
    path.push_str(title.as_ref());

    canonicalize(path)
}

pub fn is_directory<S>(path: S) -> bool
where
    S: AsRef<str>,
{
    path.as_ref().ends_with(SEPARATOR)
}

/// The final segment of `path`.
pub fn base<S>(path: S) -> String
where
    S: AsRef<str>,
{
    segments(path.as_ref()).last().unwrap_or_default().to_owned()
}

/// Everything but the final segment of `path`, canonicalized. Empty for
/// single-segment paths.
pub fn directory<S>(path: S) -> String
where
    S: AsRef<str>,
{
    let parts = segments(path.as_ref()).collect::<Vec<_>>();

    match parts.split_last() {
        Some((_, dir)) => dir.join("/"),
        None => String::new(),
    }
}

/// Validates `path` as the target of a write: it must split, and no segment
/// may be a wildcard or a relative reference.
pub fn check_entry_path<S>(path: S) -> Result<(Vec<String>, String)>
where
    S: AsRef<str>,
{
    let path = path.as_ref();

    if segments(path).any(|s| s.contains(WILDCARD) || s == "." || s == "..") {
        return Err(KpassError::InvalidPath(path.to_owned()));
    }

    split(path)
}

/// A parsed match pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Exactly one path.
    Exact(String),
    /// Every entry whose directory is this (canonical) directory.
    Directory(String),
}

impl Pattern {
    pub fn parse<S>(pattern: S) -> Result<Pattern>
    where
        S: AsRef<str>,
    {
        let raw = pattern.as_ref();
        let parts = segments(raw).collect::<Vec<_>>();

        match parts.split_last() {
            Some((&last, dir)) if last == WILDCARD => {
                if dir.iter().any(|s| s.contains(WILDCARD)) {
                    return Err(KpassError::InvalidMatch(raw.to_owned()));
                }

                Ok(Pattern::Directory(dir.join("/")))
            }
            Some(_) if raw.contains(WILDCARD) => Err(KpassError::InvalidMatch(raw.to_owned())),
            Some(_) => Ok(Pattern::Exact(canonicalize(raw))),
            None => Err(KpassError::InvalidPath(raw.to_owned())),
        }
    }

    pub fn is_match<S>(&self, path: S) -> bool
    where
        S: AsRef<str>,
    {
        let path = path.as_ref();

        match self {
            Pattern::Exact(exact) => *exact == canonicalize(path),
            Pattern::Directory(dir) => *dir == directory(path),
        }
    }
}

/// Returns whether `entry_path` is matched by `pattern`.
pub fn matches<P, S>(pattern: P, entry_path: S) -> Result<bool>
where
    P: AsRef<str>,
    S: AsRef<str>,
{
    Ok(Pattern::parse(pattern)?.is_match(entry_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms() {
        assert_eq!(canonicalize("/a//b/c/"), "a/b/c");
        assert_eq!(canonicalize("a/b"), "a/b");
        assert_eq!(canonicalize("///"), "");
    }

    #[test]
    fn split_requires_two_segments() {
        assert!(split("a").is_err());
        assert!(split("/a/").is_err());
        assert!(split("").is_err());

        let (components, title) = split("/a//b/c/").unwrap();
        assert_eq!(components, vec!["a", "b"]);
        assert_eq!(title, "c");
    }

    #[test]
    fn join_is_canonical() {
        assert_eq!(join(vec!["a".to_owned(), "".to_owned()], "c"), "a/c");
        assert_eq!(join(vec!["x".to_owned(), "y".to_owned()], "z"), "x/y/z");
    }

    #[test]
    fn base_and_directory() {
        assert_eq!(base("a/b/c"), "c");
        assert_eq!(directory("a/b/c"), "a/b");
        assert_eq!(directory("a/b"), "a");
        assert_eq!(directory("a"), "");
        assert!(is_directory("a/b/"));
        assert!(!is_directory("a/b"));
    }

    #[test]
    fn wildcard_rules() {
        assert!(matches("a/b/*", "a/b/c").unwrap());
        assert!(!matches("a/b/*", "a/b/c/d").unwrap());
        assert!(!matches("a/*", "a/b/c").unwrap());
        assert!(matches("a/b/c", "/a/b/c/").unwrap());
        assert!(matches("a/*/c", "a/b/c").is_err());
        assert!(matches("a/b*", "a/b").is_err());
        assert!(matches("*/*", "a/b").is_err());
    }

    #[test]
    fn entry_paths_reject_relative_segments() {
        assert!(check_entry_path("a/../b").is_err());
        assert!(check_entry_path("a/./b").is_err());
        assert!(check_entry_path("a/b*").is_err());
        assert!(check_entry_path("a/b").is_ok());
    }
}
