use kpass::error::KpassError;
use kpass::path::{self, Pattern};

#[test]
fn split_then_join_is_identity() {
    let paths = ["a/b", "email/work/password", "x/y/z/w/totp"];

    for p in &paths {
        let (components, title) = path::split(p).unwrap();
        assert_eq!(path::join(&components, &title), *p);
    }
}

#[test]
fn canonicalize_strips_slashes() {
    assert_eq!(path::canonicalize("//email///work/"), "email/work");
    assert_eq!(path::canonicalize("/"), "");
}

#[test]
fn single_segments_are_not_entries() {
    assert!(matches!(path::split("title"), Err(KpassError::InvalidPath(_))));
    assert!(matches!(path::split("/title/"), Err(KpassError::InvalidPath(_))));
}

#[test]
fn directory_patterns() {
    let pattern = Pattern::parse("email/*").unwrap();

    assert!(pattern.is_match("email/gmail"));
    assert!(!pattern.is_match("email/work/gmail"));
    assert!(!pattern.is_match("mail/gmail"));
    assert!(path::matches("email/gmail", "/email/gmail/").unwrap());
}

#[test]
fn wildcards_only_at_the_end() {
    assert!(matches!(
        Pattern::parse("email/*/gmail"),
        Err(KpassError::InvalidMatch(_))
    ));
    assert!(matches!(
        Pattern::parse("em*il/gmail"),
        Err(KpassError::InvalidMatch(_))
    ));
}

#[test]
fn entry_paths_reject_wildcards() {
    assert!(path::check_entry_path("a/*").is_err());
    assert!(path::check_entry_path("a/../b").is_err());
    assert!(path::check_entry_path("a/b").is_ok());
}
