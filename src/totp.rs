//! TOTP entries
//!
//! # totp
//!
//! An entry whose title is the configured TOTP leaf name stores a TOTP seed.
//! Next to the seed it keeps an `otpauth://` URL built from the configured
//! format, so other KeePass clients can generate codes from it too.

use crate::error::KpassError;
use crate::Result;

const PLACEHOLDER: &str = "%s";
const URI_SCHEME: &str = "otpauth://";

pub fn is_totp_title<S, T>(title: S, totp_entry: T) -> bool
where
    S: AsRef<str>,
    T: AsRef<str>,
{
    title.as_ref() == totp_entry.as_ref()
}

/// Builds the otpauth URL stored next to `seed`. A seed that already is an
/// otpauth URL is kept as is.
pub fn format_url<F, S>(format: F, seed: S) -> Result<String>
where
    F: AsRef<str>,
    S: AsRef<str>,
{
    let seed = seed.as_ref().trim();

    if seed.contains('\n') {
        return Err(KpassError::TotpMultiLine);
    }
    if seed.starts_with(URI_SCHEME) {
        return Ok(seed.to_owned());
    }

    let seed = seed.split_whitespace().collect::<String>();
    Ok(format.as_ref().replacen(PLACEHOLDER, &seed, 1))
}

/// The value of the `secret` query parameter of an otpauth URL.
pub fn url_secret<S>(url: S) -> Option<String>
where
    S: AsRef<str>,
{
    let url = url.as_ref();
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case("secret"))
        .map(|(_, v)| v.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::DEFAULT_TOTP_FORMAT;

    #[test]
    fn formats_default_url() {
        let url = format_url(DEFAULT_TOTP_FORMAT, "5AE472ABQDEKJQYKOYXK7HVC2LEKLQ5N").unwrap();

        assert!(url.starts_with("otpauth://totp/"));
        assert_eq!(
            url_secret(&url).as_deref(),
            Some("5AE472ABQDEKJQYKOYXK7HVC2LEKLQ5N")
        );
    }

    #[test]
    fn seeds_are_normalized() {
        let url = format_url("otpauth://totp/x?secret=%s", " ABCD EFGH \n").unwrap();
        assert_eq!(url, "otpauth://totp/x?secret=ABCDEFGH");

        let existing = "otpauth://totp/y?secret=QQQQ&issuer=y";
        assert_eq!(format_url(DEFAULT_TOTP_FORMAT, existing).unwrap(), existing);
    }

    #[test]
    fn multi_line_seed() {
        assert!(matches!(
            format_url(DEFAULT_TOTP_FORMAT, "ABCD\nEFGH"),
            Err(KpassError::TotpMultiLine)
        ));
    }

    #[test]
    fn title_check() {
        assert!(is_totp_title("totp", "totp"));
        assert!(!is_totp_title("totp2", "totp"));
    }
}
