use std::io::{self, BufRead, Write};

use anyhow::Result;
use termion::input::TermRead;
use zeroize::Zeroizing;

use crate::error::KpassError;

pub(crate) mod find;
pub(crate) mod insert;
pub(crate) mod json;
pub(crate) mod ls;
pub(crate) mod mv;
pub(crate) mod rekey;
pub(crate) mod rm;
pub(crate) mod show;
#[cfg(feature = "otp")]
pub(crate) mod totp;
pub(crate) mod unclip;

/// Asks a `[y/N]` question on the terminal; anything but `y` is a no.
pub(crate) fn prompt_yesno<S>(prompt: S) -> Result<bool>
where
    S: AsRef<str>,
{
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    write!(stdout, "{} [y/N] ", prompt.as_ref())?;
    stdout.flush()?;

    match TermRead::read_line(&mut stdin)? {
        Some(reply) => Ok(reply.trim().eq_ignore_ascii_case("y")),
        None => Ok(false),
    }
}

/// Like [`prompt_yesno`], failing with `UserAbort` on a no.
pub(crate) fn confirm<S>(prompt: S) -> Result<()>
where
    S: AsRef<str>,
{
    if prompt_yesno(prompt)? {
        Ok(())
    } else {
        Err(KpassError::UserAbort.into())
    }
}

/// Reads a hidden secret twice and checks that both match.
pub(crate) fn read_secret_twice(name: &str) -> Result<Zeroizing<String>> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    write!(stdout, "Enter secret for {}: ", name)?;
    stdout.flush()?;
    let input = Zeroizing::new(stdin.read_passwd(&mut stdout)?.unwrap_or_default());
    writeln!(stdout)?;

    write!(stdout, "Retype secret for {}: ", name)?;
    stdout.flush()?;
    let check = Zeroizing::new(stdin.read_passwd(&mut stdout)?.unwrap_or_default());
    writeln!(stdout)?;

    if *input != *check {
        return Err(KpassError::PasswordsDontMatch.into());
    }

    Ok(input)
}

/// Reads stdin until EOF.
pub(crate) fn read_multiline(name: &str) -> Result<Zeroizing<String>> {
    println!(
        "Enter the contents of {} and press Ctrl+D when finished:\n",
        name
    );

    let stdin = io::stdin();
    let mut input = Zeroizing::new(String::new());
    for line in stdin.lock().lines() {
        let line = Zeroizing::new(line?);
        input.push_str(&line);
        input.push('\n');
    }

    Ok(input)
}
