//! Terminal passphrase prompting.

use std::io::IsTerminal;

use keyfs_core::{KeyfsError, KeyfsResult};
use secrecy::SecretString;
use zeroize::Zeroize;

/// Read a secret from the controlling terminal.
///
/// Refuses to run on a non-interactive input stream. With `confirm`, the
/// value is entered twice and both entries must match exactly.
pub fn read_secret(prompt: &str, confirm: bool) -> KeyfsResult<SecretString> {
    if !std::io::stdin().is_terminal() {
        return Err(KeyfsError::Usage(
            "passphrase prompt requires a terminal".into(),
        ));
    }

    let mut first = rpassword::prompt_password(format!("Enter {prompt}: "))
        .map_err(KeyfsError::Io)?;
    if first.is_empty() {
        first.zeroize();
        return Err(KeyfsError::Usage("unable to read passphrase".into()));
    }
    if confirm {
        let mut second = rpassword::prompt_password(format!("Reenter {prompt}: "))
            .map_err(KeyfsError::Io)?;
        let matched = first == second;
        second.zeroize();
        if !matched {
            first.zeroize();
            return Err(KeyfsError::Usage("passphrases did not match".into()));
        }
    }
    Ok(SecretString::from(first))
}
