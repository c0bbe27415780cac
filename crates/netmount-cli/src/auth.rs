use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Result, bail};
use rpassword::read_password;
use secrecy::SecretString;

/// Where the admin password comes from, highest priority first.
#[derive(Clone, Default)]
pub struct PasswordSource {
    /// `--password`
    pub flag: Option<String>,
    /// `--password-stdin`
    pub stdin: bool,
    /// Handed over by a parent `netmount` through the environment
    pub handoff: Option<SecretString>,
}

impl PasswordSource {
    /// Resolve the admin password, prompting on a terminal as a last resort.
    ///
    /// `confirm` asks twice; used when the store does not exist yet and the
    /// password being typed becomes its password.
    pub fn resolve(&self, confirm: bool) -> Result<SecretString> {
        if self.stdin {
            return read_password_from_stdin();
        }
        if let Some(password) = &self.flag {
            return Ok(SecretString::from(password.clone()));
        }
        if let Some(password) = &self.handoff {
            return Ok(password.clone());
        }
        if !io::stdin().is_terminal() {
            bail!(
                "No admin password given.\n\
                 Use --password-stdin, --password or NETMOUNT_ADMIN_PASSWORD."
            );
        }
        if confirm {
            prompt_new_password("New store password: ")
        } else {
            prompt_password("Admin password: ")
        }
    }
}

/// Prompt for a password with echo disabled.
pub fn prompt_password(label: &str) -> Result<SecretString> {
    eprint!("{label}");
    io::stderr().flush()?;

    let password = read_password()?;
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(SecretString::from(password))
}

/// Prompt twice and require both answers to match.
pub fn prompt_new_password(label: &str) -> Result<SecretString> {
    use secrecy::ExposeSecret;

    let first = prompt_password(label)?;
    let second = prompt_password("Repeat: ")?;
    if first.expose_secret() != second.expose_secret() {
        bail!("Passwords do not match");
    }
    Ok(first)
}

fn read_password_from_stdin() -> Result<SecretString> {
    if io::stdin().is_terminal() {
        bail!(
            "--password-stdin requires the password to be piped in.\n\
             Example: echo \"$SECRET\" | netmount --password-stdin list"
        );
    }

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\n', '\r']);
    if password.is_empty() {
        bail!("Password from stdin is empty");
    }
    Ok(SecretString::from(password.to_string()))
}
