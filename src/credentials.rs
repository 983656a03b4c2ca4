//! Username and password resolution with interactive fallback.

use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead, Write};

use crate::error::{DuctError, Result};
use crate::types::{Credential, Field, Setting};

/// Source of interactively entered credentials.
///
/// The default [`TerminalPrompt`] reads from the controlling terminal; tests
/// substitute a fixed-answer implementation.
pub trait CredentialPrompt: Send {
    /// Ask for a username (input is echoed).
    fn username(&mut self, service: &str) -> Result<String>;

    /// Ask for a password (input is masked).
    fn password(&mut self, service: &str) -> Result<String>;

    /// Login name of the invoking user.
    fn login_name(&self) -> Option<String> {
        login_name()
    }
}

/// Prompts on the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn username(&mut self, service: &str) -> Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "Enter username for '{service}': ")?;
        stdout.flush()?;

        read_answer(&mut io::stdin().lock())
    }

    fn password(&mut self, service: &str) -> Result<String> {
        Ok(rpassword::prompt_password(format!(
            "Enter password for '{service}': "
        ))?)
    }
}

/// Read one answer line without its line terminator.
///
/// End of input is an error rather than an empty answer.
fn read_answer(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "no answer on standard input");
        return Err(eof.into());
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Login name of the current user, from the environment.
pub fn login_name() -> Option<String> {
    ["USER", "LOGNAME", "USERNAME"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .find(|name| !name.is_empty())
}

/// Resolves credential settings and caches interactive answers.
///
/// Cached answers live as long as the resolver and are never persisted.
pub struct CredentialResolver {
    prompt: Box<dyn CredentialPrompt>,
    cached: HashMap<Field, String>,
}

impl CredentialResolver {
    /// Create a resolver using the given prompt.
    pub fn new(prompt: Box<dyn CredentialPrompt>) -> Self {
        Self {
            prompt,
            cached: HashMap::new(),
        }
    }

    /// Resolve a username setting.
    ///
    /// Unset or empty usernames fall back to the login name.
    pub fn username(
        &mut self,
        setting: &Setting<Credential>,
        service: &str,
    ) -> Result<Option<String>> {
        match setting {
            Setting::Value(Credential::Value(name)) if !name.is_empty() => Ok(Some(name.clone())),
            Setting::Value(Credential::Value(_)) | Setting::Unset => Ok(self.prompt.login_name()),
            Setting::Value(Credential::Disabled) => Ok(None),
            Setting::Value(Credential::Prompt) => self.prompted(Field::Username, service).map(Some),
            Setting::Deferred(_) => Err(unresolved(Field::Username)),
        }
    }

    /// Resolve a password setting.
    pub fn password(
        &mut self,
        setting: &Setting<Credential>,
        service: &str,
    ) -> Result<Option<String>> {
        match setting {
            Setting::Value(Credential::Value(secret)) => Ok(Some(secret.clone())),
            Setting::Value(Credential::Disabled) | Setting::Unset => Ok(None),
            Setting::Value(Credential::Prompt) => self.prompted(Field::Password, service).map(Some),
            Setting::Deferred(_) => Err(unresolved(Field::Password)),
        }
    }

    /// Forget all interactively entered credentials.
    pub fn clear(&mut self) {
        self.cached.clear();
    }

    /// Check if a credential has been entered interactively.
    pub fn is_cached(&self, field: Field) -> bool {
        self.cached.contains_key(&field)
    }

    fn prompted(&mut self, field: Field, service: &str) -> Result<String> {
        if let Some(value) = self.cached.get(&field) {
            return Ok(value.clone());
        }

        let value = match field {
            Field::Password => self.prompt.password(service)?,
            _ => self.prompt.username(service)?,
        };
        self.cached.insert(field, value.clone());
        Ok(value)
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("cached", &self.cached.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unresolved(field: Field) -> DuctError {
    DuctError::configuration(format!(
        "{field} is deferred but not listed in the prepared fields"
    ))
}
