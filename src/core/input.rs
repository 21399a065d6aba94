//! Invocation-time inputs.
//!
//! Tasks declare named inputs (a message count, a message body, a key picked
//! from a fixed set). Before anything runs, the registry collects one value per
//! declared input from, in order of precedence:
//!
//! 1. an explicit override given at invocation (`-i name=value` or `-i k=value`)
//! 2. an interactive answer from a [`Prompter`]
//! 3. the declared default
//!
//! Collected values land in an [`InputValues`] map that environment templates
//! are rendered against.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while collecting inputs.
#[derive(Debug, Error)]
pub enum InputError {
    /// A choice input received a value outside its allowed set.
    #[error("invalid choice '{value}' for input '{input}', expected one of: {}", .choices.join(", "))]
    InvalidChoice {
        input: String,
        value: String,
        choices: Vec<String>,
    },

    /// An integer input received something that does not parse.
    #[error("input '{input}' expects an integer, got '{value}'")]
    InvalidInteger { input: String, value: String },

    /// An override names no declared input.
    #[error("unknown input: {0}")]
    UnknownInput(String),

    /// Several overrides name the same input with different values.
    #[error("conflicting values for input '{input}' from: {}", .keys.join(", "))]
    ConflictingOverrides { input: String, keys: Vec<String> },

    /// Reading an interactive answer failed.
    #[error("failed to read input: {0}")]
    Prompt(#[from] io::Error),
}

/// The value type of an input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Free-form text.
    #[default]
    Str,
    /// A signed integer.
    Int,
    /// One value out of a fixed set.
    Choice(Vec<String>),
}

/// A named input a task accepts at invocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeclaration {
    name: String,
    shortcut: Option<String>,
    prompt: String,
    default: String,
    kind: InputKind,
}

impl InputDeclaration {
    fn new(name: impl Into<String>, kind: InputKind) -> Self {
        let name = name.into();
        Self {
            prompt: name.clone(),
            name,
            shortcut: None,
            default: String::new(),
            kind,
        }
    }

    /// Declare a free-form text input.
    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, InputKind::Str)
    }

    /// Declare an integer input. The default is `0` until overridden.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, InputKind::Int).with_default("0")
    }

    /// Declare a choice input. The default is the first choice until overridden.
    pub fn choice<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        let default = choices.first().cloned().unwrap_or_default();
        Self::new(name, InputKind::Choice(choices)).with_default(default)
    }

    /// Builder: set a short alias usable in overrides.
    pub fn shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }

    /// Builder: set the prompt shown to the operator.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Builder: set the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shortcut_key(&self) -> Option<&str> {
        self.shortcut.as_deref()
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt
    }

    pub fn default_value(&self) -> &str {
        &self.default
    }

    pub fn kind(&self) -> &InputKind {
        &self.kind
    }

    /// Whether an override key addresses this input.
    pub fn matches_key(&self, key: &str) -> bool {
        let key = normalize_name(key);
        normalize_name(&self.name) == key
            || self
                .shortcut
                .as_deref()
                .is_some_and(|s| normalize_name(s) == key)
    }

    /// Check a raw value against the input kind and return its canonical form.
    pub fn validate(&self, raw: &str) -> Result<String, InputError> {
        match &self.kind {
            InputKind::Str => Ok(raw.to_string()),
            InputKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| InputError::InvalidInteger {
                    input: self.name.clone(),
                    value: raw.to_string(),
                }),
            InputKind::Choice(choices) => {
                if choices.iter().any(|c| c == raw) {
                    Ok(raw.to_string())
                } else {
                    Err(InputError::InvalidChoice {
                        input: self.name.clone(),
                        value: raw.to_string(),
                        choices: choices.clone(),
                    })
                }
            }
        }
    }
}

/// Input names treat `-` and `_` as the same character, so `message-key` can
/// be referenced as `{{input.message_key}}`.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('-', "_")
}

/// Resolved input values for one run, keyed by normalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputValues {
    values: HashMap<String, String>,
}

impl InputValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value. The name is normalized.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(normalize_name(name), value.into());
    }

    /// Builder: set a value.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up a value by name, in either spelling.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&normalize_name(name)).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Source of interactive answers.
pub trait Prompter: Send + Sync {
    /// Ask for a value. `None` keeps the declared default.
    fn ask(&self, input: &InputDeclaration) -> Result<Option<String>, InputError>;
}

/// Never prompts; every input without an override takes its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&self, _input: &InputDeclaration) -> Result<Option<String>, InputError> {
        Ok(None)
    }
}

/// Prompts on stderr and reads one line per input from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&self, input: &InputDeclaration) -> Result<Option<String>, InputError> {
        let mut stderr = io::stderr().lock();
        match input.kind() {
            InputKind::Choice(choices) => write!(
                stderr,
                "{} ({}) [{}]: ",
                input.prompt_text(),
                choices.join("/"),
                input.default_value()
            )?,
            _ => write!(stderr, "{} [{}]: ", input.prompt_text(), input.default_value())?,
        }
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let answer = line.trim();
        if answer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(answer.to_string()))
        }
    }
}

/// Collect one value per distinct input.
///
/// Declarations sharing a normalized name are collected once, using the first
/// one seen. Overrides are matched by name or shortcut; an override that
/// matches nothing is an error, and so are two overrides giving one input
/// different values.
pub fn collect_inputs<'a, I>(
    declarations: I,
    overrides: &HashMap<String, String>,
    prompter: &dyn Prompter,
) -> Result<InputValues, InputError>
where
    I: IntoIterator<Item = &'a InputDeclaration>,
{
    let mut unique: Vec<&InputDeclaration> = Vec::new();
    for decl in declarations {
        if !unique
            .iter()
            .any(|seen| normalize_name(seen.name()) == normalize_name(decl.name()))
        {
            unique.push(decl);
        }
    }

    for key in overrides.keys() {
        if !unique.iter().any(|decl| decl.matches_key(key)) {
            return Err(InputError::UnknownInput(key.clone()));
        }
    }

    let mut values = InputValues::new();
    for decl in unique {
        let mut matching: Vec<(&String, &String)> = overrides
            .iter()
            .filter(|(key, _)| decl.matches_key(key))
            .collect();
        matching.sort();
        if matching.windows(2).any(|pair| pair[0].1 != pair[1].1) {
            return Err(InputError::ConflictingOverrides {
                input: decl.name().to_string(),
                keys: matching.into_iter().map(|(key, _)| key.clone()).collect(),
            });
        }
        let supplied = matching.first().map(|(_, value)| (*value).clone());
        let raw = match supplied {
            Some(value) => value,
            None => prompter
                .ask(decl)?
                .unwrap_or_else(|| decl.default_value().to_string()),
        };
        let value = decl.validate(&raw)?;
        values.set(decl.name(), value);
    }

    Ok(values)
}
