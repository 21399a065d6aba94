//! Environment variables for task execution.
//!
//! A task's environment is declared as a list of bindings plus a list of env
//! files, and resolved once per run after inputs are collected. Sources merge
//! in this order, later ones winning:
//!
//! 1. env files (`KEY=VALUE` lines, loaded with `dotenvy`)
//! 2. declared binding defaults, with `{{input.<name>}}` placeholders rendered
//! 3. invocation overrides, for keys the task already declares
//!
//! The parent process environment is inherited by the child underneath all of
//! these.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use super::input::{InputDeclaration, InputValues, normalize_name};
use super::types::TaskId;

/// Errors raised while resolving a task environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A placeholder names an input the task does not declare.
    #[error("task '{task}' references undeclared input '{placeholder}'")]
    UnresolvedReference { task: TaskId, placeholder: String },

    /// An env file could not be read or parsed.
    #[error("failed to load env file '{path}': {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Environment variables passed to a task's child process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an environment variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Add an environment variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Get an environment variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Check if a variable exists.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Check if the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Get the number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Merge another environment into this one.
    /// Variables from `other` override existing variables.
    pub fn merge(&mut self, other: &Environment) {
        for (k, v) in &other.vars {
            self.vars.insert(k.clone(), v.clone());
        }
    }

    /// Iterate over the environment variables in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Environment {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// A declared environment variable with a (possibly templated) default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    pub name: String,
    pub default: String,
}

impl EnvBinding {
    pub fn new(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
        }
    }
}

/// Everything a task declares about its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSpec {
    bindings: Vec<EnvBinding>,
    files: Vec<PathBuf>,
}

impl EnvSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: declare a binding.
    pub fn binding(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.bindings.push(EnvBinding::new(name, default));
        self
    }

    /// Builder: add an env file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn push_binding(&mut self, binding: EnvBinding) {
        self.bindings.push(binding);
    }

    pub fn push_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn bindings(&self) -> &[EnvBinding] {
        &self.bindings
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.files.is_empty()
    }

    /// Check every binding default for unresolvable placeholders without
    /// touching the filesystem.
    pub fn check_references(
        &self,
        task: &TaskId,
        declared: &[InputDeclaration],
    ) -> Result<(), EnvError> {
        for binding in &self.bindings {
            check_template(&binding.default, task, declared)?;
        }
        Ok(())
    }

    /// Resolve the final environment for one invocation.
    pub fn resolve(
        &self,
        task: &TaskId,
        declared: &[InputDeclaration],
        inputs: &InputValues,
        overrides: &HashMap<String, String>,
    ) -> Result<Environment, EnvError> {
        let mut env = Environment::new();

        for path in &self.files {
            env.merge(&load_env_file(path)?);
        }

        for binding in &self.bindings {
            let value = render_template(&binding.default, task, declared, inputs)?;
            env.set(binding.name.clone(), value);
        }

        for (key, value) in overrides {
            if env.contains(key) {
                env.set(key.clone(), value.clone());
            }
        }

        Ok(env)
    }
}

/// Check that every placeholder in `template` names a declared input.
pub fn check_template(
    template: &str,
    task: &TaskId,
    declared: &[InputDeclaration],
) -> Result<(), EnvError> {
    for placeholder in placeholders(template) {
        input_reference(task, declared, &placeholder)?;
    }
    Ok(())
}

/// Load a dotenv-style file.
pub fn load_env_file(path: &Path) -> Result<Environment, EnvError> {
    let to_err = |source| EnvError::EnvFile {
        path: path.to_path_buf(),
        source,
    };
    let mut env = Environment::new();
    for item in dotenvy::from_path_iter(path).map_err(to_err)? {
        let (key, value) = item.map_err(to_err)?;
        env.set(key, value);
    }
    Ok(env)
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid placeholder regex"))
}

fn placeholders(template: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Map a placeholder expression to the name of a declared input.
fn input_reference<'a>(
    task: &TaskId,
    declared: &'a [InputDeclaration],
    expression: &str,
) -> Result<&'a InputDeclaration, EnvError> {
    let unresolved = || EnvError::UnresolvedReference {
        task: task.clone(),
        placeholder: expression.to_string(),
    };
    let name = expression.strip_prefix("input.").ok_or_else(unresolved)?;
    declared
        .iter()
        .find(|decl| normalize_name(decl.name()) == normalize_name(name))
        .ok_or_else(unresolved)
}

/// Substitute `{{input.<name>}}` placeholders with collected input values.
///
/// Only inputs declared by `task` may be referenced, even when another task in
/// the same run collected a value under that name.
pub fn render_template(
    template: &str,
    task: &TaskId,
    declared: &[InputDeclaration],
    inputs: &InputValues,
) -> Result<String, EnvError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_regex().captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let expression = &caps[1];
        let decl = input_reference(task, declared, expression)?;
        let value = inputs
            .get(decl.name())
            .ok_or_else(|| EnvError::UnresolvedReference {
                task: task.clone(),
                placeholder: expression.to_string(),
            })?;

        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);

    Ok(rendered)
}
