//! Named process templates loaded from TOML.
//!
//! ```toml
//! [[process]]
//! name = "echo"
//! command = { linux = "echo", windows = "cmd /c echo" }
//!
//! [[process.parameter]]
//! name = ""
//! value = "${MSG}"
//! if_defined = "MSG"
//! ```
//!
//! Templates are validated once at load: names are unique, kinds are
//! registered, resolver ids exist and the running OS family has a command
//! line. The command line is split with shell quoting rules before any
//! variable is substituted.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use strum::Display;
use thiserror::Error;
use tracing::debug;

use crate::action::{ActionError, ActionKinds, LaunchSpec, OS_COMMAND_KIND};
use crate::context::ExecutionContext;
use crate::resolver::{ResolvableValue, ResolveError, ResolverRegistry};

const TEMPLATE_TARGET: &str = "procd_exec::template";

/// Operating system family used to pick a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OsFamily {
    /// Linux and every other Unix-like system.
    Linux,
    /// Solaris and illumos.
    Solaris,
    /// Windows.
    Windows,
}

impl OsFamily {
    /// Family of the running host.
    #[must_use]
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Maps an OS name as reported by `std::env::consts::OS`.
    #[must_use]
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "windows" => Self::Windows,
            "solaris" | "illumos" => Self::Solaris,
            _ => Self::Linux,
        }
    }
}

/// Errors raised while loading templates or building a launch from one.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("failed to read process templates from {path}: {source}")]
    Read {
        /// File path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The document is not valid TOML for this schema.
    #[error("invalid process template document: {0}")]
    Parse(#[from] toml::de::Error),
    /// A template has an empty name.
    #[error("process template #{index} has an empty name")]
    EmptyName {
        /// Zero-based position in the document.
        index: usize,
    },
    /// Two templates share a name.
    #[error("process template '{name}' is defined more than once")]
    DuplicateName {
        /// Template name.
        name: String,
    },
    /// A template names an unregistered process kind.
    #[error("process template '{name}' uses unknown kind '{kind}'")]
    UnknownKind {
        /// Template name.
        name: String,
        /// Requested kind.
        kind: String,
    },
    /// A value names an unregistered resolver.
    #[error("process template '{name}' uses unknown resolver '{resolver}'")]
    UnknownResolver {
        /// Template name.
        name: String,
        /// Requested resolver id.
        resolver: String,
    },
    /// No command line exists for the running OS family.
    #[error("process template '{name}' has no command line for {os}")]
    MissingCommand {
        /// Template name.
        name: String,
        /// Running OS family.
        os: OsFamily,
    },
    /// The command line has unbalanced quotes.
    #[error("process template '{name}' has an unparsable command line: {source}")]
    CommandSyntax {
        /// Template name.
        name: String,
        /// Tokeniser failure.
        #[source]
        source: shell_words::ParseError,
    },
    /// A value could not be resolved against the context.
    #[error("failed to resolve process template '{name}': {source}")]
    Resolve {
        /// Template name.
        name: String,
        /// Resolver failure.
        #[source]
        source: ResolveError,
    },
    /// The resolved command line is not launchable.
    #[error(transparent)]
    Launch(#[from] ActionError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateDocument {
    #[serde(default)]
    process: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateEntry {
    name: String,
    #[serde(default = "default_kind")]
    kind: String,
    command: CommandLines,
    #[serde(default, rename = "parameter")]
    parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    environment: BTreeMap<String, ResolvableValue>,
    directory: Option<ResolvableValue>,
}

fn default_kind() -> String {
    OS_COMMAND_KIND.to_owned()
}

/// Per-OS command lines of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandLines {
    linux: Option<String>,
    solaris: Option<String>,
    windows: Option<String>,
    default: Option<String>,
}

impl CommandLines {
    /// Command line for `os`, falling back to `default`.
    #[must_use]
    pub fn select(&self, os: OsFamily) -> Option<&str> {
        let specific = match os {
            OsFamily::Linux => self.linux.as_deref(),
            OsFamily::Solaris => self.solaris.as_deref(),
            OsFamily::Windows => self.windows.as_deref(),
        };
        specific.or(self.default.as_deref())
    }
}

/// One parameter of a template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterDefinition {
    #[serde(default)]
    name: String,
    #[serde(default = "empty_value")]
    value: ResolvableValue,
    #[serde(default)]
    resolver: Option<String>,
    #[serde(default)]
    if_defined: Option<String>,
    #[serde(default)]
    separator: Option<String>,
    #[serde(default)]
    begin_group: bool,
    #[serde(default)]
    end_group: bool,
}

impl ParameterDefinition {
    /// Parameter name; empty names emit only the value.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable guarding the parameter.
    #[must_use]
    pub fn if_defined(&self) -> Option<&str> {
        self.if_defined.as_deref()
    }

    /// Value together with the resolver that interprets it.
    #[must_use]
    pub fn value(&self) -> ResolvableValue {
        match &self.resolver {
            Some(resolver) => ResolvableValue::new(self.value.value(), resolver.as_str()),
            None => self.value.clone(),
        }
    }

    fn is_skipped(&self, context: &ExecutionContext) -> bool {
        self.if_defined
            .as_deref()
            .is_some_and(|variable| !context.contains(variable))
    }

    fn tokens(&self, value: String) -> Vec<String> {
        if self.name.is_empty() {
            return if value.is_empty() { Vec::new() } else { vec![value] };
        }
        match &self.separator {
            Some(separator) => vec![format!("{}{separator}{value}", self.name)],
            None if value.is_empty() => vec![self.name.clone()],
            None => vec![self.name.clone(), value],
        }
    }
}

fn empty_value() -> ResolvableValue {
    ResolvableValue::template("")
}

/// A validated template ready to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTemplate {
    name: String,
    kind: String,
    command: Vec<String>,
    parameters: Vec<ParameterDefinition>,
    environment: BTreeMap<String, ResolvableValue>,
    directory: Option<ResolvableValue>,
}

impl ProcessTemplate {
    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process kind key.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Command tokens for the running OS before resolution.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    /// Resolves the template into an argv list.
    ///
    /// Guarded parameters whose variable is absent are skipped. Tokens from a
    /// `begin_group` parameter through the next `end_group` parameter are
    /// joined with single spaces into one argument.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Resolve`] when a value cannot be resolved.
    pub fn argv(
        &self,
        context: &ExecutionContext,
        resolvers: &ResolverRegistry,
    ) -> Result<Vec<String>, TemplateError> {
        let resolve = |value: &ResolvableValue| {
            resolvers
                .resolve(value, context)
                .map_err(|source| TemplateError::Resolve {
                    name: self.name.clone(),
                    source,
                })
        };

        let mut argv = Vec::with_capacity(self.command.len() + self.parameters.len());
        for token in &self.command {
            argv.push(resolve(&ResolvableValue::template(token.as_str()))?);
        }

        let mut group: Option<Vec<String>> = None;
        for parameter in &self.parameters {
            if parameter.begin_group && group.is_none() {
                group = Some(Vec::new());
            }
            if !parameter.is_skipped(context) {
                let tokens = parameter.tokens(resolve(&parameter.value())?);
                match group.as_mut() {
                    Some(members) => members.extend(tokens),
                    None => argv.extend(tokens),
                }
            }
            if parameter.end_group {
                close_group(&mut argv, group.take());
            }
        }
        close_group(&mut argv, group.take());
        Ok(argv)
    }

    /// Resolves the template into a launch.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Resolve`] for unresolvable values and
    /// [`TemplateError::Launch`] when the command line resolves to nothing.
    pub fn launch(
        &self,
        context: &ExecutionContext,
        resolvers: &ResolverRegistry,
    ) -> Result<LaunchSpec, TemplateError> {
        let argv = self.argv(context, resolvers)?;
        let mut launch = LaunchSpec::new(self.name.as_str(), argv)?;

        let resolve = |value: &ResolvableValue| {
            resolvers
                .resolve(value, context)
                .map_err(|source| TemplateError::Resolve {
                    name: self.name.clone(),
                    source,
                })
        };
        if !self.environment.is_empty() {
            let mut environment = BTreeMap::new();
            for (variable, value) in &self.environment {
                environment.insert(variable.clone(), resolve(value)?);
            }
            launch = launch.with_environment(environment);
        }
        if let Some(directory) = &self.directory {
            launch = launch.with_directory(resolve(directory)?);
        }
        Ok(launch)
    }

    fn resolver_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.parameters
            .iter()
            .map(|parameter| parameter.value().resolver().to_owned())
            .chain(
                self.environment
                    .values()
                    .chain(self.directory.iter())
                    .map(|value| value.resolver().to_owned()),
            )
    }
}

fn close_group(argv: &mut Vec<String>, group: Option<Vec<String>>) {
    if let Some(members) = group.filter(|members| !members.is_empty()) {
        argv.push(members.join(" "));
    }
}

/// Templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, ProcessTemplate>,
}

impl TemplateRegistry {
    /// Reads and validates templates from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Read`] when the file cannot be read and any
    /// validation error from [`Self::from_toml_str`].
    pub fn load(
        path: &Utf8Path,
        kinds: &ActionKinds,
        resolvers: &ResolverRegistry,
    ) -> Result<Self, TemplateError> {
        let text = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_toml_str(&text, kinds, resolvers)?;
        debug!(
            target: TEMPLATE_TARGET,
            path = %path,
            templates = registry.len(),
            "loaded process templates"
        );
        Ok(registry)
    }

    /// Parses templates for the running OS family.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] for malformed documents and for any
    /// template that fails validation.
    pub fn from_toml_str(
        text: &str,
        kinds: &ActionKinds,
        resolvers: &ResolverRegistry,
    ) -> Result<Self, TemplateError> {
        Self::from_toml_str_for(text, OsFamily::current(), kinds, resolvers)
    }

    /// Parses templates for an explicit OS family.
    ///
    /// # Errors
    ///
    /// As for [`Self::from_toml_str`].
    pub fn from_toml_str_for(
        text: &str,
        os: OsFamily,
        kinds: &ActionKinds,
        resolvers: &ResolverRegistry,
    ) -> Result<Self, TemplateError> {
        let document: TemplateDocument = toml::from_str(text)?;
        let mut templates = HashMap::with_capacity(document.process.len());
        for (index, entry) in document.process.into_iter().enumerate() {
            let template = validate(index, entry, os, kinds, resolvers)?;
            if templates.contains_key(template.name()) {
                return Err(TemplateError::DuplicateName {
                    name: template.name,
                });
            }
            templates.insert(template.name.clone(), template);
        }
        Ok(Self { templates })
    }

    /// Looks up a template.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProcessTemplate> {
        self.templates.get(name)
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` when no template is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Template names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn validate(
    index: usize,
    entry: TemplateEntry,
    os: OsFamily,
    kinds: &ActionKinds,
    resolvers: &ResolverRegistry,
) -> Result<ProcessTemplate, TemplateError> {
    let name = entry.name.trim().to_owned();
    if name.is_empty() {
        return Err(TemplateError::EmptyName { index });
    }
    if !kinds.contains(&entry.kind) {
        return Err(TemplateError::UnknownKind {
            name,
            kind: entry.kind,
        });
    }
    let Some(line) = entry.command.select(os) else {
        return Err(TemplateError::MissingCommand { name, os });
    };
    let command = match shell_words::split(line) {
        Ok(tokens) if tokens.is_empty() => {
            return Err(TemplateError::MissingCommand { name, os });
        }
        Ok(tokens) => tokens,
        Err(source) => return Err(TemplateError::CommandSyntax { name, source }),
    };

    let template = ProcessTemplate {
        name,
        kind: entry.kind,
        command,
        parameters: entry.parameters,
        environment: entry.environment,
        directory: entry.directory,
    };
    let unknown = template.resolver_ids().find(|id| !resolvers.contains(id));
    if let Some(resolver) = unknown {
        return Err(TemplateError::UnknownResolver {
            name: template.name,
            resolver,
        });
    }
    Ok(template)
}

#[cfg(test)]
mod tests;
