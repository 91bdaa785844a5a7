//! Pluggable strategies that turn template values into strings.
//!
//! Each [`ResolvableValue`] names the resolver that interprets it. Resolvers
//! are registered by id in a [`ResolverRegistry`]; new strategies can be
//! added without touching template loading.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use thiserror::Error;

use crate::context::ExecutionContext;

/// Id of the resolver used when a value names none.
pub const DEFAULT_RESOLVER: &str = "template";

/// Id of the verbatim resolver.
pub const LITERAL_RESOLVER: &str = "literal";

/// Id of the resolver that looks the value up as a variable name.
pub const CONTEXT_RESOLVER: &str = "context";

#[expect(clippy::expect_used, reason = "the pattern is a literal")]
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z0-9_.\-]+)\}").expect("placeholder pattern must compile")
});

/// Errors raised while resolving a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A value names a resolver that is not registered.
    #[error("unknown resolver '{id}'")]
    UnknownResolver {
        /// Requested id.
        id: String,
    },
    /// A referenced variable is absent from the context.
    #[error("variable '{name}' is not defined")]
    UndefinedVariable {
        /// Variable name.
        name: String,
    },
}

/// A template value paired with the id of the resolver that interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawValue")]
pub struct ResolvableValue {
    value: String,
    resolver: String,
}

/// Values are written either as a bare string or as `{ value, resolver }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Plain(String),
    Tagged {
        value: String,
        #[serde(default = "default_resolver")]
        resolver: String,
    },
}

fn default_resolver() -> String {
    DEFAULT_RESOLVER.to_owned()
}

impl From<RawValue> for ResolvableValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Plain(value) => Self::template(value),
            RawValue::Tagged { value, resolver } => Self::new(value, resolver),
        }
    }
}

impl ResolvableValue {
    /// Pairs a value with a resolver id.
    pub fn new(value: impl Into<String>, resolver: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            resolver: resolver.into(),
        }
    }

    /// A value interpreted by the default resolver.
    pub fn template(value: impl Into<String>) -> Self {
        Self::new(value, DEFAULT_RESOLVER)
    }

    /// Raw value text.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Resolver id.
    #[must_use]
    pub fn resolver(&self) -> &str {
        &self.resolver
    }
}

/// Strategy mapping `(value, context)` to a string.
pub trait ValueResolver: Send + Sync {
    /// Resolves `value` against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the value cannot be resolved.
    fn resolve(&self, value: &str, context: &ExecutionContext) -> Result<String, ResolveError>;
}

/// `${NAME}` substitution; `$$` produces a literal `$`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

impl ValueResolver for TemplateResolver {
    fn resolve(&self, value: &str, context: &ExecutionContext) -> Result<String, ResolveError> {
        let mut resolved = String::with_capacity(value.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(value) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            resolved.push_str(&value[last..whole.start()]);
            resolved.push_str(substitution(&captures, context)?);
            last = whole.end();
        }
        resolved.push_str(&value[last..]);
        Ok(resolved)
    }
}

fn substitution<'a>(
    captures: &Captures<'_>,
    context: &'a ExecutionContext,
) -> Result<&'a str, ResolveError> {
    let Some(name) = captures.get(1) else {
        return Ok("$");
    };
    context
        .get(name.as_str())
        .ok_or_else(|| ResolveError::UndefinedVariable {
            name: name.as_str().to_owned(),
        })
}

/// Returns the value unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralResolver;

impl ValueResolver for LiteralResolver {
    fn resolve(&self, value: &str, _context: &ExecutionContext) -> Result<String, ResolveError> {
        Ok(value.to_owned())
    }
}

/// Treats the value as the name of a context variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextResolver;

impl ValueResolver for ContextResolver {
    fn resolve(&self, value: &str, context: &ExecutionContext) -> Result<String, ResolveError> {
        let name = value.trim();
        context
            .get(name)
            .map(str::to_owned)
            .ok_or_else(|| ResolveError::UndefinedVariable {
                name: name.to_owned(),
            })
    }
}

/// Resolvers keyed by id.
#[derive(Clone)]
pub struct ResolverRegistry {
    resolvers: BTreeMap<String, Arc<dyn ValueResolver>>,
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResolverRegistry")
            .field("ids", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::empty()
            .with_resolver(DEFAULT_RESOLVER, TemplateResolver)
            .with_resolver(LITERAL_RESOLVER, LiteralResolver)
            .with_resolver(CONTEXT_RESOLVER, ContextResolver)
    }
}

impl ResolverRegistry {
    /// A registry with no resolvers at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            resolvers: BTreeMap::new(),
        }
    }

    /// Adds or replaces the resolver registered under `id`.
    #[must_use]
    pub fn with_resolver(
        mut self,
        id: impl Into<String>,
        resolver: impl ValueResolver + 'static,
    ) -> Self {
        self.resolvers.insert(id.into(), Arc::new(resolver));
        self
    }

    /// Returns `true` when `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.resolvers.contains_key(id)
    }

    /// Resolves a value with the resolver it names.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownResolver`] for unregistered ids and
    /// propagates the resolver's own failures.
    pub fn resolve(
        &self,
        value: &ResolvableValue,
        context: &ExecutionContext,
    ) -> Result<String, ResolveError> {
        let resolver =
            self.resolvers
                .get(value.resolver())
                .ok_or_else(|| ResolveError::UnknownResolver {
                    id: value.resolver().to_owned(),
                })?;
        resolver.resolve(value.value(), context)
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn context() -> ExecutionContext {
        ExecutionContext::new()
            .with("MSG", "hello world")
            .with("app.home", "/opt/app")
    }

    #[rstest]
    #[case::plain("echo", "echo")]
    #[case::single("${MSG}", "hello world")]
    #[case::embedded("--home=${app.home}/bin", "--home=/opt/app/bin")]
    #[case::escaped("$$HOME", "$HOME")]
    #[case::escaped_placeholder("$${MSG}", "${MSG}")]
    #[case::lone_dollar("cost $5", "cost $5")]
    #[case::unclosed("${MSG", "${MSG")]
    fn substitutes_placeholders(
        context: ExecutionContext,
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        let resolved = TemplateResolver.resolve(input, &context).expect("resolve");
        assert_eq!(resolved, expected);
    }

    #[rstest]
    fn undefined_variables_are_errors(context: ExecutionContext) {
        let error = TemplateResolver
            .resolve("${NOPE}", &context)
            .expect_err("undefined");
        assert_eq!(
            error,
            ResolveError::UndefinedVariable {
                name: String::from("NOPE")
            }
        );
    }

    #[rstest]
    fn registry_dispatches_by_id(context: ExecutionContext) {
        let registry = ResolverRegistry::default();
        let literal = ResolvableValue::new("${MSG}", LITERAL_RESOLVER);
        let lookup = ResolvableValue::new("MSG", CONTEXT_RESOLVER);
        assert_eq!(registry.resolve(&literal, &context).expect("literal"), "${MSG}");
        assert_eq!(registry.resolve(&lookup, &context).expect("context"), "hello world");

        let unknown = ResolvableValue::new("x", "groovy");
        assert!(matches!(
            registry.resolve(&unknown, &context),
            Err(ResolveError::UnknownResolver { .. })
        ));
    }

    struct Upper;

    impl ValueResolver for Upper {
        fn resolve(&self, value: &str, _: &ExecutionContext) -> Result<String, ResolveError> {
            Ok(value.to_uppercase())
        }
    }

    #[rstest]
    fn custom_resolvers_register_alongside_builtins(context: ExecutionContext) {
        let registry = ResolverRegistry::default().with_resolver("upper", Upper);
        let value = ResolvableValue::new("shout", "upper");
        assert!(registry.contains(DEFAULT_RESOLVER));
        assert_eq!(registry.resolve(&value, &context).expect("upper"), "SHOUT");
    }

    #[test]
    fn values_deserialize_from_strings_and_tables() {
        #[derive(Deserialize)]
        struct Doc {
            plain: ResolvableValue,
            tagged: ResolvableValue,
        }
        let doc: Doc = toml::from_str(
            "plain = \"${A}\"\ntagged = { value = \"B\", resolver = \"context\" }\n",
        )
        .expect("parse");
        assert_eq!(doc.plain, ResolvableValue::template("${A}"));
        assert_eq!(doc.tagged, ResolvableValue::new("B", CONTEXT_RESOLVER));
    }
}
