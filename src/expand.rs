use crate::error::{ExpandError, Result};
use crate::resolver::{EnvResolver, Resolver};
use crate::source::read_template;
use std::borrow::Cow;
use std::path::Path;

/// Starts a placeholder when immediately followed by [`GROUP_OPEN`]
pub const BEGIN_MARKER: u8 = b'$';
pub const GROUP_OPEN: u8 = b'{';
/// Closes a placeholder; the first one after `${` wins, there is no escaping
pub const END_MARKER: u8 = b'}';
/// Separates the variable name from its default value
pub const DEFAULT_SEPARATOR: u8 = b':';

/// What to do with a lone `$` or an unclosed `${`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Copy the marker (or the unclosed tail) to the output unchanged
    #[default]
    Literal,
    /// Fail with `ExpandError::MalformedPlaceholder`
    Reject,
}

/// Configuration for expansion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandConfig {
    /// Handling of markers that do not form a placeholder
    pub on_malformed: MalformedPolicy,
}

/// A `${NAME}` or `${NAME:default}` placeholder borrowed from the scanned content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// The full match including `${` and `}`
    pub full_match: &'a [u8],
    /// Everything before the first separator
    pub name: &'a [u8],
    /// Everything after the first separator, `Some(b"")` for `${NAME:}`
    pub default: Option<&'a [u8]>,
    /// Starting position in the content
    pub start: usize,
    /// Ending position in the content (exclusive)
    pub end: usize,
}

impl<'a> Placeholder<'a> {
    /// Variable name for display; invalid UTF-8 is replaced
    #[must_use]
    pub fn name_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name)
    }

    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// `$` not followed by `{`
    LoneMarker,
    /// `${` with no `}` before the end of content
    Unclosed,
}

impl MalformedKind {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::LoneMarker => "'$' is not followed by '{'",
            Self::Unclosed => "placeholder is not closed by '}'",
        }
    }
}

/// One piece of scanned content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A run of bytes without any marker
    Literal(&'a [u8]),
    Placeholder(Placeholder<'a>),
    /// Marker bytes that do not form a placeholder, `raw` is what they span
    Malformed {
        kind: MalformedKind,
        raw: &'a [u8],
        start: usize,
    },
}

/// Single left-to-right pass over content, yielding [`Segment`]s.
///
/// Literal bytes are yielded as whole runs up to the next `$`. Placeholders
/// do not nest; a `${` inside a body is part of the body.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    content: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[must_use]
    pub const fn new(content: &'a [u8]) -> Self {
        Self { content, pos: 0 }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.content.get(self.pos..).filter(|rest| !rest.is_empty())?;
        let start = self.pos;

        let Some(offset) = rest.iter().position(|&b| b == BEGIN_MARKER) else {
            self.pos = self.content.len();
            return Some(Segment::Literal(rest));
        };
        if offset > 0 {
            self.pos += offset;
            return Some(Segment::Literal(&rest[..offset]));
        }

        if rest.get(1) != Some(&GROUP_OPEN) {
            self.pos += 1;
            return Some(Segment::Malformed {
                kind: MalformedKind::LoneMarker,
                raw: &rest[..1],
                start,
            });
        }

        let Some(body_len) = rest[2..].iter().position(|&b| b == END_MARKER) else {
            self.pos = self.content.len();
            return Some(Segment::Malformed {
                kind: MalformedKind::Unclosed,
                raw: rest,
                start,
            });
        };

        // "${" + body + "}"
        let len = body_len + 3;
        let body = &rest[2..2 + body_len];
        let (name, default) = match body.iter().position(|&b| b == DEFAULT_SEPARATOR) {
            Some(sep) => (&body[..sep], Some(&body[sep + 1..])),
            None => (body, None),
        };
        self.pos += len;

        Some(Segment::Placeholder(Placeholder {
            full_match: &rest[..len],
            name,
            default,
            start,
            end: start + len,
        }))
    }
}

/// Outcome of looking up a single placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The variable is set to a non-empty value
    Value(String),
    /// The variable is unset or empty, the placeholder's default applies
    Default(&'a [u8]),
    /// The variable is unset or empty and there is no default
    Unresolved,
}

/// Finds all well-formed placeholders in the given content, in order.
/// Malformed markers are skipped.
#[must_use]
pub fn find_placeholders(content: &[u8]) -> Vec<Placeholder<'_>> {
    Scanner::new(content)
        .filter_map(|segment| match segment {
            Segment::Placeholder(placeholder) => Some(placeholder),
            _ => None,
        })
        .collect()
}

/// Expands placeholders against a [`Resolver`], the process environment by default
#[derive(Debug, Clone, Default)]
pub struct Expander<R = EnvResolver> {
    resolver: R,
    config: ExpandConfig,
}

impl Expander {
    /// Expander over the process environment with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Resolver> Expander<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            config: ExpandConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExpandConfig) -> Self {
        self.config = config;
        self
    }

    pub const fn config(&self) -> &ExpandConfig {
        &self.config
    }

    pub const fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Expands every placeholder in `content`.
    ///
    /// An absent content is an error, an empty one expands to an empty buffer.
    ///
    /// # Errors
    ///
    /// - `ExpandError::InvalidInput` if `content` is `None`.
    /// - Errors from [`Expander::expand_bytes`].
    pub fn expand(&self, content: Option<&[u8]>) -> Result<Vec<u8>> {
        let content = content.ok_or(ExpandError::InvalidInput)?;
        self.expand_bytes(content)
    }

    /// Expands every placeholder in `content`, all or nothing.
    ///
    /// # Errors
    ///
    /// - `ExpandError::UnresolvedVariable` for the first placeholder whose variable
    ///   is unset or empty and has no default.
    /// - `ExpandError::MalformedPlaceholder` for a lone `$` or unclosed `${` when
    ///   the configuration rejects them.
    pub fn expand_bytes(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(content.len());

        for segment in Scanner::new(content) {
            match segment {
                Segment::Literal(bytes) => output.extend_from_slice(bytes),
                Segment::Placeholder(placeholder) => {
                    output.extend_from_slice(&self.resolve(&placeholder)?);
                }
                Segment::Malformed { kind, raw, start } => match self.config.on_malformed {
                    MalformedPolicy::Literal => output.extend_from_slice(raw),
                    MalformedPolicy::Reject => {
                        return Err(ExpandError::MalformedPlaceholder {
                            position: start,
                            message: kind.message().to_string(),
                        });
                    }
                },
            }
        }

        Ok(output)
    }

    /// Text variant of [`Expander::expand_bytes`]
    ///
    /// # Errors
    ///
    /// Same as [`Expander::expand_bytes`].
    pub fn expand_str(&self, content: &str) -> Result<String> {
        Ok(String::from_utf8(self.expand_bytes(content.as_bytes())?)?)
    }

    /// Reads a template from a file (`-` for stdin) and expands it
    ///
    /// # Errors
    ///
    /// - `ExpandError::FileNotFound` if the template file doesn't exist.
    /// - Other errors from `read_template` or `expand_bytes`.
    pub fn expand_file(&self, path: &Path) -> Result<Vec<u8>> {
        let content = read_template(path)?;
        self.expand_bytes(&content)
    }

    /// Looks up a placeholder's variable and decides between value and default.
    ///
    /// A variable set to the empty string counts as unset. Names that are not
    /// valid UTF-8 are never looked up.
    pub fn resolution<'a>(&self, placeholder: &Placeholder<'a>) -> Resolution<'a> {
        let value = std::str::from_utf8(placeholder.name)
            .ok()
            .and_then(|name| self.resolver.lookup(name));

        match (value, placeholder.default) {
            (Some(value), _) if !value.is_empty() => Resolution::Value(value),
            (_, Some(default)) => Resolution::Default(default),
            _ => Resolution::Unresolved,
        }
    }

    /// Resolves a single placeholder to the bytes that replace it
    ///
    /// # Errors
    ///
    /// Returns `ExpandError::UnresolvedVariable` if there is neither a value nor a default.
    pub fn resolve<'a>(&self, placeholder: &Placeholder<'a>) -> Result<Cow<'a, [u8]>> {
        match self.resolution(placeholder) {
            Resolution::Value(value) => Ok(Cow::Owned(value.into_bytes())),
            Resolution::Default(default) => Ok(Cow::Borrowed(default)),
            Resolution::Unresolved => Err(ExpandError::UnresolvedVariable {
                name: placeholder.name_lossy().into_owned(),
            }),
        }
    }
}

/// Expands `content` against the process environment
///
/// # Errors
///
/// See [`Expander::expand`].
pub fn expand(content: Option<&[u8]>) -> Result<Vec<u8>> {
    Expander::new().expand(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MapResolver;
    use std::fs;
    use tempfile::TempDir;

    const DSN: &str = "postgresql://localhost/app?user=dbuser&password=dbuser";

    fn create_expander(vars: &[(&str, &str)]) -> Expander<MapResolver> {
        Expander::with_resolver(vars.iter().copied().collect())
    }

    fn expand_to_string(expander: &Expander<MapResolver>, content: &str) -> Result<String> {
        expander.expand_str(content)
    }

    #[test]
    fn test_scanner_segments() {
        let segments: Vec<_> = Scanner::new(b"a: ${A}\nb: ${B:x}").collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::Literal(b"a: "));
        assert!(matches!(&segments[1], Segment::Placeholder(p) if p.name == b"A" && p.default.is_none()));
        assert_eq!(segments[2], Segment::Literal(b"\nb: "));
        assert!(
            matches!(&segments[3], Segment::Placeholder(p) if p.name == b"B" && p.default == Some(&b"x"[..]))
        );
    }

    #[test]
    fn test_scanner_malformed() {
        let segments: Vec<_> = Scanner::new(b"cost $5 ${OPEN").collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::Literal(b"cost "));
        assert!(matches!(
            segments[1],
            Segment::Malformed {
                kind: MalformedKind::LoneMarker,
                start: 5,
                ..
            }
        ));
        assert_eq!(segments[2], Segment::Literal(b"5 "));
        assert_eq!(
            segments[3],
            Segment::Malformed {
                kind: MalformedKind::Unclosed,
                raw: b"${OPEN",
                start: 8,
            }
        );
    }

    #[test]
    fn test_find_placeholders_positions() {
        let content = b"port: ${APP_PORT:8080}\nhost: ${APP_HOST}";
        let placeholders = find_placeholders(content);
        assert_eq!(placeholders.len(), 2);

        assert_eq!(placeholders[0].name, b"APP_PORT");
        assert_eq!(placeholders[0].default, Some(&b"8080"[..]));
        assert_eq!(placeholders[0].full_match, b"${APP_PORT:8080}");
        assert_eq!(&content[placeholders[0].start..placeholders[0].end], b"${APP_PORT:8080}");

        assert_eq!(placeholders[1].name, b"APP_HOST");
        assert!(!placeholders[1].has_default());
        assert_eq!(placeholders[1].end, content.len());
    }

    #[test]
    fn test_find_placeholders_empty_and_malformed() {
        assert!(find_placeholders(b"").is_empty());
        assert!(find_placeholders(b"No placeholders here").is_empty());
        assert!(find_placeholders(b"$HOME ${UNCLOSED").is_empty());

        // a "${" inside a body does not nest
        let placeholders = find_placeholders(b"${A${B}}");
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].name, b"A${B");
    }

    #[test]
    fn test_default_split_on_first_separator() {
        let placeholders = find_placeholders(b"${DSN:postgresql://localhost:5432/app}");
        assert_eq!(placeholders[0].name, b"DSN");
        assert_eq!(
            placeholders[0].default,
            Some(&b"postgresql://localhost:5432/app"[..])
        );

        let expander = create_expander(&[]);
        let result =
            expand_to_string(&expander, "${DSN:postgresql://localhost:5432/app}").unwrap();
        assert_eq!(result, "postgresql://localhost:5432/app");
    }

    #[test]
    fn test_expand_without_placeholders() {
        let expander = create_expander(&[]);
        let result = expander.expand(Some(b"simple content")).unwrap();
        assert_eq!(result, b"simple content");
    }

    #[test]
    fn test_expand_absent_content() {
        let expander = create_expander(&[("CACHE_CONTROL", "no-store")]);
        let result = expander.expand(None);
        assert!(matches!(result, Err(ExpandError::InvalidInput)));
    }

    #[test]
    fn test_expand_empty_content() {
        let expander = create_expander(&[]);
        let result = expander.expand(Some(b"")).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_env_value_wins_over_default() {
        let expander = create_expander(&[("CACHE_CONTROL", "no-store")]);
        let result = expand_to_string(&expander, "${CACHE_CONTROL:no-cache}").unwrap();
        assert_eq!(result, "no-store");
    }

    #[test]
    fn test_default_used_when_unset() {
        let expander = create_expander(&[]);
        let result = expand_to_string(&expander, "${CACHE_CONTROL:no-cache}").unwrap();
        assert_eq!(result, "no-cache");
    }

    #[test]
    fn test_value_without_default() {
        let expander = create_expander(&[("CACHE_CONTROL", "no-store")]);
        let result = expand_to_string(&expander, "${CACHE_CONTROL}").unwrap();
        assert_eq!(result, "no-store");
    }

    #[test]
    fn test_unresolved_variable() {
        let expander = create_expander(&[]);
        let result = expander.expand(Some(b"${CACHE_CONTROL}"));
        match result {
            Err(ExpandError::UnresolvedVariable { name }) => assert_eq!(name, "CACHE_CONTROL"),
            other => panic!("expected UnresolvedVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_default() {
        let expander = create_expander(&[]);
        let result = expander.expand(Some(b"${CACHE_CONTROL:}")).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_value_counts_as_unset() {
        let expander = create_expander(&[("CACHE_CONTROL", "")]);

        let result = expand_to_string(&expander, "${CACHE_CONTROL:no-cache}").unwrap();
        assert_eq!(result, "no-cache");

        let result = expand_to_string(&expander, "${CACHE_CONTROL}");
        assert!(matches!(
            result,
            Err(ExpandError::UnresolvedVariable { .. })
        ));
    }

    #[test]
    fn test_long_value_keeps_trailing_text() {
        let expander = create_expander(&[("APP_DSN", DSN)]);

        let result = expand_to_string(&expander, "${APP_DSN}").unwrap();
        assert_eq!(result, DSN);

        let result = expand_to_string(&expander, "dsn: ${APP_DSN} # primary\nend").unwrap();
        assert_eq!(result, format!("dsn: {DSN} # primary\nend"));
    }

    #[test]
    fn test_multiple_placeholders_in_config() {
        let expander = create_expander(&[("APP_DSN", DSN), ("APP_PORT", "8080")]);
        let template = "application:\n  name: \"products\"\n\ndatasource:\n  dsn: ${APP_DSN}\n\nserver:\n  port: ${APP_PORT}\n  host: ${APP_HOST:0.0.0.0}\n";
        let result = expand_to_string(&expander, template).unwrap();
        assert_eq!(
            result,
            format!(
                "application:\n  name: \"products\"\n\ndatasource:\n  dsn: {DSN}\n\nserver:\n  port: 8080\n  host: 0.0.0.0\n"
            )
        );
    }

    #[test]
    fn test_adjacent_placeholders_resolve_independently() {
        let expander = create_expander(&[("A", "1"), ("C", "3")]);
        let result = expand_to_string(&expander, "${A}${B:2}${C:x}").unwrap();
        assert_eq!(result, "123");
    }

    #[test]
    fn test_unresolved_variable_aborts_whole_expansion() {
        let expander = create_expander(&[("A", "1")]);
        let result = expander.expand(Some(b"${A} ${MISSING} ${B:2}"));
        match result {
            Err(ExpandError::UnresolvedVariable { name }) => assert_eq!(name, "MISSING"),
            other => panic!("expected UnresolvedVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_literal_policy() {
        let expander = create_expander(&[("A", "1")]);
        assert_eq!(
            expand_to_string(&expander, "pa$$word ${A}").unwrap(),
            "pa$$word 1"
        );
        assert_eq!(expand_to_string(&expander, "trailing $").unwrap(), "trailing $");
        assert_eq!(expand_to_string(&expander, "${A} ${A").unwrap(), "1 ${A");
        // "$$" followed by a placeholder keeps one literal '$'
        assert_eq!(expand_to_string(&expander, "$${A}").unwrap(), "$1");
    }

    #[test]
    fn test_malformed_reject_policy() {
        let expander = create_expander(&[("A", "1")]).with_config(ExpandConfig {
            on_malformed: MalformedPolicy::Reject,
        });

        let result = expander.expand(Some(b"cost $5"));
        assert!(matches!(
            result,
            Err(ExpandError::MalformedPlaceholder { position: 5, .. })
        ));

        let result = expander.expand(Some(b"${A} ${A"));
        assert!(matches!(
            result,
            Err(ExpandError::MalformedPlaceholder { position: 5, .. })
        ));

        assert_eq!(expand_to_string(&expander, "${A}").unwrap(), "1");
    }

    #[test]
    fn test_empty_name() {
        let expander = create_expander(&[]);
        assert_eq!(expand_to_string(&expander, "${:fallback}").unwrap(), "fallback");
        assert!(matches!(
            expander.expand(Some(b"${}")),
            Err(ExpandError::UnresolvedVariable { name }) if name.is_empty()
        ));
    }

    #[test]
    fn test_non_utf8_content() {
        let expander = create_expander(&[("A", "1")]);
        let result = expander.expand(Some(b"\xff${A}\xfe${B:\xfd}")).unwrap();
        assert_eq!(result, b"\xff1\xfe\xfd");

        // a name that is not UTF-8 is never looked up
        let result = expander.expand(Some(b"${\xffA}"));
        assert!(matches!(
            result,
            Err(ExpandError::UnresolvedVariable { .. })
        ));
    }

    #[test]
    fn test_output_length_matches_for_plain_input() {
        let expander = create_expander(&[]);
        let content = "line of plain text without markers\n".repeat(4096);
        let result = expander.expand(Some(content.as_bytes())).unwrap();
        assert_eq!(result.len(), content.len());
        assert_eq!(result, content.as_bytes());
    }

    #[test]
    fn test_large_template_with_many_placeholders() {
        let expander = create_expander(&[("APP_DSN", DSN)]);
        let template = "dsn=${APP_DSN};port=${APP_PORT:8080}\n".repeat(2000);
        let result = expand_to_string(&expander, &template).unwrap();
        assert_eq!(result, format!("dsn={DSN};port=8080\n").repeat(2000));
    }

    #[test]
    fn test_resolution() {
        let expander = create_expander(&[("SET", "value"), ("EMPTY", "")]);
        let placeholders = find_placeholders(b"${SET:d} ${EMPTY:d} ${UNSET:} ${UNSET}");

        assert_eq!(
            expander.resolution(&placeholders[0]),
            Resolution::Value("value".to_string())
        );
        assert_eq!(expander.resolution(&placeholders[1]), Resolution::Default(b"d"));
        assert_eq!(expander.resolution(&placeholders[2]), Resolution::Default(b""));
        assert_eq!(expander.resolution(&placeholders[3]), Resolution::Unresolved);
    }

    #[test]
    fn test_closure_resolver() {
        let expander =
            Expander::with_resolver(|name: &str| (name == "APP_PORT").then(|| "9090".to_string()));
        assert_eq!(expander.expand_str("port=${APP_PORT}").unwrap(), "port=9090");
    }

    #[test]
    fn test_process_environment() {
        unsafe { std::env::set_var("ENVEXPAND_EXPAND_TEST_CACHE_CONTROL", "no-store") };

        let result = expand(Some(b"${ENVEXPAND_EXPAND_TEST_CACHE_CONTROL:no-cache}")).unwrap();
        assert_eq!(result, b"no-store");

        let result = expand(Some(b"${ENVEXPAND_EXPAND_TEST_UNSET:no-cache}")).unwrap();
        assert_eq!(result, b"no-cache");

        assert!(matches!(expand(None), Err(ExpandError::InvalidInput)));
    }

    #[test]
    fn test_expand_file() {
        let temp_dir = TempDir::new().unwrap();
        let expander = create_expander(&[("APP_PORT", "8080")]);

        let template = temp_dir.path().join("config.yaml.tpl");
        fs::write(&template, "server:\n  port: ${APP_PORT}\n").unwrap();

        let result = expander.expand_file(&template).unwrap();
        assert_eq!(result, b"server:\n  port: 8080\n");

        let missing = temp_dir.path().join("missing.tpl");
        let result = expander.expand_file(&missing);
        assert!(matches!(result, Err(ExpandError::FileNotFound { .. })));
    }

    #[test]
    fn test_config_default() {
        let config = ExpandConfig::default();
        assert_eq!(config.on_malformed, MalformedPolicy::Literal);
        assert_eq!(Expander::new().config(), &config);
    }
}
