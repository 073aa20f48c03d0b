//! # envexpand
//!
//! Expands environment placeholders in configuration templates before they are
//! handed to a config parser.
//!
//! ## Placeholders
//!
//! - `${NAME}` is replaced by the value of `NAME`; it is an error if `NAME` is
//!   unset or empty
//! - `${NAME:default}` falls back to the literal `default` (which may be empty)
//!   when `NAME` is unset or empty
//!
//! A variable set to the empty string counts as unset. The default is
//! everything after the first `:`, the placeholder ends at the first `}`.
//! There is no nesting and no escaping.
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```
//! use envexpand::{Expander, MapResolver};
//!
//! let resolver: MapResolver = [("APP_PORT", "8080")].into_iter().collect();
//! let expander = Expander::with_resolver(resolver);
//!
//! let config = expander
//!     .expand(Some(b"port: ${APP_PORT}\nhost: ${APP_HOST:0.0.0.0}\n"))
//!     .unwrap();
//! assert_eq!(config, b"port: 8080\nhost: 0.0.0.0\n");
//! ```
//!
//! [`expand`] does the same against the process environment.
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Expand a template file to stdout
//! envexpand config.yaml.tpl
//!
//! # Expand stdin, overriding one variable
//! cat config.yaml.tpl | envexpand -D APP_PORT=9090 > config.yaml
//!
//! # Check every placeholder resolves
//! envexpand config.yaml.tpl --dry-run
//! ```

pub mod error;
pub mod expand;
pub mod resolver;
pub mod source;

// Re-export main types and functions for convenience
pub use error::{ExpandError, Result};
pub use expand::{
    ExpandConfig, Expander, MalformedKind, MalformedPolicy, Placeholder, Resolution, Scanner,
    Segment, expand, find_placeholders,
};
pub use resolver::{EnvResolver, Layered, MapResolver, Resolver};
pub use source::{read_template, write_output};
