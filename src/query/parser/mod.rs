//! Query text parsers
//!
//! Only label selectors arrive as text; everything else in a request is
//! already typed.
//!
//! ```rust
//! use profile_querier::query::parser::parse_selector;
//!
//! let selector = parse_selector(r#"{service_name="api", env=~"prod.*"}"#).unwrap();
//! assert_eq!(selector.len(), 2);
//!
//! assert!(parse_selector("{}").unwrap().is_empty());
//! assert!(parse_selector("").unwrap().is_empty());
//! ```

pub mod selector;

pub use selector::parse_selector;
