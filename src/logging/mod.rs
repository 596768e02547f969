//! Structured logging helpers.
//!
//! Subscriber installation lives in `cli::serve`; this module builds the
//! filter it uses and the ids attached to log events.

pub mod request_id;

pub use request_id::generate_request_id;

use crate::config::LoggingConfig;

/// Build an `EnvFilter` directive string from [`LoggingConfig`].
///
/// The base level comes first, followed by one `commandr::<component>=<level>`
/// directive per configured component.
///
/// # Examples
///
/// ```
/// use commandr::config::LoggingConfig;
/// use commandr::logging::build_filter_directives;
///
/// let mut config = LoggingConfig::default();
/// config.component_levels.insert("queue".to_string(), "debug".to_string());
///
/// assert_eq!(build_filter_directives(&config), "info,commandr::queue=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    for (component, level) in &config.component_levels {
        filter_str.push_str(&format!(",commandr::{}={}", component, level));
    }

    filter_str
}
