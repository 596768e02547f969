//! Request ID generation

use uuid::Uuid;

/// Generate a correlation id for one inbound request.
///
/// The id is logged next to the queue's task id so a request can be followed
/// from admission to completion.
///
/// # Examples
///
/// ```
/// use commandr::logging::generate_request_id;
///
/// let request_id = generate_request_id();
/// assert_eq!(request_id.len(), 36);
/// ```
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_id_uniqueness() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[test]
    fn test_generate_request_id_parseable() {
        assert!(Uuid::parse_str(&generate_request_id()).is_ok());
    }
}
