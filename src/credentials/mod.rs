//! Backend credential rotation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Opaque bearer token for the upstream API.
///
/// Cheap to clone; `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential pool is empty")]
    Empty,
}

/// Round-robin pool of backend credentials.
///
/// Rotation is a single atomic increment, so concurrent workers always get
/// distinct consecutive positions in the ring.
#[derive(Debug)]
pub struct CredentialRotator {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialRotator {
    /// Build a rotator; blank tokens are discarded.
    pub fn new<I, S>(tokens: I) -> Result<Self, CredentialError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Credential::new)
            .collect();

        if credentials.is_empty() {
            return Err(CredentialError::Empty);
        }

        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Issue the next credential in the ring together with its position.
    pub fn next(&self) -> (usize, Credential) {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.credentials.len();
        (index, self.credentials[index].clone())
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_pool_rejected() {
        let none: Vec<String> = Vec::new();
        assert_eq!(CredentialRotator::new(none).unwrap_err(), CredentialError::Empty);
        assert_eq!(
            CredentialRotator::new(["", "  "]).unwrap_err(),
            CredentialError::Empty
        );
    }

    #[test]
    fn test_rotation_order() {
        let rotator = CredentialRotator::new(["a", "b", "c"]).unwrap();
        let issued: Vec<String> = (0..7)
            .map(|_| rotator.next().1.expose().to_string())
            .collect();
        assert_eq!(issued, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let credential = Credential::new("sk-live-123");
        assert_eq!(format!("{:?}", credential), "Credential(***)");
    }

    #[tokio::test]
    async fn test_concurrent_rotation_is_fair() {
        let rotator = Arc::new(CredentialRotator::new(["a", "b", "c", "d"]).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let rotator = Arc::clone(&rotator);
            handles.push(tokio::spawn(async move {
                (0..50).map(|_| rotator.next().0).collect::<Vec<_>>()
            }));
        }

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for result in futures::future::join_all(handles).await {
            for index in result.unwrap() {
                *counts.entry(index).or_default() += 1;
            }
        }
        assert!(counts.values().all(|&n| n == 100), "{:?}", counts);
    }

    proptest! {
        #[test]
        fn every_credential_issued_floor_or_ceil(pool in 1usize..8, dispatches in 0usize..200) {
            let tokens: Vec<String> = (0..pool).map(|i| format!("key-{}", i)).collect();
            let rotator = CredentialRotator::new(&tokens).unwrap();

            let mut counts = vec![0usize; pool];
            for _ in 0..dispatches {
                counts[rotator.next().0] += 1;
            }

            let floor = dispatches / pool;
            let ceil = dispatches.div_ceil(pool);
            for count in counts {
                prop_assert!(count == floor || count == ceil);
            }
        }
    }
}
