//! Key rotation for remote calls.
//!
//! [`FailoverExecutor::dispatch`] runs one logical request against the key
//! pool: it starts at the sticky index, tries every key at most once in
//! circular order and stops at the first success. Keys are never tried in
//! parallel for the same request, so one call never burns quota on more
//! than one key at a time.
//!
//! Concurrent dispatches each read the sticky index when they start and may
//! race when they update it. The last successful update wins; the index
//! only decides which key is tried first next time.

use crate::credentials::{Credential, CredentialStore};
use crate::error::{AttemptFailure, Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Where an out-of-band key that bypasses the pool comes from.
#[derive(Debug, Clone, Default)]
pub enum OverrideSource {
    /// Always use the pool.
    #[default]
    None,
    /// Read this environment variable on every dispatch.
    Env(String),
    /// Use this key.
    Fixed(Credential),
}

impl OverrideSource {
    /// Resolves the override key, if one is currently configured.
    pub fn resolve(&self) -> Option<Credential> {
        match self {
            Self::None => None,
            Self::Env(var) => std::env::var(var).ok().and_then(Credential::new),
            Self::Fixed(key) => Some(key.clone()),
        }
    }
}

/// Runs credential-parameterized operations with failover across the pool.
#[derive(Debug, Clone)]
pub struct FailoverExecutor {
    credentials: Arc<CredentialStore>,
    override_source: OverrideSource,
    timeout: Option<Duration>,
}

impl FailoverExecutor {
    /// Creates an executor over `credentials` with no override and no timeout.
    pub fn new(credentials: Arc<CredentialStore>) -> Self {
        Self {
            credentials,
            override_source: OverrideSource::None,
            timeout: None,
        }
    }

    /// Sets the override key source.
    pub fn with_override(mut self, source: OverrideSource) -> Self {
        self.override_source = source;
        self
    }

    /// Bounds every single attempt by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the pool this executor rotates through.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Runs `operation` with one key at a time until it succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::OverrideCredential`] if an override key is configured and
    ///   the operation failed with it. The pool is not consulted.
    /// - [`Error::NoCredentials`] if the pool is empty. The operation is not run.
    /// - [`Error::AllCredentialsExhausted`] if every key failed once. It carries
    ///   every failure, in attempt order.
    pub async fn dispatch<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(key) = self.override_source.resolve() {
            tracing::debug!("using override API key, pool bypassed");
            return self.attempt(&mut operation, key).await.map_err(|e| {
                tracing::error!("override API key failed: {e}");
                Error::OverrideCredential(Box::new(e))
            });
        }

        let (keys, start) = self.credentials.snapshot();
        if keys.is_empty() {
            return Err(Error::NoCredentials);
        }

        let len = keys.len();
        let mut failures = Vec::with_capacity(len);

        for offset in 0..len {
            let index = (start + offset) % len;
            match self.attempt(&mut operation, keys[index].clone()).await {
                Ok(value) => {
                    self.credentials.advance_to((index + 1) % len);
                    if offset > 0 {
                        tracing::info!(
                            index,
                            failed = offset,
                            "request succeeded after rotating API keys"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    tracing::warn!(
                        index,
                        attempt = offset + 1,
                        of = len,
                        "API key failed, trying next: {error}"
                    );
                    failures.push(AttemptFailure { index, error });
                }
            }
        }

        Err(Error::AllCredentialsExhausted {
            attempts: len,
            failures,
        })
    }

    async fn attempt<T, F, Fut>(&self, operation: &mut F, key: Credential) -> Result<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let call = operation(key);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, API_KEYS_KEY};
    use std::sync::Mutex;

    async fn pool(keys: &str) -> Arc<CredentialStore> {
        let backend = Arc::new(MemoryStore::new().with_entry(API_KEYS_KEY, keys));
        Arc::new(CredentialStore::open(backend).await)
    }

    /// Records every key handed to the operation; only keys in `good` succeed.
    fn recorder(
        good: &'static [&'static str],
    ) -> (
        Arc<Mutex<Vec<String>>>,
        impl FnMut(Credential) -> std::pin::Pin<Box<dyn Future<Output = Result<String>> + Send>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let op = move |key: Credential| {
            let log = log.clone();
            Box::pin(async move {
                let key = key.expose().to_string();
                log.lock().unwrap().push(key.clone());
                if good.contains(&key.as_str()) {
                    Ok(format!("artifact-from-{key}"))
                } else {
                    Err(Error::Auth(format!("{key} rejected")))
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<String>> + Send>>
        };
        (seen, op)
    }

    #[tokio::test]
    async fn test_empty_pool_makes_no_attempts() {
        let executor = FailoverExecutor::new(pool("").await);
        let (seen, op) = recorder(&["k1"]);

        let err = executor.dispatch(op).await.unwrap_err();
        assert!(matches!(err, Error::NoCredentials));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_success_advances_past_it() {
        for len in 1..=4 {
            let raw: Vec<String> = (0..len).map(|i| format!("k{i}")).collect();
            let store = pool(&raw.join("\n")).await;
            let executor = FailoverExecutor::new(store.clone());

            for start in 0..len {
                store.advance_to(start);
                let calls = Arc::new(Mutex::new(0));
                let counter = calls.clone();
                let result = executor
                    .dispatch(|_key| {
                        let counter = counter.clone();
                        async move {
                            *counter.lock().unwrap() += 1;
                            Ok::<_, Error>(())
                        }
                    })
                    .await;
                assert!(result.is_ok());
                assert_eq!(*calls.lock().unwrap(), 1);
                assert_eq!(store.current_index(), (start + 1) % len);
            }
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let store = pool("k1\nk2\nk3\nk4").await;
        let executor = FailoverExecutor::new(store.clone());
        store.advance_to(1);
        let (seen, op) = recorder(&["k4", "k1"]);

        let result = executor.dispatch(op).await.unwrap();
        assert_eq!(result, "artifact-from-k4");
        // k2 and k3 fail, k4 is the third candidate from start 1.
        assert_eq!(*seen.lock().unwrap(), vec!["k2", "k3", "k4"]);
        assert_eq!(store.current_index(), 0);
    }

    #[tokio::test]
    async fn test_all_fail_reports_every_cause() {
        let store = pool("k1\nk2\nk3").await;
        let executor = FailoverExecutor::new(store.clone());
        store.advance_to(1);
        let (seen, op) = recorder(&[]);

        let err = executor.dispatch(op).await.unwrap_err();
        assert_eq!(*seen.lock().unwrap(), vec!["k2", "k3", "k1"]);
        match &err {
            Error::AllCredentialsExhausted { attempts, failures } => {
                assert_eq!(*attempts, 3);
                let order: Vec<usize> = failures.iter().map(|f| f.index).collect();
                assert_eq!(order, vec![1, 2, 0]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        let msg = err.to_string();
        for key in ["k1", "k2", "k3"] {
            assert!(msg.contains(&format!("{key} rejected")), "{msg}");
        }
        // Failure does not move the sticky index.
        assert_eq!(store.current_index(), 1);
    }

    #[tokio::test]
    async fn test_sticky_scenario_across_calls() {
        let store = pool("k1\nk2\nk3").await;
        let executor = FailoverExecutor::new(store.clone());

        let (seen, op) = recorder(&["k2", "k3"]);
        executor.dispatch(op).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["k1", "k2"]);
        assert_eq!(store.current_index(), 2);

        let (seen, op) = recorder(&["k1", "k2", "k3"]);
        let result = executor.dispatch(op).await.unwrap();
        assert_eq!(result, "artifact-from-k3");
        assert_eq!(*seen.lock().unwrap(), vec!["k3"]);
    }

    #[tokio::test]
    async fn test_fixed_override_bypasses_pool() {
        let store = pool("k1\nk2").await;
        let executor = FailoverExecutor::new(store.clone())
            .with_override(OverrideSource::Fixed(Credential::new("env-key").unwrap()));

        let (seen, op) = recorder(&["env-key"]);
        assert_eq!(executor.dispatch(op).await.unwrap(), "artifact-from-env-key");
        assert_eq!(*seen.lock().unwrap(), vec!["env-key"]);
        assert_eq!(store.current_index(), 0);
    }

    #[tokio::test]
    async fn test_override_failure_never_falls_back() {
        let store = pool("k1\nk2").await;
        let executor = FailoverExecutor::new(store)
            .with_override(OverrideSource::Fixed(Credential::new("env-key").unwrap()));

        let (seen, op) = recorder(&["k1", "k2"]);
        let err = executor.dispatch(op).await.unwrap_err();
        assert!(matches!(err, Error::OverrideCredential(_)));
        assert_eq!(*seen.lock().unwrap(), vec!["env-key"]);
    }

    #[tokio::test]
    async fn test_override_with_empty_pool_still_runs() {
        let executor = FailoverExecutor::new(pool("").await)
            .with_override(OverrideSource::Fixed(Credential::new("env-key").unwrap()));
        let (_, op) = recorder(&["env-key"]);
        assert!(executor.dispatch(op).await.is_ok());
    }

    #[tokio::test]
    async fn test_env_override_is_rechecked_per_dispatch() {
        const VAR: &str = "LOOKBOOK_TEST_OVERRIDE_RECHECK";
        std::env::remove_var(VAR);

        let executor = FailoverExecutor::new(pool("k1").await)
            .with_override(OverrideSource::Env(VAR.to_string()));

        let (seen, op) = recorder(&["k1", "from-env"]);
        executor.dispatch(op).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["k1"]);

        std::env::set_var(VAR, "from-env");
        let (seen, op) = recorder(&["k1", "from-env"]);
        executor.dispatch(op).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["from-env"]);

        std::env::set_var(VAR, "   ");
        let (seen, op) = recorder(&["k1", "from-env"]);
        executor.dispatch(op).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["k1"]);

        std::env::remove_var(VAR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let store = pool("slow\nfast").await;
        let executor =
            FailoverExecutor::new(store.clone()).with_timeout(Duration::from_secs(5));

        let result = executor
            .dispatch(|key| async move {
                if key.expose() == "slow" {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok::<_, Error>(key.expose().to_string())
            })
            .await
            .unwrap();
        assert_eq!(result, "fast");
        assert_eq!(store.current_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timeouts_exhaust_pool() {
        let executor = FailoverExecutor::new(pool("a\nb").await)
            .with_timeout(Duration::from_millis(100));

        let err = executor
            .dispatch(|_key| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, Error>(())
            })
            .await
            .unwrap_err();
        match err {
            Error::AllCredentialsExhausted { failures, .. } => {
                assert!(failures
                    .iter()
                    .all(|f| matches!(f.error, Error::Timeout(_))));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_leave_valid_index() {
        let store = pool("k1\nk2\nk3").await;
        let executor = FailoverExecutor::new(store.clone());

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let executor = executor.clone();
            tasks.spawn(async move {
                executor
                    .dispatch(|key| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, Error>(key)
                    })
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap().is_ok());
        }
        assert!(store.current_index() < 3);
    }
}
