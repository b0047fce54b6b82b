//! Cache manager refresh, TTL and retry behaviour

use saml_config_core::{CacheSettings, ConfigCacheManager, ConfigFetcher, FetchError, RefreshError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Fetcher that fails a fixed number of times, then serves a valid payload
#[derive(Debug)]
struct ScriptedFetcher {
    failures: usize,
    delay: Duration,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedFetcher {
    fn new(failures: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failures,
            delay,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gaps(&self) -> Vec<Duration> {
        let times = self.call_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait::async_trait]
impl ConfigFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<HashMap<String, String>, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if call < self.failures {
            return Err(FetchError::Status {
                endpoint: "http://config.test/saml".into(),
                status: 503,
            });
        }

        Ok([
            ("CERT_LIB_PATH", "certs"),
            ("PROVIDER_LIST", "A,B"),
            ("A_KEYALIAS", "a1"),
            ("A_KEYSTOREFILE", "a.keystore"),
            ("A_KEYSTOREPASSWORD", "pw"),
            ("A_PARSEENCODING", "UTF-8"),
            ("B_KEYALIAS", "b1"),
            ("B_KEYSTOREFILE", "b.keystore"),
            ("B_KEYSTOREPASSWORD", "pw2"),
            ("B_PARSEENCODING", "UTF-8"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
    }
}

fn cache_settings(ttl_secs: i64) -> CacheSettings {
    CacheSettings {
        ttl_secs,
        max_attempts: 3,
        retry_base_delay_ms: 1000,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_load_fetches_once() {
    let fetcher = ScriptedFetcher::new(0, Duration::from_millis(100));
    let cache = Arc::new(ConfigCacheManager::new(fetcher.clone(), cache_settings(60)));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_config_data().await })
        })
        .collect();

    let snapshots: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(fetcher.calls(), 1);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    assert_eq!(snapshots[0].provider_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_snapshot_refreshes_once_under_contention() {
    let fetcher = ScriptedFetcher::new(0, Duration::from_millis(200));
    let cache = Arc::new(ConfigCacheManager::new(fetcher.clone(), cache_settings(1)));

    let stale = cache.init().await.unwrap();
    assert_eq!(fetcher.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_config_data().await })
        })
        .collect();

    for handle in handles {
        let snapshot = handle.await.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&snapshot, &stale));
    }
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_non_positive_ttl_never_expires() {
    let fetcher = ScriptedFetcher::new(0, Duration::ZERO);
    let cache = ConfigCacheManager::new(fetcher.clone(), cache_settings(0));

    cache.get_config_data().await.unwrap();
    tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
    cache.get_config_data().await.unwrap();
    assert_eq!(fetcher.calls(), 1);

    let cache = ConfigCacheManager::new(fetcher.clone(), cache_settings(-1));
    cache.get_config_data().await.unwrap();
    tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
    cache.get_config_data().await.unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_clear_cache_forces_exactly_one_refetch() {
    let fetcher = ScriptedFetcher::new(0, Duration::ZERO);
    let cache = ConfigCacheManager::new(fetcher.clone(), cache_settings(0));

    let first = cache.get_config_data().await.unwrap();
    cache.clear_cache();
    assert!(cache.last_refreshed().is_none());

    let second = cache.get_config_data().await.unwrap();
    let third = cache.get_config_data().await.unwrap();

    assert_eq!(fetcher.calls(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));
}

#[tokio::test(start_paused = true)]
async fn test_retries_with_linear_backoff() {
    let fetcher = ScriptedFetcher::new(2, Duration::ZERO);
    let cache = ConfigCacheManager::new(fetcher.clone(), cache_settings(0));

    let data = cache.get_config_data().await.unwrap();

    assert_eq!(data.provider_count(), 2);
    assert_eq!(fetcher.calls(), 3);
    let gaps = fetcher.gaps();
    assert_eq!(gaps.len(), 2);
    for (gap, expected) in gaps.iter().zip([Duration::from_secs(1), Duration::from_secs(2)]) {
        assert!(*gap >= expected, "gap {:?} shorter than {:?}", gap, expected);
        assert!(*gap < expected + Duration::from_millis(50), "gap {:?} too long", gap);
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_install_nothing() {
    let fetcher = ScriptedFetcher::new(3, Duration::ZERO);
    let cache = ConfigCacheManager::new(fetcher.clone(), cache_settings(0));

    let err = cache.get_config_data().await.unwrap_err();
    assert_eq!(err.attempts, 3);
    assert!(matches!(
        err.last_error,
        RefreshError::Fetch(FetchError::Status { status: 503, .. })
    ));
    assert_eq!(fetcher.calls(), 3);
    assert!(cache.last_refreshed().is_none());

    // Fourth call onwards succeeds
    let data = cache.get_config_data().await.unwrap();
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(data.general.cert_lib_path, "certs");
}
