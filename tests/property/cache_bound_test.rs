// tests/property/cache_bound_test.rs

//! Property-based tests for the translation cache bounds and accounting

use crate::test_helpers::init_tracing;
use bedrock_bridge::core::cache::TranslationCache;
use bedrock_bridge::core::errors::BridgeError;
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_size_never_exceeds_capacity(
        capacity in 1usize..=48,
        keys in prop::collection::vec("[a-z]{1,3}", 1..=300)
    ) {
        init_tracing();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache: TranslationCache<String, String> =
                TranslationCache::new("prop", capacity, Duration::from_secs(3600));

            for key in &keys {
                let value = cache
                    .get_or_compute(
                        key.clone(),
                        || async { Ok::<_, BridgeError>(key.to_uppercase()) },
                        || "fallback".to_string(),
                    )
                    .await;
                assert_eq!(value, key.to_uppercase());
                assert!(cache.len() <= capacity);
            }

            // The last key requested is always resident.
            let last = keys.last().unwrap();
            assert!(cache.contains(last));

            let stats = cache.stats();
            assert_eq!(stats.requests(), keys.len() as u64);
            let distinct = keys.iter().collect::<HashSet<_>>().len() as u64;
            assert!(stats.misses >= distinct);
            // Every entry that is no longer resident was evicted.
            assert_eq!(stats.misses - stats.evictions, cache.len() as u64);
        });
    }

    #[test]
    fn test_failures_never_occupy_capacity(
        keys in prop::collection::vec(("[a-z]{1,3}", any::<bool>()), 1..=100)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cache: TranslationCache<String, String> =
                TranslationCache::new("prop-fail", 1024, Duration::from_secs(3600));
            let mut stored = HashSet::new();

            for (key, ok) in &keys {
                let ok = *ok;
                let value = cache
                    .get_or_compute(
                        key.clone(),
                        || async move {
                            if ok { Ok(format!("v:{key}")) } else { Err("unmapped") }
                        },
                        || "fallback".to_string(),
                    )
                    .await;
                if value != "fallback" {
                    stored.insert(key.clone());
                }
            }

            assert_eq!(cache.len(), stored.len());
            for key in &stored {
                assert!(cache.contains(key));
            }
        });
    }
}
