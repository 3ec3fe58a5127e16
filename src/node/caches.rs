// Caches - Read-mostly caches of the node and network-wide parameters
//
// Requests, responses, checked signatures and class loaders are cached in
// small LRU maps. The consensus parameters and the current gas price are
// recomputed from the manifest by the coordinator; the caches only hold
// the last computed value.

use super::config::NodeConfig;
use crate::loader::{EngineClassLoader, LoaderError};
use crate::store::{Store, StoreError};
use crate::types::{
    GasPrice, SignatureScheme, TransactionReference, TransactionRequest, TransactionResponse,
};
use crate::verifier::JarVerifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash as StdHash;
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

/// Network-wide parameters, identical on every node of the same network.
/// Before initialization they are provided explicitly; afterwards they are
/// recomputed from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Chain identifier reported by signed requests
    pub chain_id: String,

    /// Gas ceiling for a single non-view transaction
    pub max_gas_per_transaction: u64,

    /// Persisted and user-visible error messages get truncated to this length
    pub max_error_length: usize,

    /// Maximum number of dependencies of a classpath, transitively
    pub max_dependencies: u32,

    /// Maximum cumulative size, in bytes, of the instrumented jars of a
    /// classpath and its dependencies
    pub max_cumulative_size_of_dependencies: u64,

    /// Signature scheme of signed requests, unless the account of the
    /// caller fixes its own scheme
    pub signature: SignatureScheme,

    /// Version of the verification rule-set; bumping it triggers lazy
    /// reverification of the jars already in store
    pub verification_version: u32,

    /// True if the node accepts any gas price offer
    pub ignores_gas_price: bool,

    /// Gas price in force until the gas station says otherwise
    pub initial_gas_price: GasPrice,

    /// Extra units minted per 100,000,000 units of gas rewarded
    pub inflation: u64,
}

impl ConsensusParams {
    /// Human-readable form, for logs and diagnostics
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            max_gas_per_transaction: 1_000_000_000,
            max_error_length: 300,
            max_dependencies: 20,
            max_cumulative_size_of_dependencies: 1_000_000,
            signature: SignatureScheme::Ed25519,
            verification_version: 0,
            ignores_gas_price: false,
            initial_gas_price: 100,
            inflation: 0,
        }
    }
}

/// Petit cache LRU, à verrou externe
pub struct LruCache<K, V> {
    map: HashMap<K, (V, u64)>,
    capacity: usize,
    tick: u64,
}

impl<K: Eq + StdHash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        self.map.get_mut(key).map(|entry| {
            entry.1 = tick;
            &entry.0
        })
    }

    pub fn put(&mut self, key: K, value: V) {
        self.tick += 1;

        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            // evict the least recently used entry
            if let Some(oldest) = self
                .map
                .iter()
                .min_by_key(|(_, (_, tick))| *tick)
                .map(|(k, _)| k.clone())
            {
                self.map.remove(&oldest);
            }
        }

        self.map.insert(key, (value, self.tick));
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The caches of a node
pub struct NodeCaches {
    requests: Mutex<LruCache<TransactionReference, TransactionRequest>>,
    responses: Mutex<LruCache<TransactionReference, TransactionResponse>>,

    /// Requests whose signature has already been checked, so that checking
    /// and delivering the same request verifies it only once
    checked_signatures: Mutex<LruCache<TransactionReference, bool>>,

    class_loaders: Mutex<LruCache<TransactionReference, Arc<EngineClassLoader>>>,

    consensus: RwLock<Option<ConsensusParams>>,

    /// Current gas price; reset when the gas station signals a change
    gas_price: RwLock<Option<GasPrice>>,
}

impl NodeCaches {
    pub fn new(config: &NodeConfig, consensus: Option<ConsensusParams>) -> Self {
        Self {
            requests: Mutex::new(LruCache::new(config.request_cache_size)),
            responses: Mutex::new(LruCache::new(config.response_cache_size)),
            checked_signatures: Mutex::new(LruCache::new(1_000)),
            class_loaders: Mutex::new(LruCache::new(100)),
            consensus: RwLock::new(consensus),
            gas_price: RwLock::new(None),
        }
    }

    /// The request with the given reference, from the cache or the store
    pub fn get_request(
        &self,
        store: &Store,
        reference: &TransactionReference,
    ) -> Result<Option<TransactionRequest>, StoreError> {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(request) = requests.get(reference) {
            return Ok(Some(request.clone()));
        }

        match store.get_request(reference)? {
            Some(request) => {
                requests.put(*reference, request.clone());
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    /// The response with the given reference, from the cache or the store
    pub fn get_response(
        &self,
        store: &Store,
        reference: &TransactionReference,
    ) -> Result<Option<TransactionResponse>, StoreError> {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(response) = responses.get(reference) {
            return Ok(Some(response.clone()));
        }

        match store.get_response(reference)? {
            Some(response) => {
                responses.put(*reference, response.clone());
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }

    /// The class loader for the given classpath, built on first use.
    /// Reverification against the current rule-set version is implied.
    pub fn get_class_loader(
        &self,
        classpath: TransactionReference,
        store: &Store,
        verifier: &dyn JarVerifier,
    ) -> Result<Arc<EngineClassLoader>, LoaderError> {
        {
            let mut loaders = self.class_loaders.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(loader) = loaders.get(&classpath) {
                return Ok(loader.clone());
            }
        }

        let consensus = self.consensus_params().unwrap_or_default();
        let loader = Arc::new(EngineClassLoader::new(
            None,
            &[classpath],
            store,
            verifier,
            true,
            consensus.verification_version,
            consensus.max_dependencies,
            consensus.max_cumulative_size_of_dependencies,
        )?);

        self.class_loaders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(classpath, loader.clone());

        Ok(loader)
    }

    /// Checks the signature of a request at most once, caching the verdict
    /// under the reference of the request
    pub fn signature_is_valid<F>(
        &self,
        reference: TransactionReference,
        check: F,
    ) -> bool
    where
        F: FnOnce() -> bool,
    {
        {
            let mut checked = self
                .checked_signatures
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(valid) = checked.get(&reference) {
                return *valid;
            }
        }

        let valid = check();
        self.checked_signatures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(reference, valid);
        valid
    }

    pub fn consensus_params(&self) -> Option<ConsensusParams> {
        self.consensus
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_consensus_params(&self, params: ConsensusParams) {
        *self.consensus.write().unwrap_or_else(|e| e.into_inner()) = Some(params);
    }

    pub fn gas_price(&self) -> Option<GasPrice> {
        *self.gas_price.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_gas_price(&self, price: GasPrice) {
        *self.gas_price.write().unwrap_or_else(|e| e.into_inner()) = Some(price);
    }

    /// Forgets the class loaders, needed when the verification rules change
    pub fn invalidate_class_loaders(&self) {
        self.class_loaders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Clears every cache of the node
    pub fn invalidate(&self) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.checked_signatures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.invalidate_class_loaders();
        *self.gas_price.write().unwrap_or_else(|e| e.into_inner()) = None;
        info!("the caches of the node have been invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_eviction_prefers_least_recently_used() {
        let mut cache: LruCache<u32, &str> = LruCache::new(2);

        cache.put(1, "one");
        cache.put(2, "two");

        // touch 1 so that 2 becomes the least recently used
        assert_eq!(cache.get(&1), Some(&"one"));

        cache.put(3, "three");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.get(&3), Some(&"three"));
    }

    #[test]
    fn test_signature_check_runs_once() {
        let caches = NodeCaches::new(&NodeConfig::default(), None);
        let reference = TransactionReference::of_bytes(b"request");

        let mut calls = 0;
        assert!(caches.signature_is_valid(reference, || {
            calls += 1;
            true
        }));
        assert!(caches.signature_is_valid(reference, || {
            calls += 1;
            false
        }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_consensus_defaults() {
        let params = ConsensusParams::default();
        assert_eq!(params.max_dependencies, 20);
        assert_eq!(params.max_cumulative_size_of_dependencies, 1_000_000);
        assert_eq!(params.max_error_length, 300);
    }
}
