// Coordinator - The node core: check, post, deliver, poll, reward
//
// Single entry point orchestrating validation, execution, persistence and
// caller synchronization. Multiple threads may post and poll concurrently;
// delivery is serialized by the delivery lock and driven by whatever
// consensus mechanism surrounds the node. The built-in submission queue
// checks and delivers sequentially, the arrangement of a disk-only node.

use super::caches::{ConsensusParams, LruCache, NodeCaches};
use super::config::NodeConfig;
use crate::builder::call::{InstanceMethodCallBuilder, StaticMethodCallBuilder};
use crate::builder::{response_builder_for, NodeInternal, TransactionRejected};
use crate::gas::{GasCostModel, StandardGasCostModel};
use crate::loader::EngineClassLoader;
use crate::runtime::ContractRuntime;
use crate::store::{ClassTagInfo, Store};
use crate::types::ledger::{self, methods};
use crate::types::{
    Gas, JarStoreResponse, MethodCallResponse, MethodSignature, SignatureScheme,
    StorageReference, StorageValue, TransactionReference, TransactionRequest,
    TransactionResponse, Update,
};
use crate::types::{ConstructorCallResponse, FailureInfo};
use crate::verifier::JarVerifier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Gas allowed for the execution of the reward method of the validators
/// at each committed block
const GAS_FOR_REWARD: Gas = 100_000;

/// Gas allowed for the view calls that the node runs for itself
const GAS_FOR_SELF_CALLS: Gas = 100_000;

/// Divisor of the inflation expressed in parts per hundred million
const INFLATION_DIVISOR: u128 = 100_000_000;

/// Gas, coins and transactions accumulated since the last reward
#[derive(Debug, Clone, Copy, Default)]
struct RewardCounters {
    gas_consumed: u128,
    coins: u128,
    coins_without_inflation: u128,
    transactions: u64,
}

type EventHandler = Arc<dyn Fn(StorageReference, StorageReference) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    id: u64,
    creator: Option<StorageReference>,
    handler: EventHandler,
}

/// Erreurs du coordinateur
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The transaction never executed: no gas charged, no store update
    #[error(transparent)]
    Rejected(#[from] TransactionRejected),

    /// The transaction executed, consumed gas and was persisted as failed
    #[error("transaction failed: {0}")]
    TransactionFailed(FailureInfo),

    /// The executed code raised an exception it declares
    #[error("code execution failed: {0}")]
    CodeExecutionFailed(FailureInfo),

    #[error("{reference}: cannot find the response: tried {attempts} times")]
    PollTimeout {
        reference: TransactionReference,
        attempts: u32,
    },

    #[error("{0}: unknown transaction reference")]
    UnknownReference(TransactionReference),

    #[error("no manifest set for this node")]
    NoManifest,

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error("unexpected state: {0}")]
    Unexpected(String),
}

/// The execution core of a node
pub struct Node {
    config: NodeConfig,
    pub(crate) store: Arc<Store>,
    pub(crate) caches: Arc<NodeCaches>,
    gas_model: Box<dyn GasCostModel>,
    verifier: Arc<dyn JarVerifier>,
    runtime: Arc<dyn ContractRuntime>,

    /// Completion signal of each transaction in flight, released on every
    /// delivery exit path so that pollers can never block past delivery
    signals: Mutex<HashMap<TransactionReference, watch::Sender<bool>>>,

    /// Error messages of requests that failed their check, so that pollers
    /// of a request that never reached delivery fail fast
    recent_check_errors: Mutex<LruCache<TransactionReference, String>>,

    /// Serializes deliveries and the view calls of the node itself
    deliver_lock: Mutex<()>,

    reward: Mutex<RewardCounters>,

    /// Built-in submission queue, drained by the delivery worker
    submission: Mutex<Option<mpsc::UnboundedSender<TransactionRequest>>>,

    subscriptions: Mutex<Vec<Subscription>>,
    next_subscription_id: AtomicU64,

    closed: AtomicBool,
}

impl Node {
    /// Creates a node over the given collaborators and starts its delivery
    /// worker. With `delete_dir_on_open` unset, the store of a previous
    /// run is recycled; the consensus is then recomputed from its manifest.
    ///
    /// Must run inside a tokio runtime.
    pub fn new(
        config: NodeConfig,
        consensus: Option<ConsensusParams>,
        verifier: Arc<dyn JarVerifier>,
        runtime: Arc<dyn ContractRuntime>,
    ) -> Result<Arc<Self>, NodeError> {
        if config.delete_dir_on_open && config.dir.exists() {
            std::fs::remove_dir_all(&config.dir)
                .map_err(|e| NodeError::Unexpected(format!("cannot clean the data directory: {}", e)))?;
        }
        std::fs::create_dir_all(&config.dir)
            .map_err(|e| NodeError::Unexpected(format!("cannot create the data directory: {}", e)))?;

        let store = Arc::new(Store::open(&config.dir)?);
        let caches = Arc::new(NodeCaches::new(&config, consensus));

        let (sender, mut receiver) = mpsc::unbounded_channel::<TransactionRequest>();

        let node = Arc::new(Self {
            caches,
            gas_model: Box::new(StandardGasCostModel),
            verifier,
            runtime,
            signals: Mutex::new(HashMap::new()),
            recent_check_errors: Mutex::new(LruCache::new(100)),
            deliver_lock: Mutex::new(()),
            reward: Mutex::new(RewardCounters::default()),
            submission: Mutex::new(Some(sender)),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            store,
            config,
        });

        // a recycled store knows its consensus better than the caller does
        if !node.config.delete_dir_on_open && node.store.is_initialized()? {
            node.recompute_consensus();
        }

        let worker = Arc::clone(&node);
        tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                if worker.check_transaction(&request).is_ok() {
                    let _ = worker.deliver_transaction(&request);
                }
            }
        });

        Ok(node)
    }

    /// Stops accepting submissions; the delivery worker drains its queue
    /// and terminates
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.submission
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        info!("the node has been closed");
    }

    fn internal(&self) -> NodeInternal<'_> {
        NodeInternal {
            store: &self.store,
            caches: &self.caches,
            verifier: self.verifier.as_ref(),
            runtime: self.runtime.as_ref(),
            gas_model: self.gas_model.as_ref(),
            config: &self.config,
        }
    }

    /// Truncates a message to the maximal persisted error length
    fn trimmed_message(&self, message: &str) -> String {
        let max = self
            .caches
            .consensus_params()
            .unwrap_or_default()
            .max_error_length;

        if message.len() > max {
            let mut truncated: String = message.chars().take(max).collect();
            truncated.push_str("...");
            truncated
        } else {
            message.to_string()
        }
    }

    fn signal(&self, reference: TransactionReference) {
        if let Some(sender) = self
            .signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&reference)
        {
            sender.send_replace(true);
        }
    }

    // ===== Check, post, deliver, poll =====

    /// Validates the given request without executing it. Success means the
    /// transaction is admissible; any violation is recorded and rejected.
    pub fn check_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<(), TransactionRejected> {
        let reference = request.reference();
        info!("{}: checking start ({})", reference, request.kind_name());

        match response_builder_for(reference, request, self.internal()) {
            Ok(_) => {
                info!("{}: checking success", reference);
                Ok(())
            }
            Err(rejection) => {
                // wake up whoever is waiting for this outcome; the error is
                // only cached, since nobody pays for a rejected check and
                // the store cannot be expanded
                self.signal(reference);
                let message = self.trimmed_message(&rejection.0);
                self.recent_check_errors
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .put(reference, message.clone());
                info!("{}: checking failed: {}", reference, message);
                Err(rejection)
            }
        }
    }

    /// Posts the given request to the submission queue of the node,
    /// returning its reference immediately, without blocking
    pub fn post(&self, request: TransactionRequest) -> Result<TransactionReference, TransactionRejected> {
        let reference = request.reference();
        info!("{}: posting ({})", reference, request.kind_name());

        if self
            .caches
            .get_response(&self.store, &reference)
            .map_err(TransactionRejected::from)?
            .is_some()
        {
            return Err(TransactionRejected::new("repeated request"));
        }

        {
            let mut signals = self.signals.lock().unwrap_or_else(|e| e.into_inner());
            if signals.contains_key(&reference) {
                return Err(TransactionRejected::new("repeated request"));
            }
            let (sender, _receiver) = watch::channel(false);
            signals.insert(reference, sender);
        }

        let sent = self
            .submission
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|sender| sender.send(request).is_ok())
            .unwrap_or(false);

        if !sent {
            self.signal(reference);
            return Err(TransactionRejected::new("the node is closed"));
        }

        Ok(reference)
    }

    /// Builds and executes the response for the given request and expands
    /// the store with it. The completion signal of the reference is
    /// released on every exit path.
    pub fn deliver_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, TransactionRejected> {
        let reference = request.reference();
        info!("{}: delivering start ({})", reference, request.kind_name());

        let outcome = self.deliver_inner(reference, request);

        match &outcome {
            Ok(_) => info!("{}: delivering success", reference),
            Err(rejection) => {
                let message = self.trimmed_message(&rejection.0);
                if let Err(error) = self.store.push_error(reference, request, &message) {
                    warn!("{}: cannot record the delivery error: {}", reference, error);
                }
                info!("{}: delivering failed: {}", reference, message);
            }
        }

        self.signal(reference);
        outcome
    }

    fn deliver_inner(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
    ) -> Result<TransactionResponse, TransactionRejected> {
        let _guard = self.deliver_lock.lock().unwrap_or_else(|e| e.into_inner());

        let builder = response_builder_for(reference, request, self.internal())?;
        let loader = builder.class_loader();
        let response = builder.deliver()?;

        self.store.push(reference, request, &response).map_err(|error| {
            warn!("{}: cannot expand the store: {}", reference, error);
            TransactionRejected::new("the node could not expand its store")
        })?;

        if let Some(loader) = &loader {
            if let Err(error) = loader.replace_reverified_responses(&self.store) {
                warn!("{}: cannot persist the reverified responses: {}", reference, error);
            }
        }

        self.schedule_event_notifications(&response);
        self.take_note_for_next_reward(request, &response);
        self.invalidate_caches_if_needed(&response, loader.as_deref());

        Ok(response)
    }

    /// Waits for the response of the given reference: first on its
    /// completion signal, then polling the store a bounded number of times
    /// with a delay growing by 10% per attempt
    pub async fn get_polled_response(
        &self,
        reference: &TransactionReference,
    ) -> Result<TransactionResponse, NodeError> {
        let receiver = self
            .signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .map(|sender| sender.subscribe());

        if let Some(mut receiver) = receiver {
            if !*receiver.borrow() {
                // a closed channel means the delivery already completed
                let _ = receiver.changed().await;
            }
        }

        let attempts = self.config.max_polling_attempts.max(1);
        let mut delay = self.config.polling_delay_ms;

        for _ in 0..attempts {
            // both request and response must be observable
            match self.get_response(reference) {
                Ok(response) => {
                    if self.get_request(reference).is_ok() {
                        return Ok(response);
                    }
                }
                Err(NodeError::UnknownReference(_)) => {}
                Err(error) => return Err(error),
            }

            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            delay = delay * 110 / 100;
        }

        Err(NodeError::PollTimeout {
            reference: *reference,
            attempts,
        })
    }

    // ===== Lookups =====

    /// The request that produced the transaction with the given reference
    pub fn get_request(
        &self,
        reference: &TransactionReference,
    ) -> Result<TransactionRequest, NodeError> {
        self.caches
            .get_request(&self.store, reference)?
            .ok_or(NodeError::UnknownReference(*reference))
    }

    /// The response of the transaction with the given reference. A request
    /// that was rejected surfaces its error message instead.
    pub fn get_response(
        &self,
        reference: &TransactionReference,
    ) -> Result<TransactionResponse, NodeError> {
        if let Some(response) = self.caches.get_response(&self.store, reference)? {
            return Ok(response);
        }

        // the request may have passed its check but failed its delivery,
        // or failed its check without ever reaching the store
        if let Some(error) = self.store.get_error(reference)? {
            return Err(NodeError::Rejected(TransactionRejected(error)));
        }
        if let Some(error) = self
            .recent_check_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
        {
            return Err(NodeError::Rejected(TransactionRejected(error.clone())));
        }

        Err(NodeError::UnknownReference(*reference))
    }

    /// The class tag of the given object
    pub fn get_class_tag(&self, object: &StorageReference) -> Result<ClassTagInfo, NodeError> {
        Ok(self.store.class_tag_of(object)?)
    }

    /// The reconstructed current state of the given object
    pub fn get_state(&self, object: &StorageReference) -> Result<Vec<Update>, NodeError> {
        Ok(self.store.get_state(object)?)
    }

    /// The manifest of the node, if the node is initialized
    pub fn get_manifest(&self) -> Result<StorageReference, NodeError> {
        self.store.get_manifest()?.ok_or(NodeError::NoManifest)
    }

    /// The classpath of the base jar, that of the class tag of the manifest
    pub fn get_base_classpath(&self) -> Result<TransactionReference, NodeError> {
        let manifest = self.get_manifest()?;
        Ok(self.store.class_tag_of(&manifest)?.jar)
    }

    /// The signature scheme requested for signed requests
    pub fn signature_scheme_for_requests(&self) -> SignatureScheme {
        self.caches.consensus_params().unwrap_or_default().signature
    }

    // ===== View calls =====

    /// Runs an instance method without nonce, chain id or signature
    /// checks, at gas price zero, persisting nothing
    pub fn run_instance_method_call(
        &self,
        request: &TransactionRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        if !matches!(
            request,
            TransactionRequest::InstanceMethodCall { .. }
                | TransactionRequest::InstanceSystemMethodCall { .. }
        ) {
            return Err(NodeError::Unexpected(
                "run_instance_method_call requires an instance method call request".to_string(),
            ));
        }

        let reference = request.reference();
        info!("{}: running start ({})", reference, request.kind_name());

        let _guard = self.deliver_lock.lock().unwrap_or_else(|e| e.into_inner());
        let result = self.run_view_instance(request)?;
        info!("{}: running success", reference);
        Ok(result)
    }

    /// Runs a static method under the view discipline
    pub fn run_static_method_call(
        &self,
        request: &TransactionRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        if !matches!(request, TransactionRequest::StaticMethodCall { .. }) {
            return Err(NodeError::Unexpected(
                "run_static_method_call requires a static method call request".to_string(),
            ));
        }

        let reference = request.reference();
        info!("{}: running start ({})", reference, request.kind_name());

        let _guard = self.deliver_lock.lock().unwrap_or_else(|e| e.into_inner());
        let response =
            StaticMethodCallBuilder::new(reference, request, self.internal(), true)?.deliver()?;

        let result = method_outcome_of(response)?;
        info!("{}: running success", reference);
        Ok(result)
    }

    /// View execution of an instance method, without taking the delivery
    /// lock: used both under the lock and from the cache recomputations
    /// that already run inside a delivery
    fn run_view_instance(
        &self,
        request: &TransactionRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let reference = request.reference();
        let response =
            InstanceMethodCallBuilder::new(reference, request, self.internal(), true)?.deliver()?;
        method_outcome_of(response)
    }

    // ===== Events =====

    /// Subscribes a handler for the events issued by the given creator, or
    /// for every event when no creator is given. Handlers run on the
    /// worker pool, after the delivery of the transaction that emitted
    /// the events.
    pub fn subscribe_to_events<F>(&self, creator: Option<StorageReference>, handler: F) -> u64
    where
        F: Fn(StorageReference, StorageReference) + Send + Sync + 'static,
    {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription {
                id,
                creator,
                handler: Arc::new(handler),
            });
        id
    }

    pub fn unsubscribe_from_events(&self, id: u64) -> bool {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() < before
    }

    fn schedule_event_notifications(&self, response: &TransactionResponse) {
        let events = response.events();
        if events.is_empty() {
            return;
        }

        let mut resolved = Vec::with_capacity(events.len());
        for event in events {
            match self.store.event_creator_of(event) {
                Ok(Some(creator)) => resolved.push((creator, *event)),
                _ => warn!("{}: event without a creator, not notified", event),
            }
        }

        let subscriptions: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if resolved.is_empty() || subscriptions.is_empty() {
            return;
        }

        tokio::spawn(async move {
            for (creator, event) in resolved {
                for subscription in &subscriptions {
                    if subscription.creator.is_none() || subscription.creator == Some(creator) {
                        (subscription.handler)(creator, event);
                    }
                }
            }
        });
    }

    // ===== Rewards =====

    fn take_note_for_next_reward(
        &self,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) {
        if request.is_system() {
            return;
        }

        let mut counters = self.reward.lock().unwrap_or_else(|e| e.into_inner());
        counters.transactions += 1;

        if let Some(gas) = response.gas() {
            let consumed_but_penalty = gas.total() as u128;
            counters.gas_consumed = counters.gas_consumed.saturating_add(consumed_but_penalty);

            let consumed_total =
                consumed_but_penalty.saturating_add(response.gas_penalty() as u128);
            let price = request.gas_price().unwrap_or(0) as u128;

            counters.coins_without_inflation = counters
                .coins_without_inflation
                .saturating_add(consumed_total.saturating_mul(price));
            counters.coins = counters
                .coins
                .saturating_add(self.add_inflation(consumed_total).saturating_mul(price));
        }
    }

    fn add_inflation(&self, gas: u128) -> u128 {
        let inflation = self
            .caches
            .consensus_params()
            .map(|params| params.inflation as u128)
            .unwrap_or(0);

        gas.saturating_mul(INFLATION_DIVISOR + inflation) / INFLATION_DIVISOR
    }

    /// End-of-block hook: sends the price of the gas consumed since the
    /// last reward to the validators contract, through a synthetic,
    /// unsigned system call. A no-op before initialization. Never throws:
    /// a failed reward is logged and retried at the next block.
    pub fn reward_validators(&self, behaving: &str, misbehaving: &str) -> bool {
        // the node might not have completed its initialization yet
        if self.caches.consensus_params().is_none() {
            return false;
        }

        match self.try_reward_validators(behaving, misbehaving) {
            Ok(done) => done,
            Err(error) => {
                warn!("could not reward the validators: {}", error);
                false
            }
        }
    }

    fn try_reward_validators(&self, behaving: &str, misbehaving: &str) -> Result<bool, NodeError> {
        let manifest = match self.store.get_manifest()? {
            Some(manifest) => manifest,
            None => return Ok(false),
        };
        let validators = match self.store.validators()? {
            Some(validators) => validators,
            None => return Ok(false),
        };

        let nonce = self.store.nonce_of(&manifest)?;
        let classpath = self.get_base_classpath()?;
        let counters = *self.reward.lock().unwrap_or_else(|e| e.into_inner());

        // coins minted by inflation since the last reward
        let minted = counters.coins.saturating_sub(counters.coins_without_inflation);

        let request = TransactionRequest::InstanceSystemMethodCall {
            caller: manifest,
            nonce,
            classpath,
            gas_limit: GAS_FOR_REWARD,
            method: MethodSignature::new(
                ledger::VALIDATORS_CLASS,
                methods::VALIDATORS_REWARD,
                &[
                    "biginteger",
                    "biginteger",
                    "string",
                    "string",
                    "biginteger",
                    "biginteger",
                ],
                None,
            ),
            receiver: validators,
            actuals: vec![
                StorageValue::BigInteger(counters.coins),
                StorageValue::BigInteger(minted),
                StorageValue::Str(behaving.to_string()),
                StorageValue::Str(misbehaving.to_string()),
                StorageValue::BigInteger(counters.gas_consumed),
                StorageValue::BigInteger(counters.transactions as u128),
            ],
        };

        self.check_transaction(&request)?;

        // if the only update is the nonce of the manifest, the store is
        // not expanded, so that the state can stabilize between blocks
        let reference = request.reference();
        let response = {
            let _guard = self.deliver_lock.lock().unwrap_or_else(|e| e.into_inner());
            response_builder_for(reference, &request, self.internal())?.deliver()?
        };
        let response = if response.updates().len() > 1 {
            self.deliver_transaction(&request)?
        } else {
            self.signal(reference);
            response
        };

        if let TransactionResponse::MethodCall(MethodCallResponse::Failed { cause, .. }) = &response
        {
            warn!("could not reward the validators: {}", cause);
            Ok(false)
        } else {
            info!(
                "units of gas consumed for CPU, RAM or storage since the previous reward: {}",
                counters.gas_consumed
            );
            info!(
                "units of coin rewarded to the validators since the previous reward: {}",
                counters.coins
            );
            info!("units of coin minted since the previous reward: {}", minted);

            *self.reward.lock().unwrap_or_else(|e| e.into_inner()) = RewardCounters::default();
            Ok(true)
        }
    }

    // ===== Cache recomputation =====

    fn invalidate_caches_if_needed(
        &self,
        response: &TransactionResponse,
        loader: Option<&EngineClassLoader>,
    ) {
        let consensus_might_have_changed = matches!(response, TransactionResponse::Initialization)
            || self.has_event_of(response, loader, ledger::CONSENSUS_UPDATE_EVENT);

        if consensus_might_have_changed {
            let version_before = self
                .caches
                .consensus_params()
                .map(|params| params.verification_version);

            info!("recomputing the consensus cache since the information in the manifest might have changed");
            self.recompute_consensus();
            self.caches.invalidate_class_loaders();

            let version_after = self
                .caches
                .consensus_params()
                .map(|params| params.verification_version);
            if version_before != version_after {
                info!(
                    "the version of the verification module has changed from {:?} to {:?}",
                    version_before, version_after
                );
            }
        }

        if self.has_event_of(response, loader, ledger::GAS_PRICE_UPDATE_EVENT) {
            info!("recomputing the gas price cache since it has changed");
            self.recompute_gas_price();
        }
    }

    /// True if the response emitted an event of the given class, or of a
    /// subclass when the class space of the transaction is available
    fn has_event_of(
        &self,
        response: &TransactionResponse,
        loader: Option<&EngineClassLoader>,
        event_class: &str,
    ) -> bool {
        response.events().iter().any(|event| {
            match self.store.class_tag_of(event) {
                Ok(tag) => match loader {
                    Some(loader) => loader.class_space().is_subclass_of(&tag.class, event_class),
                    None => tag.class == event_class,
                },
                Err(_) => false,
            }
        })
    }

    /// A view call that the node runs for itself, with the manifest as
    /// caller
    fn self_view_call(
        &self,
        manifest: StorageReference,
        classpath: TransactionReference,
        receiver: StorageReference,
        method: &str,
        returns: &str,
    ) -> Result<Option<StorageValue>, NodeError> {
        let request = TransactionRequest::InstanceMethodCall {
            payload: crate::types::NonInitialPayload {
                caller: manifest,
                nonce: 0,
                classpath,
                gas_limit: GAS_FOR_SELF_CALLS,
                gas_price: 0,
                chain_id: String::new(),
                signature: vec![],
            },
            method: MethodSignature::new(ledger::MANIFEST_CLASS, method, &[], Some(returns)),
            receiver,
            actuals: vec![],
        };

        self.run_view_instance(&request)
    }

    fn recompute_consensus(&self) {
        match self.try_recompute_consensus() {
            Ok(params) => {
                debug!("consensus parameters: {}", params.to_json());
                self.caches.set_consensus_params(params);
                info!("the consensus cache has been recomputed");
            }
            Err(error) => {
                warn!(
                    "could not reconstruct the consensus parameters from the manifest: {}",
                    error
                );
            }
        }
    }

    fn try_recompute_consensus(&self) -> Result<ConsensusParams, NodeError> {
        let manifest = self.get_manifest()?;
        let classpath = self.get_base_classpath()?;
        let mut params = self.caches.consensus_params().unwrap_or_default();

        let manifest_call = |method: &str, returns: &str| {
            self.self_view_call(manifest, classpath, manifest, method, returns)
        };

        if let Some(StorageValue::Str(chain_id)) =
            manifest_call(methods::GET_CHAIN_ID, "string")?
        {
            params.chain_id = chain_id;
        }
        if let Some(StorageValue::Int(length)) =
            manifest_call(methods::GET_MAX_ERROR_LENGTH, "int")?
        {
            params.max_error_length = length.max(0) as usize;
        }
        if let Some(StorageValue::Int(dependencies)) =
            manifest_call(methods::GET_MAX_DEPENDENCIES, "int")?
        {
            params.max_dependencies = dependencies.max(0) as u32;
        }
        if let Some(StorageValue::Long(size)) =
            manifest_call(methods::GET_MAX_CUMULATIVE_SIZE_OF_DEPENDENCIES, "long")?
        {
            params.max_cumulative_size_of_dependencies = size.max(0) as u64;
        }
        if let Some(StorageValue::Str(signature)) =
            manifest_call(methods::GET_SIGNATURE, "string")?
        {
            if let Some(scheme) = SignatureScheme::from_name(&signature) {
                params.signature = scheme;
            }
        }

        if let Some(gas_station) = self.store.gas_station()? {
            let gas_station_call = |method: &str, returns: &str| {
                self.self_view_call(manifest, classpath, gas_station, method, returns)
            };

            if let Some(StorageValue::BigInteger(max_gas)) =
                gas_station_call(methods::GET_MAX_GAS_PER_TRANSACTION, "biginteger")?
            {
                params.max_gas_per_transaction = u64::try_from(max_gas).unwrap_or(u64::MAX);
            }
            if let Some(StorageValue::Bool(ignores)) =
                gas_station_call(methods::IGNORES_GAS_PRICE, "boolean")?
            {
                params.ignores_gas_price = ignores;
            }
            if let Some(StorageValue::Long(inflation)) =
                gas_station_call(methods::GET_INFLATION, "long")?
            {
                params.inflation = inflation.max(0) as u64;
            }
        }

        if let Some(versions) = self.store.versions()? {
            if let Some(StorageValue::Int(version)) = self.self_view_call(
                manifest,
                classpath,
                versions,
                methods::GET_VERIFICATION_VERSION,
                "int",
            )? {
                params.verification_version = version.max(0) as u32;
            }
        }

        Ok(params)
    }

    fn recompute_gas_price(&self) {
        let result = (|| -> Result<(), NodeError> {
            let manifest = self.get_manifest()?;
            let classpath = self.get_base_classpath()?;
            let gas_station = self
                .store
                .gas_station()?
                .ok_or_else(|| NodeError::Unexpected("the manifest has no gas station".to_string()))?;

            if let Some(StorageValue::BigInteger(price)) = self.self_view_call(
                manifest,
                classpath,
                gas_station,
                methods::GET_GAS_PRICE,
                "biginteger",
            )? {
                let price = u64::try_from(price).unwrap_or(u64::MAX);
                self.caches.set_gas_price(price);
                info!("the gas price cache has been recomputed: {}", price);
            }

            Ok(())
        })();

        if let Err(error) = result {
            warn!("could not recompute the gas price: {}", error);
        }
    }

    // ===== Outcome helpers: post, poll and interpret =====

    /// Installs an initial jar and yields the reference of its transaction
    pub async fn add_jar_store_initial_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionReference, NodeError> {
        let reference = self.post(request)?;
        match self.get_polled_response(&reference).await? {
            TransactionResponse::JarStoreInitial(_) => Ok(reference),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Creates a gamete and yields its storage reference
    pub async fn add_gamete_creation_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<StorageReference, NodeError> {
        let reference = self.post(request)?;
        match self.get_polled_response(&reference).await? {
            TransactionResponse::GameteCreation(response) => Ok(response.gamete),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Initializes the node with its manifest
    pub async fn add_initialization_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<(), NodeError> {
        let reference = self.post(request)?;
        match self.get_polled_response(&reference).await? {
            TransactionResponse::Initialization => Ok(()),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Installs a jar, paying gas, and yields the reference of its
    /// transaction, usable as classpath afterwards
    pub async fn add_jar_store_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionReference, NodeError> {
        let reference = self.post(request)?;
        match self.get_polled_response(&reference).await? {
            TransactionResponse::JarStore(JarStoreResponse::Successful { .. }) => Ok(reference),
            TransactionResponse::JarStore(JarStoreResponse::Failed { cause, .. }) => {
                Err(NodeError::TransactionFailed(cause))
            }
            other => Err(unexpected_response(&other)),
        }
    }

    /// Runs a constructor and yields the created object
    pub async fn add_constructor_call_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<StorageReference, NodeError> {
        let reference = self.post(request)?;
        match self.get_polled_response(&reference).await? {
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Successful {
                new_object,
                ..
            }) => Ok(new_object),
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Exception {
                cause,
                ..
            }) => Err(NodeError::CodeExecutionFailed(cause)),
            TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed {
                cause, ..
            }) => Err(NodeError::TransactionFailed(cause)),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Runs an instance method and yields its result, None for void
    pub async fn add_instance_method_call_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let reference = self.post(request)?;
        method_outcome_of(self.get_polled_response(&reference).await?)
    }

    /// Runs a static method and yields its result, None for void
    pub async fn add_static_method_call_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Option<StorageValue>, NodeError> {
        let reference = self.post(request)?;
        method_outcome_of(self.get_polled_response(&reference).await?)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected_response(response: &TransactionResponse) -> NodeError {
    NodeError::Unexpected(format!(
        "unexpected response of kind {}",
        response.kind_name()
    ))
}

fn method_outcome_of(response: TransactionResponse) -> Result<Option<StorageValue>, NodeError> {
    match response {
        TransactionResponse::MethodCall(MethodCallResponse::Successful { result, .. }) => {
            Ok(result)
        }
        TransactionResponse::MethodCall(MethodCallResponse::Exception { cause, .. }) => {
            Err(NodeError::CodeExecutionFailed(cause))
        }
        TransactionResponse::MethodCall(MethodCallResponse::Failed { cause, .. }) => {
            Err(NodeError::TransactionFailed(cause))
        }
        other => Err(unexpected_response(&other)),
    }
}
