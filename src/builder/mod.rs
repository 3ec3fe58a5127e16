// Builder - One response builder per request kind
//
// A builder is created in two phases. Construction validates the request
// without touching any state: this is what checking a transaction runs.
// Delivery executes the request and produces the response: gas is charged,
// balances move, code runs. A precondition violation is a rejection; a
// failure during execution is a normal, penalized response.

pub mod call;
pub mod context;
pub mod initial;
pub mod jar;
pub mod noninitial;

pub use context::{ContextError, ExecutionContext};

use crate::gas::{GasCostModel, GasError};
use crate::loader::{EngineClassLoader, LoaderError};
use crate::node::caches::NodeCaches;
use crate::node::config::NodeConfig;
use crate::runtime::ContractRuntime;
use crate::store::{Store, StoreError};
use crate::types::{TransactionReference, TransactionRequest, TransactionResponse};
use crate::verifier::{JarVerifier, VerificationError};
use std::sync::Arc;

/// The view of the node that builders work against
#[derive(Clone, Copy)]
pub struct NodeInternal<'a> {
    pub store: &'a Store,
    pub caches: &'a NodeCaches,
    pub verifier: &'a dyn JarVerifier,
    pub runtime: &'a dyn ContractRuntime,
    pub gas_model: &'a dyn GasCostModel,
    pub config: &'a NodeConfig,
}

/// The transaction never executed: no gas charged, no store update beyond
/// an error marker
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransactionRejected(pub String);

impl TransactionRejected {
    pub fn new<S: Into<String>>(message: S) -> Self {
        TransactionRejected(message.into())
    }
}

impl From<LoaderError> for TransactionRejected {
    fn from(error: LoaderError) -> Self {
        TransactionRejected(error.to_string())
    }
}

impl From<StoreError> for TransactionRejected {
    fn from(error: StoreError) -> Self {
        TransactionRejected(error.to_string())
    }
}

impl From<GasError> for TransactionRejected {
    fn from(error: GasError) -> Self {
        TransactionRejected(error.to_string())
    }
}

impl From<VerificationError> for TransactionRejected {
    fn from(error: VerificationError) -> Self {
        TransactionRejected(error.to_string())
    }
}

impl From<ContextError> for TransactionRejected {
    fn from(error: ContextError) -> Self {
        TransactionRejected(error.to_string())
    }
}

/// A validated builder, ready to deliver its response
pub enum ResponseBuilder<'a> {
    JarStoreInitial(initial::JarStoreInitialBuilder<'a>),
    GameteCreation(initial::GameteCreationBuilder<'a>),
    Initialization(initial::InitializationBuilder),
    JarStore(jar::JarStoreBuilder<'a>),
    ConstructorCall(call::ConstructorCallBuilder<'a>),
    InstanceMethodCall(call::InstanceMethodCallBuilder<'a>),
    StaticMethodCall(call::StaticMethodCallBuilder<'a>),
}

impl<'a> ResponseBuilder<'a> {
    /// The class loader of the transaction, when it resolves a classpath
    pub fn class_loader(&self) -> Option<Arc<EngineClassLoader>> {
        match self {
            ResponseBuilder::JarStoreInitial(builder) => builder.class_loader(),
            ResponseBuilder::GameteCreation(builder) => Some(builder.class_loader()),
            ResponseBuilder::Initialization(builder) => Some(builder.class_loader()),
            ResponseBuilder::JarStore(builder) => Some(builder.class_loader()),
            ResponseBuilder::ConstructorCall(builder) => Some(builder.class_loader()),
            ResponseBuilder::InstanceMethodCall(builder) => Some(builder.class_loader()),
            ResponseBuilder::StaticMethodCall(builder) => Some(builder.class_loader()),
        }
    }

    /// Executes the request and produces its response
    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        match self {
            ResponseBuilder::JarStoreInitial(builder) => builder.deliver(),
            ResponseBuilder::GameteCreation(builder) => builder.deliver(),
            ResponseBuilder::Initialization(builder) => builder.deliver(),
            ResponseBuilder::JarStore(builder) => builder.deliver(),
            ResponseBuilder::ConstructorCall(builder) => builder.deliver(),
            ResponseBuilder::InstanceMethodCall(builder) => builder.deliver(),
            ResponseBuilder::StaticMethodCall(builder) => builder.deliver(),
        }
    }
}

/// Builds the validated response builder for the given request. Every
/// precondition violation surfaces here as a rejection.
pub fn response_builder_for<'a>(
    reference: TransactionReference,
    request: &'a TransactionRequest,
    node: NodeInternal<'a>,
) -> Result<ResponseBuilder<'a>, TransactionRejected> {
    match request {
        TransactionRequest::JarStoreInitial { .. } => Ok(ResponseBuilder::JarStoreInitial(
            initial::JarStoreInitialBuilder::new(reference, request, node)?,
        )),
        TransactionRequest::GameteCreation { .. }
        | TransactionRequest::RedGreenGameteCreation { .. } => Ok(ResponseBuilder::GameteCreation(
            initial::GameteCreationBuilder::new(reference, request, node)?,
        )),
        TransactionRequest::Initialization { .. } => Ok(ResponseBuilder::Initialization(
            initial::InitializationBuilder::new(reference, request, node)?,
        )),
        TransactionRequest::JarStore { .. } => Ok(ResponseBuilder::JarStore(
            jar::JarStoreBuilder::new(reference, request, node)?,
        )),
        TransactionRequest::ConstructorCall { .. } => Ok(ResponseBuilder::ConstructorCall(
            call::ConstructorCallBuilder::new(reference, request, node)?,
        )),
        TransactionRequest::InstanceMethodCall { .. }
        | TransactionRequest::InstanceSystemMethodCall { .. } => {
            Ok(ResponseBuilder::InstanceMethodCall(
                call::InstanceMethodCallBuilder::new(reference, request, node, false)?,
            ))
        }
        TransactionRequest::StaticMethodCall { .. } => Ok(ResponseBuilder::StaticMethodCall(
            call::StaticMethodCallBuilder::new(reference, request, node, false)?,
        )),
    }
}
