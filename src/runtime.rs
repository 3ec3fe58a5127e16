// Runtime - Seam towards the smart-contract language runtime
//
// The engine validates, meters and persists; the actual execution of
// instrumented code is delegated to this collaborator. The runtime sees the
// world only through [`RuntimeEnv`], which routes every resource access
// back through the gas meter and the object pool of the transaction.

use crate::gas::GasError;
use crate::types::{
    ConstructorSignature, FailureInfo, FieldId, Gas, MethodSignature, StorageReference,
    StorageValue,
};

/// The world as seen by running contract code: gas, objects, events, time.
/// Implemented by the execution context of the transaction being built.
pub trait RuntimeEnv {
    /// Charges CPU gas; fails the instant the budget would go negative
    fn charge_cpu(&mut self, amount: Gas) -> Result<(), RuntimeFailure>;

    /// Charges RAM gas
    fn charge_ram(&mut self, amount: Gas) -> Result<(), RuntimeFailure>;

    /// Starts a fenced sub-computation limited to the given gas
    fn push_gas_fence(&mut self, amount: Gas) -> Result<(), RuntimeFailure>;

    /// Ends the innermost fenced sub-computation
    fn pop_gas_fence(&mut self);

    /// The caller of the transaction
    fn caller(&self) -> StorageReference;

    /// UTC time of the execution, in milliseconds
    fn now(&self) -> i64;

    /// The class of the given object
    fn class_of(&mut self, object: StorageReference) -> Result<String, RuntimeFailure>;

    /// Reads a field of an object, materializing the object if needed
    fn get_field(
        &mut self,
        object: StorageReference,
        field: &FieldId,
    ) -> Result<StorageValue, RuntimeFailure>;

    /// Writes a field of an object
    fn set_field(
        &mut self,
        object: StorageReference,
        field: FieldId,
        value: StorageValue,
    ) -> Result<(), RuntimeFailure>;

    /// Allocates a fresh object of the given class, assigning it the next
    /// progressive storage reference of this transaction
    fn new_object(&mut self, class: &str) -> Result<StorageReference, RuntimeFailure>;

    /// Takes note of an event object emitted during the execution
    fn emit_event(&mut self, event: StorageReference);
}

/// Outcome of a constructor run that completed
#[derive(Debug, Clone)]
pub enum ConstructorOutcome {
    /// The constructor created this object
    Created(StorageReference),

    /// The constructor raised an exception it declares. Updates are kept
    /// and gas is refunded, unlike a failure.
    Exception(FailureInfo),
}

/// Outcome of a method run that completed
#[derive(Debug, Clone)]
pub enum MethodOutcome {
    /// The method returned this value, None for void
    Returned(Option<StorageValue>),

    /// The method raised an exception it declares
    Exception(FailureInfo),
}

/// Failure of a run: the transaction is penalized and its object-state
/// changes are discarded
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeFailure {
    #[error("out of gas")]
    OutOfGas,

    #[error("{0}")]
    Failed(FailureInfo),
}

impl RuntimeFailure {
    pub fn failed(class_of_cause: &str, message: &str, site: &str) -> Self {
        RuntimeFailure::Failed(FailureInfo::new(class_of_cause, message, site))
    }

    pub fn into_failure_info(self) -> FailureInfo {
        match self {
            RuntimeFailure::OutOfGas => {
                FailureInfo::new("OutOfGasError", "the transaction ran out of gas", "")
            }
            RuntimeFailure::Failed(info) => info,
        }
    }
}

impl From<GasError> for RuntimeFailure {
    fn from(error: GasError) -> Self {
        match error {
            GasError::OutOfGas { .. } => RuntimeFailure::OutOfGas,
            GasError::Overflow => {
                RuntimeFailure::failed("GasOverflowError", "gas counter overflow", "")
            }
        }
    }
}

/// The contract runtime collaborator: executes instrumented code against
/// the environment of the transaction being built.
pub trait ContractRuntime: Send + Sync {
    /// Runs a constructor with the given deserialized actuals
    fn run_constructor(
        &self,
        env: &mut dyn RuntimeEnv,
        constructor: &ConstructorSignature,
        actuals: &[StorageValue],
    ) -> Result<ConstructorOutcome, RuntimeFailure>;

    /// Runs a method with the given deserialized actuals; the receiver is
    /// None for static methods
    fn run_method(
        &self,
        env: &mut dyn RuntimeEnv,
        method: &MethodSignature,
        receiver: Option<StorageReference>,
        actuals: &[StorageValue],
    ) -> Result<MethodOutcome, RuntimeFailure>;
}
