// Execution Context - The world of one transaction being built
//
// Materializes objects out of the store on first access, keeps a pristine
// snapshot of each, tracks objects created by the transaction, collects
// emitted events and routes every gas charge through the meter. At the end
// of the execution, the updates are the difference between the pool and
// its pristine snapshots.

use crate::gas::{GasError, GasMeter};
use crate::loader::{EngineClassLoader, StorageObject};
use crate::runtime::{RuntimeEnv, RuntimeFailure};
use crate::store::{Store, StoreError};
use crate::types::{
    FieldId, Gas, StorageReference, StorageValue, TransactionReference, Update,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The context of one transaction execution
pub struct ExecutionContext<'a> {
    store: &'a Store,
    loader: Arc<EngineClassLoader>,

    /// The gas meter of the transaction
    pub gas: GasMeter,

    /// The transaction being built, owner of the new objects
    transaction: TransactionReference,

    /// The caller of the transaction
    caller: StorageReference,

    /// UTC time of the execution, in milliseconds
    now_ms: i64,

    /// Index of the next object created by this transaction
    next_progressive: u64,

    /// Materialized objects, by reference
    objects: BTreeMap<StorageReference, StorageObject>,

    /// Snapshot of each materialized object as it was in store
    pristine: BTreeMap<StorageReference, StorageObject>,

    /// Events emitted during the execution, in order
    events: Vec<StorageReference>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        store: &'a Store,
        loader: Arc<EngineClassLoader>,
        gas: GasMeter,
        transaction: TransactionReference,
        caller: StorageReference,
    ) -> Self {
        Self {
            store,
            loader,
            gas,
            transaction,
            caller,
            now_ms: chrono::Utc::now().timestamp_millis(),
            next_progressive: 0,
            objects: BTreeMap::new(),
            pristine: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn loader(&self) -> &EngineClassLoader {
        &self.loader
    }

    pub fn caller(&self) -> StorageReference {
        self.caller
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    pub fn events(&self) -> &[StorageReference] {
        &self.events
    }

    /// Materializes the given object from its history in store
    fn materialize(&mut self, reference: StorageReference) -> Result<(), ContextError> {
        if self.objects.contains_key(&reference) {
            return Ok(());
        }

        let tag = self.store.class_tag_of(&reference)?;

        let mut fields = BTreeMap::new();
        for update in self.store.get_state(&reference)? {
            if let Update::Field { field, value, .. } = update {
                fields.insert(field, value);
            }
        }

        let object = StorageObject::from_storage(reference, tag.class, fields);
        self.pristine.insert(reference, object.clone());
        self.objects.insert(reference, object);
        Ok(())
    }

    /// The materialized object with the given reference
    pub fn object(&mut self, reference: StorageReference) -> Result<&StorageObject, ContextError> {
        self.materialize(reference)?;
        Ok(self
            .objects
            .get(&reference)
            .expect("just materialized"))
    }

    /// The materialized object with the given reference, for modification
    pub fn object_mut(
        &mut self,
        reference: StorageReference,
    ) -> Result<&mut StorageObject, ContextError> {
        self.materialize(reference)?;
        Ok(self
            .objects
            .get_mut(&reference)
            .expect("just materialized"))
    }

    /// Creates a fresh object of the given class, owned by this transaction
    pub fn create_object(&mut self, class: &str) -> Result<StorageReference, ContextError> {
        if !self.loader.class_space().contains(class) {
            return Err(ContextError::UnknownClass(class.to_string()));
        }

        let reference = StorageReference::new(self.transaction, self.next_progressive);
        self.next_progressive += 1;

        self.objects
            .insert(reference, StorageObject::fresh(reference, class.to_string()));
        Ok(reference)
    }

    pub fn add_event(&mut self, event: StorageReference) {
        self.events.push(event);
    }

    /// Extracts the updates induced by the execution: a class tag plus
    /// every field for created objects, the changed fields for objects
    /// materialized from store
    pub fn extract_updates(&self) -> Vec<Update> {
        let mut updates = Vec::new();

        for (reference, object) in &self.objects {
            if object.in_storage {
                let pristine = self.pristine.get(reference);
                for (field, value) in object.fields() {
                    let unchanged = pristine
                        .and_then(|p| p.get(field))
                        .map(|old| old == value)
                        .unwrap_or(false);

                    if !unchanged {
                        updates.push(Update::Field {
                            object: *reference,
                            field: field.clone(),
                            value: value.clone(),
                        });
                    }
                }
            } else {
                updates.push(Update::ClassTag {
                    object: *reference,
                    class: object.class.clone(),
                    jar: self
                        .loader
                        .transaction_that_installed(&object.class)
                        .unwrap_or(self.transaction),
                });

                for (field, value) in object.fields() {
                    updates.push(Update::Field {
                        object: *reference,
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        updates
    }
}

/// Erreurs du contexte d'exécution
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error(transparent)]
    Gas(#[from] GasError),
}

impl From<ContextError> for RuntimeFailure {
    fn from(error: ContextError) -> Self {
        match error {
            ContextError::Gas(gas) => gas.into(),
            other => RuntimeFailure::failed("IllegalStateError", &other.to_string(), ""),
        }
    }
}

impl RuntimeEnv for ExecutionContext<'_> {
    fn charge_cpu(&mut self, amount: Gas) -> Result<(), RuntimeFailure> {
        self.gas.charge_cpu(amount).map_err(RuntimeFailure::from)
    }

    fn charge_ram(&mut self, amount: Gas) -> Result<(), RuntimeFailure> {
        self.gas.charge_ram(amount).map_err(RuntimeFailure::from)
    }

    fn push_gas_fence(&mut self, amount: Gas) -> Result<(), RuntimeFailure> {
        self.gas.push_fence(amount).map_err(RuntimeFailure::from)
    }

    fn pop_gas_fence(&mut self) {
        self.gas.pop_fence();
    }

    fn caller(&self) -> StorageReference {
        self.caller
    }

    fn now(&self) -> i64 {
        self.now_ms
    }

    fn class_of(&mut self, object: StorageReference) -> Result<String, RuntimeFailure> {
        Ok(self.object(object)?.class.clone())
    }

    fn get_field(
        &mut self,
        object: StorageReference,
        field: &FieldId,
    ) -> Result<StorageValue, RuntimeFailure> {
        Ok(self
            .object(object)?
            .get(field)
            .cloned()
            .unwrap_or(StorageValue::Null))
    }

    fn set_field(
        &mut self,
        object: StorageReference,
        field: FieldId,
        value: StorageValue,
    ) -> Result<(), RuntimeFailure> {
        self.object_mut(object)?.set(field, value);
        Ok(())
    }

    fn new_object(&mut self, class: &str) -> Result<StorageReference, RuntimeFailure> {
        Ok(self.create_object(class)?)
    }

    fn emit_event(&mut self, event: StorageReference) {
        self.add_event(event);
    }
}
