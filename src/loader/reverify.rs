// Reverification - Lazy re-check of jars verified under older rule-sets
//
// When the verification rules of the node change version, jars already in
// store were checked under the old rules. The class loader re-verifies them
// transparently on first use; after a successful delivery, the coordinator
// persists the reverified responses so that subsequent loads are cheap.

use super::LoaderError;
use crate::store::{Store, StoreError};
use crate::types::{
    FailureInfo, JarStoreInitialResponse, JarStoreResponse, TransactionReference,
    TransactionRequest, TransactionResponse,
};
use crate::verifier::JarVerifier;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

/// The reverifications performed while building one class loader
pub struct Reverification {
    /// Responses whose verification version differed from that of the node
    /// and that have consequently been reverified
    reverified: Mutex<HashMap<TransactionReference, TransactionResponse>>,
}

impl Reverification {
    /// No reverification requested
    pub fn empty() -> Self {
        Self {
            reverified: Mutex::new(HashMap::new()),
        }
    }

    /// Reverifies the given transactions and their dependencies, which must
    /// all have installed jars in store
    pub fn new(
        transactions: &[TransactionReference],
        store: &Store,
        verifier: &dyn JarVerifier,
        verification_version: u32,
        max_dependencies: u32,
    ) -> Result<Self, LoaderError> {
        let reverification = Self::empty();
        let mut counter = 0u32;

        for transaction in transactions {
            reverification.reverify(
                *transaction,
                store,
                verifier,
                verification_version,
                max_dependencies,
                &mut counter,
            )?;
        }

        Ok(reverification)
    }

    /// The reverified response for the given transaction, if any
    pub fn get_reverified(&self, transaction: &TransactionReference) -> Option<TransactionResponse> {
        self.reverified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(transaction)
            .cloned()
    }

    /// Persists every reverified response into the store, then forgets
    /// them to avoid repeated replacement if the loader is recycled
    pub fn replace_into(&self, store: &Store) -> Result<(), StoreError> {
        let mut reverified = self.reverified.lock().unwrap_or_else(|e| e.into_inner());

        for (reference, response) in reverified.iter() {
            store.replace(*reference, response)?;
            info!("{}: updated after reverification", reference);
        }

        reverified.clear();
        Ok(())
    }

    /// Reverifies one transaction and its dependencies. Returns false if
    /// this transaction or one of its dependencies failed reverification.
    fn reverify(
        &self,
        transaction: TransactionReference,
        store: &Store,
        verifier: &dyn JarVerifier,
        verification_version: u32,
        max_dependencies: u32,
        counter: &mut u32,
    ) -> Result<bool, LoaderError> {
        *counter += 1;
        if *counter > max_dependencies {
            return Err(LoaderError::TooManyDependencies {
                max: max_dependencies,
            });
        }

        let response = self
            .get_reverified(&transaction)
            .map(Ok)
            .unwrap_or_else(|| {
                store
                    .get_response(&transaction)?
                    .ok_or(LoaderError::UnknownTransaction(transaction))
            })?;

        let (old_jar, dependencies, old_version) = match response.instrumented_jar() {
            Some((jar, dependencies, version)) => {
                (jar.to_vec(), dependencies.to_vec(), version)
            }
            None => return Ok(false),
        };

        let mut dependencies_ok = true;
        for dependency in &dependencies {
            dependencies_ok &= self.reverify(
                *dependency,
                store,
                verifier,
                verification_version,
                max_dependencies,
                counter,
            )?;
        }

        if !dependencies_ok {
            self.transform_into_failed(
                transaction,
                &response,
                "the reverification of a dependency failed",
            )?;
            return Ok(false);
        }

        if old_version == verification_version {
            return Ok(true);
        }

        // the dependencies passed, but this jar was verified under another
        // rule-set version: verify its original code again
        let raw_jar = raw_jar_of(store, &transaction)?;
        match verifier.verify(&raw_jar, verification_version) {
            Ok(_) => {
                // the old instrumented code is still valid, only the
                // version stamp changes
                self.update_version(transaction, &response, old_jar, dependencies, verification_version);
                Ok(true)
            }
            Err(error) => {
                warn!("{}: reverification failed: {}", transaction, error);
                self.transform_into_failed(transaction, &response, &error.to_string())?;
                Ok(false)
            }
        }
    }

    fn update_version(
        &self,
        transaction: TransactionReference,
        response: &TransactionResponse,
        instrumented_jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
        verification_version: u32,
    ) {
        let replacement = match response {
            TransactionResponse::JarStoreInitial(_) => {
                TransactionResponse::JarStoreInitial(JarStoreInitialResponse {
                    instrumented_jar,
                    dependencies,
                    verification_version,
                })
            }
            TransactionResponse::JarStore(JarStoreResponse::Successful {
                updates, gas, ..
            }) => TransactionResponse::JarStore(JarStoreResponse::Successful {
                instrumented_jar,
                dependencies,
                verification_version,
                updates: updates.clone(),
                gas: *gas,
            }),
            // instrumented_jar() already guaranteed one of the above
            _ => return,
        };

        self.reverified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(transaction, replacement);
    }

    fn transform_into_failed(
        &self,
        transaction: TransactionReference,
        response: &TransactionResponse,
        error: &str,
    ) -> Result<(), LoaderError> {
        let replacement = match response {
            TransactionResponse::JarStoreInitial(_) => {
                // without its initial jars the node cannot work at all
                return Err(LoaderError::Inconsistent(format!(
                    "the reverification of the initial jar store transaction {} failed: its jar cannot be used",
                    transaction
                )));
            }
            TransactionResponse::JarStore(JarStoreResponse::Successful {
                updates, gas, ..
            }) => TransactionResponse::JarStore(JarStoreResponse::Failed {
                cause: FailureInfo::new("VerificationError", error, ""),
                updates: updates.clone(),
                gas: *gas,
                gas_penalty: 0,
            }),
            _ => return Ok(()),
        };

        self.reverified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(transaction, replacement);

        Ok(())
    }
}

/// The raw jar that the given transaction had requested to install
fn raw_jar_of(store: &Store, transaction: &TransactionReference) -> Result<Vec<u8>, LoaderError> {
    let request = store
        .get_request(transaction)?
        .ok_or(LoaderError::UnknownTransaction(*transaction))?;

    match request {
        TransactionRequest::JarStoreInitial { jar, .. }
        | TransactionRequest::JarStore { jar, .. } => Ok(jar),
        _ => Err(LoaderError::DidNotInstallJar(*transaction)),
    }
}
