// Store - Append-only transaction log with compacted object histories
//
// The store is the single source of truth of the node. It persists, per
// transaction reference, the request and either its response or the error
// that rejected it; per object, the compacted list of transactions whose
// updates reconstruct its current state; and the manifest reference, set
// exactly once when the node is initialized.

use super::db::{Database, DatabaseError, WriteOp};
use crate::types::{
    StorageReference, TransactionReference, TransactionRequest, TransactionResponse, Update,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Storage key prefixes
const PREFIX_REQUEST: &[u8] = b"req:";
const PREFIX_RESPONSE: &[u8] = b"resp:";
const PREFIX_ERROR: &[u8] = b"err:";
const PREFIX_HISTORY: &[u8] = b"hist:";
const KEY_MANIFEST: &[u8] = b"manifest";

/// The store of a node
pub struct Store {
    db: Database,

    /// Serializes all modifications of the store
    write_lock: Mutex<()>,
}

impl Store {
    /// Opens or creates the store inside the given directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open(dir)?,
            write_lock: Mutex::new(()),
        })
    }

    /// Records the request and its response, expands and compacts the
    /// history of every object touched by the updates of the response and,
    /// for an initialization response, records the manifest.
    ///
    /// Write-once: pushing a second response for the same reference is an
    /// error, the coordinator rejects repeated requests before this point.
    pub fn push(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        response: &TransactionResponse,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.db.exists(&response_key(&reference))? {
            return Err(StoreError::AlreadyInStore(reference));
        }

        let mut ops = vec![
            WriteOp::Put {
                key: request_key(&reference),
                value: serialize(request)?,
            },
            WriteOp::Put {
                key: response_key(&reference),
                value: serialize(response)?,
            },
        ];

        self.expand_histories(reference, response.updates(), &mut ops)?;

        if let TransactionResponse::Initialization = response {
            let manifest = match request {
                TransactionRequest::Initialization { manifest, .. } => *manifest,
                _ => return Err(StoreError::Inconsistent("initialization response for a request of another kind".to_string())),
            };

            if self.get_manifest()?.is_some() {
                return Err(StoreError::ManifestAlreadySet);
            }

            ops.push(WriteOp::Put {
                key: KEY_MANIFEST.to_vec(),
                value: serialize(&manifest)?,
            });

            info!("{}: set as manifest", manifest);
            info!("the node has been initialized");
        }

        if let TransactionResponse::GameteCreation(created) = response {
            info!("{}: created as gamete", created.gamete);
        }

        self.db.batch_write(ops)?;
        Ok(())
    }

    /// Records the request and the message that rejected it during delivery
    pub fn push_error(
        &self,
        reference: TransactionReference,
        request: &TransactionRequest,
        message: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        self.db.batch_write(vec![
            WriteOp::Put {
                key: request_key(&reference),
                value: serialize(request)?,
            },
            WriteOp::Put {
                key: error_key(&reference),
                value: message.as_bytes().to_vec(),
            },
        ])?;

        Ok(())
    }

    /// Overwrites the response of a transaction already in store, leaving
    /// histories untouched. Used to persist reverified responses.
    pub fn replace(
        &self,
        reference: TransactionReference,
        response: &TransactionResponse,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if !self.db.exists(&response_key(&reference))? {
            return Err(StoreError::Unknown(reference));
        }

        self.db.put(&response_key(&reference), &serialize(response)?)?;
        Ok(())
    }

    pub fn get_request(
        &self,
        reference: &TransactionReference,
    ) -> Result<Option<TransactionRequest>, StoreError> {
        match self.db.get(&request_key(reference))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_response(
        &self,
        reference: &TransactionReference,
    ) -> Result<Option<TransactionResponse>, StoreError> {
        match self.db.get(&response_key(reference))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The error that rejected the transaction during delivery, if any
    pub fn get_error(&self, reference: &TransactionReference) -> Result<Option<String>, StoreError> {
        Ok(self
            .db
            .get(&error_key(reference))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// The compacted history of the given object, newest first. Empty for
    /// an object the store knows nothing about.
    pub fn get_history(
        &self,
        object: &StorageReference,
    ) -> Result<Vec<TransactionReference>, StoreError> {
        match self.db.get(&history_key(object))? {
            Some(bytes) => Ok(deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_manifest(&self) -> Result<Option<StorageReference>, StoreError> {
        match self.db.get(KEY_MANIFEST)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Recomputes the history of every object touched by the given updates,
    /// queuing the replacement writes into `ops`
    fn expand_histories(
        &self,
        added: TransactionReference,
        updates: &[Update],
        ops: &mut Vec<WriteOp>,
    ) -> Result<(), StoreError> {
        let touched: BTreeSet<StorageReference> =
            updates.iter().map(|update| update.object()).collect();

        for object in touched {
            let simplified = self.simplified_history(object, added, updates)?;
            ops.push(WriteOp::Put {
                key: history_key(&object),
                value: serialize(&simplified)?,
            });
        }

        Ok(())
    }

    /// Prepends `added` to the history of `object` and drops the previous
    /// entries that it fully shadows.
    ///
    /// An old entry survives only if it provides at least one update for a
    /// (object, field) pair not yet covered by a more recent entry. The
    /// oldest entry always survives: it carries the class tag and the
    /// values of the final fields, which are never written again.
    fn simplified_history(
        &self,
        object: StorageReference,
        added: TransactionReference,
        added_updates: &[Update],
    ) -> Result<Vec<TransactionReference>, StoreError> {
        let old = self.get_history(&object)?;

        let mut covered: Vec<Update> = added_updates
            .iter()
            .filter(|update| update.object() == object)
            .cloned()
            .collect();

        let mut simplified = Vec::with_capacity(old.len() + 1);
        simplified.push(added);

        if let Some((oldest, middle)) = old.split_last() {
            for reference in middle {
                self.add_if_uncovered(*reference, object, &mut covered, &mut simplified)?;
            }

            // the oldest is always useful: it contains at least the class tag
            simplified.push(*oldest);
        }

        Ok(simplified)
    }

    /// Keeps `reference` in the history if it updates at least one property
    /// of `object` not yet covered by a more recent entry
    fn add_if_uncovered(
        &self,
        reference: TransactionReference,
        object: StorageReference,
        covered: &mut Vec<Update>,
        history: &mut Vec<TransactionReference>,
    ) -> Result<(), StoreError> {
        let response = self.get_response(&reference)?.ok_or_else(|| {
            StoreError::Inconsistent(format!(
                "history of {} contains {} which is not in store",
                object, reference
            ))
        })?;

        let updates = response.updates();
        if updates.is_empty() {
            return Err(StoreError::Inconsistent(format!(
                "history of {} contains {} which carries no updates",
                object, reference
            )));
        }

        let uncovered: Vec<Update> = updates
            .iter()
            .filter(|update| {
                update.object() == object
                    && !covered.iter().any(|c| update.same_property(c))
            })
            .cloned()
            .collect();

        if !uncovered.is_empty() {
            history.push(reference);
            covered.extend(uncovered);
        }

        Ok(())
    }
}

fn request_key(reference: &TransactionReference) -> Vec<u8> {
    let mut key = PREFIX_REQUEST.to_vec();
    key.extend_from_slice(reference.hash().as_bytes());
    key
}

fn response_key(reference: &TransactionReference) -> Vec<u8> {
    let mut key = PREFIX_RESPONSE.to_vec();
    key.extend_from_slice(reference.hash().as_bytes());
    key
}

fn error_key(reference: &TransactionReference) -> Vec<u8> {
    let mut key = PREFIX_ERROR.to_vec();
    key.extend_from_slice(reference.hash().as_bytes());
    key
}

fn history_key(object: &StorageReference) -> Vec<u8> {
    let mut key = PREFIX_HISTORY.to_vec();
    key.extend_from_slice(object.transaction.hash().as_bytes());
    key.extend_from_slice(&object.progressive.to_le_bytes());
    key
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Erreurs du store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Erreur de base de données: {0}")]
    Database(#[from] DatabaseError),

    #[error("Échec de sérialisation: {0}")]
    Serialization(String),

    #[error("Échec de désérialisation: {0}")]
    Deserialization(String),

    #[error("{0}: already in store")]
    AlreadyInStore(TransactionReference),

    #[error("{0}: unknown transaction reference")]
    Unknown(TransactionReference),

    #[error("the manifest is already set")]
    ManifestAlreadySet,

    #[error("inconsistent store: {0}")]
    Inconsistent(String),
}
