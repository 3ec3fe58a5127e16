// History - Read side of the store: state reconstruction and typed readers
//
// The dual of compaction: walking an object's history from newest to
// oldest and keeping the first update seen per property yields the complete
// current state of the object.

use super::store::{Store, StoreError};
use crate::types::ledger::fields;
use crate::types::{
    Balance, FieldId, Nonce, StorageReference, StorageValue, TransactionReference, Update,
};

/// The class tag of an object: its class and the jar that defines it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTagInfo {
    pub class: String,
    pub jar: TransactionReference,
}

impl Store {
    /// Reconstructs the full current state of the given object: the first
    /// update seen per property while walking its history newest to oldest
    pub fn get_state(&self, object: &StorageReference) -> Result<Vec<Update>, StoreError> {
        let mut state: Vec<Update> = Vec::new();

        for reference in self.get_history(object)? {
            let response = self.get_response(&reference)?.ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "history of {} contains {} which is not in store",
                    object, reference
                ))
            })?;

            for update in response.updates() {
                if update.object() == *object
                    && !state.iter().any(|seen| seen.same_property(update))
                {
                    state.push(update.clone());
                }
            }
        }

        Ok(state)
    }

    /// The most recent value of the given field of the given object
    pub fn last_update_to_field(
        &self,
        object: &StorageReference,
        field: &FieldId,
    ) -> Result<Option<StorageValue>, StoreError> {
        for reference in self.get_history(object)? {
            let response = self.get_response(&reference)?.ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "history of {} contains {} which is not in store",
                    object, reference
                ))
            })?;

            for update in response.updates() {
                if let Update::Field {
                    object: updated,
                    field: updated_field,
                    value,
                } = update
                {
                    if updated == object && updated_field == field {
                        return Ok(Some(value.clone()));
                    }
                }
            }
        }

        Ok(None)
    }

    /// The class tag of an object, found in its creating transaction
    pub fn class_tag_of(&self, object: &StorageReference) -> Result<ClassTagInfo, StoreError> {
        let response = self
            .get_response(&object.transaction)?
            .ok_or(StoreError::Unknown(object.transaction))?;

        response
            .updates()
            .iter()
            .find_map(|update| match update {
                Update::ClassTag {
                    object: tagged,
                    class,
                    jar,
                } if tagged == object => Some(ClassTagInfo {
                    class: class.clone(),
                    jar: *jar,
                }),
                _ => None,
            })
            .ok_or_else(|| {
                StoreError::Inconsistent(format!("{} carries no class tag for {}", object.transaction, object))
            })
    }

    fn big_integer_field(
        &self,
        object: &StorageReference,
        field: &FieldId,
    ) -> Result<Option<Balance>, StoreError> {
        match self.last_update_to_field(object, field)? {
            Some(StorageValue::BigInteger(value)) => Ok(Some(value)),
            Some(other) => Err(StoreError::Inconsistent(format!(
                "field {} of {} holds {} instead of a big integer",
                field, object, other
            ))),
            None => Ok(None),
        }
    }

    /// Green balance of a contract; zero if never set
    pub fn balance_of(&self, contract: &StorageReference) -> Result<Balance, StoreError> {
        Ok(self
            .big_integer_field(contract, &fields::balance())?
            .unwrap_or(0))
    }

    /// Red balance of a contract; zero for contracts without red coins
    pub fn red_balance_of(&self, contract: &StorageReference) -> Result<Balance, StoreError> {
        Ok(self
            .big_integer_field(contract, &fields::red_balance())?
            .unwrap_or(0))
    }

    /// Red and green balances together
    pub fn total_balance_of(&self, contract: &StorageReference) -> Result<Balance, StoreError> {
        Ok(self
            .balance_of(contract)?
            .saturating_add(self.red_balance_of(contract)?))
    }

    /// Nonce of an externally owned account
    pub fn nonce_of(&self, account: &StorageReference) -> Result<Nonce, StoreError> {
        let nonce = self
            .big_integer_field(account, &fields::nonce())?
            .ok_or_else(|| {
                StoreError::Inconsistent(format!("{} has no nonce, it is not an account", account))
            })?;

        Nonce::try_from(nonce).map_err(|_| {
            StoreError::Inconsistent(format!("the nonce of {} does not fit in 64 bits", account))
        })
    }

    /// Public key of an externally owned account, hex encoded
    pub fn public_key_of(&self, account: &StorageReference) -> Result<String, StoreError> {
        match self.last_update_to_field(account, &fields::public_key())? {
            Some(StorageValue::Str(key)) => Ok(key),
            Some(other) => Err(StoreError::Inconsistent(format!(
                "public key of {} holds {} instead of a string",
                account, other
            ))),
            None => Err(StoreError::Inconsistent(format!(
                "{} has no public key, it is not an account",
                account
            ))),
        }
    }

    /// The node is initialized once its manifest is set
    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        Ok(self.get_manifest()?.is_some())
    }

    fn manifest_field(&self, field: FieldId) -> Result<Option<StorageReference>, StoreError> {
        match self.get_manifest()? {
            None => Ok(None),
            Some(manifest) => match self.last_update_to_field(&manifest, &field)? {
                Some(StorageValue::Reference(reference)) => Ok(Some(reference)),
                _ => Ok(None),
            },
        }
    }

    /// The gamete of an initialized node
    pub fn gamete(&self) -> Result<Option<StorageReference>, StoreError> {
        self.manifest_field(fields::manifest_gamete())
    }

    /// The gas station of an initialized node
    pub fn gas_station(&self) -> Result<Option<StorageReference>, StoreError> {
        self.manifest_field(fields::manifest_gas_station())
    }

    /// The validators contract of an initialized node
    pub fn validators(&self) -> Result<Option<StorageReference>, StoreError> {
        self.manifest_field(fields::manifest_validators())
    }

    /// The versions object of an initialized node
    pub fn versions(&self) -> Result<Option<StorageReference>, StoreError> {
        self.manifest_field(fields::manifest_versions())
    }

    /// The creator of an event object
    pub fn event_creator_of(
        &self,
        event: &StorageReference,
    ) -> Result<Option<StorageReference>, StoreError> {
        match self.last_update_to_field(event, &fields::event_creator())? {
            Some(StorageValue::Reference(creator)) => Ok(Some(creator)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        GameteCreationResponse, MethodCallResponse, TransactionRequest, TransactionResponse,
    };
    use tempfile::TempDir;

    fn some_request() -> TransactionRequest {
        TransactionRequest::JarStoreInitial {
            jar: vec![9],
            dependencies: vec![],
        }
    }

    fn store_with_account(balance: Balance) -> (TempDir, Store, StorageReference) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let creating = TransactionReference::of_bytes(b"create");
        let account = StorageReference::new(creating, 0);

        let response = TransactionResponse::GameteCreation(GameteCreationResponse {
            updates: vec![
                Update::ClassTag {
                    object: account,
                    class: "moneta.lang.ExternallyOwnedAccount".to_string(),
                    jar: TransactionReference::of_bytes(b"jar"),
                },
                Update::Field {
                    object: account,
                    field: fields::balance(),
                    value: StorageValue::BigInteger(balance),
                },
                Update::Field {
                    object: account,
                    field: fields::nonce(),
                    value: StorageValue::BigInteger(0),
                },
                Update::Field {
                    object: account,
                    field: fields::public_key(),
                    value: StorageValue::Str("aabb".to_string()),
                },
            ],
            gamete: account,
        });
        store.push(creating, &some_request(), &response).unwrap();

        (dir, store, account)
    }

    #[test]
    fn test_typed_readers() {
        let (_dir, store, account) = store_with_account(500);

        assert_eq!(store.balance_of(&account).unwrap(), 500);
        assert_eq!(store.red_balance_of(&account).unwrap(), 0);
        assert_eq!(store.total_balance_of(&account).unwrap(), 500);
        assert_eq!(store.nonce_of(&account).unwrap(), 0);
        assert_eq!(store.public_key_of(&account).unwrap(), "aabb");

        let tag = store.class_tag_of(&account).unwrap();
        assert_eq!(tag.class, "moneta.lang.ExternallyOwnedAccount");
    }

    #[test]
    fn test_state_reconstruction_sees_latest_values() {
        let (_dir, store, account) = store_with_account(500);

        let tx = TransactionReference::of_bytes(b"spend");
        let response = TransactionResponse::MethodCall(MethodCallResponse::Successful {
            result: None,
            updates: vec![
                Update::Field {
                    object: account,
                    field: fields::balance(),
                    value: StorageValue::BigInteger(420),
                },
                Update::Field {
                    object: account,
                    field: fields::nonce(),
                    value: StorageValue::BigInteger(1),
                },
            ],
            events: vec![],
            gas: Default::default(),
        });
        store.push(tx, &some_request(), &response).unwrap();

        assert_eq!(store.balance_of(&account).unwrap(), 420);
        assert_eq!(store.nonce_of(&account).unwrap(), 1);

        // the state carries one update per property: class tag, balance,
        // nonce and public key
        let state = store.get_state(&account).unwrap();
        assert_eq!(state.len(), 4);
        assert!(state.iter().any(|u| matches!(u, Update::ClassTag { .. })));
    }
}
