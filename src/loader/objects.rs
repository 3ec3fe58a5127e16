// Objects - Objets du ledger matérialisés en mémoire
//
// Typed access to the ledger-defined shapes (balances, nonce, public key)
// is direct field access into the materialized map, never reflection.

use crate::types::ledger::fields;
use crate::types::{Balance, FieldId, Nonce, StorageReference, StorageValue};
use std::collections::BTreeMap;

/// Un objet du ledger matérialisé pendant une transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    /// Identité de l'objet
    pub reference: StorageReference,

    /// Classe de l'objet
    pub class: String,

    /// Marqueur: l'objet vient du store (true) ou a été créé par la
    /// transaction courante (false)
    pub in_storage: bool,

    fields: BTreeMap<FieldId, StorageValue>,
}

impl StorageObject {
    /// Matérialise un objet depuis son état reconstruit
    pub fn from_storage(
        reference: StorageReference,
        class: String,
        fields: BTreeMap<FieldId, StorageValue>,
    ) -> Self {
        Self {
            reference,
            class,
            in_storage: true,
            fields,
        }
    }

    /// Crée un objet neuf, encore vide, pour la transaction courante
    pub fn fresh(reference: StorageReference, class: String) -> Self {
        Self {
            reference,
            class,
            in_storage: false,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &FieldId) -> Option<&StorageValue> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: FieldId, value: StorageValue) {
        self.fields.insert(field, value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&FieldId, &StorageValue)> {
        self.fields.iter()
    }

    // Accès typés aux formes reconnues par le moteur

    /// Balance verte; zéro si jamais écrite
    pub fn balance(&self) -> Balance {
        match self.get(&fields::balance()) {
            Some(StorageValue::BigInteger(value)) => *value,
            _ => 0,
        }
    }

    pub fn set_balance(&mut self, value: Balance) {
        self.set(fields::balance(), StorageValue::BigInteger(value));
    }

    /// Balance rouge; zéro pour les contrats sans monnaie rouge
    pub fn red_balance(&self) -> Balance {
        match self.get(&fields::red_balance()) {
            Some(StorageValue::BigInteger(value)) => *value,
            _ => 0,
        }
    }

    pub fn set_red_balance(&mut self, value: Balance) {
        self.set(fields::red_balance(), StorageValue::BigInteger(value));
    }

    pub fn total_balance(&self) -> Balance {
        self.balance().saturating_add(self.red_balance())
    }

    pub fn nonce(&self) -> Nonce {
        match self.get(&fields::nonce()) {
            Some(StorageValue::BigInteger(value)) => Nonce::try_from(*value).unwrap_or(Nonce::MAX),
            _ => 0,
        }
    }

    pub fn set_nonce(&mut self, value: Nonce) {
        self.set(fields::nonce(), StorageValue::BigInteger(value as u128));
    }

    pub fn public_key(&self) -> Option<&str> {
        match self.get(&fields::public_key()) {
            Some(StorageValue::Str(key)) => Some(key),
            _ => None,
        }
    }

    pub fn set_public_key(&mut self, key: &str) {
        self.set(fields::public_key(), StorageValue::Str(key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionReference;

    fn object() -> StorageObject {
        StorageObject::fresh(
            StorageReference::new(TransactionReference::of_bytes(b"tx"), 0),
            "moneta.lang.ExternallyOwnedAccount".to_string(),
        )
    }

    #[test]
    fn test_typed_accessors() {
        let mut account = object();

        assert_eq!(account.balance(), 0);
        account.set_balance(1_000);
        account.set_red_balance(50);
        account.set_nonce(7);
        account.set_public_key("aabb");

        assert_eq!(account.balance(), 1_000);
        assert_eq!(account.red_balance(), 50);
        assert_eq!(account.total_balance(), 1_050);
        assert_eq!(account.nonce(), 7);
        assert_eq!(account.public_key(), Some("aabb"));
    }

    #[test]
    fn test_fresh_objects_are_not_in_storage() {
        assert!(!object().in_storage);
    }
}
