// Values - Valeurs stockables dans les champs des objets du ledger
use super::primitives::Balance;
use super::references::StorageReference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Valeur d'un champ ou d'un argument de transaction.
///
/// Les valeurs "eager" sont chargées avec l'objet qui les contient; les
/// références vers d'autres objets sont "lazy" et ne sont résolues que
/// lorsque le code exécuté les traverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    BigInteger(Balance),
    Str(String),
    Enum { class: String, name: String },
    Reference(StorageReference),
}

impl StorageValue {
    /// Une valeur est lazy si c'est une référence vers un autre objet
    pub fn is_lazy(&self) -> bool {
        matches!(self, StorageValue::Reference(_))
    }

    pub fn as_big_integer(&self) -> Option<Balance> {
        match self {
            StorageValue::BigInteger(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StorageValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<StorageReference> {
        match self {
            StorageValue::Reference(reference) => Some(*reference),
            _ => None,
        }
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageValue::Null => write!(f, "null"),
            StorageValue::Bool(value) => write!(f, "{}", value),
            StorageValue::Int(value) => write!(f, "{}", value),
            StorageValue::Long(value) => write!(f, "{}", value),
            StorageValue::BigInteger(value) => write!(f, "{}", value),
            StorageValue::Str(value) => write!(f, "\"{}\"", value),
            StorageValue::Enum { class, name } => write!(f, "{}::{}", class, name),
            StorageValue::Reference(reference) => write!(f, "{}", reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::references::TransactionReference;

    #[test]
    fn test_lazy_values() {
        let tx = TransactionReference::of_bytes(b"tx");
        assert!(StorageValue::Reference(StorageReference::new(tx, 0)).is_lazy());
        assert!(!StorageValue::BigInteger(42).is_lazy());
        assert!(!StorageValue::Null.is_lazy());
    }
}
