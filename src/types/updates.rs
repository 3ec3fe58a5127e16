// Updates - Changements d'état produits par une transaction
use super::references::{StorageReference, TransactionReference};
use super::values::StorageValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identité d'un champ: la classe qui le déclare et son nom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId {
    /// Classe qui déclare le champ
    pub defining_class: String,

    /// Nom du champ
    pub name: String,
}

impl FieldId {
    pub fn new(defining_class: &str, name: &str) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.defining_class, self.name)
    }
}

/// Un changement d'état atomique sur un objet du ledger.
///
/// L'identité d'un update de champ est la paire (objet, champ); le class tag
/// est unique par objet et n'est émis que par la transaction créatrice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Update {
    /// Tag de classe: fixe la classe de l'objet et le jar qui la définit
    ClassTag {
        object: StorageReference,
        class: String,
        jar: TransactionReference,
    },

    /// Nouvelle valeur d'un champ
    Field {
        object: StorageReference,
        field: FieldId,
        value: StorageValue,
    },
}

impl Update {
    pub fn object(&self) -> StorageReference {
        match self {
            Update::ClassTag { object, .. } => *object,
            Update::Field { object, .. } => *object,
        }
    }

    /// Deux updates portent sur la même propriété s'ils écrasent la même
    /// information: même champ du même objet, ou deux class tags du même
    /// objet.
    pub fn same_property(&self, other: &Update) -> bool {
        match (self, other) {
            (Update::ClassTag { object: a, .. }, Update::ClassTag { object: b, .. }) => a == b,
            (
                Update::Field {
                    object: a,
                    field: fa,
                    ..
                },
                Update::Field {
                    object: b,
                    field: fb,
                    ..
                },
            ) => a == b && fa == fb,
            _ => false,
        }
    }

    /// Un update est eager si sa valeur est chargée avec l'objet
    pub fn is_eager(&self) -> bool {
        match self {
            Update::ClassTag { .. } => true,
            Update::Field { value, .. } => !value.is_lazy(),
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Update::ClassTag { object, class, jar } => {
                write!(f, "<{}: class {} from {}>", object, class, jar)
            }
            Update::Field {
                object,
                field,
                value,
            } => write!(f, "<{}: {} = {}>", object, field, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ledger::fields;

    fn object(seed: u8) -> StorageReference {
        StorageReference::new(TransactionReference::of_bytes(&[seed]), 0)
    }

    #[test]
    fn test_same_property_field_updates() {
        let update1 = Update::Field {
            object: object(1),
            field: fields::balance(),
            value: StorageValue::BigInteger(100),
        };
        let update2 = Update::Field {
            object: object(1),
            field: fields::balance(),
            value: StorageValue::BigInteger(200),
        };
        let update3 = Update::Field {
            object: object(1),
            field: fields::nonce(),
            value: StorageValue::BigInteger(1),
        };
        let update4 = Update::Field {
            object: object(2),
            field: fields::balance(),
            value: StorageValue::BigInteger(100),
        };

        // same field of the same object, different values
        assert!(update1.same_property(&update2));
        // different field
        assert!(!update1.same_property(&update3));
        // different object
        assert!(!update1.same_property(&update4));
    }

    #[test]
    fn test_same_property_class_tags() {
        let jar = TransactionReference::of_bytes(b"jar");
        let tag1 = Update::ClassTag {
            object: object(1),
            class: "A".to_string(),
            jar,
        };
        let tag2 = Update::ClassTag {
            object: object(1),
            class: "B".to_string(),
            jar,
        };
        let field = Update::Field {
            object: object(1),
            field: fields::balance(),
            value: StorageValue::BigInteger(1),
        };

        assert!(tag1.same_property(&tag2));
        assert!(!tag1.same_property(&field));
    }
}
