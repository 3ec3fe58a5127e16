// References - Clés du log de transactions et des objets du ledger
use super::primitives::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Référence d'une transaction: hash Blake3 du contenu de la requête.
/// C'est la clé primaire du log, globalement unique par contenu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionReference(Hash);

impl TransactionReference {
    pub fn new(hash: Hash) -> Self {
        TransactionReference(hash)
    }

    /// Calcule la référence d'une requête sérialisée
    pub fn of_bytes(request_bytes: &[u8]) -> Self {
        TransactionReference(Hash::hash(request_bytes))
    }

    pub fn hash(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for TransactionReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// Référence d'un objet du ledger: la transaction qui l'a créé, plus un
/// index progressif parmi les objets créés par cette même transaction.
/// Immuable une fois créée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageReference {
    /// La transaction qui a créé l'objet
    pub transaction: TransactionReference,

    /// Index progressif dans cette transaction
    pub progressive: u64,
}

impl StorageReference {
    pub fn new(transaction: TransactionReference, progressive: u64) -> Self {
        Self {
            transaction,
            progressive,
        }
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.transaction, self.progressive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_of_bytes_deterministic() {
        let r1 = TransactionReference::of_bytes(b"request");
        let r2 = TransactionReference::of_bytes(b"request");
        assert_eq!(r1, r2);
        assert_ne!(r1, TransactionReference::of_bytes(b"other"));
    }

    #[test]
    fn test_storage_reference_ordering() {
        let tx = TransactionReference::of_bytes(b"tx");
        let a = StorageReference::new(tx, 0);
        let b = StorageReference::new(tx, 1);
        assert!(a < b);
    }
}
