// Primitives Moneta - Types fondamentaux minimaux
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash universel (Blake3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash des données avec Blake3
    pub fn hash(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Hash(*hash.as_bytes())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }
}

/// Balance en unités de coin (u128 = suffisant pour des siècles)
pub type Balance = u128;

/// Nonce pour prévenir replay attacks
pub type Nonce = u64;

/// Unités de gas promises ou consommées par une transaction
pub type Gas = u64;

/// Prix d'une unité de gas, en unités de coin
pub type GasPrice = u64;

/// Coût total d'un achat de gas. Calculé en u128 pour éviter l'overflow
/// de gas × prix.
pub fn cost_of(gas: Gas, price: GasPrice) -> Balance {
    (gas as u128) * (price as u128)
}
