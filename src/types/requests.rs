// Requests - The nine transaction request kinds accepted by the engine
//
// Initial requests bootstrap a node and consume no gas; they are only legal
// until the manifest is set. Non-initial requests carry a paying caller,
// a nonce, a gas budget and (unless they are system calls) a chain id and
// a signature over their unsigned encoding.

use super::primitives::{Balance, Gas, GasPrice, Nonce};
use super::references::{StorageReference, TransactionReference};
use super::signature::{domain_separate, DOMAIN_REQUEST};
use super::values::StorageValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature of a constructor: its defining class and formal parameter types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstructorSignature {
    pub defining_class: String,
    pub formals: Vec<String>,
}

impl ConstructorSignature {
    pub fn new(defining_class: &str, formals: &[&str]) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            formals: formals.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Display for ConstructorSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.defining_class, self.formals.join(","))
    }
}

/// Signature of a method: defining class, name, formals and return type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub defining_class: String,
    pub name: String,
    pub formals: Vec<String>,
    /// None for void methods
    pub returns: Option<String>,
}

impl MethodSignature {
    pub fn new(defining_class: &str, name: &str, formals: &[&str], returns: Option<&str>) -> Self {
        Self {
            defining_class: defining_class.to_string(),
            name: name.to_string(),
            formals: formals.iter().map(|s| s.to_string()).collect(),
            returns: returns.map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{}({})",
            self.defining_class,
            self.name,
            self.formals.join(",")
        )
    }
}

/// The common part of every signed, gas-paying request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonInitialPayload {
    /// The externally owned account that signs and pays
    pub caller: StorageReference,

    /// Must match the caller's on-chain nonce
    pub nonce: Nonce,

    /// The jar-install transaction whose class space resolves this request
    pub classpath: TransactionReference,

    /// Gas promised, paid for upfront
    pub gas_limit: Gas,

    /// Offered price per unit of gas
    pub gas_price: GasPrice,

    /// Must match the chain id of the node
    pub chain_id: String,

    /// Signature over the unsigned encoding of the request
    pub signature: Vec<u8>,
}

/// Tagged union over every request kind the engine can execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRequest {
    /// Installs a jar before initialization, without paying gas
    JarStoreInitial {
        jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
    },

    /// Creates the gamete, the account holding the initial coin supply
    GameteCreation {
        classpath: TransactionReference,
        initial_amount: Balance,
        public_key: String,
    },

    /// Creates a gamete holding both green and red coins
    RedGreenGameteCreation {
        classpath: TransactionReference,
        green_amount: Balance,
        red_amount: Balance,
        public_key: String,
    },

    /// Marks the node as initialized by installing its manifest
    Initialization {
        classpath: TransactionReference,
        manifest: StorageReference,
    },

    /// Installs a jar, paying gas for verification and storage
    JarStore {
        payload: NonInitialPayload,
        jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
    },

    /// Runs a constructor of the classpath
    ConstructorCall {
        payload: NonInitialPayload,
        constructor: ConstructorSignature,
        actuals: Vec<StorageValue>,
    },

    /// Runs an instance method on a receiver object
    InstanceMethodCall {
        payload: NonInitialPayload,
        method: MethodSignature,
        receiver: StorageReference,
        actuals: Vec<StorageValue>,
    },

    /// Runs a static method of the classpath
    StaticMethodCall {
        payload: NonInitialPayload,
        method: MethodSignature,
        actuals: Vec<StorageValue>,
    },

    /// Unsigned call issued by the node itself, at gas price zero.
    /// Only the engine builds these, for end-of-block bookkeeping.
    InstanceSystemMethodCall {
        caller: StorageReference,
        nonce: Nonce,
        classpath: TransactionReference,
        gas_limit: Gas,
        method: MethodSignature,
        receiver: StorageReference,
        actuals: Vec<StorageValue>,
    },
}

impl TransactionRequest {
    /// The content-addressed reference of this request
    pub fn reference(&self) -> TransactionReference {
        TransactionReference::of_bytes(&self.to_bytes())
    }

    /// Canonical encoding of the request, also the input of [`Self::reference`]
    pub fn to_bytes(&self) -> Vec<u8> {
        match bincode::serialize(self) {
            Ok(bytes) => bytes,
            Err(_) => {
                // cannot happen for these types; keep a deterministic fallback
                // rather than panicking inside reference computation
                self.kind_name().as_bytes().to_vec()
            }
        }
    }

    /// The unsigned encoding: the request with an empty signature slot,
    /// under the request signing domain. This is what callers sign and what
    /// the engine verifies.
    pub fn signed_payload(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        if let Some(payload) = unsigned.payload_mut() {
            payload.signature.clear();
        }
        domain_separate(DOMAIN_REQUEST, &unsigned.to_bytes())
    }

    /// The same request, carrying the given signature. Meaningless for
    /// unsigned request kinds, which are returned unchanged.
    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        if let Some(payload) = self.payload_mut() {
            payload.signature = signature;
        }
        self
    }

    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionRequest::JarStoreInitial { .. }
                | TransactionRequest::GameteCreation { .. }
                | TransactionRequest::RedGreenGameteCreation { .. }
                | TransactionRequest::Initialization { .. }
        )
    }

    /// System calls are issued by the node itself and carry no signature
    pub fn is_system(&self) -> bool {
        matches!(self, TransactionRequest::InstanceSystemMethodCall { .. })
    }

    pub fn payload(&self) -> Option<&NonInitialPayload> {
        match self {
            TransactionRequest::JarStore { payload, .. }
            | TransactionRequest::ConstructorCall { payload, .. }
            | TransactionRequest::InstanceMethodCall { payload, .. }
            | TransactionRequest::StaticMethodCall { payload, .. } => Some(payload),
            _ => None,
        }
    }

    fn payload_mut(&mut self) -> Option<&mut NonInitialPayload> {
        match self {
            TransactionRequest::JarStore { payload, .. }
            | TransactionRequest::ConstructorCall { payload, .. }
            | TransactionRequest::InstanceMethodCall { payload, .. }
            | TransactionRequest::StaticMethodCall { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// The paying caller, for any non-initial request
    pub fn caller(&self) -> Option<StorageReference> {
        match self {
            TransactionRequest::InstanceSystemMethodCall { caller, .. } => Some(*caller),
            _ => self.payload().map(|p| p.caller),
        }
    }

    pub fn nonce(&self) -> Option<Nonce> {
        match self {
            TransactionRequest::InstanceSystemMethodCall { nonce, .. } => Some(*nonce),
            _ => self.payload().map(|p| p.nonce),
        }
    }

    pub fn gas_limit(&self) -> Option<Gas> {
        match self {
            TransactionRequest::InstanceSystemMethodCall { gas_limit, .. } => Some(*gas_limit),
            _ => self.payload().map(|p| p.gas_limit),
        }
    }

    /// Gas price of the request; system calls always run at price zero
    pub fn gas_price(&self) -> Option<GasPrice> {
        match self {
            TransactionRequest::InstanceSystemMethodCall { .. } => Some(0),
            _ => self.payload().map(|p| p.gas_price),
        }
    }

    /// The classpath whose class space resolves this request
    pub fn classpath(&self) -> Option<TransactionReference> {
        match self {
            TransactionRequest::GameteCreation { classpath, .. }
            | TransactionRequest::RedGreenGameteCreation { classpath, .. }
            | TransactionRequest::Initialization { classpath, .. }
            | TransactionRequest::InstanceSystemMethodCall { classpath, .. } => Some(*classpath),
            _ => self.payload().map(|p| p.classpath),
        }
    }

    /// Short name of the request kind, for logging
    pub fn kind_name(&self) -> &'static str {
        match self {
            TransactionRequest::JarStoreInitial { .. } => "JarStoreInitial",
            TransactionRequest::GameteCreation { .. } => "GameteCreation",
            TransactionRequest::RedGreenGameteCreation { .. } => "RedGreenGameteCreation",
            TransactionRequest::Initialization { .. } => "Initialization",
            TransactionRequest::JarStore { .. } => "JarStore",
            TransactionRequest::ConstructorCall { .. } => "ConstructorCall",
            TransactionRequest::InstanceMethodCall { .. } => "InstanceMethodCall",
            TransactionRequest::StaticMethodCall { .. } => "StaticMethodCall",
            TransactionRequest::InstanceSystemMethodCall { .. } => "InstanceSystemMethodCall",
        }
    }

    /// Serialized length of the request, the basis of its storage gas cost
    pub fn serialized_length(&self) -> u64 {
        match bincode::serialized_size(self) {
            Ok(size) => size,
            Err(_) => self.to_bytes().len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::signature::{Keypair, SignatureScheme};

    fn payload_with_signature(signature: Vec<u8>) -> NonInitialPayload {
        NonInitialPayload {
            caller: StorageReference::new(TransactionReference::of_bytes(b"creator"), 0),
            nonce: 3,
            classpath: TransactionReference::of_bytes(b"jar"),
            gas_limit: 10_000,
            gas_price: 2,
            chain_id: "moneta-test".to_string(),
            signature,
        }
    }

    #[test]
    fn test_reference_is_content_addressed() {
        let request = TransactionRequest::JarStoreInitial {
            jar: vec![1, 2, 3],
            dependencies: vec![],
        };
        assert_eq!(request.reference(), request.clone().reference());

        let other = TransactionRequest::JarStoreInitial {
            jar: vec![1, 2, 4],
            dependencies: vec![],
        };
        assert_ne!(request.reference(), other.reference());
    }

    #[test]
    fn test_signed_payload_ignores_signature() {
        let request1 = TransactionRequest::StaticMethodCall {
            payload: payload_with_signature(vec![1; 64]),
            method: MethodSignature::new("a.B", "m", &[], None),
            actuals: vec![],
        };
        let request2 = TransactionRequest::StaticMethodCall {
            payload: payload_with_signature(vec![2; 64]),
            method: MethodSignature::new("a.B", "m", &[], None),
            actuals: vec![],
        };

        // the unsigned encoding is the same, the reference is not
        assert_eq!(request1.signed_payload(), request2.signed_payload());
        assert_ne!(request1.reference(), request2.reference());
    }

    #[test]
    fn test_sign_then_verify() {
        let keypair = Keypair::generate(SignatureScheme::Ed25519);
        let mut request = TransactionRequest::StaticMethodCall {
            payload: payload_with_signature(vec![]),
            method: MethodSignature::new("a.B", "m", &[], None),
            actuals: vec![],
        };

        let signature = keypair.sign(&request.signed_payload());
        if let Some(payload) = request.payload_mut() {
            payload.signature = signature.clone();
        }

        assert!(SignatureScheme::Ed25519.verify(
            &keypair.public_key_hex(),
            &request.signed_payload(),
            &signature,
        ));
    }

    #[test]
    fn test_system_call_runs_at_price_zero() {
        let request = TransactionRequest::InstanceSystemMethodCall {
            caller: StorageReference::new(TransactionReference::of_bytes(b"m"), 0),
            nonce: 0,
            classpath: TransactionReference::of_bytes(b"jar"),
            gas_limit: 100_000,
            method: MethodSignature::new("moneta.system.Validators", "reward", &[], None),
            receiver: StorageReference::new(TransactionReference::of_bytes(b"v"), 0),
            actuals: vec![],
        };

        assert_eq!(request.gas_price(), Some(0));
        assert!(!request.is_initial());
        assert!(request.is_system());
    }
}
