// Responses - Verified, gas-accounted outcomes of transaction requests
//
// A response mirrors the request kind that produced it. Non-initial
// responses account for the gas actually consumed; failed ones also carry
// the penalty charged for the gas that was promised but never used.

use super::primitives::Gas;
use super::references::{StorageReference, TransactionReference};
use super::updates::Update;
use super::values::StorageValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gas consumed by a non-initial transaction, split by resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasConsumption {
    pub cpu: Gas,
    pub ram: Gas,
    pub storage: Gas,
}

impl GasConsumption {
    pub fn total(&self) -> Gas {
        self.cpu
            .saturating_add(self.ram)
            .saturating_add(self.storage)
    }
}

impl fmt::Display for GasConsumption {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cpu={} ram={} storage={}",
            self.cpu, self.ram, self.storage
        )
    }
}

/// What went wrong, for exception and failure outcomes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Class of the cause, such as an exception class of the contract
    pub class_of_cause: String,

    /// Message of the cause
    pub message_of_cause: String,

    /// Program point where the cause originated, when known
    pub site: String,
}

impl FailureInfo {
    pub fn new(class_of_cause: &str, message_of_cause: &str, site: &str) -> Self {
        Self {
            class_of_cause: class_of_cause.to_string(),
            message_of_cause: message_of_cause.to_string(),
            site: site.to_string(),
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.site.is_empty() {
            write!(f, "{}: {}", self.class_of_cause, self.message_of_cause)
        } else {
            write!(
                f,
                "{}: {} at {}",
                self.class_of_cause, self.message_of_cause, self.site
            )
        }
    }
}

/// Response to an initial jar installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarStoreInitialResponse {
    pub instrumented_jar: Vec<u8>,
    pub dependencies: Vec<TransactionReference>,
    pub verification_version: u32,
}

/// Response to the creation of a gamete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameteCreationResponse {
    pub updates: Vec<Update>,
    pub gamete: StorageReference,
}

/// Response to a non-initial jar installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JarStoreResponse {
    Successful {
        instrumented_jar: Vec<u8>,
        dependencies: Vec<TransactionReference>,
        verification_version: u32,
        updates: Vec<Update>,
        gas: GasConsumption,
    },
    Failed {
        cause: FailureInfo,
        updates: Vec<Update>,
        gas: GasConsumption,
        gas_penalty: Gas,
    },
}

/// Response to a constructor call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructorCallResponse {
    Successful {
        new_object: StorageReference,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumption,
    },
    /// The constructor completed by raising an exception it declares.
    /// Not a failure: gas is refunded and the updates are kept.
    Exception {
        cause: FailureInfo,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumption,
    },
    Failed {
        cause: FailureInfo,
        updates: Vec<Update>,
        gas: GasConsumption,
        gas_penalty: Gas,
    },
}

/// Response to an instance, static or system method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCallResponse {
    Successful {
        /// None for void methods
        result: Option<StorageValue>,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumption,
    },
    /// The method completed by raising an exception it declares
    Exception {
        cause: FailureInfo,
        updates: Vec<Update>,
        events: Vec<StorageReference>,
        gas: GasConsumption,
    },
    Failed {
        cause: FailureInfo,
        updates: Vec<Update>,
        gas: GasConsumption,
        gas_penalty: Gas,
    },
}

/// Tagged union over every response kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionResponse {
    JarStoreInitial(JarStoreInitialResponse),
    GameteCreation(GameteCreationResponse),
    Initialization,
    JarStore(JarStoreResponse),
    ConstructorCall(ConstructorCallResponse),
    MethodCall(MethodCallResponse),
}

impl TransactionResponse {
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            TransactionResponse::JarStoreInitial(_)
                | TransactionResponse::GameteCreation(_)
                | TransactionResponse::Initialization
        )
    }

    /// The state changes carried by this response, possibly none
    pub fn updates(&self) -> &[Update] {
        match self {
            TransactionResponse::JarStoreInitial(_) | TransactionResponse::Initialization => &[],
            TransactionResponse::GameteCreation(response) => &response.updates,
            TransactionResponse::JarStore(response) => match response {
                JarStoreResponse::Successful { updates, .. }
                | JarStoreResponse::Failed { updates, .. } => updates,
            },
            TransactionResponse::ConstructorCall(response) => match response {
                ConstructorCallResponse::Successful { updates, .. }
                | ConstructorCallResponse::Exception { updates, .. }
                | ConstructorCallResponse::Failed { updates, .. } => updates,
            },
            TransactionResponse::MethodCall(response) => match response {
                MethodCallResponse::Successful { updates, .. }
                | MethodCallResponse::Exception { updates, .. }
                | MethodCallResponse::Failed { updates, .. } => updates,
            },
        }
    }

    /// The events emitted during this transaction, possibly none
    pub fn events(&self) -> &[StorageReference] {
        match self {
            TransactionResponse::ConstructorCall(response) => match response {
                ConstructorCallResponse::Successful { events, .. }
                | ConstructorCallResponse::Exception { events, .. } => events,
                ConstructorCallResponse::Failed { .. } => &[],
            },
            TransactionResponse::MethodCall(response) => match response {
                MethodCallResponse::Successful { events, .. }
                | MethodCallResponse::Exception { events, .. } => events,
                MethodCallResponse::Failed { .. } => &[],
            },
            _ => &[],
        }
    }

    /// Gas consumed, for non-initial responses
    pub fn gas(&self) -> Option<GasConsumption> {
        match self {
            TransactionResponse::JarStore(response) => match response {
                JarStoreResponse::Successful { gas, .. }
                | JarStoreResponse::Failed { gas, .. } => Some(*gas),
            },
            TransactionResponse::ConstructorCall(response) => match response {
                ConstructorCallResponse::Successful { gas, .. }
                | ConstructorCallResponse::Exception { gas, .. }
                | ConstructorCallResponse::Failed { gas, .. } => Some(*gas),
            },
            TransactionResponse::MethodCall(response) => match response {
                MethodCallResponse::Successful { gas, .. }
                | MethodCallResponse::Exception { gas, .. }
                | MethodCallResponse::Failed { gas, .. } => Some(*gas),
            },
            _ => None,
        }
    }

    /// Penalty charged for the promised gas never used; zero unless failed
    pub fn gas_penalty(&self) -> Gas {
        match self {
            TransactionResponse::JarStore(JarStoreResponse::Failed { gas_penalty, .. })
            | TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed {
                gas_penalty,
                ..
            })
            | TransactionResponse::MethodCall(MethodCallResponse::Failed {
                gas_penalty, ..
            }) => *gas_penalty,
            _ => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            TransactionResponse::JarStore(JarStoreResponse::Failed { .. })
                | TransactionResponse::ConstructorCall(ConstructorCallResponse::Failed { .. })
                | TransactionResponse::MethodCall(MethodCallResponse::Failed { .. })
        )
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        match self {
            TransactionResponse::JarStore(JarStoreResponse::Failed { cause, .. }) => Some(cause),
            TransactionResponse::ConstructorCall(
                ConstructorCallResponse::Exception { cause, .. }
                | ConstructorCallResponse::Failed { cause, .. },
            ) => Some(cause),
            TransactionResponse::MethodCall(
                MethodCallResponse::Exception { cause, .. }
                | MethodCallResponse::Failed { cause, .. },
            ) => Some(cause),
            _ => None,
        }
    }

    /// The instrumented jar installed by this response, if it installed one
    pub fn instrumented_jar(&self) -> Option<(&[u8], &[TransactionReference], u32)> {
        match self {
            TransactionResponse::JarStoreInitial(response) => Some((
                &response.instrumented_jar,
                &response.dependencies,
                response.verification_version,
            )),
            TransactionResponse::JarStore(JarStoreResponse::Successful {
                instrumented_jar,
                dependencies,
                verification_version,
                ..
            }) => Some((instrumented_jar, dependencies, *verification_version)),
            _ => None,
        }
    }

    /// Serialized length of the response, the basis of its storage gas cost
    pub fn serialized_length(&self) -> u64 {
        match bincode::serialized_size(self) {
            Ok(size) => size,
            Err(_) => 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TransactionResponse::JarStoreInitial(_) => "JarStoreInitial",
            TransactionResponse::GameteCreation(_) => "GameteCreation",
            TransactionResponse::Initialization => "Initialization",
            TransactionResponse::JarStore(_) => "JarStore",
            TransactionResponse::ConstructorCall(_) => "ConstructorCall",
            TransactionResponse::MethodCall(_) => "MethodCall",
        }
    }
}
