// Ledger - Well-known classes, fields and methods of the base classpath
//
// The base jar installed at node bootstrap defines the contract hierarchy
// that the engine must recognize natively: contracts, accounts, the manifest
// and its satellite objects. The engine refers to them by name only; their
// code lives in the installed jar like any other contract.

use super::updates::FieldId;

// Classes de base du ledger
pub const STORAGE_CLASS: &str = "moneta.lang.Storage";
pub const CONTRACT_CLASS: &str = "moneta.lang.Contract";
pub const RED_GREEN_CONTRACT_CLASS: &str = "moneta.lang.RedGreenContract";
pub const EOA_CLASS: &str = "moneta.lang.ExternallyOwnedAccount";
pub const RED_GREEN_EOA_CLASS: &str = "moneta.lang.RedGreenExternallyOwnedAccount";

// Accounts that fix their own signature scheme, overriding the consensus
pub const ACCOUNT_ED25519_CLASS: &str = "moneta.lang.AccountED25519";
pub const ACCOUNT_SR25519_CLASS: &str = "moneta.lang.AccountSR25519";
pub const EVENT_CLASS: &str = "moneta.lang.Event";
pub const MANIFEST_CLASS: &str = "moneta.system.Manifest";
pub const VALIDATORS_CLASS: &str = "moneta.system.Validators";
pub const GAS_STATION_CLASS: &str = "moneta.system.GasStation";
pub const VERSIONS_CLASS: &str = "moneta.system.Versions";

// Events that force the node to refresh its caches
pub const GAS_PRICE_UPDATE_EVENT: &str = "moneta.system.GasPriceUpdate";
pub const CONSENSUS_UPDATE_EVENT: &str = "moneta.system.ConsensusUpdate";

/// Champs reconnus nativement par le moteur
pub mod fields {
    use super::*;

    pub fn balance() -> FieldId {
        FieldId::new(CONTRACT_CLASS, "balance")
    }

    pub fn red_balance() -> FieldId {
        FieldId::new(RED_GREEN_CONTRACT_CLASS, "redBalance")
    }

    pub fn nonce() -> FieldId {
        FieldId::new(EOA_CLASS, "nonce")
    }

    pub fn public_key() -> FieldId {
        FieldId::new(EOA_CLASS, "publicKey")
    }

    pub fn event_creator() -> FieldId {
        FieldId::new(EVENT_CLASS, "creator")
    }

    pub fn manifest_gamete() -> FieldId {
        FieldId::new(MANIFEST_CLASS, "gamete")
    }

    pub fn manifest_gas_station() -> FieldId {
        FieldId::new(MANIFEST_CLASS, "gasStation")
    }

    pub fn manifest_validators() -> FieldId {
        FieldId::new(MANIFEST_CLASS, "validators")
    }

    pub fn manifest_versions() -> FieldId {
        FieldId::new(MANIFEST_CLASS, "versions")
    }
}

/// Méthodes invoquées par le moteur lui-même
pub mod methods {
    /// Reward method on the validators contract, called at end of block
    pub const VALIDATORS_REWARD: &str = "reward";

    // Consensus getters, run as view calls against the manifest and its
    // satellite objects when the caches must be recomputed
    pub const GET_CHAIN_ID: &str = "getChainId";
    pub const GET_MAX_ERROR_LENGTH: &str = "getMaxErrorLength";
    pub const GET_MAX_DEPENDENCIES: &str = "getMaxDependencies";
    pub const GET_MAX_CUMULATIVE_SIZE_OF_DEPENDENCIES: &str =
        "getMaxCumulativeSizeOfDependencies";
    pub const GET_SIGNATURE: &str = "getSignature";
    pub const GET_MAX_GAS_PER_TRANSACTION: &str = "getMaxGasPerTransaction";
    pub const IGNORES_GAS_PRICE: &str = "ignoresGasPrice";
    pub const GET_GAS_PRICE: &str = "getGasPrice";
    pub const GET_INFLATION: &str = "getInflation";
    pub const GET_VERIFICATION_VERSION: &str = "getVerificationVersion";
}
