// Fixtures - In-test verifier, contract runtime and bootstrap helpers
//
// The jar format of the tests is a bincode-encoded list of class
// definitions; the instrumented form carries the verification version it
// was checked under. The runtime dispatches on constructor and method
// names and exercises gas charging, object creation, field access, events
// and declared exceptions.

use crate::loader::{ClassDef, FieldDef};
use crate::node::{ConsensusParams, Node, NodeConfig};
use crate::runtime::{
    ConstructorOutcome, ContractRuntime, MethodOutcome, RuntimeEnv, RuntimeFailure,
};
use crate::types::ledger::{self, fields};
use crate::types::{
    Balance, ConstructorSignature, FailureInfo, FieldId, Gas, Keypair, MethodSignature,
    Nonce, NonInitialPayload, SignatureScheme, StorageReference, StorageValue,
    TransactionReference, TransactionRequest,
};
use crate::verifier::{JarVerifier, VerificationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::TempDir;

pub const CHAIN_ID: &str = "moneta-test";
pub const GAS_PRICE: u64 = 100;
pub const DEFAULT_GAS_LIMIT: Gas = 1_000_000;
pub const GAMETE_FUNDS: Balance = 1_000_000_000_000;

pub const COUNTER_CLASS: &str = "test.Counter";

// ===== Jars =====

pub fn jar_of(classes: &[ClassDef]) -> Vec<u8> {
    bincode::serialize(&classes.to_vec()).unwrap()
}

/// The base jar: the ledger hierarchy, the system objects and the test
/// contracts
pub fn base_jar() -> Vec<u8> {
    let storage = ledger::STORAGE_CLASS;

    jar_of(&[
        ClassDef::new(storage, None, vec![]),
        ClassDef::new(
            ledger::CONTRACT_CLASS,
            Some(storage),
            vec![FieldDef::new("balance", "biginteger")],
        ),
        ClassDef::new(
            ledger::RED_GREEN_CONTRACT_CLASS,
            Some(ledger::CONTRACT_CLASS),
            vec![FieldDef::new("redBalance", "biginteger")],
        ),
        ClassDef::new(
            ledger::EOA_CLASS,
            Some(ledger::CONTRACT_CLASS),
            vec![
                FieldDef::new("nonce", "biginteger"),
                FieldDef::final_field("publicKey", "string"),
            ],
        ),
        ClassDef::new(
            ledger::RED_GREEN_EOA_CLASS,
            Some(ledger::RED_GREEN_CONTRACT_CLASS),
            vec![
                FieldDef::new("nonce", "biginteger"),
                FieldDef::final_field("publicKey", "string"),
            ],
        ),
        ClassDef::new(
            ledger::EVENT_CLASS,
            Some(storage),
            vec![FieldDef::new("creator", storage)],
        ),
        ClassDef::new(ledger::CONSENSUS_UPDATE_EVENT, Some(ledger::EVENT_CLASS), vec![]),
        ClassDef::new(ledger::GAS_PRICE_UPDATE_EVENT, Some(ledger::EVENT_CLASS), vec![]),
        ClassDef::new(
            ledger::MANIFEST_CLASS,
            Some(ledger::EOA_CLASS),
            vec![
                FieldDef::new("chainId", "string"),
                FieldDef::new("gamete", storage),
                FieldDef::new("gasStation", storage),
                FieldDef::new("validators", storage),
                FieldDef::new("versions", storage),
            ],
        ),
        ClassDef::new(ledger::VALIDATORS_CLASS, Some(ledger::CONTRACT_CLASS), vec![]),
        ClassDef::new(
            ledger::GAS_STATION_CLASS,
            Some(ledger::CONTRACT_CLASS),
            vec![FieldDef::new("gasPrice", "biginteger")],
        ),
        ClassDef::new(
            ledger::VERSIONS_CLASS,
            Some(storage),
            vec![FieldDef::new("verificationVersion", "int")],
        ),
        ClassDef::new(
            COUNTER_CLASS,
            Some(storage),
            vec![FieldDef::new("count", "biginteger")],
        ),
    ])
}

#[derive(Serialize, Deserialize)]
struct InstrumentedBlob {
    verification_version: u32,
    classes: Vec<ClassDef>,
}

/// Verifier of the tests: decodes the jar, rejects marked classes and
/// stamps the instrumented form with the verification version
pub struct TestVerifier;

impl JarVerifier for TestVerifier {
    fn verify(
        &self,
        jar: &[u8],
        verification_version: u32,
    ) -> Result<Vec<u8>, VerificationError> {
        let classes: Vec<ClassDef> = bincode::deserialize(jar)
            .map_err(|e| VerificationError::Malformed(e.to_string()))?;

        for class in &classes {
            if class.name.contains("Unverifiable") {
                return Err(VerificationError::Failed(format!(
                    "class {} cannot be verified",
                    class.name
                )));
            }

            // classes named test.FailsAtVersionN fail under version N and above
            if let Some(suffix) = class.name.strip_prefix("test.FailsAtVersion") {
                if suffix
                    .parse::<u32>()
                    .map(|v| verification_version >= v)
                    .unwrap_or(false)
                {
                    return Err(VerificationError::Failed(format!(
                        "class {} violates the rules of version {}",
                        class.name, verification_version
                    )));
                }
            }
        }

        bincode::serialize(&InstrumentedBlob {
            verification_version,
            classes,
        })
        .map_err(|e| VerificationError::Malformed(e.to_string()))
    }

    fn classes_of(&self, instrumented_jar: &[u8]) -> Result<Vec<ClassDef>, VerificationError> {
        bincode::deserialize::<InstrumentedBlob>(instrumented_jar)
            .map(|blob| blob.classes)
            .map_err(|e| VerificationError::Malformed(e.to_string()))
    }
}

// ===== Runtime =====

fn expect_big(value: &StorageValue) -> Result<Balance, RuntimeFailure> {
    value
        .as_big_integer()
        .ok_or_else(|| RuntimeFailure::failed("IllegalArgumentError", "expected a big integer", ""))
}

fn expect_receiver(receiver: Option<StorageReference>) -> Result<StorageReference, RuntimeFailure> {
    receiver.ok_or_else(|| RuntimeFailure::failed("IllegalStateError", "missing receiver", ""))
}

fn balance_of(env: &mut dyn RuntimeEnv, object: StorageReference) -> Result<Balance, RuntimeFailure> {
    Ok(env
        .get_field(object, &fields::balance())?
        .as_big_integer()
        .unwrap_or(0))
}

fn set_balance(
    env: &mut dyn RuntimeEnv,
    object: StorageReference,
    value: Balance,
) -> Result<(), RuntimeFailure> {
    env.set_field(object, fields::balance(), StorageValue::BigInteger(value))
}

/// Runtime of the tests, dispatching on target names
pub struct TestRuntime;

impl ContractRuntime for TestRuntime {
    fn run_constructor(
        &self,
        env: &mut dyn RuntimeEnv,
        constructor: &ConstructorSignature,
        actuals: &[StorageValue],
    ) -> Result<ConstructorOutcome, RuntimeFailure> {
        env.charge_cpu(100)?;

        match constructor.defining_class.as_str() {
            COUNTER_CLASS => {
                let counter = env.new_object(COUNTER_CLASS)?;
                env.set_field(
                    counter,
                    FieldId::new(COUNTER_CLASS, "count"),
                    StorageValue::BigInteger(0),
                )?;
                Ok(ConstructorOutcome::Created(counter))
            }

            // payable account constructor: the caller funds the new account
            ledger::EOA_CLASS => {
                let amount = expect_big(&actuals[0])?;
                let key = actuals[1]
                    .as_str()
                    .ok_or_else(|| {
                        RuntimeFailure::failed("IllegalArgumentError", "expected a public key", "")
                    })?
                    .to_string();

                let caller = env.caller();
                let funds = balance_of(env, caller)?;
                if funds < amount {
                    return Err(RuntimeFailure::failed(
                        "InsufficientFundsError",
                        "the caller cannot fund the new account",
                        "",
                    ));
                }
                set_balance(env, caller, funds - amount)?;

                let account = env.new_object(ledger::EOA_CLASS)?;
                set_balance(env, account, amount)?;
                env.set_field(account, fields::nonce(), StorageValue::BigInteger(0))?;
                env.set_field(account, fields::public_key(), StorageValue::Str(key))?;
                Ok(ConstructorOutcome::Created(account))
            }

            // creates the manifest and its satellite system objects
            ledger::MANIFEST_CLASS => {
                let chain_id = actuals[0]
                    .as_str()
                    .ok_or_else(|| {
                        RuntimeFailure::failed("IllegalArgumentError", "expected a chain id", "")
                    })?
                    .to_string();

                let manifest = env.new_object(ledger::MANIFEST_CLASS)?;
                set_balance(env, manifest, 0)?;
                env.set_field(manifest, fields::nonce(), StorageValue::BigInteger(0))?;
                env.set_field(
                    manifest,
                    fields::public_key(),
                    StorageValue::Str(String::new()),
                )?;
                env.set_field(
                    manifest,
                    FieldId::new(ledger::MANIFEST_CLASS, "chainId"),
                    StorageValue::Str(chain_id),
                )?;

                let validators = env.new_object(ledger::VALIDATORS_CLASS)?;
                set_balance(env, validators, 0)?;

                let gas_station = env.new_object(ledger::GAS_STATION_CLASS)?;
                set_balance(env, gas_station, 0)?;
                env.set_field(
                    gas_station,
                    FieldId::new(ledger::GAS_STATION_CLASS, "gasPrice"),
                    StorageValue::BigInteger(GAS_PRICE as u128),
                )?;

                let versions = env.new_object(ledger::VERSIONS_CLASS)?;
                env.set_field(
                    versions,
                    FieldId::new(ledger::VERSIONS_CLASS, "verificationVersion"),
                    StorageValue::Int(0),
                )?;

                let caller = env.caller();
                env.set_field(
                    manifest,
                    fields::manifest_gamete(),
                    StorageValue::Reference(caller),
                )?;
                env.set_field(
                    manifest,
                    fields::manifest_validators(),
                    StorageValue::Reference(validators),
                )?;
                env.set_field(
                    manifest,
                    fields::manifest_gas_station(),
                    StorageValue::Reference(gas_station),
                )?;
                env.set_field(
                    manifest,
                    fields::manifest_versions(),
                    StorageValue::Reference(versions),
                )?;

                Ok(ConstructorOutcome::Created(manifest))
            }

            other => Err(RuntimeFailure::failed(
                "NoSuchConstructorError",
                &format!("unknown constructor of class {}", other),
                "",
            )),
        }
    }

    fn run_method(
        &self,
        env: &mut dyn RuntimeEnv,
        method: &MethodSignature,
        receiver: Option<StorageReference>,
        actuals: &[StorageValue],
    ) -> Result<MethodOutcome, RuntimeFailure> {
        env.charge_cpu(50)?;

        match method.name.as_str() {
            "nop" => Ok(MethodOutcome::Returned(None)),

            "get" => {
                let counter = expect_receiver(receiver)?;
                let count = env.get_field(counter, &FieldId::new(COUNTER_CLASS, "count"))?;
                Ok(MethodOutcome::Returned(Some(count)))
            }

            "increment" => {
                let counter = expect_receiver(receiver)?;
                let field = FieldId::new(COUNTER_CLASS, "count");
                let count = env.get_field(counter, &field)?.as_big_integer().unwrap_or(0);
                env.set_field(counter, field, StorageValue::BigInteger(count + 1))?;
                Ok(MethodOutcome::Returned(Some(StorageValue::BigInteger(
                    count + 1,
                ))))
            }

            // payable: the caller sends coins to the receiver
            "receive" => {
                let to = expect_receiver(receiver)?;
                let amount = expect_big(&actuals[0])?;
                let caller = env.caller();

                let funds = balance_of(env, caller)?;
                if funds < amount {
                    return Err(RuntimeFailure::failed(
                        "InsufficientFundsError",
                        "the caller cannot pay",
                        "",
                    ));
                }
                set_balance(env, caller, funds - amount)?;
                let received = balance_of(env, to)?;
                set_balance(env, to, received + amount)?;
                Ok(MethodOutcome::Returned(None))
            }

            // burns gas until the meter stops it
            "spin" => loop {
                env.charge_cpu(1_000)?;
            },

            "failUnexpectedly" => Err(RuntimeFailure::failed(
                "test.UnexpectedError",
                "something went wrong",
                "test.Counter.failUnexpectedly",
            )),

            "throwDeclared" => Ok(MethodOutcome::Exception(FailureInfo::new(
                "test.DeclaredException",
                "declared failure",
                "test.Counter.throwDeclared",
            ))),

            "setVerificationVersion" => {
                let versions = expect_receiver(receiver)?;
                env.set_field(
                    versions,
                    FieldId::new(ledger::VERSIONS_CLASS, "verificationVersion"),
                    actuals[0].clone(),
                )?;

                let event = env.new_object(ledger::CONSENSUS_UPDATE_EVENT)?;
                env.set_field(
                    event,
                    fields::event_creator(),
                    StorageValue::Reference(versions),
                )?;
                env.emit_event(event);
                Ok(MethodOutcome::Returned(None))
            }

            "setGasPrice" => {
                let gas_station = expect_receiver(receiver)?;
                env.set_field(
                    gas_station,
                    FieldId::new(ledger::GAS_STATION_CLASS, "gasPrice"),
                    actuals[0].clone(),
                )?;

                let event = env.new_object(ledger::GAS_PRICE_UPDATE_EVENT)?;
                env.set_field(
                    event,
                    fields::event_creator(),
                    StorageValue::Reference(gas_station),
                )?;
                env.emit_event(event);
                Ok(MethodOutcome::Returned(None))
            }

            // end-of-block reward on the validators contract
            "reward" => {
                let validators = expect_receiver(receiver)?;
                let coins = expect_big(&actuals[0])?;
                let held = balance_of(env, validators)?;
                set_balance(env, validators, held + coins)?;
                Ok(MethodOutcome::Returned(None))
            }

            // consensus getters, run as view calls by the node itself
            "getChainId" => {
                let manifest = expect_receiver(receiver)?;
                let chain_id =
                    env.get_field(manifest, &FieldId::new(ledger::MANIFEST_CLASS, "chainId"))?;
                Ok(MethodOutcome::Returned(Some(chain_id)))
            }
            "getMaxErrorLength" => Ok(MethodOutcome::Returned(Some(StorageValue::Int(300)))),
            "getMaxDependencies" => Ok(MethodOutcome::Returned(Some(StorageValue::Int(20)))),
            "getMaxCumulativeSizeOfDependencies" => {
                Ok(MethodOutcome::Returned(Some(StorageValue::Long(1_000_000))))
            }
            "getSignature" => Ok(MethodOutcome::Returned(Some(StorageValue::Str(
                "ed25519".to_string(),
            )))),
            "getMaxGasPerTransaction" => Ok(MethodOutcome::Returned(Some(
                StorageValue::BigInteger(1_000_000_000),
            ))),
            "ignoresGasPrice" => Ok(MethodOutcome::Returned(Some(StorageValue::Bool(false)))),
            "getInflation" => Ok(MethodOutcome::Returned(Some(StorageValue::Long(0)))),
            "getVerificationVersion" => {
                let versions = expect_receiver(receiver)?;
                let version = env.get_field(
                    versions,
                    &FieldId::new(ledger::VERSIONS_CLASS, "verificationVersion"),
                )?;
                Ok(MethodOutcome::Returned(Some(version)))
            }
            "getGasPrice" => {
                let gas_station = expect_receiver(receiver)?;
                let price = env.get_field(
                    gas_station,
                    &FieldId::new(ledger::GAS_STATION_CLASS, "gasPrice"),
                )?;
                Ok(MethodOutcome::Returned(Some(price)))
            }

            other => Err(RuntimeFailure::failed(
                "NoSuchMethodError",
                &format!("unknown method {}", other),
                "",
            )),
        }
    }
}

// ===== Bootstrap =====

/// A node under test, with its bootstrap artifacts
pub struct TestNode {
    pub dir: TempDir,
    pub node: Arc<Node>,
    pub base: TransactionReference,
    pub gamete: StorageReference,
    pub keypair: Keypair,
}

pub fn test_consensus() -> ConsensusParams {
    ConsensusParams {
        chain_id: CHAIN_ID.to_string(),
        initial_gas_price: GAS_PRICE,
        ..ConsensusParams::default()
    }
}

/// Routes engine logs to the test output when RUST_LOG asks for them
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn fresh_node() -> (TempDir, Arc<Node>) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = NodeConfig::new(dir.path().join("chain"));
    let node = Node::new(
        config,
        Some(test_consensus()),
        Arc::new(TestVerifier),
        Arc::new(TestRuntime),
    )
    .unwrap();
    (dir, node)
}

/// A node with the base jar installed and a funded gamete, not initialized
pub async fn bootstrapped_node() -> TestNode {
    let (dir, node) = fresh_node();

    let base = node
        .add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
            jar: base_jar(),
            dependencies: vec![],
        })
        .await
        .unwrap();

    let keypair = Keypair::generate(SignatureScheme::Ed25519);
    let gamete = node
        .add_gamete_creation_transaction(TransactionRequest::GameteCreation {
            classpath: base,
            initial_amount: GAMETE_FUNDS,
            public_key: keypair.public_key_hex(),
        })
        .await
        .unwrap();

    TestNode {
        dir,
        node,
        base,
        gamete,
        keypair,
    }
}

/// A fully initialized node: base jar, gamete, manifest, initialization.
/// The gamete has nonce 1 afterwards.
pub async fn initialized_node() -> TestNode {
    let net = bootstrapped_node().await;

    let manifest = net
        .node
        .add_constructor_call_transaction(net.constructor_call(
            0,
            ledger::MANIFEST_CLASS,
            &["string"],
            vec![StorageValue::Str(CHAIN_ID.to_string())],
        ))
        .await
        .unwrap();

    net.node
        .add_initialization_transaction(TransactionRequest::Initialization {
            classpath: net.base,
            manifest,
        })
        .await
        .unwrap();

    net
}

impl TestNode {
    pub fn payload(&self, nonce: Nonce, gas_limit: Gas) -> NonInitialPayload {
        NonInitialPayload {
            caller: self.gamete,
            nonce,
            classpath: self.base,
            gas_limit,
            gas_price: GAS_PRICE,
            chain_id: CHAIN_ID.to_string(),
            signature: vec![],
        }
    }

    pub fn sign(&self, request: TransactionRequest) -> TransactionRequest {
        let signature = self.keypair.sign(&request.signed_payload());
        request.with_signature(signature)
    }

    pub fn constructor_call(
        &self,
        nonce: Nonce,
        class: &str,
        formals: &[&str],
        actuals: Vec<StorageValue>,
    ) -> TransactionRequest {
        self.sign(TransactionRequest::ConstructorCall {
            payload: self.payload(nonce, DEFAULT_GAS_LIMIT),
            constructor: ConstructorSignature::new(class, formals),
            actuals,
        })
    }

    pub fn instance_call(
        &self,
        nonce: Nonce,
        receiver: StorageReference,
        class: &str,
        name: &str,
        formals: &[&str],
        actuals: Vec<StorageValue>,
        returns: Option<&str>,
    ) -> TransactionRequest {
        self.instance_call_with_gas(
            nonce,
            DEFAULT_GAS_LIMIT,
            receiver,
            class,
            name,
            formals,
            actuals,
            returns,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn instance_call_with_gas(
        &self,
        nonce: Nonce,
        gas_limit: Gas,
        receiver: StorageReference,
        class: &str,
        name: &str,
        formals: &[&str],
        actuals: Vec<StorageValue>,
        returns: Option<&str>,
    ) -> TransactionRequest {
        self.sign(TransactionRequest::InstanceMethodCall {
            payload: self.payload(nonce, gas_limit),
            method: MethodSignature::new(class, name, formals, returns),
            receiver,
            actuals,
        })
    }

    pub fn balance_of(&self, object: &StorageReference) -> Balance {
        self.node.store.balance_of(object).unwrap()
    }

    pub fn nonce_of(&self, object: &StorageReference) -> Nonce {
        self.node.store.nonce_of(object).unwrap()
    }
}
