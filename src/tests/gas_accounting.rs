// Gas accounting - floors, exact payer accounting, penalties, red/green

use super::fixtures::*;
use crate::node::NodeError;
use crate::types::ledger;
use crate::types::{Keypair, SignatureScheme, TransactionRequest};

#[tokio::test]
async fn test_gas_below_floor_is_rejected_with_no_store_writes() {
    let net = initialized_node().await;

    // far below any possible floor
    let request = net.instance_call_with_gas(
        1,
        10,
        net.gamete,
        ledger::EOA_CLASS,
        "nop",
        &[],
        vec![],
        None,
    );
    let reference = request.reference();
    let balance_before = net.balance_of(&net.gamete);

    match net.node.add_instance_method_call_transaction(request).await {
        Err(NodeError::Rejected(rejection)) => {
            assert!(rejection.0.contains("not enough gas"), "{}", rejection.0)
        }
        other => panic!("expected a rejection, got {:?}", other),
    }

    // no gas charged, nothing persisted for this reference
    assert_eq!(net.balance_of(&net.gamete), balance_before);
    assert_eq!(net.nonce_of(&net.gamete), 1);
    assert!(matches!(
        net.node.get_request(&reference),
        Err(NodeError::UnknownReference(_))
    ));
}

#[tokio::test]
async fn test_successful_call_charges_exactly_the_consumed_gas() {
    let net = initialized_node().await;

    let balance_before = net.balance_of(&net.gamete);
    let request = net.instance_call(
        1,
        net.gamete,
        ledger::EOA_CLASS,
        "nop",
        &[],
        vec![],
        None,
    );
    let reference = request.reference();

    net.node
        .add_instance_method_call_transaction(request)
        .await
        .unwrap();

    let response = net.node.get_response(&reference).unwrap();
    let gas = response.gas().unwrap();

    // no rounding drift: the payer lost exactly gas consumed times price
    assert_eq!(
        balance_before - net.balance_of(&net.gamete),
        gas.total() as u128 * GAS_PRICE as u128
    );
    assert!(gas.total() < DEFAULT_GAS_LIMIT);
    assert_eq!(response.gas_penalty(), 0);
}

#[tokio::test]
async fn test_out_of_gas_produces_a_penalized_response() {
    let net = initialized_node().await;

    let gas_limit = 100_000;
    let balance_before = net.balance_of(&net.gamete);
    let request = net.instance_call_with_gas(
        1,
        gas_limit,
        net.gamete,
        ledger::EOA_CLASS,
        "spin",
        &[],
        vec![],
        None,
    );
    let reference = request.reference();

    match net.node.add_instance_method_call_transaction(request).await {
        Err(NodeError::TransactionFailed(cause)) => {
            assert_eq!(cause.class_of_cause, "OutOfGasError")
        }
        other => panic!("expected an out of gas failure, got {:?}", other),
    }

    // gas exhaustion is a response, never a dropped transaction
    let response = net.node.get_response(&reference).unwrap();
    let gas = response.gas().unwrap();

    // consumed plus penalty account for every promised unit
    assert_eq!(gas.total() + response.gas_penalty(), gas_limit);
    assert!(response.gas_penalty() > 0);

    // the payer keeps only the upfront deduction, with no refund
    assert_eq!(
        balance_before - net.balance_of(&net.gamete),
        gas_limit as u128 * GAS_PRICE as u128
    );

    // the nonce increment of the caller survived the failure
    assert_eq!(net.nonce_of(&net.gamete), 2);
}

#[tokio::test]
async fn test_red_coins_are_charged_before_green_ones() {
    // a red/green gamete, before initialization so that no signature or
    // chain id checks interfere with the payment logic under test
    let (_dir, node) = fresh_node();

    let base = node
        .add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
            jar: base_jar(),
            dependencies: vec![],
        })
        .await
        .unwrap();

    let keypair = Keypair::generate(SignatureScheme::Ed25519);
    let green = 1_000_000_000u128;
    let red = 30_000_000u128;
    let gamete = node
        .add_gamete_creation_transaction(TransactionRequest::RedGreenGameteCreation {
            classpath: base,
            green_amount: green,
            red_amount: red,
            public_key: keypair.public_key_hex(),
        })
        .await
        .unwrap();

    assert_eq!(node.store.balance_of(&gamete).unwrap(), green);
    assert_eq!(node.store.red_balance_of(&gamete).unwrap(), red);

    // cost = 1_000_000 × 100 = 100M: red goes to zero upfront, green covers
    // the remaining 70M; the refund then restores green first, so the net
    // effect is that only red coins paid for the consumed gas
    let request = TransactionRequest::InstanceMethodCall {
        payload: crate::types::NonInitialPayload {
            caller: gamete,
            nonce: 0,
            classpath: base,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: GAS_PRICE,
            chain_id: CHAIN_ID.to_string(),
            signature: vec![],
        },
        method: crate::types::MethodSignature::new(ledger::EOA_CLASS, "nop", &[], None),
        receiver: gamete,
        actuals: vec![],
    };
    let signature = keypair.sign(&request.signed_payload());
    let request = request.with_signature(signature);
    let reference = request.reference();

    node.add_instance_method_call_transaction(request)
        .await
        .unwrap();

    let response = node.get_response(&reference).unwrap();
    let consumed = response.gas().unwrap().total() as u128 * GAS_PRICE as u128;

    assert_eq!(node.store.balance_of(&gamete).unwrap(), green);
    assert_eq!(node.store.red_balance_of(&gamete).unwrap(), red - consumed);
}
