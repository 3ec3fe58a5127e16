// Classpath resolution - dependency limits and malformed classpaths

use super::fixtures::*;
use crate::loader::ClassDef;
use crate::node::NodeError;
use crate::types::{TransactionReference, TransactionRequest};

#[tokio::test]
async fn test_dependency_chain_of_21_jars_is_rejected() {
    let (_dir, node) = fresh_node();

    // 21 chained jars install fine, each depending on the previous one:
    // every installation resolves at most 20 dependencies
    let mut previous: Option<TransactionReference> = None;
    for i in 0..21 {
        let jar = jar_of(&[ClassDef::new(&format!("test.Dep{}", i), None, vec![])]);
        let dependencies = previous.into_iter().collect();
        previous = Some(
            node.add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
                jar,
                dependencies,
            })
            .await
            .unwrap(),
        );
    }

    // a jar referencing the whole chain of 21 exceeds the dependency
    // limit, regardless of byte size
    let jar = jar_of(&[ClassDef::new("test.Dep21", None, vec![])]);
    let outcome = node
        .add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
            jar,
            dependencies: previous.into_iter().collect(),
        })
        .await;

    match outcome {
        Err(NodeError::Rejected(rejection)) => {
            assert!(
                rejection.0.contains("too many dependencies"),
                "{}",
                rejection.0
            )
        }
        other => panic!("expected a rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_cumulative_dependency_size_is_bounded() {
    let (_dir, node) = fresh_node();

    // two jars of about 600 KB each: individually fine, together over the
    // one-megabyte limit
    let fat_class = |name: &str| {
        ClassDef::new(
            name,
            None,
            vec![crate::loader::FieldDef::new(&"x".repeat(600_000), "int")],
        )
    };

    let first = node
        .add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
            jar: jar_of(&[fat_class("test.Fat0")]),
            dependencies: vec![],
        })
        .await
        .unwrap();

    let second = node
        .add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
            jar: jar_of(&[fat_class("test.Fat1")]),
            dependencies: vec![first],
        })
        .await
        .unwrap();

    // resolving a classpath that needs both jars at once is over the limit
    let third = node
        .add_jar_store_initial_transaction(TransactionRequest::JarStoreInitial {
            jar: jar_of(&[fat_class("test.Fat2")]),
            dependencies: vec![second],
        })
        .await;

    match third {
        Err(NodeError::Rejected(rejection)) => assert!(
            rejection.0.contains("cumulative size"),
            "{}",
            rejection.0
        ),
        other => panic!("expected a rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_unknown_classpath_is_rejected() {
    let net = bootstrapped_node().await;

    let mut request = net.constructor_call(0, COUNTER_CLASS, &[], vec![]);
    if let TransactionRequest::ConstructorCall { payload, .. } = &mut request {
        payload.classpath = TransactionReference::of_bytes(b"no such transaction");
    }
    let request = net.sign(request);

    match net.node.add_constructor_call_transaction(request).await {
        Err(NodeError::Rejected(rejection)) => assert!(
            rejection.0.contains("unknown transaction"),
            "{}",
            rejection.0
        ),
        other => panic!("expected a rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_classpath_that_installed_no_jar_is_rejected() {
    let net = bootstrapped_node().await;

    // the creating transaction of the gamete is in store, but it did not
    // install any jar
    let mut request = net.constructor_call(0, COUNTER_CLASS, &[], vec![]);
    if let TransactionRequest::ConstructorCall { payload, .. } = &mut request {
        payload.classpath = net.gamete.transaction;
    }
    let request = net.sign(request);

    match net.node.add_constructor_call_transaction(request).await {
        Err(NodeError::Rejected(rejection)) => assert!(
            rejection.0.contains("did not install a jar"),
            "{}",
            rejection.0
        ),
        other => panic!("expected a rejection, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_unverifiable_jar_fails_the_paid_installation() {
    let net = initialized_node().await;

    // a paid installation of a jar that fails verification consumes gas
    // and produces a failed response, not a rejection
    let request = net.sign(TransactionRequest::JarStore {
        payload: net.payload(1, DEFAULT_GAS_LIMIT),
        jar: jar_of(&[ClassDef::new("test.Unverifiable", None, vec![])]),
        dependencies: vec![net.base],
    });
    let reference = request.reference();
    let balance_before = net.balance_of(&net.gamete);

    match net.node.add_jar_store_transaction(request).await {
        Err(NodeError::TransactionFailed(cause)) => {
            assert_eq!(cause.class_of_cause, "VerificationError")
        }
        other => panic!("expected a failed installation, got {:?}", other.map(|_| ())),
    }

    let response = net.node.get_response(&reference).unwrap();
    assert!(response.gas_penalty() > 0);
    assert_eq!(
        balance_before - net.balance_of(&net.gamete),
        DEFAULT_GAS_LIMIT as u128 * GAS_PRICE as u128
    );
}

#[tokio::test]
async fn test_paid_installation_yields_a_usable_classpath() {
    let net = initialized_node().await;

    let jar = jar_of(&[ClassDef::new("test.Extra", None, vec![])]);
    let installed = net
        .node
        .add_jar_store_transaction(net.sign(TransactionRequest::JarStore {
            payload: net.payload(1, DEFAULT_GAS_LIMIT),
            jar,
            dependencies: vec![net.base],
        }))
        .await
        .unwrap();

    // a counter resolves through the new classpath, via its dependency on
    // the base jar
    let mut request = net.constructor_call(2, COUNTER_CLASS, &[], vec![]);
    if let TransactionRequest::ConstructorCall { payload, .. } = &mut request {
        payload.classpath = installed;
    }
    let request = net.sign(request);

    let counter = net.node.add_constructor_call_transaction(request).await.unwrap();
    let tag = net.node.get_class_tag(&counter).unwrap();
    assert_eq!(tag.class, COUNTER_CLASS);
    // the class tag records the jar that really defines the class
    assert_eq!(tag.jar, net.base);
}
