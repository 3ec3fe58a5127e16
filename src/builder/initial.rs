// Initial builders - Bootstrap transactions, before the manifest is set
//
// Initial requests consume no gas and are rejected once the node is
// initialized. They install the first jars, create the gamete holding the
// initial coin supply and finally mark the node as initialized.

use super::{NodeInternal, TransactionRejected};
use crate::builder::context::ExecutionContext;
use crate::gas::GasMeter;
use crate::loader::EngineClassLoader;
use crate::types::ledger;
use crate::types::{
    Balance, GameteCreationResponse, JarStoreInitialResponse, StorageReference,
    TransactionReference, TransactionRequest, TransactionResponse,
};
use std::sync::Arc;

/// Rejects any initial request on an already initialized node
fn must_not_be_initialized(
    node: NodeInternal<'_>,
    request: &TransactionRequest,
) -> Result<(), TransactionRejected> {
    if node.store.is_initialized()? {
        Err(TransactionRejected(format!(
            "cannot run a {} request on an already initialized node",
            request.kind_name()
        )))
    } else {
        Ok(())
    }
}

/// Installs a jar without paying gas
pub struct JarStoreInitialBuilder<'a> {
    node: NodeInternal<'a>,
    jar: &'a [u8],
    dependencies: &'a [TransactionReference],
    verification_version: u32,
    loader: Arc<EngineClassLoader>,
}

impl<'a> JarStoreInitialBuilder<'a> {
    pub fn new(
        _reference: TransactionReference,
        request: &'a TransactionRequest,
        node: NodeInternal<'a>,
    ) -> Result<Self, TransactionRejected> {
        must_not_be_initialized(node, request)?;

        let (jar, dependencies) = match request {
            TransactionRequest::JarStoreInitial { jar, dependencies } => (jar, dependencies),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        let consensus = node.caches.consensus_params().unwrap_or_default();

        // resolving the dependencies also enforces the dependency limits
        let loader = Arc::new(EngineClassLoader::new(
            None,
            dependencies,
            node.store,
            node.verifier,
            true,
            consensus.verification_version,
            consensus.max_dependencies,
            consensus.max_cumulative_size_of_dependencies,
        )?);

        Ok(Self {
            node,
            jar,
            dependencies,
            verification_version: consensus.verification_version,
            loader,
        })
    }

    pub fn class_loader(&self) -> Option<Arc<EngineClassLoader>> {
        Some(self.loader.clone())
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        // a verification failure of an initial jar is a plain rejection:
        // nobody pays for initial transactions
        let instrumented_jar = self
            .node
            .verifier
            .verify(self.jar, self.verification_version)?;

        Ok(TransactionResponse::JarStoreInitial(
            JarStoreInitialResponse {
                instrumented_jar,
                dependencies: self.dependencies.to_vec(),
                verification_version: self.verification_version,
            },
        ))
    }
}

/// Creates the gamete, with green coins only or with both currencies
pub struct GameteCreationBuilder<'a> {
    node: NodeInternal<'a>,
    reference: TransactionReference,
    green_amount: Balance,
    red_amount: Balance,
    public_key: &'a str,
    account_class: &'static str,
    loader: Arc<EngineClassLoader>,
}

impl<'a> GameteCreationBuilder<'a> {
    pub fn new(
        reference: TransactionReference,
        request: &'a TransactionRequest,
        node: NodeInternal<'a>,
    ) -> Result<Self, TransactionRejected> {
        must_not_be_initialized(node, request)?;

        let (classpath, green_amount, red_amount, public_key, account_class) = match request {
            TransactionRequest::GameteCreation {
                classpath,
                initial_amount,
                public_key,
            } => (*classpath, *initial_amount, 0, public_key, ledger::EOA_CLASS),
            TransactionRequest::RedGreenGameteCreation {
                classpath,
                green_amount,
                red_amount,
                public_key,
            } => (
                *classpath,
                *green_amount,
                *red_amount,
                public_key,
                ledger::RED_GREEN_EOA_CLASS,
            ),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        if public_key.is_empty() {
            return Err(TransactionRejected::new("the gamete must have a public key"));
        }

        let loader = node
            .caches
            .get_class_loader(classpath, node.store, node.verifier)?;

        if !loader.class_space().contains(account_class) {
            return Err(TransactionRejected(format!(
                "the classpath does not define the class {}",
                account_class
            )));
        }

        Ok(Self {
            node,
            reference,
            green_amount,
            red_amount,
            public_key,
            account_class,
            loader,
        })
    }

    pub fn class_loader(&self) -> Arc<EngineClassLoader> {
        self.loader.clone()
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        // the gamete is the first object of this transaction; no gas is
        // metered for its creation
        let placeholder = StorageReference::new(self.reference, 0);
        let mut ctx = ExecutionContext::new(
            self.node.store,
            self.loader.clone(),
            GasMeter::unmetered(),
            self.reference,
            placeholder,
        );

        let gamete = ctx.create_object(self.account_class)?;
        {
            let object = ctx.object_mut(gamete)?;
            object.set_balance(self.green_amount);
            if self.account_class == ledger::RED_GREEN_EOA_CLASS {
                object.set_red_balance(self.red_amount);
            }
            object.set_nonce(0);
            object.set_public_key(self.public_key);
        }

        Ok(TransactionResponse::GameteCreation(GameteCreationResponse {
            updates: ctx.extract_updates(),
            gamete,
        }))
    }
}

/// Marks the node as initialized by recording its manifest
pub struct InitializationBuilder {
    loader: Arc<EngineClassLoader>,
}

impl InitializationBuilder {
    pub fn new(
        _reference: TransactionReference,
        request: &TransactionRequest,
        node: NodeInternal<'_>,
    ) -> Result<Self, TransactionRejected> {
        must_not_be_initialized(node, request)?;

        let (classpath, manifest) = match request {
            TransactionRequest::Initialization {
                classpath,
                manifest,
            } => (*classpath, *manifest),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        let loader = node
            .caches
            .get_class_loader(classpath, node.store, node.verifier)?;

        // the manifest becomes the caller of the system transactions of
        // the node, hence it must be an account already in store
        let manifest_class = node.store.class_tag_of(&manifest)?.class;
        if !loader
            .class_space()
            .is_externally_owned_account(&manifest_class)
        {
            return Err(TransactionRejected::new(
                "the manifest of a node must be an externally owned account",
            ));
        }

        Ok(Self { loader })
    }

    pub fn class_loader(&self) -> Arc<EngineClassLoader> {
        self.loader.clone()
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        // the store records the manifest when it pushes this response
        Ok(TransactionResponse::Initialization)
    }
}
