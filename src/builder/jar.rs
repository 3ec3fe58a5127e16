// Jar builder - Paid installation of a jar
//
// The jar resolves against the dependencies it declares. Verification and
// instrumentation are charged proportionally to the size of the jar; a
// verification failure is not a rejection but a failed, penalized response,
// since the work of verifying has been done.

use super::noninitial::{ExecutionFrame, NonInitialBuilder};
use super::{NodeInternal, TransactionRejected};
use crate::loader::EngineClassLoader;
use crate::runtime::RuntimeFailure;
use crate::types::{
    FailureInfo, Gas, GasConsumption, JarStoreResponse, TransactionReference, TransactionRequest,
    TransactionResponse,
};
use std::sync::Arc;

pub struct JarStoreBuilder<'a> {
    common: NonInitialBuilder<'a>,
    request: &'a TransactionRequest,
    jar: &'a [u8],
    dependencies: &'a [TransactionReference],
}

impl<'a> JarStoreBuilder<'a> {
    pub fn new(
        reference: TransactionReference,
        request: &'a TransactionRequest,
        node: NodeInternal<'a>,
    ) -> Result<Self, TransactionRejected> {
        let (jar, dependencies) = match request {
            TransactionRequest::JarStore {
                jar, dependencies, ..
            } => (jar, dependencies),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        let consensus = node.caches.consensus_params().unwrap_or_default();

        // the jar resolves against its declared dependencies
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

        let common = NonInitialBuilder::validate(
            node,
            reference,
            request,
            loader,
            false,
            gas_for_storing_failed_response(node, request),
        )?;

        Ok(Self {
            common,
            request,
            jar,
            dependencies,
        })
    }

    pub fn class_loader(&self) -> Arc<EngineClassLoader> {
        self.common.loader.clone()
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        let mut frame = self.common.start_execution(self.request)?;
        let node = self.common.node;
        let verification_version = self.common.consensus.verification_version;

        let body = (|frame: &mut ExecutionFrame<'a>| -> Result<TransactionResponse, RuntimeFailure> {
            let length = self.jar.len() as u64;
            frame
                .ctx
                .gas
                .charge_cpu(node.gas_model.cpu_cost_for_installing_jar(length))
                .map_err(RuntimeFailure::from)?;
            frame
                .ctx
                .gas
                .charge_ram(node.gas_model.ram_cost_for_installing_jar(length))
                .map_err(RuntimeFailure::from)?;

            let instrumented_jar = node
                .verifier
                .verify(self.jar, verification_version)
                .map_err(|e| RuntimeFailure::failed("VerificationError", &e.to_string(), ""))?;

            // charge for the storage of the response itself, then refund
            let provisional = TransactionResponse::JarStore(JarStoreResponse::Successful {
                instrumented_jar: instrumented_jar.clone(),
                dependencies: self.dependencies.to_vec(),
                verification_version,
                updates: frame.ctx.extract_updates(),
                gas: frame.ctx.gas.consumed(),
            });
            frame.charge_storage_for_response(provisional.serialized_length(), node.gas_model)?;
            frame.refund_remaining_gas()?;

            Ok(TransactionResponse::JarStore(JarStoreResponse::Successful {
                instrumented_jar,
                dependencies: self.dependencies.to_vec(),
                verification_version,
                updates: frame.ctx.extract_updates(),
                gas: frame.ctx.gas.consumed(),
            }))
        })(&mut frame);

        match body {
            Ok(response) => Ok(response),
            Err(failure) => {
                // no refund: the failed transaction pays for all the gas
                // it promised
                frame
                    .reset_payer_to_balances_on_failure()
                    .map_err(|e| TransactionRejected::new(e.to_string()))?;

                Ok(fail_response(
                    failure.into_failure_info(),
                    frame.updates_to_balance_or_nonce_of_caller(),
                    frame.ctx.gas.consumed(),
                    frame.ctx.gas.penalty(),
                ))
            }
        }
    }
}

fn fail_response(
    cause: FailureInfo,
    updates: Vec<crate::types::Update>,
    gas: GasConsumption,
    gas_penalty: Gas,
) -> TransactionResponse {
    TransactionResponse::JarStore(JarStoreResponse::Failed {
        cause,
        updates,
        gas,
        gas_penalty,
    })
}

/// Storage cost of a failed response for this request, part of the gas floor
fn gas_for_storing_failed_response(node: NodeInternal<'_>, request: &TransactionRequest) -> Gas {
    let gas_limit = request.gas_limit().unwrap_or(0);
    let placeholder = fail_response(
        FailureInfo::new(
            "placeholder for the class of the cause",
            "placeholder for the message of the cause",
            "",
        ),
        vec![],
        GasConsumption {
            cpu: gas_limit,
            ram: gas_limit,
            storage: gas_limit,
        },
        gas_limit,
    );

    node.gas_model
        .storage_cost_of_bytes(placeholder.serialized_length())
}
