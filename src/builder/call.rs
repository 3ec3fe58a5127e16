// Call builders - Constructor and method execution
//
// The target code runs under the gas meter of the transaction, through the
// runtime collaborator. Three outcomes are possible: success and declared
// exceptions both refund the unused gas and keep the updates; any other
// failure charges a penalty for all remaining promised gas and keeps only
// the balance and nonce changes of the caller.

use super::noninitial::{ExecutionFrame, NonInitialBuilder};
use super::{NodeInternal, TransactionRejected};
use crate::loader::EngineClassLoader;
use crate::runtime::{ConstructorOutcome, MethodOutcome, RuntimeFailure};
use crate::types::{
    ConstructorCallResponse, ConstructorSignature, FailureInfo, Gas, GasConsumption,
    MethodCallResponse, MethodSignature, StorageReference, StorageValue, TransactionReference,
    TransactionRequest, TransactionResponse, Update,
};
use std::sync::Arc;

/// Rejects requests whose actual arguments do not match the formal
/// parameters of their target
fn formals_must_match_actuals(
    formals: &[String],
    actuals: &[StorageValue],
    target: &str,
) -> Result<(), TransactionRejected> {
    if formals.len() != actuals.len() {
        Err(TransactionRejected(format!(
            "argument count mismatch: {} declares {} formal parameters but {} actuals were provided",
            target,
            formals.len(),
            actuals.len()
        )))
    } else {
        Ok(())
    }
}

/// Storage cost of a failed response for a code call, part of the gas floor
fn gas_for_storing_failed_response(node: NodeInternal<'_>, request: &TransactionRequest) -> Gas {
    let gas_limit = request.gas_limit().unwrap_or(0);
    let placeholder = TransactionResponse::MethodCall(MethodCallResponse::Failed {
        cause: FailureInfo::new(
            "placeholder for the class of the cause",
            "placeholder for the message of the cause",
            "placeholder for the site",
        ),
        updates: vec![],
        gas: GasConsumption {
            cpu: gas_limit,
            ram: gas_limit,
            storage: gas_limit,
        },
        gas_penalty: gas_limit,
    });

    node.gas_model
        .storage_cost_of_bytes(placeholder.serialized_length())
}

/// Runs a constructor of the classpath
pub struct ConstructorCallBuilder<'a> {
    common: NonInitialBuilder<'a>,
    request: &'a TransactionRequest,
    constructor: &'a ConstructorSignature,
    actuals: &'a [StorageValue],
}

impl<'a> ConstructorCallBuilder<'a> {
    pub fn new(
        reference: TransactionReference,
        request: &'a TransactionRequest,
        node: NodeInternal<'a>,
    ) -> Result<Self, TransactionRejected> {
        let (payload, constructor, actuals) = match request {
            TransactionRequest::ConstructorCall {
                payload,
                constructor,
                actuals,
            } => (payload, constructor, actuals),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        formals_must_match_actuals(
            &constructor.formals,
            actuals,
            &constructor.to_string(),
        )?;

        let loader = node
            .caches
            .get_class_loader(payload.classpath, node.store, node.verifier)?;

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
            constructor,
            actuals,
        })
    }

    pub fn class_loader(&self) -> Arc<EngineClassLoader> {
        self.common.loader.clone()
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        let mut frame = self.common.start_execution(self.request)?;
        let node = self.common.node;

        let body = (|frame: &mut ExecutionFrame<'a>| -> Result<TransactionResponse, RuntimeFailure> {
            let outcome =
                node.runtime
                    .run_constructor(&mut frame.ctx, self.constructor, self.actuals)?;

            match outcome {
                ConstructorOutcome::Created(new_object) => {
                    let make = |frame: &ExecutionFrame<'a>| {
                        TransactionResponse::ConstructorCall(ConstructorCallResponse::Successful {
                            new_object,
                            updates: frame.ctx.extract_updates(),
                            events: frame.ctx.events().to_vec(),
                            gas: frame.ctx.gas.consumed(),
                        })
                    };
                    let provisional = make(frame);
                    frame.charge_storage_for_response(
                        provisional.serialized_length(),
                        node.gas_model,
                    )?;
                    frame.refund_remaining_gas()?;
                    Ok(make(frame))
                }
                ConstructorOutcome::Exception(cause) => {
                    let make = |frame: &ExecutionFrame<'a>| {
                        TransactionResponse::ConstructorCall(ConstructorCallResponse::Exception {
                            cause: cause.clone(),
                            updates: frame.ctx.extract_updates(),
                            events: frame.ctx.events().to_vec(),
                            gas: frame.ctx.gas.consumed(),
                        })
                    };
                    let provisional = make(frame);
                    frame.charge_storage_for_response(
                        provisional.serialized_length(),
                        node.gas_model,
                    )?;
                    frame.refund_remaining_gas()?;
                    Ok(make(frame))
                }
            }
        })(&mut frame);

        match body {
            Ok(response) => Ok(response),
            Err(failure) => {
                frame
                    .reset_payer_to_balances_on_failure()
                    .map_err(|e| TransactionRejected::new(e.to_string()))?;

                Ok(TransactionResponse::ConstructorCall(
                    ConstructorCallResponse::Failed {
                        cause: failure.into_failure_info(),
                        updates: frame.updates_to_balance_or_nonce_of_caller(),
                        gas: frame.ctx.gas.consumed(),
                        gas_penalty: frame.ctx.gas.penalty(),
                    },
                ))
            }
        }
    }
}

/// Runs an instance method on a receiver, including the unsigned system
/// calls issued by the node itself
pub struct InstanceMethodCallBuilder<'a> {
    common: NonInitialBuilder<'a>,
    request: &'a TransactionRequest,
    method: &'a MethodSignature,
    receiver: StorageReference,
    actuals: &'a [StorageValue],
}

impl<'a> InstanceMethodCallBuilder<'a> {
    pub fn new(
        reference: TransactionReference,
        request: &'a TransactionRequest,
        node: NodeInternal<'a>,
        view: bool,
    ) -> Result<Self, TransactionRejected> {
        let (classpath, method, receiver, actuals) = match request {
            TransactionRequest::InstanceMethodCall {
                payload,
                method,
                receiver,
                actuals,
            } => (payload.classpath, method, *receiver, actuals),
            TransactionRequest::InstanceSystemMethodCall {
                classpath,
                method,
                receiver,
                actuals,
                ..
            } => (*classpath, method, *receiver, actuals),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        formals_must_match_actuals(&method.formals, actuals, &method.to_string())?;

        let loader = node
            .caches
            .get_class_loader(classpath, node.store, node.verifier)?;

        let common = NonInitialBuilder::validate(
            node,
            reference,
            request,
            loader,
            view,
            gas_for_storing_failed_response(node, request),
        )?;

        Ok(Self {
            common,
            request,
            method,
            receiver,
            actuals,
        })
    }

    pub fn class_loader(&self) -> Arc<EngineClassLoader> {
        self.common.loader.clone()
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        let frame = self.common.start_execution(self.request)?;
        deliver_method_call(
            frame,
            self.common.node,
            self.method,
            Some(self.receiver),
            self.actuals,
        )
    }
}

/// Runs a static method of the classpath
pub struct StaticMethodCallBuilder<'a> {
    common: NonInitialBuilder<'a>,
    request: &'a TransactionRequest,
    method: &'a MethodSignature,
    actuals: &'a [StorageValue],
}

impl<'a> StaticMethodCallBuilder<'a> {
    pub fn new(
        reference: TransactionReference,
        request: &'a TransactionRequest,
        node: NodeInternal<'a>,
        view: bool,
    ) -> Result<Self, TransactionRejected> {
        let (payload, method, actuals) = match request {
            TransactionRequest::StaticMethodCall {
                payload,
                method,
                actuals,
            } => (payload, method, actuals),
            _ => return Err(TransactionRejected::new("unexpected request kind")),
        };

        formals_must_match_actuals(&method.formals, actuals, &method.to_string())?;

        let loader = node
            .caches
            .get_class_loader(payload.classpath, node.store, node.verifier)?;

        let common = NonInitialBuilder::validate(
            node,
            reference,
            request,
            loader,
            view,
            gas_for_storing_failed_response(node, request),
        )?;

        Ok(Self {
            common,
            request,
            method,
            actuals,
        })
    }

    pub fn class_loader(&self) -> Arc<EngineClassLoader> {
        self.common.loader.clone()
    }

    pub fn deliver(self) -> Result<TransactionResponse, TransactionRejected> {
        let frame = self.common.start_execution(self.request)?;
        deliver_method_call(frame, self.common.node, self.method, None, self.actuals)
    }
}

/// The shared body of every method call
fn deliver_method_call<'a>(
    mut frame: ExecutionFrame<'a>,
    node: NodeInternal<'a>,
    method: &MethodSignature,
    receiver: Option<StorageReference>,
    actuals: &[StorageValue],
) -> Result<TransactionResponse, TransactionRejected> {
    let body = (|frame: &mut ExecutionFrame<'a>| -> Result<TransactionResponse, RuntimeFailure> {
        let outcome = node
            .runtime
            .run_method(&mut frame.ctx, method, receiver, actuals)?;

        // the updates of a view call must not escape the caller
        if frame.is_view() {
            frame.ensure_no_side_effects_beyond_caller()?;
        }

        match outcome {
            MethodOutcome::Returned(result) => {
                let make = |frame: &ExecutionFrame<'a>| {
                    TransactionResponse::MethodCall(MethodCallResponse::Successful {
                        result: result.clone(),
                        updates: frame.ctx.extract_updates(),
                        events: frame.ctx.events().to_vec(),
                        gas: frame.ctx.gas.consumed(),
                    })
                };
                let provisional = make(frame);
                frame.charge_storage_for_response(provisional.serialized_length(), node.gas_model)?;
                frame.refund_remaining_gas()?;
                Ok(make(frame))
            }
            MethodOutcome::Exception(cause) => {
                let make = |frame: &ExecutionFrame<'a>| {
                    TransactionResponse::MethodCall(MethodCallResponse::Exception {
                        cause: cause.clone(),
                        updates: frame.ctx.extract_updates(),
                        events: frame.ctx.events().to_vec(),
                        gas: frame.ctx.gas.consumed(),
                    })
                };
                let provisional = make(frame);
                frame.charge_storage_for_response(provisional.serialized_length(), node.gas_model)?;
                frame.refund_remaining_gas()?;
                Ok(make(frame))
            }
        }
    })(&mut frame);

    match body {
        Ok(response) => Ok(response),
        Err(failure) => {
            frame
                .reset_payer_to_balances_on_failure()
                .map_err(|e| TransactionRejected::new(e.to_string()))?;

            let updates: Vec<Update> = frame.updates_to_balance_or_nonce_of_caller();
            Ok(TransactionResponse::MethodCall(MethodCallResponse::Failed {
                cause: failure.into_failure_info(),
                updates,
                gas: frame.ctx.gas.consumed(),
                gas_penalty: frame.ctx.gas.penalty(),
            }))
        }
    }
}
