// Non-initial common - Validation pipeline and gas payment
//
// Everything shared by the gas-paying builders: the precondition checks
// run at construction time, the execution prologue (nonce bump, base
// charges, upfront payment of all promised gas) and the epilogue (refund
// on success, balance reset plus penalty on failure).
//
// The red/green precedence is a fixed business rule: the charge takes red
// coins first and only then green ones; the refund returns green coins
// first, but never more green than was initially taken from green, and the
// rest goes back to red.

use super::context::ExecutionContext;
use super::{NodeInternal, TransactionRejected};
use crate::gas::GasMeter;
use crate::loader::EngineClassLoader;
use crate::runtime::RuntimeFailure;
use crate::types::ledger;
use crate::types::{
    cost_of, Balance, Gas, GasPrice, Nonce, SignatureScheme, StorageReference,
    TransactionReference, TransactionRequest, Update,
};
use crate::node::caches::ConsensusParams;
use std::sync::Arc;
use tracing::debug;

/// The validated common part of a non-initial transaction
pub struct NonInitialBuilder<'a> {
    pub node: NodeInternal<'a>,
    pub reference: TransactionReference,
    pub caller: StorageReference,
    pub nonce: Nonce,
    pub gas_limit: Gas,

    /// Effective gas price: zero for view calls and system calls
    pub gas_price: GasPrice,

    pub loader: Arc<EngineClassLoader>,
    pub consensus: ConsensusParams,
    pub view: bool,
}

impl<'a> NonInitialBuilder<'a> {
    /// Runs the whole validation pipeline. Any violation rejects the
    /// transaction before any state is touched.
    ///
    /// `gas_for_storing_failed_response` enters the minimal gas floor: a
    /// transaction must at least be able to pay for persisting its own
    /// failure. The loader is that of the classpath of the request, except
    /// for jar installations, which resolve against the dependencies they
    /// declare.
    pub fn validate(
        node: NodeInternal<'a>,
        reference: TransactionReference,
        request: &TransactionRequest,
        loader: Arc<EngineClassLoader>,
        view: bool,
        gas_for_storing_failed_response: Gas,
    ) -> Result<Self, TransactionRejected> {
        let caller = request
            .caller()
            .ok_or_else(|| TransactionRejected::new("the request has no caller"))?;
        let nonce = request.nonce().unwrap_or(0);
        let gas_limit = request.gas_limit().unwrap_or(0);
        let declared_price = request.gas_price().unwrap_or(0);

        // view calls run at gas price zero and never persist anything
        let gas_price = if view { 0 } else { declared_price };

        // signed: neither a view call nor a system call
        let signed = !view && !request.is_system();

        let consensus = node.caches.consensus_params().unwrap_or_default();

        // the caller must be an externally owned account
        let caller_class = node.store.class_tag_of(&caller)?.class;
        if !loader.class_space().is_externally_owned_account(&caller_class) {
            return Err(TransactionRejected::new(
                "the caller of a request must be an externally owned account",
            ));
        }

        // the gas limit must be inside the bounds of the node
        let max_gas = if view {
            node.config.max_gas_per_view_transaction
        } else {
            consensus.max_gas_per_transaction
        };
        if gas_limit > max_gas {
            return Err(TransactionRejected(format!(
                "the gas limit of the request is larger than the maximum allowed ({} > {})",
                gas_limit, max_gas
            )));
        }

        // the request must promise at least the minimal gas floor
        let minimum = Self::minimal_gas_required(
            node,
            request,
            loader.as_ref(),
            gas_for_storing_failed_response,
        );
        if gas_limit < minimum {
            return Err(TransactionRejected(format!(
                "not enough gas to start the transaction, expected at least {} units of gas",
                minimum
            )));
        }

        let initialized = node.store.is_initialized()?;

        // the offered gas price must keep up with the current one
        if signed && initialized && !consensus.ignores_gas_price {
            let current = node
                .caches
                .gas_price()
                .unwrap_or(consensus.initial_gas_price);
            if declared_price < current {
                return Err(TransactionRejected(format!(
                    "the gas price of the request is smaller than the current gas price ({} < {})",
                    declared_price, current
                )));
            }
        }

        // the chain id must match
        if signed && initialized {
            let chain_id = request
                .payload()
                .map(|p| p.chain_id.as_str())
                .unwrap_or_default();
            if chain_id != consensus.chain_id {
                return Err(TransactionRejected(format!(
                    "incorrect chain id: the request reports {} but the node requires {}",
                    chain_id, consensus.chain_id
                )));
            }
        }

        // the signature must verify under the scheme of the caller
        if signed && initialized {
            let scheme = Self::scheme_for(&caller_class, loader.as_ref(), &consensus);
            let public_key = node.store.public_key_of(&caller)?;
            let payload_bytes = request.signed_payload();
            let signature = request
                .payload()
                .map(|p| p.signature.clone())
                .unwrap_or_default();

            let valid = node.caches.signature_is_valid(reference, || {
                scheme.verify(&public_key, &payload_bytes, &signature)
            });
            if !valid {
                return Err(TransactionRejected::new("invalid request signature"));
            }
        }

        // the nonce of the caller must agree with the request
        if !view {
            let expected = node.store.nonce_of(&caller)?;
            if expected != nonce {
                return Err(TransactionRejected(format!(
                    "incorrect nonce: the request reports {} but the account {} contains {}",
                    nonce, caller, expected
                )));
            }
        }

        // the payer must be able to pay for all promised gas, red and
        // green coins together
        let cost = cost_of(gas_limit, gas_price);
        if node.store.total_balance_of(&caller)? < cost {
            return Err(TransactionRejected(format!(
                "the payer has not enough funds to buy {} units of gas",
                gas_limit
            )));
        }

        Ok(Self {
            node,
            reference,
            caller,
            nonce,
            gas_limit,
            gas_price,
            loader,
            consensus,
            view,
        })
    }

    /// The minimal gas below which the transaction cannot even start:
    /// base CPU cost, the storage cost of the request itself, the storage
    /// cost of a failed response, and the cost of the class loader
    fn minimal_gas_required(
        node: NodeInternal<'a>,
        request: &TransactionRequest,
        loader: &EngineClassLoader,
        gas_for_storing_failed_response: Gas,
    ) -> Gas {
        let model = node.gas_model;
        let mut minimum = model.cpu_base_transaction_cost();
        minimum = minimum.saturating_add(model.storage_cost_of_bytes(request.serialized_length()));
        minimum = minimum.saturating_add(gas_for_storing_failed_response);

        for length in loader.jar_lengths() {
            minimum = minimum.saturating_add(model.cpu_cost_for_loading_jar(*length));
            minimum = minimum.saturating_add(model.ram_cost_for_loading_jar(*length));
        }

        minimum
    }

    /// The signature scheme of the caller: fixed by its account class when
    /// it names one, the scheme of the consensus otherwise
    fn scheme_for(
        caller_class: &str,
        loader: &EngineClassLoader,
        consensus: &ConsensusParams,
    ) -> SignatureScheme {
        let space = loader.class_space();

        if space.is_subclass_of(caller_class, ledger::ACCOUNT_ED25519_CLASS) {
            SignatureScheme::Ed25519
        } else if space.is_subclass_of(caller_class, ledger::ACCOUNT_SR25519_CLASS) {
            SignatureScheme::Sr25519
        } else {
            consensus.signature
        }
    }

    /// Starts the execution: bumps the nonce, applies the base charges and
    /// deducts the full promised cost from the payer, red coins first
    pub fn start_execution(
        &self,
        request: &TransactionRequest,
    ) -> Result<ExecutionFrame<'a>, TransactionRejected> {
        let mut ctx = ExecutionContext::new(
            self.node.store,
            self.loader.clone(),
            GasMeter::new(self.gas_limit),
            self.reference,
            self.caller,
        );

        // view calls never persist nonce increments
        if !self.view {
            let nonce = self.nonce;
            ctx.object_mut(self.caller)?.set_nonce(nonce + 1);
        }

        let model = self.node.gas_model;
        ctx.gas.charge_cpu(model.cpu_base_transaction_cost())?;
        ctx.gas
            .charge_storage(model.storage_cost_of_bytes(request.serialized_length()))?;
        for length in self.loader.jar_lengths() {
            ctx.gas.charge_cpu(model.cpu_cost_for_loading_jar(*length))?;
            ctx.gas.charge_ram(model.ram_cost_for_loading_jar(*length))?;
        }

        // deduct the full promised cost upfront, red coins before green
        let cost = cost_of(self.gas_limit, self.gas_price);
        let payer = ctx.object_mut(self.caller)?;

        let red = payer.red_balance();
        let green_initially_paid = if red >= cost {
            // red coins cover the whole cost
            if cost > 0 {
                payer.set_red_balance(red - cost);
            }
            0
        } else {
            // red coins go to zero, the remainder comes from green
            let from_green = cost - red;
            if red > 0 {
                payer.set_red_balance(0);
            }
            let green = payer.balance();
            payer.set_balance(green.saturating_sub(from_green));
            from_green
        };

        // what the payer will own if the transaction fails
        let green_balance_on_failure = payer.balance();
        let red_balance_on_failure = payer.red_balance();

        debug!(
            "{}: charged {} upfront for {} units of gas",
            self.reference, cost, self.gas_limit
        );

        Ok(ExecutionFrame {
            ctx,
            caller: self.caller,
            gas_price: self.gas_price,
            view: self.view,
            green_initially_paid,
            green_balance_on_failure,
            red_balance_on_failure,
        })
    }
}

/// The running state of a non-initial execution
pub struct ExecutionFrame<'a> {
    pub ctx: ExecutionContext<'a>,
    caller: StorageReference,
    gas_price: GasPrice,
    view: bool,

    /// Green coins taken by the upfront charge, the pivot of the refund
    green_initially_paid: Balance,

    green_balance_on_failure: Balance,
    red_balance_on_failure: Balance,
}

impl ExecutionFrame<'_> {
    /// Charges the storage cost of the response itself; an out-of-gas here
    /// fails the transaction like any other charge
    pub fn charge_storage_for_response(
        &mut self,
        serialized_length: u64,
        model: &dyn crate::gas::GasCostModel,
    ) -> Result<(), RuntimeFailure> {
        self.ctx
            .gas
            .charge_storage(model.storage_cost_of_bytes(serialized_length))
            .map_err(RuntimeFailure::from)
    }

    /// Pays back the unused gas, green coins first up to the green share
    /// of the upfront payment, the rest back to red
    pub fn refund_remaining_gas(&mut self) -> Result<(), RuntimeFailure> {
        let refund = cost_of(self.ctx.gas.remaining(), self.gas_price);
        if refund == 0 {
            return Ok(());
        }

        let green_initially_paid = self.green_initially_paid;
        let payer = self.ctx.object_mut(self.caller)?;
        let green = payer.balance();

        if refund <= green_initially_paid {
            payer.set_balance(green.saturating_add(refund));
        } else {
            let red = payer.red_balance();
            payer.set_balance(green.saturating_add(green_initially_paid));
            payer.set_red_balance(red.saturating_add(refund - green_initially_paid));
        }

        Ok(())
    }

    /// The failure path: the payer keeps the balances it had after paying
    /// for all promised gas, nothing is refunded
    pub fn reset_payer_to_balances_on_failure(&mut self) -> Result<(), RuntimeFailure> {
        let green = self.green_balance_on_failure;
        let red = self.red_balance_on_failure;
        let payer = self.ctx.object_mut(self.caller)?;
        if payer.balance() != green {
            payer.set_balance(green);
        }
        if payer.red_balance() != red {
            payer.set_red_balance(red);
        }
        Ok(())
    }

    /// The updates of a failed transaction: only the balance and nonce
    /// changes of the caller survive, everything else is discarded
    pub fn updates_to_balance_or_nonce_of_caller(&self) -> Vec<Update> {
        self.ctx
            .extract_updates()
            .into_iter()
            .filter(|update| self.is_update_to_balance_or_nonce_of_caller(update))
            .collect()
    }

    /// True for updates of the balance, red balance or nonce of the caller
    pub fn is_update_to_balance_or_nonce_of_caller(&self, update: &Update) -> bool {
        match update {
            Update::Field { object, field, .. } if *object == self.caller => {
                use crate::types::ledger::fields;
                *field == fields::balance()
                    || *field == fields::red_balance()
                    || *field == fields::nonce()
            }
            _ => false,
        }
    }

    /// Enforced after a view call: its updates must not escape the caller
    pub fn ensure_no_side_effects_beyond_caller(&self) -> Result<(), RuntimeFailure> {
        let escaped = self
            .ctx
            .extract_updates()
            .iter()
            .any(|update| !self.is_update_to_balance_or_nonce_of_caller(update));

        if escaped {
            Err(RuntimeFailure::failed(
                "SideEffectsInViewMethodError",
                "a view method generated updates outside the caller",
                "",
            ))
        } else {
            Ok(())
        }
    }

    pub fn is_view(&self) -> bool {
        self.view
    }
}
