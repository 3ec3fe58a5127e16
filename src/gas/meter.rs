// Gas Meter - Compteur de gas d'une transaction en vol
use crate::types::{Gas, GasConsumption};

/// Compteur de gas d'une transaction.
///
/// Les compteurs cpu/ram/storage ne font que croître pendant l'exécution.
/// Une charge qui rendrait le gas restant négatif échoue immédiatement avec
/// [`GasError::OutOfGas`]. Les transactions initiales utilisent un compteur
/// non limité dont les charges sont des no-ops.
#[derive(Debug, Clone)]
pub struct GasMeter {
    /// Gas promis par la requête
    gas_limit: Gas,

    /// Gas restant, None pour un compteur non limité
    remaining: Option<Gas>,

    /// Gas consommé pour le CPU
    cpu: Gas,

    /// Gas consommé pour la RAM
    ram: Gas,

    /// Gas consommé pour le stockage
    storage: Gas,

    /// Pile des budgets englobants, pour les sous-calculs clôturés
    fences: Vec<Gas>,
}

impl GasMeter {
    /// Crée un compteur limité au gas promis par la requête
    pub fn new(gas_limit: Gas) -> Self {
        Self {
            gas_limit,
            remaining: Some(gas_limit),
            cpu: 0,
            ram: 0,
            storage: 0,
            fences: Vec::new(),
        }
    }

    /// Compteur non limité, pour les transactions initiales qui ne
    /// consomment pas de gas
    pub fn unmetered() -> Self {
        Self {
            gas_limit: 0,
            remaining: None,
            cpu: 0,
            ram: 0,
            storage: 0,
            fences: Vec::new(),
        }
    }

    fn charge(&mut self, amount: Gas) -> Result<Gas, GasError> {
        match self.remaining {
            // unmetered: nothing is counted
            None => Ok(0),
            Some(remaining) => {
                if remaining < amount {
                    return Err(GasError::OutOfGas {
                        needed: amount,
                        remaining,
                    });
                }
                self.remaining = Some(remaining - amount);
                Ok(amount)
            }
        }
    }

    /// Consomme du gas pour le CPU
    pub fn charge_cpu(&mut self, amount: Gas) -> Result<(), GasError> {
        let charged = self.charge(amount)?;
        self.cpu = self.cpu.checked_add(charged).ok_or(GasError::Overflow)?;
        Ok(())
    }

    /// Consomme du gas pour la RAM
    pub fn charge_ram(&mut self, amount: Gas) -> Result<(), GasError> {
        let charged = self.charge(amount)?;
        self.ram = self.ram.checked_add(charged).ok_or(GasError::Overflow)?;
        Ok(())
    }

    /// Consomme du gas pour le stockage
    pub fn charge_storage(&mut self, amount: Gas) -> Result<(), GasError> {
        let charged = self.charge(amount)?;
        self.storage = self.storage.checked_add(charged).ok_or(GasError::Overflow)?;
        Ok(())
    }

    /// Démarre un sous-calcul clôturé: le montant est retiré du budget
    /// courant et devient le seul gas disponible jusqu'au pop. Un échec du
    /// sous-calcul ne peut donc pas consommer plus que sa clôture.
    pub fn push_fence(&mut self, amount: Gas) -> Result<(), GasError> {
        match self.remaining {
            None => {
                self.fences.push(0);
                Ok(())
            }
            Some(remaining) => {
                if remaining < amount {
                    return Err(GasError::OutOfGas {
                        needed: amount,
                        remaining,
                    });
                }
                self.fences.push(remaining - amount);
                self.remaining = Some(amount);
                Ok(())
            }
        }
    }

    /// Termine le sous-calcul clôturé: le gas non utilisé de la clôture
    /// retourne au budget englobant
    pub fn pop_fence(&mut self) {
        if let Some(saved) = self.fences.pop() {
            if let Some(remaining) = self.remaining {
                self.remaining = Some(remaining.saturating_add(saved));
            }
        }
    }

    /// Gas restant
    pub fn remaining(&self) -> Gas {
        self.remaining.unwrap_or(0)
    }

    pub fn gas_limit(&self) -> Gas {
        self.gas_limit
    }

    /// Gas consommé, ventilé par ressource
    pub fn consumed(&self) -> GasConsumption {
        GasConsumption {
            cpu: self.cpu,
            ram: self.ram,
            storage: self.storage,
        }
    }

    /// Pénalité en cas d'échec: tout le gas promis non consommé
    pub fn penalty(&self) -> Gas {
        self.gas_limit
            .saturating_sub(self.cpu)
            .saturating_sub(self.ram)
            .saturating_sub(self.storage)
    }
}

/// Erreurs de gas
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GasError {
    #[error("Gas insuffisant: besoin de {needed}, reste {remaining}")]
    OutOfGas { needed: Gas, remaining: Gas },

    #[error("Overflow dans le calcul de gas")]
    Overflow,
}
