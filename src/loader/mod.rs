// Loader - Class resolution layer of the engine
//
// Builds, from a classpath recorded in store (plus, for jar installations,
// the jar being installed right now), a single resolvable class space
// spanning the transitive closure of its dependencies. Tracks which
// transaction installed the jar defining each class, so that gas can be
// charged for the cost of having loaded it, and reverifies stale bytecode.

pub mod class_space;
pub mod objects;
pub mod reverify;

pub use class_space::{ClassDef, ClassSpace, FieldDef};
pub use objects::StorageObject;
pub use reverify::Reverification;

use crate::store::{Store, StoreError};
use crate::types::{TransactionReference, TransactionResponse};
use crate::verifier::{JarVerifier, VerificationError};
use std::collections::HashMap;

/// The class loader of one transaction
pub struct EngineClassLoader {
    class_space: ClassSpace,

    /// Lengths, in bytes, of the instrumented jars of the classpath and of
    /// its dependency closure
    jar_lengths: Vec<u64>,

    /// Per class, the transaction that installed the jar defining it.
    /// Classes of a jar being installed right now have no entry.
    installer_of_class: HashMap<String, TransactionReference>,

    /// The reverifications performed while building this loader
    reverification: Reverification,

    verification_version: u32,
}

impl EngineClassLoader {
    /// Builds the class loader for the given classpaths and, for a jar
    /// installation, the jar being installed (`extra_jar`).
    ///
    /// Enforces the two hard limits of the consensus: at most
    /// `max_dependencies` jars and at most `max_cumulative_size` bytes of
    /// instrumented code.
    pub fn new(
        extra_jar: Option<&[u8]>,
        classpaths: &[TransactionReference],
        store: &Store,
        verifier: &dyn JarVerifier,
        reverify: bool,
        verification_version: u32,
        max_dependencies: u32,
        max_cumulative_size: u64,
    ) -> Result<Self, LoaderError> {
        let reverification = if reverify {
            Reverification::new(
                classpaths,
                store,
                verifier,
                verification_version,
                max_dependencies,
            )?
        } else {
            Reverification::empty()
        };

        // jars of the class space, in resolution order, each with the
        // transaction that installed it
        let mut jars: Vec<(Vec<u8>, Option<TransactionReference>)> = Vec::new();
        let mut counter = 0u32;

        if let Some(jar) = extra_jar {
            jars.push((jar.to_vec(), None));
            counter += 1;
        }

        for classpath in classpaths {
            add_jars(
                *classpath,
                store,
                &reverification,
                &mut jars,
                &mut counter,
                max_dependencies,
                max_cumulative_size,
            )?;
        }

        let mut class_space = ClassSpace::new();
        let mut installer_of_class = HashMap::new();
        let mut jar_lengths = Vec::with_capacity(jars.len());

        for (jar, installed_by) in &jars {
            jar_lengths.push(jar.len() as u64);

            let defs = verifier.classes_of(jar)?;
            for def in &defs {
                // the first definition of a class wins; the installer map
                // follows the same precedence
                if !class_space.contains(&def.name) {
                    if let Some(transaction) = installed_by {
                        installer_of_class.insert(def.name.clone(), *transaction);
                    }
                }
            }
            class_space.add_jar_classes(defs);
        }

        Ok(Self {
            class_space,
            jar_lengths,
            installer_of_class,
            reverification,
            verification_version,
        })
    }

    pub fn class_space(&self) -> &ClassSpace {
        &self.class_space
    }

    /// Lengths of the jars loaded into this class space, the basis of the
    /// class-loading gas charge
    pub fn jar_lengths(&self) -> &[u64] {
        &self.jar_lengths
    }

    /// The transaction that installed the jar defining the given class
    pub fn transaction_that_installed(&self, class: &str) -> Option<TransactionReference> {
        self.installer_of_class.get(class).copied()
    }

    pub fn verification_version(&self) -> u32 {
        self.verification_version
    }

    /// Persists into the store the responses reverified while building
    /// this loader. Called by the coordinator after a successful delivery.
    pub fn replace_reverified_responses(&self, store: &Store) -> Result<(), StoreError> {
        self.reverification.replace_into(store)
    }
}

/// Expands `classpath` and its dependency closure into `jars`,
/// dependencies first
fn add_jars(
    classpath: TransactionReference,
    store: &Store,
    reverification: &Reverification,
    jars: &mut Vec<(Vec<u8>, Option<TransactionReference>)>,
    counter: &mut u32,
    max_dependencies: u32,
    max_cumulative_size: u64,
) -> Result<(), LoaderError> {
    *counter += 1;
    if *counter > max_dependencies {
        return Err(LoaderError::TooManyDependencies {
            max: max_dependencies,
        });
    }

    let response = response_with_instrumented_jar(classpath, store, reverification)?;
    let (jar, dependencies, _version) = match response.instrumented_jar() {
        Some((jar, dependencies, version)) => (jar.to_vec(), dependencies.to_vec(), version),
        None => {
            // a reverification may have turned the response into a failed one
            if let Some(failure) = response.failure() {
                return Err(LoaderError::ReverificationFailed {
                    transaction: classpath,
                    cause: failure.to_string(),
                });
            }
            return Err(LoaderError::DidNotInstallJar(classpath));
        }
    };

    for dependency in dependencies {
        add_jars(
            dependency,
            store,
            reverification,
            jars,
            counter,
            max_dependencies,
            max_cumulative_size,
        )?;
    }

    jars.push((jar, Some(classpath)));

    let cumulative: u64 = jars.iter().map(|(jar, _)| jar.len() as u64).sum();
    if cumulative > max_cumulative_size {
        return Err(LoaderError::DependenciesTooLarge {
            max: max_cumulative_size,
        });
    }

    Ok(())
}

/// The response of the given transaction, preferring its reverified form
fn response_with_instrumented_jar(
    reference: TransactionReference,
    store: &Store,
    reverification: &Reverification,
) -> Result<TransactionResponse, LoaderError> {
    reverification
        .get_reverified(&reference)
        .map(Ok)
        .unwrap_or_else(|| {
            store
                .get_response(&reference)?
                .ok_or(LoaderError::UnknownTransaction(reference))
        })
}

/// Erreurs de résolution de classes
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("too many dependencies in classpath: max is {max}")]
    TooManyDependencies { max: u32 },

    #[error("too large cumulative size of dependencies in classpath: max is {max} bytes")]
    DependenciesTooLarge { max: u64 },

    #[error("{0}: unknown transaction reference")]
    UnknownTransaction(TransactionReference),

    #[error("{0}: did not install a jar in store")]
    DidNotInstallJar(TransactionReference),

    #[error("{transaction}: reverification failed: {cause}")]
    ReverificationFailed {
        transaction: TransactionReference,
        cause: String,
    },

    #[error("unknown class {0}")]
    UnknownClass(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}
