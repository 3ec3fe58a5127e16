// Verifier - Seam towards the bytecode verifier and instrumentor
//
// The engine never looks inside jar bytes. Verification and instrumentation
// are delegated to this collaborator, which annotates raw code with gas
// charges and reports the class metadata the resolution layer needs.

use crate::loader::class_space::ClassDef;

/// The verifier and instrumentor of jars. Given raw jar bytes and the
/// verification rule-set version of the node, it either produces an
/// instrumented jar or fails verification. It can also read back the class
/// metadata of a jar it instrumented earlier.
pub trait JarVerifier: Send + Sync {
    /// Verifies the given raw jar under the given rule-set version and
    /// yields its instrumented form
    fn verify(&self, jar: &[u8], verification_version: u32)
        -> Result<Vec<u8>, VerificationError>;

    /// Yields the classes defined by an instrumented jar
    fn classes_of(&self, instrumented_jar: &[u8]) -> Result<Vec<ClassDef>, VerificationError>;
}

/// Erreurs de vérification
#[derive(Debug, Clone, thiserror::Error)]
pub enum VerificationError {
    #[error("verification failed: {0}")]
    Failed(String),

    #[error("malformed jar: {0}")]
    Malformed(String),
}
