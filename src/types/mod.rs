// Types fondamentaux de Moneta
// Principle: Immutable data, content-addressed identity

pub mod ledger;
pub mod primitives;
pub mod references;
pub mod requests;
pub mod responses;
pub mod signature;
pub mod updates;
pub mod values;

pub use primitives::*;
pub use references::*;
pub use requests::*;
pub use responses::*;
pub use signature::*;
pub use updates::*;
pub use values::*;
