//! Run persistence.
//!
//! - [`traits::RunStore`] - the persistence collaborator interface
//! - [`memory::InMemoryRunStore`] - bundled in-process implementation

pub mod memory;
pub mod traits;

pub use memory::InMemoryRunStore;
pub use traits::RunStore;
