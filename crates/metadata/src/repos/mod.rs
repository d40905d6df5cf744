//! Repository traits, one per concern.

pub mod ledger;
pub mod ownership;

pub use ledger::LedgerRepo;
pub use ownership::OwnershipRepo;
