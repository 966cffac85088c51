//! Services shared by clients

mod store;

pub use store::FhirStore;
