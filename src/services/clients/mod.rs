pub mod client;
pub mod registry;

pub use client::{ClientKeys, ClientPolicyLookup, ClientRecord, LookupError};
pub use registry::{RegistryError, StaticClientRegistry};
