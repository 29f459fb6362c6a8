//! Hotel supplier abstraction and registry.
//!
//! Every supplier implements [`HotelProvider`]. The [`ProviderRegistry`]
//! holds them keyed by name and provides:
//! - health-filtered, priority-ordered selection
//! - search fan-out that aggregates offers from every healthy supplier
//! - booking failover that stops as soon as a hold may exist

pub mod error;
pub mod memory;
pub mod provider;
pub mod registry;

pub use error::{ProviderError, RegistryError};
pub use memory::InMemoryProvider;
pub use provider::HotelProvider;
pub use registry::{
    ProviderDescriptor, ProviderFailure, ProviderRegistry, RegistryConfig, SearchResults,
};
