//! Provider registry: health filtering, priority ordering, search fan-out
//! and booking failover.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use domain::{
    BookingConfirmation, BookingRequest, HotelDetails, HotelOffer, ProviderBookingStatus,
    SearchRequest,
};
use futures_util::future::join_all;
use serde::Serialize;

use crate::error::{ProviderError, RegistryError};
use crate::provider::HotelProvider;

/// Registry-wide settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound for a single provider health check.
    pub health_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_timeout: Duration::from_secs(2),
        }
    }
}

/// Static description of a registered supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Unique supplier code.
    pub name: String,
    /// Lower is tried first.
    pub priority: u32,
    /// Upper bound for every call made to this supplier.
    pub timeout: Duration,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One supplier's failure during a fan-out or failover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

/// Aggregated search output across every healthy supplier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    /// Offers from every supplier that answered, each tagged with its provider code.
    pub hotels: Vec<HotelOffer>,
    /// Suppliers that failed this search.
    pub failures: Vec<ProviderFailure>,
}

struct Entry {
    descriptor: ProviderDescriptor,
    provider: Arc<dyn HotelProvider>,
    /// Last observed health; informational only, never used to skip a check.
    healthy: AtomicBool,
}

impl Entry {
    /// Runs `call` under this supplier's timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.descriptor.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.descriptor.timeout)),
        }
    }
}

/// Registry of hotel suppliers keyed by name.
///
/// Suppliers are registered at start-up through `&mut self`; afterwards the
/// registry is shared read-only (typically behind an `Arc`), so lookups need
/// no lock. Health is re-checked on every selection so a transient outage
/// heals on the next call.
pub struct ProviderRegistry {
    entries: HashMap<String, Arc<Entry>>,
    config: RegistryConfig,
}

impl ProviderRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    /// Registers a supplier under its own name with the default timeout.
    pub fn register(&mut self, provider: Arc<dyn HotelProvider>, priority: u32) {
        let descriptor = ProviderDescriptor::new(provider.name(), priority);
        self.register_with(descriptor, provider);
    }

    /// Registers a supplier with an explicit descriptor. A later registration
    /// under the same name replaces the earlier one.
    pub fn register_with(&mut self, descriptor: ProviderDescriptor, provider: Arc<dyn HotelProvider>) {
        tracing::info!(
            provider = %descriptor.name,
            priority = descriptor.priority,
            timeout = ?descriptor.timeout,
            "provider registered"
        );
        let name = descriptor.name.clone();
        let entry = Entry {
            descriptor,
            provider,
            healthy: AtomicBool::new(true),
        };
        if self.entries.insert(name.clone(), Arc::new(entry)).is_some() {
            tracing::warn!(provider = %name, "provider re-registered, previous entry replaced");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    /// Health as observed by the most recent check of each supplier, sorted by name.
    pub fn last_known_health(&self) -> Vec<(String, bool)> {
        let mut report: Vec<_> = self
            .entries
            .values()
            .map(|e| (e.descriptor.name.clone(), e.healthy.load(Ordering::Relaxed)))
            .collect();
        report.sort();
        report
    }

    /// Checks every supplier concurrently and returns the ones that passed.
    pub async fn healthy(&self) -> Vec<ProviderDescriptor> {
        self.healthy_entries()
            .await
            .into_iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Healthy suppliers ordered by ascending priority, ties broken by name.
    pub async fn by_priority(&self) -> Vec<ProviderDescriptor> {
        self.prioritized_entries()
            .await
            .into_iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Fans the search out to every healthy supplier and aggregates the offers.
    ///
    /// Fails only when no supplier is healthy or every healthy supplier failed.
    #[tracing::instrument(skip(self, request), fields(city = %request.city))]
    pub async fn search_all(&self, request: &SearchRequest) -> Result<SearchResults, RegistryError> {
        let entries = self.prioritized_entries().await;
        if entries.is_empty() {
            return Err(RegistryError::NoHealthyProviders);
        }

        let searches = entries.iter().map(|entry| async move {
            let result = entry
                .bounded(entry.provider.search_availability(request))
                .await;
            (entry, result)
        });

        let mut results = SearchResults::default();
        for (entry, result) in join_all(searches).await {
            let name = &entry.descriptor.name;
            match result {
                Ok(response) => {
                    tracing::debug!(provider = %name, hotels = response.hotels.len(), "search answered");
                    results.hotels.extend(response.hotels.into_iter().map(|mut offer| {
                        offer.provider_code = name.clone();
                        offer
                    }));
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider search failed");
                    results.failures.push(ProviderFailure {
                        provider: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if results.failures.len() == entries.len() {
            return Err(RegistryError::NoProviderAvailable {
                attempts: results.failures,
            });
        }
        Ok(results)
    }

    /// Tries `create_booking` on each healthy supplier in priority order and
    /// returns the first hold.
    ///
    /// Failover only happens while no hold can exist. If a supplier's outcome
    /// is ambiguous (timeout, lost acknowledgement) the loop stops with
    /// [`RegistryError::HoldUncertain`] so the caller cancels at that supplier
    /// instead of holding a second room elsewhere.
    #[tracing::instrument(skip(self, request), fields(booking_id = %request.booking_id))]
    pub async fn create_booking_with_fallback(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, RegistryError> {
        let entries = self.prioritized_entries().await;
        if entries.is_empty() {
            return Err(RegistryError::NoHealthyProviders);
        }

        let mut attempts = Vec::new();
        for entry in &entries {
            let name = &entry.descriptor.name;
            match entry.bounded(entry.provider.create_booking(request)).await {
                Ok(mut confirmation) => {
                    confirmation.provider_code = name.clone();
                    tracing::info!(
                        provider = %name,
                        reference = %confirmation.provider_reference,
                        "booking held at provider"
                    );
                    return Ok(confirmation);
                }
                Err(e) if e.is_hold_ambiguous() => {
                    tracing::error!(
                        provider = %name,
                        error = %e,
                        "booking outcome at provider is ambiguous, stopping failover"
                    );
                    metrics::counter!("provider_booking_failures_total", "provider" => name.clone())
                        .increment(1);
                    return Err(RegistryError::HoldUncertain {
                        provider: name.clone(),
                        reference: e.reference().map(str::to_string),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider failed to create booking, trying next");
                    metrics::counter!("provider_booking_failures_total", "provider" => name.clone())
                        .increment(1);
                    attempts.push(ProviderFailure {
                        provider: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(RegistryError::NoProviderAvailable { attempts })
    }

    /// Cancels a hold at the supplier that issued it.
    pub async fn cancel_booking(&self, provider: &str, reference: &str) -> Result<(), RegistryError> {
        let entry = self.entry(provider)?;
        entry
            .bounded(entry.provider.cancel_booking(reference))
            .await
            .map_err(|source| RegistryError::Provider {
                provider: provider.to_string(),
                source,
            })
    }

    pub async fn get_booking_status(
        &self,
        provider: &str,
        reference: &str,
    ) -> Result<ProviderBookingStatus, RegistryError> {
        let entry = self.entry(provider)?;
        entry
            .bounded(entry.provider.get_booking_status(reference))
            .await
            .map_err(|source| RegistryError::Provider {
                provider: provider.to_string(),
                source,
            })
    }

    pub async fn get_hotel_details(
        &self,
        provider: &str,
        hotel_id: &str,
    ) -> Result<HotelDetails, RegistryError> {
        let entry = self.entry(provider)?;
        entry
            .bounded(entry.provider.get_hotel_details(hotel_id))
            .await
            .map(|mut details| {
                details.provider_code = provider.to_string();
                details
            })
            .map_err(|source| RegistryError::Provider {
                provider: provider.to_string(),
                source,
            })
    }

    fn entry(&self, name: &str) -> Result<&Arc<Entry>, RegistryError> {
        self.entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))
    }

    async fn check_health(&self, entry: &Entry) -> bool {
        let healthy = match tokio::time::timeout(
            self.config.health_timeout,
            entry.provider.health_check(),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(provider = %entry.descriptor.name, error = %e, "provider health check failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    provider = %entry.descriptor.name,
                    timeout = ?self.config.health_timeout,
                    "provider health check timed out"
                );
                false
            }
        };
        entry.healthy.store(healthy, Ordering::Relaxed);
        healthy
    }

    async fn healthy_entries(&self) -> Vec<Arc<Entry>> {
        let checks = self.entries.values().map(|entry| async move {
            let healthy = self.check_health(entry).await;
            (Arc::clone(entry), healthy)
        });
        join_all(checks)
            .await
            .into_iter()
            .filter_map(|(entry, healthy)| healthy.then_some(entry))
            .collect()
    }

    async fn prioritized_entries(&self) -> Vec<Arc<Entry>> {
        let mut entries = self.healthy_entries().await;
        entries.sort_by(|a, b| {
            a.descriptor
                .priority
                .cmp(&b.descriptor.priority)
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
        });
        entries
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
