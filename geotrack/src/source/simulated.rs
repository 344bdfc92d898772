//! In-process position sources with scripted behavior.
//!
//! - [`SimulatedSource`] - table of providers that can be enabled, disabled
//!   and made to emit fixes on demand
//! - [`NoProviderSource`] - never has a provider
//! - [`FlakySource`] - wraps another source and drops every Nth provider query

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    PositionSink, PositionSource, SourceError, SourceEvent, SubscriptionId, SubscriptionParams,
};
use crate::position::{Criteria, Position, ProviderId};

struct ProviderEntry {
    id: ProviderId,
    accuracy_m: f32,
    enabled: bool,
    last_known: Option<Position>,
}

struct Subscription {
    provider: ProviderId,
    params: SubscriptionParams,
    sink: Arc<dyn PositionSink>,
}

#[derive(Default)]
struct SimulatedState {
    providers: Vec<ProviderEntry>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_id: u64,
}

/// Scriptable position source.
///
/// The best provider is the enabled one meeting the criteria with the
/// smallest accuracy radius; ties go to the provider registered first.
/// Toggling a provider with [`enable`](Self::enable) or
/// [`disable`](Self::disable) notifies every live sink, like an OS location
/// service would.
#[derive(Default)]
pub struct SimulatedSource {
    state: Mutex<SimulatedState>,
    best_provider_calls: AtomicUsize,
}

impl SimulatedSource {
    /// Create a source with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source with a single enabled provider.
    pub fn fixed(provider: impl Into<ProviderId>) -> Self {
        Self::new().with_provider(provider, 10.0)
    }

    /// Add an enabled provider with the given accuracy radius.
    pub fn with_provider(self, provider: impl Into<ProviderId>, accuracy_m: f32) -> Self {
        self.state.lock().providers.push(ProviderEntry {
            id: provider.into(),
            accuracy_m,
            enabled: true,
            last_known: None,
        });
        self
    }

    /// Set the last known fix of a provider.
    pub fn set_last_known(&self, provider: &ProviderId, position: Option<Position>) {
        let mut state = self.state.lock();
        if let Some(entry) = state.providers.iter_mut().find(|p| &p.id == provider) {
            entry.last_known = position;
        }
    }

    /// Enable a provider and notify all sinks.
    pub fn enable(&self, provider: &ProviderId) {
        if self.set_enabled(provider, true) {
            self.emit(SourceEvent::ProviderEnabled(provider.clone()));
        }
    }

    /// Disable a provider and notify all sinks.
    ///
    /// Subscriptions to the provider stay registered, as on a real device;
    /// they simply stop producing fixes.
    pub fn disable(&self, provider: &ProviderId) {
        if self.set_enabled(provider, false) {
            self.emit(SourceEvent::ProviderDisabled(provider.clone()));
        }
    }

    /// Change the enabled flag without notifying anyone.
    ///
    /// Returns false if the provider is unknown.
    pub fn set_enabled(&self, provider: &ProviderId, enabled: bool) -> bool {
        let mut state = self.state.lock();
        match state.providers.iter_mut().find(|p| &p.id == provider) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Report a new fix from its provider.
    ///
    /// The fix becomes the provider's last known position and is delivered to
    /// every sink subscribed to that provider. Fixes from disabled providers
    /// are dropped. Returns the number of sinks called.
    pub fn emit_position(&self, position: Position) -> usize {
        let sinks: Vec<Arc<dyn PositionSink>> = {
            let mut state = self.state.lock();
            let provider = position.provider().clone();
            match state.providers.iter_mut().find(|p| p.id == provider) {
                Some(entry) if entry.enabled => entry.last_known = Some(position.clone()),
                _ => return 0,
            }
            state
                .subscriptions
                .values()
                .filter(|s| s.provider == provider)
                .map(|s| Arc::clone(&s.sink))
                .collect()
        };

        for sink in &sinks {
            sink.on_event(SourceEvent::PositionChanged(position.clone()));
        }
        sinks.len()
    }

    /// Deliver an arbitrary event to every live sink.
    pub fn emit(&self, event: SourceEvent) -> usize {
        // Sinks may call back into the source; never hold the lock while calling.
        let sinks: Vec<Arc<dyn PositionSink>> = self
            .state
            .lock()
            .subscriptions
            .values()
            .map(|s| Arc::clone(&s.sink))
            .collect();

        for sink in &sinks {
            sink.on_event(event.clone());
        }
        sinks.len()
    }

    /// Providers with a live subscription, with their parameters.
    pub fn subscriptions(&self) -> Vec<(ProviderId, SubscriptionParams)> {
        self.state
            .lock()
            .subscriptions
            .values()
            .map(|s| (s.provider.clone(), s.params))
            .collect()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// How many times `best_provider` has been called.
    pub fn best_provider_calls(&self) -> usize {
        self.best_provider_calls.load(Ordering::SeqCst)
    }
}

impl PositionSource for SimulatedSource {
    fn best_provider(&self, criteria: &Criteria, require_enabled: bool) -> Option<ProviderId> {
        self.best_provider_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.state.lock();
        let mut best: Option<&ProviderEntry> = None;
        for entry in state
            .providers
            .iter()
            .filter(|p| p.enabled || !require_enabled)
            .filter(|p| criteria.accepts(p.accuracy_m))
        {
            if best.map_or(true, |b| entry.accuracy_m < b.accuracy_m) {
                best = Some(entry);
            }
        }
        best.map(|b| b.id.clone())
    }

    fn subscribe(
        &self,
        provider: &ProviderId,
        params: SubscriptionParams,
        sink: Arc<dyn PositionSink>,
    ) -> Result<SubscriptionId, SourceError> {
        let mut state = self.state.lock();
        if !state.providers.iter().any(|p| &p.id == provider) {
            return Err(SourceError::Unavailable(provider.clone()));
        }

        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscriptions.insert(
            id,
            Subscription {
                provider: provider.clone(),
                params,
                sink,
            },
        );
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.state.lock().subscriptions.remove(&subscription);
    }

    fn last_known_position(&self, provider: &ProviderId) -> Result<Option<Position>, SourceError> {
        let state = self.state.lock();
        state
            .providers
            .iter()
            .find(|p| &p.id == provider)
            .map(|p| p.last_known.clone())
            .ok_or_else(|| SourceError::Unavailable(provider.clone()))
    }
}

/// Source without any provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProviderSource;

impl PositionSource for NoProviderSource {
    fn best_provider(&self, _criteria: &Criteria, _require_enabled: bool) -> Option<ProviderId> {
        None
    }

    fn subscribe(
        &self,
        provider: &ProviderId,
        _params: SubscriptionParams,
        _sink: Arc<dyn PositionSink>,
    ) -> Result<SubscriptionId, SourceError> {
        Err(SourceError::Unavailable(provider.clone()))
    }

    fn unsubscribe(&self, _subscription: SubscriptionId) {}

    fn last_known_position(&self, _provider: &ProviderId) -> Result<Option<Position>, SourceError> {
        Ok(None)
    }
}

/// Wraps a source and answers "no provider" to every Nth query.
pub struct FlakySource<S> {
    inner: S,
    every: usize,
    calls: AtomicUsize,
}

impl<S: PositionSource> FlakySource<S> {
    /// Fail every `every`-th `best_provider` call (1-based). Zero never fails.
    pub fn new(inner: S, every: usize) -> Self {
        Self {
            inner,
            every,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: PositionSource> PositionSource for FlakySource<S> {
    fn best_provider(&self, criteria: &Criteria, require_enabled: bool) -> Option<ProviderId> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.every != 0 && call % self.every == 0 {
            tracing::debug!(call, "Flaky source dropping provider query");
            return None;
        }
        self.inner.best_provider(criteria, require_enabled)
    }

    fn subscribe(
        &self,
        provider: &ProviderId,
        params: SubscriptionParams,
        sink: Arc<dyn PositionSink>,
    ) -> Result<SubscriptionId, SourceError> {
        self.inner.subscribe(provider, params, sink)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.inner.unsubscribe(subscription)
    }

    fn last_known_position(&self, provider: &ProviderId) -> Result<Option<Position>, SourceError> {
        self.inner.last_known_position(provider)
    }
}
