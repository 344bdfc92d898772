//! Integration tests for the location tracker.
//!
//! These tests drive the public API end to end:
//! - listener registration and provider selection
//! - position fan-out from a simulated source
//! - restart recovery through a shared store
//! - provider loss
//! - listeners racing deliveries or calling back into the tracker
//!
//! Run with: `cargo test --test tracker_integration`

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use tempfile::TempDir;

use geotrack::persistence::{ByteStore, FileStore, MemoryStore, PersistenceGateway};
use geotrack::selector::Selection;
use geotrack::source::{FlakySource, SimulatedSource, SourceEvent, SubscriptionParams};
use geotrack::{
    EventOutcome, ListenerError, ListenerRecord, LocationTracker, Position, PositionListener,
    ProviderId, TrackerError,
};

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Changed(Position),
    Delta(Position, Option<Position>),
}

/// Listener that records every callback it receives.
struct Recorder {
    label: String,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn changed_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Changed(_)))
            .count()
    }
}

impl PositionListener for Recorder {
    fn on_position_changed(&self, current: &Position) -> Result<(), ListenerError> {
        self.calls.lock().push(Call::Changed(current.clone()));
        Ok(())
    }

    fn on_position_delta(
        &self,
        previous: &Position,
        current: Option<&Position>,
    ) -> Result<(), ListenerError> {
        self.calls
            .lock()
            .push(Call::Delta(previous.clone(), current.cloned()));
        Ok(())
    }

    fn kind(&self) -> &str {
        "recorder"
    }

    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("label".to_string(), self.label.clone())])
    }
}

/// Factory that rebuilds recorders and keeps a handle on each one.
#[derive(Default)]
struct RecorderFactory {
    built: Mutex<Vec<(String, Arc<Recorder>)>>,
}

impl RecorderFactory {
    fn built(&self, name: &str) -> Arc<Recorder> {
        self.built
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| Arc::clone(r))
            .unwrap_or_else(|| panic!("listener '{}' was not rebuilt", name))
    }
}

impl geotrack::ListenerFactory for RecorderFactory {
    fn restore(&self, record: &ListenerRecord) -> Option<Arc<dyn PositionListener>> {
        if record.kind != "recorder" {
            return None;
        }
        let label = record.params.get("label")?;
        let recorder = Recorder::new(label);
        self.built
            .lock()
            .push((record.name.clone(), Arc::clone(&recorder)));
        Some(recorder)
    }
}

fn gps() -> ProviderId {
    ProviderId::new("gps")
}

fn create_tracker(
    source: Arc<SimulatedSource>,
    store: Arc<dyn ByteStore>,
) -> Arc<LocationTracker> {
    LocationTracker::new(
        source,
        PersistenceGateway::with_defaults(store),
        SubscriptionParams::default(),
    )
}

// ============================================================================
// Registration and selection
// ============================================================================

#[test]
fn test_first_add_selects_once_second_add_does_not() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source.clone(), Arc::new(MemoryStore::new()));

    tracker.add_listener("a", Recorder::new("a")).unwrap();
    assert_eq!(source.best_provider_calls(), 1);

    tracker.add_listener("b", Recorder::new("b")).unwrap();
    assert_eq!(source.best_provider_calls(), 1);
    assert_eq!(source.subscription_count(), 1);
}

#[test]
fn test_removing_last_listener_stops_tracking() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source.clone(), Arc::new(MemoryStore::new()));
    tracker.add_listener("a", Recorder::new("a")).unwrap();
    tracker.add_listener("b", Recorder::new("b")).unwrap();

    assert!(tracker.remove_listener("a"));
    assert!(tracker.is_tracking());

    assert!(tracker.remove_listener("b"));
    assert!(!tracker.is_tracking());
    assert_eq!(source.subscription_count(), 0);
}

#[test]
fn test_position_event_reaches_every_listener_once() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source.clone(), Arc::new(MemoryStore::new()));
    let recorders: Vec<_> = ["a", "b", "c"].iter().map(|n| Recorder::new(n)).collect();
    for (name, recorder) in ["a", "b", "c"].iter().zip(&recorders) {
        tracker.add_listener(*name, recorder.clone()).unwrap();
    }

    let fix = Position::now(48.85, 2.35, 4.0, gps());
    source.emit_position(fix.clone());

    for recorder in &recorders {
        assert_eq!(recorder.calls(), vec![Call::Changed(fix.clone())]);
    }
}

#[test]
fn test_new_listener_receives_last_known_fix() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let fix = Position::now(10.0, 20.0, 5.0, gps());
    source.set_last_known(&gps(), Some(fix.clone()));
    let tracker = create_tracker(source, Arc::new(MemoryStore::new()));
    let recorder = Recorder::new("a");

    tracker.add_listener("a", recorder.clone()).unwrap();

    assert_eq!(recorder.calls(), vec![Call::Changed(fix)]);
}

#[test]
fn test_first_add_without_provider_is_rejected() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    source.set_enabled(&gps(), false);
    let store = Arc::new(MemoryStore::new());
    let tracker = create_tracker(source.clone(), store.clone());

    assert_eq!(
        tracker.add_listener("a", Recorder::new("a")),
        Err(TrackerError::NoProviderAvailable)
    );
    assert!(tracker.listener_names().is_empty());
    assert!(!store.contains("location_listeners"));
}

#[test]
fn test_disabling_only_provider_keeps_registering_listeners() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let store = Arc::new(MemoryStore::new());
    let tracker = create_tracker(source.clone(), store.clone());
    tracker.add_listener("a", Recorder::new("a")).unwrap();

    source.disable(&gps());

    assert!(!tracker.is_tracking());
    assert_eq!(source.subscription_count(), 0);

    let b = Recorder::new("b");
    tracker.add_listener("b", b.clone()).unwrap();
    assert_eq!(
        tracker.listener_names(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert!(b.calls().is_empty());
    assert!(!tracker.is_tracking());

    let persisted: Vec<String> = PersistenceGateway::with_defaults(store)
        .load_registry()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(persisted, vec!["a".to_string(), "b".to_string()]);

    // Provider comes back: the next add resumes tracking.
    source.set_enabled(&gps(), true);
    tracker.add_listener("c", Recorder::new("c")).unwrap();
    assert_eq!(tracker.active_provider(), Some(gps()));
}

#[test]
fn test_flaky_provider_query_suspends_then_resumes_tracking() {
    let source = Arc::new(FlakySource::new(SimulatedSource::fixed("gps"), 2));
    let tracker = LocationTracker::new(
        source.clone(),
        PersistenceGateway::with_defaults(Arc::new(MemoryStore::new())),
        SubscriptionParams::default(),
    );
    tracker.add_listener("a", Recorder::new("a")).unwrap();

    // Second query is dropped by the source.
    assert_eq!(
        tracker.handle_event(SourceEvent::StatusChanged(gps())),
        EventOutcome::TrackingInactive(TrackerError::NoProviderAvailable)
    );
    assert_eq!(source.inner().subscription_count(), 0);

    assert_eq!(
        tracker.handle_event(SourceEvent::StatusChanged(gps())),
        EventOutcome::Reselected(Selection::Switched {
            from: None,
            to: gps()
        })
    );
    assert_eq!(source.inner().subscription_count(), 1);
}

#[test]
fn test_provider_failover_and_recovery() {
    let source = Arc::new(
        SimulatedSource::new()
            .with_provider("gps", 5.0)
            .with_provider("network", 50.0),
    );
    let tracker = create_tracker(source.clone(), Arc::new(MemoryStore::new()));
    tracker.add_listener("a", Recorder::new("a")).unwrap();
    assert_eq!(tracker.active_provider(), Some(gps()));

    source.disable(&gps());
    assert_eq!(tracker.active_provider(), Some(ProviderId::new("network")));

    source.enable(&gps());
    assert_eq!(tracker.active_provider(), Some(gps()));
    assert_eq!(source.subscription_count(), 1);
}

// ============================================================================
// Restart recovery
// ============================================================================

#[test]
fn test_restart_delivers_one_delta_per_listener() {
    let store = Arc::new(MemoryStore::new());
    let p1 = Position::now(10.0, 20.0, 5.0, gps());
    let p2 = Position::now(10.001, 20.0, 5.0, gps());

    // First run: two listeners see P1, then the process stops.
    {
        let source = Arc::new(SimulatedSource::fixed("gps"));
        let tracker = create_tracker(source.clone(), store.clone());
        tracker.add_listener("a", Recorder::new("a")).unwrap();
        tracker.add_listener("b", Recorder::new("b")).unwrap();
        source.emit_position(p1.clone());
        tracker.shutdown();
    }

    // Second run: the device has moved to P2.
    let source = Arc::new(SimulatedSource::fixed("gps"));
    source.set_last_known(&gps(), Some(p2.clone()));
    let tracker = create_tracker(source, store.clone());
    let factory = RecorderFactory::default();

    let summary = tracker.restore(&factory);

    assert_eq!(summary.restored, 2);
    assert_eq!(summary.dormant, 0);
    assert_eq!(summary.provider, Some(gps()));
    assert_eq!(summary.delta.delivered, 2);
    for name in ["a", "b"] {
        let recorder = factory.built(name);
        assert_eq!(recorder.label, name);
        assert_eq!(recorder.calls(), vec![Call::Delta(p1.clone(), Some(p2.clone()))]);
        assert_eq!(recorder.changed_count(), 0);
    }

    let gateway = PersistenceGateway::with_defaults(store);
    assert_eq!(gateway.load_position(), Some(p2));
}

#[test]
fn test_restart_without_checkpoint_sends_no_delta() {
    let store = Arc::new(MemoryStore::new());
    {
        let source = Arc::new(SimulatedSource::fixed("gps"));
        let tracker = create_tracker(source, store.clone());
        tracker.add_listener("a", Recorder::new("a")).unwrap();
    }

    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source, store);
    let factory = RecorderFactory::default();

    let summary = tracker.restore(&factory);

    assert_eq!(summary.restored, 1);
    assert_eq!(summary.delta.attempted(), 0);
    assert!(factory.built("a").calls().is_empty());
}

#[test]
fn test_unknown_records_stay_dormant_until_reregistered() {
    let store = Arc::new(MemoryStore::new());
    store.put(
        "location_listeners",
        r#"{"version":1,"listeners":[{"name":"a","kind":"recorder","params":{"label":"a"}},{"name":"z","kind":"plugin"}]}"#,
    );
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source, store.clone());

    let summary = tracker.restore(&RecorderFactory::default());

    assert_eq!(summary.restored, 1);
    assert_eq!(summary.dormant, 1);
    assert_eq!(tracker.dormant_names(), vec!["z".to_string()]);

    tracker.add_listener("z", Recorder::new("z")).unwrap();
    assert!(tracker.dormant_names().is_empty());
    assert_eq!(
        tracker.listener_names(),
        vec!["a".to_string(), "z".to_string()]
    );
}

#[test]
fn test_corrupted_registry_restores_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.put("location_listeners", b"\x00\xffnot json".to_vec());
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source.clone(), store);

    let summary = tracker.restore(&RecorderFactory::default());

    assert_eq!(summary.restored, 0);
    assert!(tracker.listener_names().is_empty());
    assert!(!tracker.is_tracking());
    assert_eq!(source.subscription_count(), 0);
}

#[test]
fn test_restart_through_file_store() {
    let temp_dir = TempDir::new().unwrap();
    let p1 = Position::now(10.0, 20.0, 5.0, gps());
    let p2 = Position::now(10.001, 20.0, 5.0, gps());

    {
        let source = Arc::new(SimulatedSource::fixed("gps"));
        let tracker = create_tracker(source.clone(), Arc::new(FileStore::new(temp_dir.path())));
        tracker.add_listener("a", Recorder::new("a")).unwrap();
        source.emit_position(p1.clone());
    }

    let source = Arc::new(SimulatedSource::fixed("gps"));
    source.set_last_known(&gps(), Some(p2.clone()));
    let tracker = create_tracker(source, Arc::new(FileStore::new(temp_dir.path())));
    let factory = RecorderFactory::default();

    tracker.restore(&factory);

    assert_eq!(factory.built("a").calls(), vec![Call::Delta(p1, Some(p2))]);
}

// ============================================================================
// Concurrency and re-entry
// ============================================================================

#[test]
fn test_concurrent_add_gets_first_fix_before_pump_updates() {
    const FIXES: usize = 200;
    let source = Arc::new(SimulatedSource::fixed("gps"));
    source.set_last_known(&gps(), Some(Position::now(0.0, 0.0, 5.0, gps())));
    let tracker = create_tracker(source.clone(), Arc::new(MemoryStore::new()));
    tracker.add_listener("anchor", Recorder::new("anchor")).unwrap();
    let recorders: Vec<_> = (0..20).map(|i| Recorder::new(&format!("l{}", i))).collect();

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 1..=FIXES {
                source.emit_position(Position::now(i as f64 * 0.001, 0.0, 5.0, gps()));
            }
        });
        scope.spawn(|| {
            for recorder in &recorders {
                tracker
                    .add_listener(recorder.label.clone(), recorder.clone())
                    .unwrap();
            }
        });
    });

    let last = FIXES as f64 * 0.001;
    for recorder in &recorders {
        let latitudes: Vec<f64> = recorder
            .calls()
            .into_iter()
            .map(|call| match call {
                Call::Changed(p) => p.latitude(),
                Call::Delta(..) => panic!("unexpected delta for {}", recorder.label),
            })
            .collect();

        // The first call is the first-listen fix; pump updates only follow it.
        assert!(!latitudes.is_empty());
        assert!(
            latitudes.windows(2).all(|w| w[0] <= w[1]),
            "{}: {:?}",
            recorder.label,
            latitudes
        );
        assert_eq!(latitudes.last().copied(), Some(last));
    }
}

/// Removes itself from the tracker on its first update.
struct RemovesItself {
    tracker: Weak<LocationTracker>,
    updates: AtomicUsize,
}

impl PositionListener for RemovesItself {
    fn on_position_changed(&self, _current: &Position) -> Result<(), ListenerError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.remove_listener("once");
        }
        Ok(())
    }

    fn on_position_delta(&self, _: &Position, _: Option<&Position>) -> Result<(), ListenerError> {
        Ok(())
    }

    fn kind(&self) -> &str {
        "removes-itself"
    }
}

/// Registers `child` on its first update.
struct AddsChild {
    tracker: Weak<LocationTracker>,
    child: Arc<Recorder>,
    added: AtomicBool,
}

impl PositionListener for AddsChild {
    fn on_position_changed(&self, _current: &Position) -> Result<(), ListenerError> {
        if self.added.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(tracker) = self.tracker.upgrade() {
            tracker
                .add_listener("child", self.child.clone())
                .map_err(|e| ListenerError::Failed(e.to_string()))?;
        }
        Ok(())
    }

    fn on_position_delta(&self, _: &Position, _: Option<&Position>) -> Result<(), ListenerError> {
        Ok(())
    }

    fn kind(&self) -> &str {
        "adds-child"
    }
}

#[test]
fn test_listener_can_mutate_registry_from_callback() {
    let source = Arc::new(SimulatedSource::fixed("gps"));
    let tracker = create_tracker(source.clone(), Arc::new(MemoryStore::new()));
    let keep = Recorder::new("keep");
    let once = Arc::new(RemovesItself {
        tracker: Arc::downgrade(&tracker),
        updates: AtomicUsize::new(0),
    });
    let child = Recorder::new("child");
    let parent = Arc::new(AddsChild {
        tracker: Arc::downgrade(&tracker),
        child: child.clone(),
        added: AtomicBool::new(false),
    });
    tracker.add_listener("keep", keep.clone()).unwrap();
    tracker.add_listener("once", once.clone()).unwrap();
    tracker.add_listener("parent", parent).unwrap();

    let fix1 = Position::now(10.0, 20.0, 5.0, gps());
    assert_eq!(source.emit_position(fix1.clone()), 1);

    assert_eq!(
        tracker.listener_names(),
        vec!["child".to_string(), "keep".to_string(), "parent".to_string()]
    );
    assert_eq!(child.calls(), vec![Call::Changed(fix1.clone())]);

    let fix2 = Position::now(10.001, 20.0, 5.0, gps());
    source.emit_position(fix2.clone());

    assert_eq!(once.updates.load(Ordering::SeqCst), 1);
    assert_eq!(
        child.calls(),
        vec![Call::Changed(fix1.clone()), Call::Changed(fix2.clone())]
    );
    assert_eq!(keep.calls(), vec![Call::Changed(fix1), Call::Changed(fix2)]);
}

/// Emits a fresh fix from another thread while handling the restart delta.
struct EmitsDuringDelta {
    source: Arc<SimulatedSource>,
    fresh: Position,
    emitter: Mutex<Option<thread::JoinHandle<()>>>,
    calls: Mutex<Vec<Call>>,
}

impl PositionListener for EmitsDuringDelta {
    fn on_position_changed(&self, current: &Position) -> Result<(), ListenerError> {
        self.calls.lock().push(Call::Changed(current.clone()));
        Ok(())
    }

    fn on_position_delta(
        &self,
        previous: &Position,
        current: Option<&Position>,
    ) -> Result<(), ListenerError> {
        self.calls
            .lock()
            .push(Call::Delta(previous.clone(), current.cloned()));

        let source = Arc::clone(&self.source);
        let fresh = self.fresh.clone();
        *self.emitter.lock() = Some(thread::spawn(move || {
            source.emit_position(fresh);
        }));
        thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    fn kind(&self) -> &str {
        "emits-during-delta"
    }
}

#[test]
fn test_fix_arriving_during_restart_waits_for_delta() {
    let store = Arc::new(MemoryStore::new());
    let p1 = Position::now(10.0, 20.0, 5.0, gps());
    let p2 = Position::now(10.001, 20.0, 5.0, gps());
    let p3 = Position::now(10.002, 20.0, 5.0, gps());
    let gateway = PersistenceGateway::with_defaults(store.clone());
    gateway.save_registry(&[ListenerRecord {
        name: "a".to_string(),
        kind: "emits-during-delta".to_string(),
        params: BTreeMap::new(),
    }]);
    gateway.save_position(&p1);

    let source = Arc::new(SimulatedSource::fixed("gps"));
    source.set_last_known(&gps(), Some(p2.clone()));
    let listener = Arc::new(EmitsDuringDelta {
        source: source.clone(),
        fresh: p3.clone(),
        emitter: Mutex::new(None),
        calls: Mutex::new(Vec::new()),
    });
    let tracker = create_tracker(source, store);
    let factory = |_: &ListenerRecord| -> Option<Arc<dyn PositionListener>> {
        Some(listener.clone() as Arc<dyn PositionListener>)
    };

    tracker.restore(&factory);
    let emitter = listener.emitter.lock().take();
    emitter.expect("delta was delivered").join().unwrap();

    assert_eq!(
        listener.calls.lock().clone(),
        vec![Call::Delta(p1, Some(p2)), Call::Changed(p3.clone())]
    );
    assert_eq!(gateway.load_position(), Some(p3));
}

// ============================================================================
// Property tests
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add(u8),
    Remove(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..6).prop_map(Op::Add), (0u8..6).prop_map(Op::Remove)]
}

proptest! {
    #[test]
    fn prop_registry_matches_add_remove_model(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let source = Arc::new(SimulatedSource::fixed("gps"));
        let store = Arc::new(MemoryStore::new());
        let tracker = create_tracker(source.clone(), store.clone());
        let mut model = BTreeSet::new();

        for op in ops {
            match op {
                Op::Add(n) => {
                    let name = format!("l{}", n);
                    tracker.add_listener(name.clone(), Recorder::new(&name)).unwrap();
                    model.insert(name);
                }
                Op::Remove(n) => {
                    let name = format!("l{}", n);
                    prop_assert_eq!(tracker.remove_listener(&name), model.remove(&name));
                }
            }
        }

        let expected: Vec<String> = model.iter().cloned().collect();
        prop_assert_eq!(tracker.listener_names(), expected.clone());
        prop_assert_eq!(tracker.is_tracking(), !model.is_empty());
        prop_assert_eq!(source.subscription_count(), usize::from(!model.is_empty()));

        let persisted: Vec<String> = PersistenceGateway::with_defaults(store)
            .load_registry()
            .into_iter()
            .map(|r| r.name)
            .collect();
        prop_assert_eq!(persisted, expected);
    }
}
