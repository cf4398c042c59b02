use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use wardcache::status::AssignmentCandidate;
use wardcache_core::{BoxError, Lookup};

/// One lookup starting or finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupEvent {
    /// The lookup for the id was polled for the first time.
    Start(u32),
    /// The lookup for the id settled.
    End(u32),
}

#[derive(Debug, Default)]
pub struct LookupCounters {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl LookupCounters {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Assignment lookup keyed by `u32` resident ids.
///
/// Ids without configured records return the default records (empty unless
/// set). Failing ids reject after the delay.
#[derive(Clone, Debug, Default)]
pub struct MockLookup {
    records: Arc<Mutex<HashMap<u32, Vec<AssignmentCandidate>>>>,
    default_records: Vec<AssignmentCandidate>,
    failing: Arc<Mutex<HashSet<u32>>>,
    delay: Duration,
    events: Arc<Mutex<Vec<LookupEvent>>>,
    pub counters: Arc<LookupCounters>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Records returned for ids without their own records.
    pub fn with_default_records(mut self, records: Vec<AssignmentCandidate>) -> Self {
        self.default_records = records;
        self
    }

    pub fn with_records(self, id: u32, records: Vec<AssignmentCandidate>) -> Self {
        self.records.lock().unwrap().insert(id, records);
        self
    }

    pub fn failing(self, id: u32) -> Self {
        self.failing.lock().unwrap().insert(id);
        self
    }

    pub fn calls(&self) -> usize {
        self.counters.calls()
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight()
    }

    pub fn events(&self) -> Vec<LookupEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Ids in the order their lookups started.
    pub fn started(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LookupEvent::Start(id) => Some(id),
                LookupEvent::End(_) => None,
            })
            .collect()
    }

    fn answer(&self, id: u32) -> Result<Vec<AssignmentCandidate>, BoxError> {
        if self.failing.lock().unwrap().contains(&id) {
            return Err(format!("lookup for resident {id} failed").into());
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.default_records.clone()))
    }
}

impl Lookup<u32, Vec<AssignmentCandidate>> for MockLookup {
    fn lookup(&self, id: u32) -> BoxFuture<'static, Result<Vec<AssignmentCandidate>, BoxError>> {
        let this = self.clone();
        Box::pin(async move {
            this.counters.enter();
            this.events.lock().unwrap().push(LookupEvent::Start(id));
            if !this.delay.is_zero() {
                tokio::time::sleep(this.delay).await;
            }
            let result = this.answer(id);
            this.events.lock().unwrap().push(LookupEvent::End(id));
            this.counters.exit();
            result
        })
    }
}
