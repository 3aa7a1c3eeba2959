//! Debounced, deduplicated range fetching on top of the range tracker

use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;
use web_time::{Duration, Instant};

use super::range::{FetchId, IndexRange, RangeTracker};

/// Why a range fetch did not produce data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("loader is not running")]
    Disconnected,
}

/// Rows and columns a fetch should cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub rows: Vec<i32>,
    pub cols: Vec<i32>,
}

impl FetchRequest {
    pub fn new(rows: Vec<i32>, cols: Vec<i32>) -> Self {
        Self { rows, cols }
    }

    pub fn from_range(range: &IndexRange) -> Self {
        Self {
            rows: range.rows.to_vec(),
            cols: range.cols.to_vec(),
        }
    }

    pub fn bounds(&self) -> Option<IndexRange> {
        IndexRange::from_indices(&self.rows, &self.cols)
    }
}

/// Completion of a dispatched fetch
#[derive(Debug)]
pub struct FetchOutcome<T> {
    pub id: FetchId,
    pub result: Result<T, FetchError>,
}

/// Data source the scheduler drives. Implementations start the request in
/// `dispatch` and report completion through `poll`; they must tolerate
/// overlapping ranges being requested more than once.
pub trait RangeFetcher {
    type Output;

    fn dispatch(&mut self, id: FetchId, request: FetchRequest);

    fn poll(&mut self) -> Option<FetchOutcome<Self::Output>>;
}

/// Trailing-edge debounce: only the last value passed to `call` survives, and
/// it is released once `delay` has passed without another call.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<T>,
    last_call: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            last_call: None,
        }
    }

    pub fn call(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.last_call = Some(now);
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let last = self.last_call?;
        if now.saturating_duration_since(last) < self.delay {
            return None;
        }
        self.last_call = None;
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.last_call = None;
    }
}

/// Turns a stream of viewport ranges into the minimal set of fetches.
///
/// `request` is the debounced entry point; `update` must be called every
/// frame to release the debounced candidate and collect completions.
#[derive(Debug)]
pub struct FetchScheduler {
    tracker: RangeTracker,
    debouncer: Debouncer<FetchRequest>,
    load_gap: i32,
    next_id: u64,
    outstanding: HashMap<FetchId, FetchRequest>,
}

impl FetchScheduler {
    pub fn new(debounce: Duration, loading_timeout: Duration, load_gap: i32) -> Self {
        Self {
            tracker: RangeTracker::new(loading_timeout),
            debouncer: Debouncer::new(debounce),
            load_gap,
            next_id: 1,
            outstanding: HashMap::new(),
        }
    }

    /// Offer a candidate range. Replaces any candidate still waiting out the
    /// debounce window.
    pub fn request(&mut self, rows: Vec<i32>, cols: Vec<i32>, now: Instant) {
        self.debouncer.call(FetchRequest::new(rows, cols), now);
    }

    /// Release the debounced candidate if its quiet period is over, then drain
    /// finished fetches. Returns the payloads of successful fetches.
    pub fn update<F: RangeFetcher>(&mut self, now: Instant, fetcher: &mut F) -> Vec<F::Output> {
        if let Some(request) = self.debouncer.poll(now) {
            self.try_dispatch(request, now, fetcher);
        }

        let mut delivered = Vec::new();
        while let Some(outcome) = fetcher.poll() {
            if let Some(output) = self.complete(outcome) {
                delivered.push(output);
            }
        }
        delivered
    }

    /// Dispatch `request` unless it is already loading or already loaded.
    pub fn try_dispatch<F: RangeFetcher>(
        &mut self,
        request: FetchRequest,
        now: Instant,
        fetcher: &mut F,
    ) -> Option<FetchId> {
        let range = request.bounds()?;

        if self.tracker.is_already_loading(&request.rows, &request.cols, now) {
            debug!("Skipping fetch for {:?}: already loading", range);
            return None;
        }
        if self
            .tracker
            .is_already_loaded(&request.rows, &request.cols, self.load_gap)
        {
            debug!("Skipping fetch for {:?}: already loaded", range);
            return None;
        }

        let expired = self.tracker.expire_loading(now);
        if expired > 0 {
            warn!("Dropped {} loading area(s) past the timeout", expired);
        }

        let id = FetchId(self.next_id);
        self.next_id += 1;
        self.tracker.register_loading(id, range, now);
        self.outstanding.insert(id, request.clone());

        debug!("Dispatching fetch {:?} for {:?}", id, range);
        fetcher.dispatch(id, request);
        Some(id)
    }

    fn complete<T>(&mut self, outcome: FetchOutcome<T>) -> Option<T> {
        self.tracker.complete_loading(outcome.id);
        let Some(request) = self.outstanding.remove(&outcome.id) else {
            warn!("Ignoring completion for unknown fetch {:?}", outcome.id);
            return None;
        };

        match outcome.result {
            Ok(output) => {
                self.tracker.grow_loaded_grid(&request.rows, &request.cols);
                Some(output)
            }
            Err(e) => {
                warn!("Fetch {:?} failed: {}", outcome.id, e);
                None
            }
        }
    }

    /// True while any dispatched fetch has not completed
    pub fn is_fetching(&self) -> bool {
        !self.outstanding.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    pub fn has_pending_request(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn loaded_grid(&self) -> Option<IndexRange> {
        self.tracker.loaded_grid()
    }

    pub fn tracker(&self) -> &RangeTracker {
        &self.tracker
    }
}

impl Default for FetchScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(300), Duration::from_secs(10), 2)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Records dispatches; completions are queued by hand
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub dispatched: Vec<(FetchId, FetchRequest)>,
        pub completions: VecDeque<FetchOutcome<()>>,
    }

    impl FakeFetcher {
        pub fn succeed(&mut self, id: FetchId) {
            self.completions.push_back(FetchOutcome { id, result: Ok(()) });
        }

        pub fn fail(&mut self, id: FetchId) {
            self.completions.push_back(FetchOutcome {
                id,
                result: Err(FetchError::Status(500)),
            });
        }
    }

    impl RangeFetcher for FakeFetcher {
        type Output = ();

        fn dispatch(&mut self, id: FetchId, request: FetchRequest) {
            self.dispatched.push((id, request));
        }

        fn poll(&mut self) -> Option<FetchOutcome<()>> {
            self.completions.pop_front()
        }
    }

    fn span(min: i32, max: i32) -> Vec<i32> {
        (min..=max).collect()
    }

    #[test]
    fn test_debouncer_keeps_last_value() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.call(1, t0);
        debouncer.call(2, t0 + Duration::from_millis(200));

        assert_eq!(debouncer.poll(t0 + Duration::from_millis(400)), None);
        assert_eq!(debouncer.poll(t0 + Duration::from_millis(500)), Some(2));
        assert_eq!(debouncer.poll(t0 + Duration::from_millis(900)), None);
    }

    #[test]
    fn test_burst_of_requests_dispatches_last_only() {
        let t0 = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();

        for step in 0..10 {
            let now = t0 + Duration::from_millis(step * 20);
            scheduler.request(span(step as i32, step as i32 + 4), span(0, 4), now);
            scheduler.update(now, &mut fetcher);
        }
        assert!(fetcher.dispatched.is_empty());

        scheduler.update(t0 + Duration::from_secs(1), &mut fetcher);
        assert_eq!(fetcher.dispatched.len(), 1);
        assert_eq!(fetcher.dispatched[0].1.rows, span(9, 13));
    }

    #[test]
    fn test_same_range_twice_dispatches_once() {
        let now = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();

        let request = FetchRequest::new(span(0, 5), span(0, 5));
        assert!(scheduler.try_dispatch(request.clone(), now, &mut fetcher).is_some());
        assert!(scheduler.try_dispatch(request, now, &mut fetcher).is_none());
        assert_eq!(fetcher.dispatched.len(), 1);
        assert!(scheduler.is_fetching());
    }

    #[test]
    fn test_success_grows_loaded_grid_and_skips_refetch() {
        let now = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();

        let id = scheduler
            .try_dispatch(FetchRequest::new(span(0, 10), span(0, 10)), now, &mut fetcher)
            .unwrap();
        fetcher.succeed(id);
        let delivered = scheduler.update(now, &mut fetcher);

        assert_eq!(delivered.len(), 1);
        assert!(!scheduler.is_fetching());
        assert_eq!(
            scheduler.loaded_grid(),
            IndexRange::from_indices(&span(0, 10), &span(0, 10))
        );
        assert!(scheduler
            .try_dispatch(FetchRequest::new(span(1, 9), span(1, 9)), now, &mut fetcher)
            .is_none());
    }

    #[test]
    fn test_failure_leaves_region_fetchable() {
        let now = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();

        let request = FetchRequest::new(span(0, 3), span(0, 3));
        let id = scheduler.try_dispatch(request.clone(), now, &mut fetcher).unwrap();
        fetcher.fail(id);
        assert!(scheduler.update(now, &mut fetcher).is_empty());

        assert_eq!(scheduler.loaded_grid(), None);
        assert!(!scheduler.is_fetching());
        assert!(scheduler.try_dispatch(request, now, &mut fetcher).is_some());
        assert_eq!(fetcher.dispatched.len(), 2);
    }

    #[test]
    fn test_stuck_fetch_expires_after_timeout() {
        let t0 = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();

        let request = FetchRequest::new(span(0, 3), span(0, 3));
        scheduler.try_dispatch(request.clone(), t0, &mut fetcher).unwrap();

        let t1 = t0 + Duration::from_secs(5);
        assert!(scheduler.try_dispatch(request.clone(), t1, &mut fetcher).is_none());

        let t2 = t0 + Duration::from_secs(11);
        assert!(scheduler.try_dispatch(request, t2, &mut fetcher).is_some());
        assert_eq!(scheduler.tracker().loading_count(), 1);
        assert_eq!(scheduler.in_flight(), 2);
    }

    #[test]
    fn test_late_completion_of_expired_fetch_is_absorbed() {
        let t0 = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();

        let id = scheduler
            .try_dispatch(FetchRequest::new(span(0, 3), span(0, 3)), t0, &mut fetcher)
            .unwrap();
        let later = t0 + Duration::from_secs(30);
        scheduler
            .try_dispatch(FetchRequest::new(span(50, 53), span(0, 3)), later, &mut fetcher)
            .unwrap();
        assert_eq!(scheduler.tracker().loading_count(), 1);

        fetcher.succeed(id);
        assert_eq!(scheduler.update(later, &mut fetcher).len(), 1);
        assert_eq!(
            scheduler.loaded_grid(),
            IndexRange::from_indices(&span(0, 3), &span(0, 3))
        );
    }

    #[test]
    fn test_empty_request_is_ignored() {
        let now = Instant::now();
        let mut scheduler = FetchScheduler::default();
        let mut fetcher = FakeFetcher::default();
        assert!(scheduler
            .try_dispatch(FetchRequest::new(vec![], span(0, 3)), now, &mut fetcher)
            .is_none());
        assert!(fetcher.dispatched.is_empty());
    }
}
