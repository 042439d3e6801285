//! Runs performers of one source category on a dedicated worker pool.
use super::performer::SearchPerformer;
use super::{SearchEvent, SearchListener, SourceCategory};
use crate::error::{Result, SearchError};
use crate::result::SearchResult;
use crate::token::SearchToken;
use crossbeam_channel::Sender;
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Shared {
    tasks: Mutex<Vec<Arc<SearchPerformer>>>,
    drained: Condvar,
    events: Sender<SearchEvent>,
}

/// Forwards one performer's callbacks to the event channel until it is
/// stopped.
struct ChannelListener<'a> {
    performer: &'a SearchPerformer,
    events: &'a Sender<SearchEvent>,
}

impl SearchListener for ChannelListener<'_> {
    fn on_results(&self, token: SearchToken, results: Vec<Arc<SearchResult>>) {
        if self.performer.is_stopped() {
            return;
        }
        self.events
            .send(SearchEvent::Results {
                token,
                source: self.performer.source().to_string(),
                results,
            })
            .ok();
    }

    fn on_error(&self, token: SearchToken, error: &SearchError) {
        if self.performer.is_stopped() {
            return;
        }
        self.events
            .send(SearchEvent::Error {
                token,
                source: self.performer.source().to_string(),
                message: error.to_string(),
            })
            .ok();
    }

    fn on_stopped(&self, token: SearchToken) {
        self.events
            .send(SearchEvent::Stopped {
                token,
                source: self.performer.source().to_string(),
            })
            .ok();
    }
}

/// One manager per [`SourceCategory`], each with its own bounded pool so a
/// stuck source cannot starve another category.
pub struct SearchManager {
    category: SourceCategory,
    pool: ThreadPool,
    shared: Arc<Shared>,
}

impl SearchManager {
    pub fn new(
        category: SourceCategory,
        num_threads: usize,
        events: Sender<SearchEvent>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(move |i| format!("fedsearch-{category}-{i}"))
            .build()
            .map_err(|e| SearchError::Other(format!("cannot start {category} pool: {e}")))?;
        Ok(Self {
            category,
            pool,
            shared: Arc::new(Shared {
                tasks: Mutex::new(Vec::new()),
                drained: Condvar::new(),
                events,
            }),
        })
    }

    pub fn category(&self) -> SourceCategory {
        self.category
    }

    pub fn perform(&self, performer: SearchPerformer) {
        self.perform_all(vec![performer]);
    }

    /// Schedules a batch. All of it is registered before any of it runs, so
    /// `Finished` is only sent once the whole batch of a token is done.
    pub fn perform_all(&self, performers: Vec<SearchPerformer>) {
        let performers: Vec<Arc<SearchPerformer>> = performers.into_iter().map(Arc::new).collect();
        self.shared
            .tasks
            .lock()
            .extend(performers.iter().map(Arc::clone));

        for performer in performers {
            debug!(
                "Scheduling {} for token {} on the {} pool",
                performer.source(),
                performer.token(),
                self.category
            );
            let shared = Arc::clone(&self.shared);
            let category = self.category;
            self.pool.spawn(move || run_task(&shared, category, performer));
        }
    }

    /// Stops every scheduled or running performer. Idempotent.
    pub fn stop(&self) {
        self.stop_matching(|_| true);
    }

    /// Stops only the performers of `token`.
    pub fn stop_token(&self, token: SearchToken) {
        self.stop_matching(|p| p.token() == token);
    }

    fn stop_matching(&self, filter: impl Fn(&SearchPerformer) -> bool) {
        let tasks = self.shared.tasks.lock();
        for performer in tasks.iter().filter(|p| filter(p)) {
            if performer.stop() {
                let listener = ChannelListener {
                    performer,
                    events: &self.shared.events,
                };
                listener.on_stopped(performer.token());
            }
        }
    }

    pub fn active_tasks(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    pub fn has_tasks_for(&self, token: SearchToken) -> bool {
        self.shared.tasks.lock().iter().any(|p| p.token() == token)
    }

    /// Stops everything and waits up to `timeout` for workers to drain.
    /// Returns whether they did.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();
        let deadline = Instant::now() + timeout;
        let mut tasks = self.shared.tasks.lock();
        while !tasks.is_empty() {
            if self.shared.drained.wait_until(&mut tasks, deadline).timed_out() {
                return tasks.is_empty();
            }
        }
        true
    }
}

fn run_task(shared: &Shared, category: SourceCategory, performer: Arc<SearchPerformer>) {
    let listener = ChannelListener {
        performer: &performer,
        events: &shared.events,
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| performer.perform(&listener)));
    if outcome.is_err() {
        error!(
            "{} panicked while searching for token {}",
            performer.source(),
            performer.token()
        );
    }

    let token = performer.token();
    let mut tasks = shared.tasks.lock();
    tasks.retain(|t| !Arc::ptr_eq(t, &performer));
    let token_done = !tasks.iter().any(|t| t.token() == token);
    if token_done && !performer.is_stopped() {
        shared
            .events
            .send(SearchEvent::Finished { token, category })
            .ok();
    }
    if tasks.is_empty() {
        shared.drained.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpClient, HttpRequest};
    use crate::search::context::SearchContext;
    use crate::search::pattern::SearchPattern;
    use crate::search::StopSignal;
    use crate::token::TokenMint;
    use crossbeam_channel::{unbounded, Receiver};

    /// Waits for the gate before answering, when there is one.
    struct GatedHttp {
        gate: Option<Receiver<()>>,
    }

    impl HttpClient for GatedHttp {
        fn fetch(&self, request: &HttpRequest) -> crate::error::Result<Vec<u8>> {
            if let Some(gate) = &self.gate {
                gate.recv_timeout(Duration::from_secs(5)).ok();
            }
            Ok(request.url.clone().into_bytes())
        }
    }

    struct Named(&'static str);

    impl SearchPattern for Named {
        fn search_url(&self, _encoded_keywords: &str, page: u32) -> String {
            format!("https://example.org/{}/{page}", self.0)
        }

        fn parse_results(&self, body: &str, _stop: &StopSignal) -> crate::error::Result<Vec<SearchResult>> {
            if self.0 == "panics" {
                panic!("broken source definition");
            }
            if !body.ends_with("/1") {
                return Ok(Vec::new());
            }
            Ok(vec![SearchResult::builder()
                .display_name(self.0)
                .source(self.0)
                .build()?])
        }
    }

    fn performer(token: SearchToken, name: &'static str, ctx: &Arc<SearchContext>) -> SearchPerformer {
        SearchPerformer::new(
            token,
            name,
            SourceCategory::Cloud,
            "query",
            Arc::new(Named(name)),
            Arc::clone(ctx),
        )
    }

    fn drain_until_finished(rx: &Receiver<SearchEvent>) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            let done = matches!(event, SearchEvent::Finished { .. });
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn test_finished_after_all_performers() {
        let (tx, rx) = unbounded();
        let manager = SearchManager::new(SourceCategory::Cloud, 2, tx).unwrap();
        let ctx = Arc::new(SearchContext::new(Arc::new(GatedHttp { gate: None })));
        let token = TokenMint::new().mint();

        manager.perform_all(vec![
            performer(token, "a", &ctx),
            performer(token, "b", &ctx),
            performer(token, "c", &ctx),
        ]);
        let events = drain_until_finished(&rx);

        let results = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Results { .. }))
            .count();
        assert_eq!(results, 3);
        assert!(matches!(
            events.last(),
            Some(SearchEvent::Finished { token: t, category: SourceCategory::Cloud }) if *t == token
        ));
        assert!(manager.shutdown(Duration::from_secs(5)));
        assert_eq!(manager.active_tasks(), 0);
    }

    #[test]
    fn test_panicking_performer_still_finishes() {
        let (tx, rx) = unbounded();
        let manager = SearchManager::new(SourceCategory::Cloud, 1, tx).unwrap();
        let ctx = Arc::new(SearchContext::new(Arc::new(GatedHttp { gate: None })));
        let token = TokenMint::new().mint();

        manager.perform_all(vec![performer(token, "panics", &ctx), performer(token, "ok", &ctx)]);
        let events = drain_until_finished(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SearchEvent::Results { source, .. } if source == "ok")));
        assert!(matches!(events.last(), Some(SearchEvent::Finished { .. })));
    }

    #[test]
    fn test_stop_suppresses_results() {
        let (tx, rx) = unbounded();
        let manager = SearchManager::new(SourceCategory::Cloud, 2, tx).unwrap();
        let (open, gate) = unbounded();
        let ctx = Arc::new(SearchContext::new(Arc::new(GatedHttp { gate: Some(gate) })));
        let token = TokenMint::new().mint();

        manager.perform(performer(token, "slow", &ctx));
        assert!(manager.has_tasks_for(token));
        manager.stop();
        manager.stop();
        open.send(()).unwrap();
        assert!(manager.shutdown(Duration::from_secs(5)));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SearchEvent::Stopped { source, .. } if source == "slow"));
    }

    #[test]
    fn test_stop_token_leaves_other_queries_running() {
        let (tx, rx) = unbounded();
        let manager = SearchManager::new(SourceCategory::Cloud, 2, tx).unwrap();
        let (open, gate) = unbounded();
        let ctx = Arc::new(SearchContext::new(Arc::new(GatedHttp { gate: Some(gate) })));
        let mint = TokenMint::new();
        let (old, new) = (mint.mint(), mint.mint());

        manager.perform(performer(old, "old", &ctx));
        manager.perform(performer(new, "new", &ctx));
        manager.stop_token(old);
        open.send(()).unwrap();
        open.send(()).unwrap();

        let events = drain_until_finished(&rx);
        assert!(matches!(
            events.last(),
            Some(SearchEvent::Finished { token, .. }) if *token == new
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, SearchEvent::Results { token, .. } if *token == new)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SearchEvent::Results { token, .. } if *token == old)));
    }

    #[test]
    fn test_stop_without_tasks_is_a_no_op() {
        let (tx, rx) = unbounded();
        let manager = SearchManager::new(SourceCategory::TorrentIndex, 1, tx).unwrap();
        manager.stop();
        assert!(manager.shutdown(Duration::from_millis(10)));
        assert!(rx.try_recv().is_err());
    }
}
