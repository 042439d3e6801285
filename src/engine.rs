//! Top-level orchestration of one query at a time across every source.
use crate::error::Result;
use crate::keywords::KeywordFilter;
use crate::result::SearchResult;
use crate::search::{SearchContext, SearchEvent, SearchManager, SourceCategory};
use crate::sources::SourceDefinition;
use crate::token::{SearchToken, TokenMint};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What the engine hands to its consumer. Only events of the current
/// token are ever delivered.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Results {
        token: SearchToken,
        results: Vec<Arc<SearchResult>>,
    },
    Finished {
        token: SearchToken,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cloud_threads: usize,
    pub torrent_threads: usize,
    /// Torrent results with fewer seeds are dropped.
    pub min_torrent_seeds: i32,
    /// Crawled stream results with these extensions are dropped.
    pub excluded_stream_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cloud_threads: 4,
            torrent_threads: 6,
            min_torrent_seeds: 0,
            excluded_stream_extensions: vec!["flv".to_string()],
        }
    }
}

impl EngineConfig {
    fn threads_for(&self, category: SourceCategory) -> usize {
        match category {
            SourceCategory::Cloud => self.cloud_threads,
            SourceCategory::TorrentIndex => self.torrent_threads,
        }
    }

    fn keeps(&self, result: &SearchResult) -> bool {
        if result.seeds().is_some_and(|seeds| seeds < self.min_torrent_seeds) {
            return false;
        }
        if result.is_crawled() && result.is_streamable() {
            if let Some(ext) = result.extension() {
                return !self
                    .excluded_stream_extensions
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(&ext));
            }
        }
        true
    }
}

#[derive(Default)]
struct EngineState {
    current: Option<SearchToken>,
    filter: Option<KeywordFilter>,
    pending: HashSet<SourceCategory>,
    seen: HashSet<String>,
    finished: bool,
    stopped: bool,
}

impl EngineState {
    fn accept(&mut self, result: &SearchResult, config: &EngineConfig) -> bool {
        let matches = self.filter.as_ref().is_some_and(|f| f.accepts(result));
        matches && config.keeps(result) && self.seen.insert(result.uid())
    }
}

/// Runs at most one query at a time over a fixed set of sources.
pub struct LocalSearchEngine {
    context: Arc<SearchContext>,
    sources: Vec<SourceDefinition>,
    managers: Vec<SearchManager>,
    mint: TokenMint,
    state: Arc<Mutex<EngineState>>,
    // held across stop, mint and dispatch
    dispatch: Mutex<()>,
    output: Sender<EngineEvent>,
}

impl LocalSearchEngine {
    pub fn new(
        context: Arc<SearchContext>,
        sources: Vec<SourceDefinition>,
        config: EngineConfig,
    ) -> Result<(Self, Receiver<EngineEvent>)> {
        let (event_tx, event_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();

        let managers = SourceCategory::ALL
            .iter()
            .map(|&category| {
                SearchManager::new(category, config.threads_for(category), event_tx.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        drop(event_tx);

        let state = Arc::new(Mutex::new(EngineState::default()));
        let relay_state = Arc::clone(&state);
        let relay_output = output_tx.clone();
        thread::Builder::new()
            .name("fedsearch-relay".to_string())
            .spawn(move || relay(event_rx, relay_state, relay_output, config))?;

        let engine = Self {
            context,
            sources,
            managers,
            mint: TokenMint::new(),
            state,
            dispatch: Mutex::new(()),
            output: output_tx,
        };
        Ok((engine, output_rx))
    }

    /// Cancels any running query and starts `query` on every enabled source.
    /// Returns `None` when the query has no searchable tokens.
    pub fn perform_search(&self, query: &str) -> Option<SearchToken> {
        let filter = KeywordFilter::new(query);
        if filter.is_empty() {
            debug!("Ignoring query without keywords: {:?}", query);
            return None;
        }
        let _dispatch = self.dispatch.lock();
        self.stop_managers();

        let token = self.mint.mint();
        let keywords = query.split_whitespace().collect::<Vec<_>>().join(" ");
        let enabled: Vec<&SourceDefinition> = self.sources.iter().filter(|s| s.enabled).collect();
        let categories: HashSet<SourceCategory> = enabled.iter().map(|s| s.category).collect();
        info!(
            "Searching {:?} on {} sources with token {}",
            keywords,
            enabled.len(),
            token
        );

        {
            let mut state = self.state.lock();
            *state = EngineState {
                current: Some(token),
                filter: Some(filter),
                pending: categories.clone(),
                finished: categories.is_empty(),
                ..EngineState::default()
            };
            if categories.is_empty() {
                self.output.send(EngineEvent::Finished { token }).ok();
                return Some(token);
            }
        }

        for manager in &self.managers {
            if !categories.contains(&manager.category()) {
                continue;
            }
            let performers = enabled
                .iter()
                .filter(|s| s.category == manager.category())
                .map(|s| s.performer(token, &keywords, &self.context))
                .collect();
            manager.perform_all(performers);
        }
        Some(token)
    }

    /// Retires the current token without starting a new query.
    pub fn cancel_search(&self) {
        let _dispatch = self.dispatch.lock();
        let mut state = self.state.lock();
        if state.current.take().is_some() {
            state.stopped = true;
            drop(state);
            self.stop_managers();
        }
    }

    pub fn current_token(&self) -> Option<SearchToken> {
        self.state.lock().current
    }

    pub fn is_search_finished(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && state.finished
    }

    pub fn is_search_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn sources(&self) -> &[SourceDefinition] {
        &self.sources
    }

    pub fn context(&self) -> &Arc<SearchContext> {
        &self.context
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.context.cache {
            cache.clear();
        }
    }

    /// Bytes held by the crawl cache.
    pub fn cache_size(&self) -> usize {
        self.context.cache.as_ref().map_or(0, |c| c.size_bytes())
    }

    /// Stops every query and waits for the workers. Returns whether they
    /// drained within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel_search();
        self.managers
            .iter()
            .map(|m| m.shutdown(timeout))
            .fold(true, |all, drained| all && drained)
    }

    fn stop_managers(&self) {
        for manager in &self.managers {
            manager.stop();
        }
    }
}

fn relay(
    events: Receiver<SearchEvent>,
    state: Arc<Mutex<EngineState>>,
    output: Sender<EngineEvent>,
    config: EngineConfig,
) {
    for event in events.iter() {
        let mut state = state.lock();
        if state.current != Some(event.token()) {
            debug!("Dropping event of stale token {}", event.token());
            continue;
        }
        match event {
            SearchEvent::Results {
                token,
                source,
                results,
            } => {
                let total = results.len();
                let accepted: Vec<_> = results
                    .into_iter()
                    .filter(|r| state.accept(r, &config))
                    .collect();
                debug!("{}: kept {} of {} results", source, accepted.len(), total);
                if !accepted.is_empty() {
                    output.send(EngineEvent::Results { token, results: accepted }).ok();
                }
            }
            SearchEvent::Error { source, message, .. } => {
                warn!("{} failed: {}", source, message);
            }
            SearchEvent::Stopped { source, .. } => {
                debug!("{} stopped", source);
            }
            SearchEvent::Finished { token, category } => {
                state.pending.remove(&category);
                if state.pending.is_empty() && !state.finished {
                    state.finished = true;
                    info!("Search {} finished", token);
                    output.send(EngineEvent::Finished { token }).ok();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str) -> SearchResult {
        SearchResult::builder()
            .display_name(name)
            .source("fixture")
            .build()
            .unwrap()
    }

    #[test]
    fn test_seed_filter() {
        let config = EngineConfig {
            min_torrent_seeds: 5,
            ..EngineConfig::default()
        };
        let few = SearchResult::builder()
            .display_name("few")
            .source("fixture")
            .file("few.torrent", 1)
            .torrent("u", "h", 2, "r")
            .build()
            .unwrap();
        assert!(!config.keeps(&few));
        assert!(config.keeps(&result("no torrent")));
    }

    #[test]
    fn test_excluded_crawled_streams() {
        let parent = Arc::new(result("Some Show"));
        let flv = SearchResult::crawled_from(&parent)
            .display_name("Some Show")
            .streaming("https://archive.org/download/show/show.flv")
            .build()
            .unwrap();
        let mp4 = SearchResult::crawled_from(&parent)
            .display_name("Some Show")
            .streaming("https://archive.org/download/show/show.mp4")
            .build()
            .unwrap();
        let config = EngineConfig::default();
        assert!(!config.keeps(&flv));
        assert!(config.keeps(&mp4));
    }

    #[test]
    fn test_state_dedupes_and_filters() {
        let mut state = EngineState {
            filter: Some(KeywordFilter::new("creative commons")),
            ..EngineState::default()
        };
        let config = EngineConfig::default();
        let hit = result("My Song (Creative Commons) - SoundCloud");
        assert!(state.accept(&hit, &config));
        assert!(!state.accept(&hit, &config));
        assert!(!state.accept(&result("Creative"), &config));
    }
}
