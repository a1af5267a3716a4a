//! The render state machine.
//!
//! One render runs at a time per pipeline. Starting a render cancels the one in
//! flight, then waits for it to release the sink before touching it. Sink
//! calls are awaited one by one; cancellation is observed between them and
//! during pacing and memory pauses, never inside a sink call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_stream::stream;
use futures::Stream;
use metrics::{counter, histogram};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::analysis::ComplexityAnalyzer;
use crate::cache::RenderCache;
use crate::domain::{Document, MemoryLevel};
use crate::infra::telemetry::{METRIC_RENDER_CHUNKS, METRIC_RENDER_FALLBACK, METRIC_RENDER_MS};
use crate::util::lock::mutex_lock;

use super::config::RenderPipelineConfig;
use super::sink::{RenderSink, SinkError};
use super::strategy::{ChunkPlan, RenderStrategySelector, plan_chunks};
use super::types::{RenderError, RenderEvent, RenderReport, RenderState};

const SOURCE: &str = "application::render::pipeline";
const TRANSITION_CAPACITY: usize = 256;

#[derive(Clone)]
struct CancelToken(Arc<watch::Sender<bool>>);

impl CancelToken {
    fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self(Arc::new(sender))
    }

    fn cancel(&self) {
        self.0.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    async fn cancelled(&self) {
        let mut receiver = self.0.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

struct ActiveRender {
    generation: u64,
    token: CancelToken,
}

/// State shared between a pipeline and its cancel handles.
struct RenderControl {
    active: Mutex<Option<ActiveRender>>,
    generation: AtomicU64,
    state: watch::Sender<RenderState>,
    transitions: broadcast::Sender<RenderState>,
}

impl RenderControl {
    fn new() -> Self {
        let (state, _) = watch::channel(RenderState::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            state,
            transitions,
        }
    }

    /// Register a new render, cancelling the previous one if still active.
    fn begin(&self) -> (u64, CancelToken) {
        let mut active = mutex_lock(&self.active, SOURCE, "begin");
        if let Some(previous) = active.take() {
            previous.token.cancel();
            self.publish(RenderState::Cancelled);
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancelToken::new();
        *active = Some(ActiveRender {
            generation,
            token: token.clone(),
        });
        (generation, token)
    }

    fn cancel_active(&self) -> bool {
        let mut active = mutex_lock(&self.active, SOURCE, "cancel");
        match active.take() {
            Some(render) => {
                render.token.cancel();
                self.publish(RenderState::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Publish `state` if `generation` is still the active render.
    fn transition(&self, generation: u64, state: RenderState) {
        let active = mutex_lock(&self.active, SOURCE, "transition");
        if active.as_ref().is_some_and(|r| r.generation == generation) {
            self.publish(state);
        }
    }

    fn finish(&self, generation: u64, state: RenderState) {
        let mut active = mutex_lock(&self.active, SOURCE, "finish");
        if active.as_ref().is_some_and(|r| r.generation == generation) {
            *active = None;
            self.publish(state);
        }
    }

    fn publish(&self, state: RenderState) {
        self.state.send_replace(state.clone());
        let _ = self.transitions.send(state);
    }
}

/// Cloneable handle that cancels whichever render is active on its pipeline.
#[derive(Clone)]
pub struct RenderCanceller {
    control: Arc<RenderControl>,
}

impl RenderCanceller {
    /// Returns `true` when a render was active.
    pub fn cancel(&self) -> bool {
        self.control.cancel_active()
    }
}

impl std::fmt::Debug for RenderCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCanceller").finish_non_exhaustive()
    }
}

pub struct RenderPipeline {
    sink: Arc<dyn RenderSink>,
    cache: Arc<dyn RenderCache>,
    memory: watch::Receiver<MemoryLevel>,
    selector: RenderStrategySelector,
    analyzer: ComplexityAnalyzer,
    config: RenderPipelineConfig,
    control: Arc<RenderControl>,
    delivery: tokio::sync::Mutex<()>,
}

impl RenderPipeline {
    pub fn new(
        sink: Arc<dyn RenderSink>,
        cache: Arc<dyn RenderCache>,
        memory: watch::Receiver<MemoryLevel>,
        config: RenderPipelineConfig,
    ) -> Self {
        Self {
            sink,
            cache,
            memory,
            selector: RenderStrategySelector::new(config.thresholds),
            analyzer: ComplexityAnalyzer::new(config.complexity),
            config,
            control: Arc::new(RenderControl::new()),
            delivery: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RenderPipelineConfig {
        &self.config
    }

    pub fn state(&self) -> RenderState {
        self.control.state.borrow().clone()
    }

    /// Every state transition from now on, in order.
    pub fn subscribe_states(&self) -> broadcast::Receiver<RenderState> {
        self.control.transitions.subscribe()
    }

    /// Latest state, for hosts that only care about the current value.
    pub fn watch_state(&self) -> watch::Receiver<RenderState> {
        self.control.state.subscribe()
    }

    pub fn canceller(&self) -> RenderCanceller {
        RenderCanceller {
            control: Arc::clone(&self.control),
        }
    }

    /// Cancel the active render, if any. Chunks already delivered stay visible.
    pub fn cancel(&self) {
        if self.control.cancel_active() {
            info!(target: SOURCE, "Render cancelled by caller");
        }
    }

    /// Render `text` into the sink, reporting `(progress, label)` along the way.
    ///
    /// The callback also receives the error label when the render fails.
    pub async fn render<F>(&self, text: &str, mut progress: F) -> Result<RenderReport, RenderError>
    where
        F: FnMut(f64, &str) + Send,
    {
        if text.is_empty() {
            progress(0.0, RenderError::EmptyContent.label());
            return Err(RenderError::EmptyContent);
        }

        let (generation, token) = self.control.begin();
        let render_id = Uuid::new_v4();
        let started = Instant::now();
        let _delivery = self.delivery.lock().await;

        let mut run = RenderRun {
            pipeline: self,
            generation,
            token,
            render_id,
            progress: &mut progress,
            current: 0.0,
        };
        let result = run.execute(text).await;
        let current = run.current;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(report) => {
                self.control.finish(generation, RenderState::Completed);
                histogram!(METRIC_RENDER_MS).record(elapsed_ms);
                info!(
                    target: SOURCE,
                    %render_id,
                    strategy = report.strategy.map(|s| s.name()).unwrap_or("cache"),
                    chunks = report.chunks_delivered,
                    cache_hit = report.cache_hit,
                    fallback = report.used_fallback,
                    elapsed_ms,
                    "Render completed"
                );
            }
            Err(RenderError::Cancelled) => {
                self.control.finish(generation, RenderState::Cancelled);
                progress(current, RenderError::Cancelled.label());
                info!(target: SOURCE, %render_id, elapsed_ms, "Render cancelled");
            }
            Err(error) => {
                self.control
                    .finish(generation, RenderState::Error(error.clone()));
                progress(current, error.label());
                warn!(
                    target: SOURCE,
                    %render_id,
                    error = %error,
                    elapsed_ms,
                    "Render failed"
                );
            }
        }
        result
    }

    /// Run a render on a background task and observe it as a stream of events.
    ///
    /// The stream ends with exactly one [`RenderEvent::Finished`].
    pub fn render_events(self: Arc<Self>, text: String) -> impl Stream<Item = RenderEvent> + Send {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let mut states = self.subscribe_states();

        let progress_events = events.clone();
        tokio::spawn(async move {
            let result = self
                .render(&text, move |progress, label| {
                    let _ = progress_events.send(RenderEvent::Progress {
                        progress,
                        label: label.to_string(),
                    });
                })
                .await;
            let _ = events.send(RenderEvent::Finished(result));
        });

        stream! {
            let mut states_open = true;
            loop {
                let next = if states_open {
                    tokio::select! {
                        biased;
                        state = states.recv() => Next::State(state),
                        event = receiver.recv() => Next::Event(event),
                    }
                } else {
                    Next::Event(receiver.recv().await)
                };

                match next {
                    Next::State(Ok(state)) => yield RenderEvent::State(state),
                    Next::State(Err(broadcast::error::RecvError::Lagged(_))) => {}
                    Next::State(Err(broadcast::error::RecvError::Closed)) => states_open = false,
                    Next::Event(Some(RenderEvent::Finished(result))) => {
                        while let Ok(state) = states.try_recv() {
                            yield RenderEvent::State(state);
                        }
                        yield RenderEvent::Finished(result);
                        break;
                    }
                    Next::Event(Some(event)) => yield event,
                    Next::Event(None) => break,
                }
            }
        }
    }
}

enum Next {
    State(Result<RenderState, broadcast::error::RecvError>),
    Event(Option<RenderEvent>),
}

/// Failure while delivering the chunk plan.
enum Delivery {
    /// Cancellation or memory pressure; no fallback.
    Aborted(RenderError),
    Sink(SinkError),
}

impl From<RenderError> for Delivery {
    fn from(error: RenderError) -> Self {
        Delivery::Aborted(error)
    }
}

struct RenderRun<'p, F> {
    pipeline: &'p RenderPipeline,
    generation: u64,
    token: CancelToken,
    render_id: Uuid,
    progress: &'p mut F,
    current: f64,
}

impl<F> RenderRun<'_, F>
where
    F: FnMut(f64, &str) + Send,
{
    async fn execute(&mut self, text: &str) -> Result<RenderReport, RenderError> {
        let pipeline = self.pipeline;
        self.transition(RenderState::Preprocessing);
        (self.progress)(0.0, "preprocessing");

        let source: Arc<str> = Arc::from(text);
        let (size, content_hash) = {
            let source = Arc::clone(&source);
            tokio::task::spawn_blocking(move || {
                let document = Document::new(&source);
                (document.size(), document.content_hash().clone())
            })
            .await
            .map_err(|err| RenderError::render_failed(format!("preprocessing task: {err}")))?
        };
        self.checkpoint()?;

        if let Some(markup) = pipeline.cache.get(&content_hash) {
            debug!(
                target: SOURCE,
                render_id = %self.render_id,
                hash = content_hash.short(),
                "Serving cached markup"
            );
            pipeline
                .sink
                .load_precomputed(&markup)
                .await
                .map_err(|err| RenderError::render_failed(err.to_string()))?;
            self.checkpoint()?;
            self.current = 1.0;
            (self.progress)(1.0, "completed");
            return Ok(RenderReport {
                content_hash,
                strategy: None,
                chunks_delivered: 0,
                cache_hit: true,
                used_fallback: false,
                complexity: None,
            });
        }

        let strategy = pipeline.selector.select(size)?;
        info!(
            target: SOURCE,
            render_id = %self.render_id,
            size,
            strategy = %strategy,
            hash = content_hash.short(),
            "Render started"
        );

        let plan = {
            let source = Arc::clone(&source);
            let analyzer = pipeline.analyzer.clone();
            let config = pipeline.config;
            tokio::task::spawn_blocking(move || plan_chunks(&source, strategy, &analyzer, &config))
                .await
                .map_err(|err| RenderError::render_failed(format!("chunking task: {err}")))?
        };
        self.checkpoint()?;

        let (markup, chunks_delivered, used_fallback) = match self.deliver(&plan).await {
            Ok(markup) => (markup, plan.chunks.len(), false),
            Err(Delivery::Aborted(error)) => return Err(error),
            Err(Delivery::Sink(error)) => {
                self.checkpoint()?;
                warn!(
                    target: SOURCE,
                    render_id = %self.render_id,
                    error = %error,
                    "Chunked delivery failed, falling back to whole document"
                );
                counter!(METRIC_RENDER_FALLBACK).increment(1);
                let markup = self.deliver_whole(&source).await.map_err(|err| {
                    warn!(
                        target: SOURCE,
                        render_id = %self.render_id,
                        error = %err,
                        "Fallback delivery failed"
                    );
                    RenderError::render_failed(err.to_string())
                })?;
                (markup, 1, true)
            }
        };

        self.checkpoint()?;
        pipeline.cache.put(content_hash.clone(), markup);
        self.current = 1.0;
        (self.progress)(1.0, "completed");

        Ok(RenderReport {
            content_hash,
            strategy: Some(strategy),
            chunks_delivered,
            cache_hit: false,
            used_fallback,
            complexity: plan.complexity.map(|report| report.level),
        })
    }

    async fn deliver(&mut self, plan: &ChunkPlan) -> Result<String, Delivery> {
        let pipeline = self.pipeline;
        let sink = &pipeline.sink;
        let mut memory = pipeline.memory.clone();
        let total = plan.chunks.len();

        self.transition(RenderState::Rendering { progress: 0.0 });
        sink.initialize().await.map_err(Delivery::Sink)?;

        for (position, chunk) in plan.chunks.iter().enumerate() {
            if position > 0 {
                self.checkpoint()?;
                if !plan.pacing.is_zero() {
                    tokio::select! {
                        _ = self.token.cancelled() => return Err(RenderError::Cancelled.into()),
                        _ = sleep(plan.pacing) => {}
                    }
                }
                self.respect_memory(&mut memory).await?;
                self.checkpoint()?;
            }

            sink.append_chunk(&chunk.content, chunk.index)
                .await
                .map_err(Delivery::Sink)?;
            counter!(METRIC_RENDER_CHUNKS).increment(1);

            let progress = (position + 1) as f64 / total as f64;
            self.current = progress;
            self.transition(RenderState::Rendering { progress });
            let label = format!("chunk {}/{}", position + 1, total);
            (self.progress)(progress, &label);
            debug!(
                target: SOURCE,
                render_id = %self.render_id,
                index = chunk.index,
                chars = chunk.chars,
                progress,
                "Chunk delivered"
            );
        }

        self.checkpoint()?;
        sink.finalize().await.map_err(Delivery::Sink)
    }

    async fn deliver_whole(&self, text: &str) -> Result<String, SinkError> {
        let sink = &self.pipeline.sink;
        sink.initialize().await?;
        sink.append_chunk(text, 0).await?;
        sink.finalize().await
    }

    /// React to the latest memory level before the next chunk.
    async fn respect_memory(
        &mut self,
        memory: &mut watch::Receiver<MemoryLevel>,
    ) -> Result<(), RenderError> {
        let level = *memory.borrow_and_update();
        match level {
            MemoryLevel::Normal => Ok(()),
            MemoryLevel::Critical => {
                warn!(
                    target: SOURCE,
                    render_id = %self.render_id,
                    "Critical memory pressure, aborting render"
                );
                Err(RenderError::MemoryPressure)
            }
            MemoryLevel::Warning => {
                warn!(
                    target: SOURCE,
                    render_id = %self.render_id,
                    "Memory warning, shedding cache and pausing"
                );
                self.pipeline.cache.shed();
                self.transition(RenderState::Paused);
                (self.progress)(self.current, "paused");

                let recovery = self.pipeline.config.pause_recovery_timeout;
                let waited = tokio::select! {
                    _ = self.token.cancelled() => return Err(RenderError::Cancelled),
                    waited = timeout(recovery, async {
                        memory
                            .wait_for(|level| *level != MemoryLevel::Warning)
                            .await
                            .map(|level| *level)
                    }) => waited,
                };

                match waited {
                    Ok(Ok(MemoryLevel::Critical)) => {
                        warn!(
                            target: SOURCE,
                            render_id = %self.render_id,
                            "Memory escalated to critical while paused"
                        );
                        Err(RenderError::MemoryPressure)
                    }
                    Ok(_) => {
                        self.resume();
                        Ok(())
                    }
                    Err(_elapsed) => {
                        debug!(
                            target: SOURCE,
                            render_id = %self.render_id,
                            "Pause timed out, resuming"
                        );
                        self.resume();
                        Ok(())
                    }
                }
            }
        }
    }

    fn resume(&mut self) {
        self.transition(RenderState::Rendering {
            progress: self.current,
        });
        (self.progress)(self.current, "resumed");
    }

    fn checkpoint(&self) -> Result<(), RenderError> {
        if self.token.is_cancelled() {
            Err(RenderError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn transition(&self, state: RenderState) {
        self.pipeline.control.transition(self.generation, state);
    }
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_token_resolves_once_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        waiter.await.expect("waiter completes");
        assert!(token.is_cancelled());
    }

    #[test]
    fn transitions_from_superseded_renders_are_ignored() {
        let control = RenderControl::new();
        let mut transitions = control.transitions.subscribe();
        let (first, first_token) = control.begin();
        let (second, _) = control.begin();
        assert!(first_token.is_cancelled());

        control.transition(first, RenderState::Preprocessing);
        control.transition(second, RenderState::Paused);
        control.finish(first, RenderState::Completed);

        assert_eq!(transitions.try_recv().ok(), Some(RenderState::Cancelled));
        assert_eq!(transitions.try_recv().ok(), Some(RenderState::Paused));
        assert!(transitions.try_recv().is_err());
        assert_eq!(*control.state.borrow(), RenderState::Paused);
    }

    #[test]
    fn cancel_without_active_render_is_a_no_op() {
        let control = RenderControl::new();
        assert!(!control.cancel_active());
        assert_eq!(*control.state.borrow(), RenderState::Idle);
    }
}
