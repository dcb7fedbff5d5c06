//! Async bridge between the owner context and classifier calls
//!
//! The owner of session state (a GUI thread, the terminal loop) must never
//! block on the network. The bridge owns a dedicated tokio runtime per
//! session:
//!
//! - `dispatch` pushes work onto an unbounded queue and returns immediately
//! - a dispatcher task spawns one analysis task per item; independent calls
//!   run concurrently against their own window snapshots
//! - results go onto a bounded completion queue with `try_send`; a full
//!   queue drops the result with a warning instead of stalling a worker,
//!   and the dropped dispatch id is reported on an unbounded side channel
//!   so the owner still learns the analysis is over
//! - the owner drains the completion queue at its own cadence with
//!   `poll_completions` and applies results to state itself
//!
//! The bridge never touches session state. `stop` stops accepting work,
//! cancels in-flight calls, waits at most the grace period, retires the
//! runtime and discards anything still queued, so nothing is delivered after
//! it returns.

use crate::analysis::{AnalysisGateway, SentimentResult};
use crate::error::{ClassifierError, MonitorError, Result};
use crate::window::{AnalysisWindow, WindowRange};
use chatguard_common::MonitorConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Extra time allowed for the dispatcher to wind down beyond the grace period
const DISPATCHER_JOIN_MARGIN: Duration = Duration::from_millis(250);

/// Identifies one dispatched analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchHandle {
    pub id: u64,
    /// Party whose message triggered the analysis
    pub party: String,
    pub range: WindowRange,
}

/// Result of one analysis, delivered through the completion queue
#[derive(Debug, Clone)]
pub struct AnalysisCompletion {
    pub id: u64,
    pub party: String,
    pub range: WindowRange,
    pub result: std::result::Result<SentimentResult, ClassifierError>,
}

struct WorkItem {
    handle: DispatchHandle,
    window: AnalysisWindow,
}

/// Settings the bridge takes from the session configuration
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub call_timeout: Duration,
    pub completion_capacity: usize,
    pub workers: usize,
    pub shutdown_grace: Duration,
}

impl From<&MonitorConfig> for BridgeSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            call_timeout: config.request_timeout,
            completion_capacity: config.completion_queue_capacity,
            workers: config.analysis_workers,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

/// Runs classifier calls off the owner context
pub struct AnalysisBridge {
    runtime: Option<Runtime>,
    work_tx: Option<mpsc::UnboundedSender<WorkItem>>,
    completion_rx: mpsc::Receiver<AnalysisCompletion>,
    dropped_rx: mpsc::UnboundedReceiver<u64>,
    dispatcher: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    next_id: u64,
    shutdown_grace: Duration,
}

impl AnalysisBridge {
    /// Start the background runtime and dispatcher
    ///
    /// Meant to be owned by a thread outside any tokio runtime. Stopping or
    /// dropping it from inside one still works, but skips the grace-period
    /// wait for in-flight calls.
    pub fn start(gateway: Arc<dyn AnalysisGateway>, settings: BridgeSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.workers.max(1))
            .thread_name("chatguard-analysis")
            .enable_all()
            .build()
            .map_err(|e| MonitorError::Runtime(e.to_string()))?;

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::channel(settings.completion_capacity.max(1));
        let (dropped_tx, dropped_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let dispatcher = runtime.spawn(run_dispatcher(
            work_rx,
            gateway,
            completion_tx,
            dropped_tx,
            cancel.clone(),
            Arc::clone(&in_flight),
            settings.call_timeout,
            settings.shutdown_grace,
        ));

        info!(
            workers = settings.workers,
            completion_capacity = settings.completion_capacity,
            "Analysis bridge started"
        );

        Ok(Self {
            runtime: Some(runtime),
            work_tx: Some(work_tx),
            completion_rx,
            dropped_rx,
            dispatcher: Some(dispatcher),
            cancel,
            in_flight,
            next_id: 1,
            shutdown_grace: settings.shutdown_grace,
        })
    }

    /// Queue a window for analysis without blocking
    pub fn dispatch(&mut self, party: &str, window: AnalysisWindow) -> Result<DispatchHandle> {
        let work_tx = self.work_tx.as_ref().ok_or(MonitorError::BridgeStopped)?;

        let handle = DispatchHandle {
            id: self.next_id,
            party: party.to_string(),
            range: window.range(),
        };

        // Counted before queueing so `in_flight` never under-reports
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if work_tx
            .send(WorkItem {
                handle: handle.clone(),
                window,
            })
            .is_err()
        {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(MonitorError::BridgeStopped);
        }

        self.next_id += 1;
        debug!(
            dispatch_id = handle.id,
            party = %handle.party,
            range = %handle.range,
            "Analysis dispatched"
        );
        Ok(handle)
    }

    /// Drain every completion that is ready, without blocking
    pub fn poll_completions(&mut self) -> Vec<AnalysisCompletion> {
        let mut ready = Vec::new();
        if !self.is_running() {
            return ready;
        }
        loop {
            match self.completion_rx.try_recv() {
                Ok(completion) => ready.push(completion),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ready
    }

    /// Dispatch ids whose results were dropped on a full completion queue
    pub fn take_dropped(&mut self) -> Vec<u64> {
        let mut dropped = Vec::new();
        if !self.is_running() {
            return dropped;
        }
        while let Ok(id) = self.dropped_rx.try_recv() {
            dropped.push(id);
        }
        dropped
    }

    /// Drop queued completions without applying them; returns how many
    ///
    /// Dropped-result notices queued so far are forgotten as well.
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.completion_rx.try_recv().is_ok() {
            discarded += 1;
        }
        while self.dropped_rx.try_recv().is_ok() {}
        if discarded > 0 {
            debug!(discarded, "Discarded queued analysis completions");
        }
        discarded
    }

    /// Analyses dispatched but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.work_tx.is_some()
    }

    /// Retire the bridge
    ///
    /// Idempotent. After this returns no background work remains and no
    /// completion will ever be delivered.
    pub fn stop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        info!(in_flight = self.in_flight(), "Stopping analysis bridge");

        // Refuse new work, then abandon what is running
        self.work_tx = None;
        self.cancel.cancel();

        if tokio::runtime::Handle::try_current().is_ok() {
            // Blocking inside another runtime panics; cancelled tasks wind
            // down on their own and the closed queues below reject them
            warn!("Analysis bridge stopped from inside a tokio runtime, not waiting for tasks");
            self.dispatcher = None;
            runtime.shutdown_background();
        } else {
            if let Some(dispatcher) = self.dispatcher.take() {
                let deadline = self.shutdown_grace + DISPATCHER_JOIN_MARGIN;
                let joined =
                    runtime.block_on(async { tokio::time::timeout(deadline, dispatcher).await });
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Analysis dispatcher failed: {}", e),
                    Err(_) => warn!(
                        "Analysis dispatcher did not finish within {:?}",
                        deadline
                    ),
                }
            }
            runtime.shutdown_timeout(self.shutdown_grace);
        }

        self.completion_rx.close();
        self.dropped_rx.close();
        let discarded = self.discard_pending();
        info!(discarded, "Analysis bridge stopped");
    }
}

impl Drop for AnalysisBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receives work items and runs each as its own task
async fn run_dispatcher(
    mut work_rx: mpsc::UnboundedReceiver<WorkItem>,
    gateway: Arc<dyn AnalysisGateway>,
    completion_tx: mpsc::Sender<AnalysisCompletion>,
    dropped_tx: mpsc::UnboundedSender<u64>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    call_timeout: Duration,
    shutdown_grace: Duration,
) {
    debug!("Analysis dispatcher started");
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = work_rx.recv() => match item {
                Some(item) => {
                    tasks.spawn(run_analysis(
                        item,
                        Arc::clone(&gateway),
                        completion_tx.clone(),
                        dropped_tx.clone(),
                        cancel.clone(),
                        Arc::clone(&in_flight),
                        call_timeout,
                    ));
                }
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Analysis task failed: {}", e);
                }
            }
        }
    }

    // Work that was queued but never started counts as abandoned
    while let Ok(item) = work_rx.try_recv() {
        in_flight.fetch_sub(1, Ordering::SeqCst);
        debug!(dispatch_id = item.handle.id, "Queued analysis abandoned");
    }

    if !tasks.is_empty() {
        debug!(remaining = tasks.len(), "Waiting for analysis tasks to wind down");
        let drained = tokio::time::timeout(shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                abandoned = tasks.len(),
                "Analysis tasks exceeded shutdown grace period, aborting"
            );
            tasks.shutdown().await;
        }
    }

    debug!("Analysis dispatcher stopped");
}

/// Decrements the in-flight counter however the task ends
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_analysis(
    item: WorkItem,
    gateway: Arc<dyn AnalysisGateway>,
    completion_tx: mpsc::Sender<AnalysisCompletion>,
    dropped_tx: mpsc::UnboundedSender<u64>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    call_timeout: Duration,
) {
    let _guard = InFlightGuard(in_flight);
    let WorkItem { handle, window } = item;

    let call = tokio::time::timeout(call_timeout, gateway.submit(&handle.party, &window));
    let result = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(dispatch_id = handle.id, "Analysis abandoned during shutdown");
            return;
        }
        outcome = call => match outcome {
            Ok(result) => result,
            Err(_) => Err(ClassifierError::Timeout(call_timeout)),
        },
    };

    if cancel.is_cancelled() {
        debug!(dispatch_id = handle.id, "Discarding result that arrived after shutdown began");
        return;
    }

    if let Err(e) = &result {
        debug!(dispatch_id = handle.id, kind = ?e.kind(), "Analysis failed: {}", e);
    }

    let completion = AnalysisCompletion {
        id: handle.id,
        party: handle.party,
        range: handle.range,
        result,
    };

    match completion_tx.try_send(completion) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            warn!(
                dispatch_id = dropped.id,
                range = %dropped.range,
                "Completion queue full, dropping analysis result"
            );
            let _ = dropped_tx.send(dropped.id);
        }
        Err(TrySendError::Closed(dropped)) => {
            debug!(dispatch_id = dropped.id, "Completion queue closed, dropping result");
        }
    }
}
