//! Fixed-size pool of compiler units.
//!
//! Each unit is a dedicated OS thread that owns one [`Compiler`]. The pool
//! keeps a FIFO queue of submissions and a set of idle units; a unit is
//! handed the next queued job only after it has finished generating code for
//! its current one.
//!
//! Units talk to the pool exclusively through [`UnitMessage`]s on a single
//! event channel. A routing task matches every message against the unit's
//! in-flight job; anything that does not fit the `Deps → Code | Error`
//! sequence retires the unit. When the last unit is gone the pool is closed
//! and every queued job fails with [`LoaderError::PoolUnavailable`].
//!
//! [`Compiler`]: super::Compiler

use std::collections::VecDeque;
use std::sync::mpsc::{self as std_mpsc, Sender};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::protocol::{UnitMessage, UnitRequest, run_unit};
use super::{CompileRequest, CompilerFactory, DependencyReport};
use crate::error::{LoaderError, Result};
use crate::specifier::ModuleSpecifier;

/// Compiled code, shared by every waiter.
pub type CodeFuture = Shared<BoxFuture<'static, Result<Arc<str>>>>;

/// Result of a submission once its dependencies are known.
#[derive(Clone)]
pub struct CompileOutput {
    pub report: DependencyReport,
    /// Resolves when the unit finishes generating code.
    pub code: CodeFuture,
}

impl std::fmt::Debug for CompileOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOutput")
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub units: usize,
    pub live_units: usize,
    pub busy_units: usize,
    pub queued: usize,
}

/// Default number of units.
///
/// Unit start-up is not free, so the pool stays small: one unit on
/// constrained hosts, otherwise one per CPU up to four.
pub fn default_pool_size(constrained: bool) -> usize {
    if constrained {
        1
    } else {
        num_cpus::get().clamp(1, 4)
    }
}

/// Bounded pool of isolated compiler units.
#[derive(Clone)]
pub struct CompilerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for CompilerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerPool")
            .field("stats", &self.stats())
            .finish()
    }
}

struct PoolInner {
    size: usize,
    state: Mutex<PoolState>,
}

struct PoolState {
    units: Vec<UnitSlot>,
    idle: VecDeque<usize>,
    queue: VecDeque<Job>,
    live: usize,
    initializing: usize,
    closed: Option<String>,
    next_reference: u64,
}

#[derive(Default)]
struct UnitSlot {
    sender: Option<Sender<UnitRequest>>,
    current: Option<InFlight>,
    ready: bool,
    retired: bool,
}

struct Job {
    request: CompileRequest,
    deps_tx: oneshot::Sender<Result<DependencyReport>>,
    code_tx: oneshot::Sender<Result<Arc<str>>>,
}

struct InFlight {
    reference: u64,
    specifier: ModuleSpecifier,
    deps_tx: Option<oneshot::Sender<Result<DependencyReport>>>,
    code_tx: oneshot::Sender<Result<Arc<str>>>,
}

impl InFlight {
    /// Deliver `error` to whichever half of the submission is still waiting.
    fn fail(self, error: LoaderError) {
        match self.deps_tx {
            Some(deps_tx) => {
                let _ = deps_tx.send(Err(error));
            }
            None => {
                let _ = self.code_tx.send(Err(error));
            }
        }
    }
}

impl CompilerPool {
    /// Start `size` units, each hosting a compiler built by `factory`.
    ///
    /// Must be called from within a tokio runtime. Units initialize in the
    /// background; submissions made before any unit is ready are queued.
    pub fn new(size: usize, factory: Arc<dyn CompilerFactory>) -> Result<Self> {
        if size == 0 {
            return Err(LoaderError::PoolUnavailable {
                reason: "pool size must be at least 1".to_string(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            LoaderError::PoolUnavailable {
                reason: format!("compiler pool requires a tokio runtime: {e}"),
            }
        })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut units = Vec::with_capacity(size);
        let mut initializing = 0;

        for unit in 0..size {
            let (request_tx, request_rx) = std_mpsc::channel();
            let factory = Arc::clone(&factory);
            let events = events_tx.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("tsb-compiler-{unit}"))
                .spawn(move || run_unit(unit, factory, request_rx, events));

            match spawned {
                Ok(_) => {
                    initializing += 1;
                    units.push(UnitSlot {
                        sender: Some(request_tx),
                        ..UnitSlot::default()
                    });
                }
                Err(err) => {
                    warn!(unit, error = %err, "failed to spawn compiler unit");
                    units.push(UnitSlot {
                        retired: true,
                        ..UnitSlot::default()
                    });
                }
            }
        }
        drop(events_tx);

        if initializing == 0 {
            return Err(LoaderError::PoolUnavailable {
                reason: "no compiler unit could be started".to_string(),
            });
        }

        let inner = Arc::new(PoolInner {
            size,
            state: Mutex::new(PoolState {
                units,
                idle: VecDeque::with_capacity(size),
                queue: VecDeque::new(),
                live: 0,
                initializing,
                closed: None,
                next_reference: 0,
            }),
        });

        runtime.spawn(route_events(Arc::downgrade(&inner), events_rx));
        debug!(size, "compiler pool started");

        Ok(Self { inner })
    }

    /// Queue `request` and wait for its dependency report.
    ///
    /// The returned [`CompileOutput::code`] completes once the unit has
    /// generated code; the unit is not reused before that.
    pub async fn submit(&self, request: CompileRequest) -> Result<CompileOutput> {
        let specifier = request.specifier.clone();
        let (deps_tx, deps_rx) = oneshot::channel();
        let (code_tx, code_rx) = oneshot::channel();

        self.inner.enqueue(Job {
            request,
            deps_tx,
            code_tx,
        })?;

        let report = deps_rx.await.map_err(|_| unit_went_away(&specifier))??;

        let code = async move { code_rx.await.map_err(|_| unit_went_away(&specifier))? }
            .boxed()
            .shared();

        Ok(CompileOutput { report, code })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            units: self.inner.size,
            live_units: state.live,
            busy_units: state.units.iter().filter(|u| u.current.is_some()).count(),
            queued: state.queue.len(),
        }
    }

    /// Reason the pool stopped accepting work, if it has.
    pub fn closed_reason(&self) -> Option<String> {
        self.inner.state.lock().closed.clone()
    }
}

fn unit_went_away(specifier: &ModuleSpecifier) -> LoaderError {
    LoaderError::PoolUnavailable {
        reason: format!("compiler unit stopped while compiling '{specifier}'"),
    }
}

async fn route_events(
    pool: Weak<PoolInner>,
    mut events: mpsc::UnboundedReceiver<(usize, UnitMessage)>,
) {
    while let Some((unit, message)) = events.recv().await {
        let Some(inner) = pool.upgrade() else {
            break;
        };
        inner.handle(unit, message);
    }
    trace!("compiler pool event loop finished");
}

impl PoolInner {
    fn enqueue(&self, job: Job) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(LoaderError::PoolUnavailable {
                reason: reason.clone(),
            });
        }
        trace!(specifier = %job.request.specifier, queued = state.queue.len(), "queued compile");
        state.queue.push_back(job);
        Self::dispatch(&mut state);
        Ok(())
    }

    fn handle(&self, unit: usize, message: UnitMessage) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(slot) = state.units.get_mut(unit) else {
            return;
        };
        if slot.retired {
            trace!(unit, kind = message.kind(), "ignoring message from retired unit");
            return;
        }

        match message {
            UnitMessage::Ready if !slot.ready => {
                slot.ready = true;
                state.initializing -= 1;
                state.live += 1;
                state.idle.push_back(unit);
                info!(unit, "compiler unit ready");
            }
            UnitMessage::InitFailed { message } if !slot.ready => {
                slot.retired = true;
                slot.sender = None;
                state.initializing -= 1;
                warn!(unit, error = %message, "compiler unit failed to initialize");
                Self::close_if_exhausted(state, &message);
            }
            UnitMessage::Deps { reference, report } => match slot.current.as_mut() {
                Some(job) if job.reference == reference && job.deps_tx.is_some() => {
                    if let Some(deps_tx) = job.deps_tx.take() {
                        let _ = deps_tx.send(Ok(report));
                    }
                }
                _ => Self::retire_unexpected(state, unit, "deps"),
            },
            UnitMessage::Code { reference, code } => match slot.current.take() {
                Some(job) if job.reference == reference && job.deps_tx.is_none() => {
                    debug!(unit, specifier = %job.specifier, "compiled");
                    let _ = job.code_tx.send(Ok(code.into()));
                    state.idle.push_back(unit);
                }
                other => {
                    slot.current = other;
                    Self::retire_unexpected(state, unit, "code");
                }
            },
            UnitMessage::Error {
                reference,
                message,
                stack,
                fatal,
            } => match slot.current.take() {
                Some(job) if job.reference == reference => {
                    debug!(unit, specifier = %job.specifier, error = %message, "compile failed");
                    let specifier = job.specifier.clone();
                    job.fail(LoaderError::CompileFailure {
                        specifier,
                        message: message.clone(),
                        stack,
                    });
                    if fatal {
                        Self::retire(state, unit, None, &message);
                    } else {
                        state.idle.push_back(unit);
                    }
                }
                other => {
                    slot.current = other;
                    Self::retire_unexpected(state, unit, "error");
                }
            },
            other => Self::retire_unexpected(state, unit, other.kind()),
        }

        Self::dispatch(state);
    }

    /// Hand queued jobs to idle units.
    fn dispatch(state: &mut PoolState) {
        while !state.queue.is_empty() {
            let Some(unit) = state.idle.pop_front() else {
                return;
            };
            let Some(job) = Self::next_live_job(state) else {
                state.idle.push_front(unit);
                return;
            };

            let reference = state.next_reference;
            state.next_reference += 1;

            let slot = &mut state.units[unit];
            let specifier = job.request.specifier.clone();
            let request = UnitRequest {
                reference,
                request: job.request,
            };

            match slot.sender.as_ref().map(|tx| tx.send(request)) {
                Some(Ok(())) => {
                    trace!(unit, reference, specifier = %specifier, "dispatched compile");
                    slot.current = Some(InFlight {
                        reference,
                        specifier,
                        deps_tx: Some(job.deps_tx),
                        code_tx: job.code_tx,
                    });
                }
                Some(Err(std_mpsc::SendError(request))) => {
                    state.queue.push_front(Job {
                        request: request.request,
                        deps_tx: job.deps_tx,
                        code_tx: job.code_tx,
                    });
                    Self::retire(state, unit, None, "compiler unit thread exited");
                }
                None => {
                    let _ = job.deps_tx.send(Err(LoaderError::PoolUnavailable {
                        reason: format!("compiler unit {unit} has no request channel"),
                    }));
                    Self::retire(state, unit, None, "compiler unit lost its request channel");
                }
            }
        }
    }

    /// Pop the next job whose submitter is still waiting.
    fn next_live_job(state: &mut PoolState) -> Option<Job> {
        while let Some(job) = state.queue.pop_front() {
            if job.deps_tx.is_closed() {
                trace!(specifier = %job.request.specifier, "skipping abandoned compile");
                continue;
            }
            return Some(job);
        }
        None
    }

    fn retire_unexpected(state: &mut PoolState, unit: usize, kind: &str) {
        let error = LoaderError::UnexpectedProtocolMessage {
            unit,
            message: kind.to_string(),
        };
        let reason = error.to_string();
        Self::retire(state, unit, Some(error), &reason);
    }

    /// Stop using `unit`. Its in-flight job, if any, fails with `error`.
    fn retire(state: &mut PoolState, unit: usize, error: Option<LoaderError>, reason: &str) {
        let slot = &mut state.units[unit];
        if slot.retired {
            return;
        }
        slot.retired = true;
        slot.sender = None;
        if let Some(job) = slot.current.take() {
            job.fail(error.unwrap_or_else(|| LoaderError::PoolUnavailable {
                reason: reason.to_string(),
            }));
        }
        if slot.ready {
            state.live -= 1;
        } else {
            state.initializing -= 1;
        }
        state.idle.retain(|u| *u != unit);
        warn!(unit, reason, "compiler unit retired");

        Self::close_if_exhausted(state, reason);
    }

    fn close_if_exhausted(state: &mut PoolState, last_error: &str) {
        if state.live > 0 || state.initializing > 0 || state.closed.is_some() {
            return;
        }

        let reason = format!("no compiler units left (last error: {last_error})");
        warn!(reason = %reason, queued = state.queue.len(), "compiler pool closed");
        for job in state.queue.drain(..) {
            let _ = job.deps_tx.send(Err(LoaderError::PoolUnavailable {
                reason: reason.clone(),
            }));
        }
        state.closed = Some(reason);
    }
}
