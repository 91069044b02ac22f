// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Execution methods for [`CompiledWorkload`].
//!
//! One internal drain cycle backs every public entry point: [`execute`]
//! awaits the terminal state, [`stream`] additionally yields each audit
//! event as it is appended, and [`execute_blocking`] wraps `execute` for
//! synchronous callers. Failures never discard audit data — the error
//! carries the report accumulated so far.
//!
//! [`execute`]: CompiledWorkload::execute
//! [`stream`]: CompiledWorkload::stream
//! [`execute_blocking`]: CompiledWorkload::execute_blocking

use std::collections::{HashMap, VecDeque};

use async_stream::stream;
use chrono::Utc;
use futures::stream::Stream;
use serde_json::{json, Value};
use tracing::{info_span, Instrument, Span};

use super::{ExecutionReport, NodeRun, RunOptions, RunStatus};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::graph::CompiledWorkload;
use crate::ledger::{AuditEvent, AuditEventKind, AuditLedger};
use crate::node::{Invocable, NodeError};
use crate::runtime::{PendingEmission, RouteError, RuntimeHandle};
use crate::state::RunState;
use crate::stream::RunEvent;
use crate::token::{QueuedToken, Token, TokenId, ENTRY};

/// Outcome of one drain cycle.
enum CycleOutcome {
    /// A token was dispatched; keep draining.
    Continue,
    /// The run reached a non-error terminal state.
    Terminal(RunStatus),
    /// The run failed; the caller converts this into an error that owns
    /// the partial report.
    Faulted(FailureKind),
}

enum FailureKind {
    Route { origin: String, target: String },
    StepLimit { limit: u64 },
    Node { node: String, source: NodeError },
}

/// All mutable state of one run. Created by seeding, consumed by the
/// terminal report or error.
struct Run<'w> {
    workload: &'w CompiledWorkload,
    context: RunContext,
    queue: VecDeque<QueuedToken>,
    ledger: AuditLedger,
    results: HashMap<String, Vec<NodeRun>>,
    state: RunState,
    next_token_id: u64,
    stop_requested: bool,
    steps: u64,
    max_steps: u64,
}

impl<'w> Run<'w> {
    /// One drain cycle: terminal checks, then dispatch of the next token.
    async fn cycle(&mut self, span: &Span) -> CycleOutcome {
        if self.queue.is_empty() {
            return CycleOutcome::Terminal(RunStatus::Completed);
        }
        if self.steps >= self.max_steps {
            return CycleOutcome::Faulted(FailureKind::StepLimit {
                limit: self.max_steps,
            });
        }
        let Some(QueuedToken { target, token }) = self.queue.pop_front() else {
            return CycleOutcome::Terminal(RunStatus::Completed);
        };

        self.ledger.append(
            AuditEvent::new(AuditEventKind::TokenDequeued, token.id())
                .with_source(token.origin())
                .with_target(&target)
                .with_meta("payload", token.payload().clone()),
        );

        let workload = self.workload;
        let Some(invocable) = workload.invocable(&target) else {
            // Routes are validated before enqueueing, so this cannot happen
            // for tokens the engine produced. Fail closed regardless.
            return CycleOutcome::Faulted(FailureKind::Node {
                node: target,
                source: "target node is not registered".into(),
            });
        };

        tracing::debug!(node = target.as_str(), token_id = %token.id(), "dispatching token");
        let started_at = Utc::now();
        let (result, emissions, pending) = {
            let Run {
                context,
                ledger,
                state,
                next_token_id,
                stop_requested,
                ..
            } = &mut *self;
            let mut handle = RuntimeHandle::new(
                workload,
                &target,
                &token,
                ledger,
                state,
                next_token_id,
                stop_requested,
            );
            let result = invocable
                .invoke(token.payload().clone(), &mut handle, context)
                .instrument(span.clone())
                .await;
            let emissions = handle.emissions();
            let pending = handle.take_pending();
            (result, emissions, pending)
        };

        match result {
            Ok(value) => {
                let finished_at = Utc::now();
                self.results.entry(target.clone()).or_default().push(NodeRun {
                    node: target.clone(),
                    token_id: token.id(),
                    result: value.clone(),
                    started_at,
                    finished_at,
                });
                self.ledger.append(
                    AuditEvent::new(AuditEventKind::NodeCompleted, token.id())
                        .with_source(&target)
                        .with_meta("result", value)
                        .with_meta("emissions", json!(emissions)),
                );

                // Routing effects land after the completion event.
                for PendingEmission {
                    token: child,
                    target: child_target,
                    metadata,
                } in pending
                {
                    self.ledger.append(
                        AuditEvent::new(AuditEventKind::TokenEnqueued, child.id())
                            .with_source(&target)
                            .with_target(&child_target)
                            .with_meta("payload", child.payload().clone())
                            .with_metadata(metadata),
                    );
                    self.queue.push_back(QueuedToken {
                        target: child_target,
                        token: child,
                    });
                }

                self.steps += 1;

                if self.stop_requested {
                    let discarded = self.queue.len();
                    self.ledger.append(
                        AuditEvent::new(AuditEventKind::RunStopped, token.id())
                            .with_source(&target)
                            .with_meta("reason", json!("stop-requested"))
                            .with_meta("discarded", json!(discarded)),
                    );
                    self.queue.clear();
                    tracing::debug!(discarded, "run stopped cooperatively");
                    return CycleOutcome::Terminal(RunStatus::Stopped);
                }

                CycleOutcome::Continue
            }
            Err(error) => {
                self.ledger.append(
                    AuditEvent::new(AuditEventKind::NodeFailed, token.id())
                        .with_source(&target)
                        .with_meta("error", json!(error.to_string())),
                );
                tracing::warn!(node = target.as_str(), error = %error, "node failed");

                match error.downcast::<RouteError>() {
                    Ok(route) => CycleOutcome::Faulted(FailureKind::Route {
                        origin: route.origin,
                        target: route.target,
                    }),
                    Err(source) => CycleOutcome::Faulted(FailureKind::Node {
                        node: target,
                        source,
                    }),
                }
            }
        }
    }

    fn finish(self, status: RunStatus) -> ExecutionReport {
        ExecutionReport::new(status, self.results, self.ledger, self.context)
    }

    fn fail(self, kind: FailureKind) -> Error {
        let report = Box::new(ExecutionReport::new(
            RunStatus::Failed,
            self.results,
            self.ledger,
            self.context,
        ));
        match kind {
            FailureKind::Route { origin, target } => Error::UnknownRoute {
                origin,
                target,
                report,
            },
            FailureKind::StepLimit { limit } => Error::StepLimitExceeded { limit, report },
            FailureKind::Node { node, source } => Error::NodeFailure {
                node,
                source,
                report,
            },
        }
    }
}

impl CompiledWorkload {
    /// Validate options, build the run context, and seed entry tokens.
    fn begin_run(&self, payload: Value, options: RunOptions) -> Result<Run<'_>> {
        if options.deployment_id.is_empty() {
            return Err(Error::MissingDeploymentId);
        }

        let entries = match options.entry_nodes {
            Some(entries) => {
                for name in &entries {
                    if !self.node_ids.contains_key(name) {
                        return Err(Error::InvalidEntryNode { name: name.clone() });
                    }
                }
                entries
            }
            None => self.default_entries.clone(),
        };

        let context = RunContext::new(
            self.workload_id.clone(),
            self.logic_id,
            options.deployment_id,
            self.org_namespace.clone(),
            self.metadata.name().to_string(),
            self.metadata.version().to_string(),
            options.invoked_by,
            options.extras,
        );

        let mut run = Run {
            workload: self,
            context,
            queue: VecDeque::new(),
            ledger: AuditLedger::new(),
            results: HashMap::new(),
            state: RunState::new(),
            next_token_id: 0,
            stop_requested: false,
            steps: 0,
            max_steps: options.max_steps,
        };

        for entry in entries {
            let id = TokenId::new(run.next_token_id);
            run.next_token_id += 1;
            let token = Token::new(id, payload.clone(), ENTRY, None, Vec::new());
            run.ledger.append(
                AuditEvent::new(AuditEventKind::TokenEnqueued, id)
                    .with_target(&entry)
                    .with_meta("seed", json!(true))
                    .with_meta("payload", payload.clone()),
            );
            run.queue.push_back(QueuedToken {
                target: entry,
                token,
            });
        }

        Ok(run)
    }

    fn run_span(&self, context: &RunContext) -> Span {
        info_span!(
            "workload.run",
            run_id = %context.run_id(),
            workload = self.workload_id.as_str(),
            logic_id = %self.logic_id,
            deployment = context.deployment_id()
        )
    }

    /// Execute the workload to a terminal state.
    ///
    /// Seeds one token per entry node with `payload`, drains the queue in
    /// FIFO order with exactly one invocation in flight, and returns the
    /// [`ExecutionReport`] once the run completes or is stopped.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingDeploymentId`] - options carried an empty deployment id
    /// - [`Error::InvalidEntryNode`] - an entry override names an unknown node
    /// - [`Error::UnknownRoute`] - a node emitted along an undeclared edge
    /// - [`Error::StepLimitExceeded`] - the invocation ceiling was reached
    /// - [`Error::NodeFailure`] - an invocable returned an error
    ///
    /// The last three carry the partial report; see
    /// [`Error::partial_report`].
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let report = app.execute(json!({"text": "hello"}), RunOptions::new("dev")).await?;
    /// println!("{:?}", report.node_results("count"));
    /// ```
    pub async fn execute(&self, payload: Value, options: RunOptions) -> Result<ExecutionReport> {
        let mut run = self.begin_run(payload, options)?;
        let span = self.run_span(&run.context);
        loop {
            match run.cycle(&span).await {
                CycleOutcome::Continue => {}
                CycleOutcome::Terminal(status) => return Ok(run.finish(status)),
                CycleOutcome::Faulted(kind) => return Err(run.fail(kind)),
            }
        }
    }

    /// Execute from synchronous code.
    ///
    /// Spins up a current-thread runtime and blocks on
    /// [`execute`](Self::execute). Must not be called from within an async
    /// context.
    pub fn execute_blocking(
        &self,
        payload: Value,
        options: RunOptions,
    ) -> Result<ExecutionReport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::BlockingRuntime)?;
        runtime.block_on(self.execute(payload, options))
    }

    /// Stream execution, yielding lifecycle events as they happen.
    ///
    /// Every audit event is yielded in ledger order as
    /// [`RunEvent::Audit`]; the final item is either
    /// [`RunEvent::Finished`] with the report or the error `execute` would
    /// have returned. Consuming the stream drives the run — dropping it
    /// abandons the run.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use futures::StreamExt;
    ///
    /// let mut events = std::pin::pin!(app.stream(payload, RunOptions::new("dev")));
    /// while let Some(event) = events.next().await {
    ///     match event? {
    ///         RunEvent::Audit(audit) => println!("{}", audit.kind),
    ///         RunEvent::Finished(report) => println!("{:?}", report.status()),
    ///     }
    /// }
    /// ```
    pub fn stream(
        &self,
        payload: Value,
        options: RunOptions,
    ) -> impl Stream<Item = Result<RunEvent>> + '_ {
        stream! {
            let mut run = match self.begin_run(payload, options) {
                Ok(run) => run,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            let span = self.run_span(&run.context);
            let mut cursor = 0;

            loop {
                while cursor < run.ledger.len() {
                    yield Ok(RunEvent::Audit(run.ledger.events()[cursor].clone()));
                    cursor += 1;
                }

                match run.cycle(&span).await {
                    CycleOutcome::Continue => {}
                    CycleOutcome::Terminal(status) => {
                        while cursor < run.ledger.len() {
                            yield Ok(RunEvent::Audit(run.ledger.events()[cursor].clone()));
                            cursor += 1;
                        }
                        yield Ok(RunEvent::Finished(Box::new(run.finish(status))));
                        return;
                    }
                    CycleOutcome::Faulted(kind) => {
                        while cursor < run.ledger.len() {
                            yield Ok(RunEvent::Audit(run.ledger.events()[cursor].clone()));
                            cursor += 1;
                        }
                        yield Err(run.fail(kind));
                        return;
                    }
                }
            }
        }
    }
}
