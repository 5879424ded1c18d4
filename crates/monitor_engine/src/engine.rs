use std::sync::Arc;
use std::time::Duration;

use monitor_core::{Decision, Gate, ReleaseEvent, RunStatistics};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::pipeline::Pipeline;

enum EngineCommand {
    Submit(ReleaseEvent),
}

/// Producer side of the dispatcher queue. Cheap to clone.
#[derive(Clone)]
pub struct EventSender {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EventSender {
    /// Queue an event for a decision. `false` once the engine has stopped.
    pub fn submit(&self, event: ReleaseEvent) -> bool {
        self.cmd_tx.send(EngineCommand::Submit(event)).is_ok()
    }
}

/// Single dispatcher that serializes gate decisions and runs admitted
/// releases on tracked tasks.
pub struct Engine {
    gate: Gate,
    pipeline: Arc<Pipeline>,
    stats: Arc<RunStatistics>,
    tracker: TaskTracker,
}

pub struct EngineHandle {
    sender: EventSender,
    stop: CancellationToken,
    dispatcher: JoinHandle<()>,
    tracker: TaskTracker,
}

impl Engine {
    pub fn new(gate: Gate, pipeline: Arc<Pipeline>, stats: Arc<RunStatistics>) -> Self {
        Self {
            gate,
            pipeline,
            stats,
            tracker: TaskTracker::new(),
        }
    }

    pub fn start(gate: Gate, pipeline: Arc<Pipeline>, stats: Arc<RunStatistics>) -> EngineHandle {
        Self::new(gate, pipeline, stats).spawn()
    }

    pub fn spawn(self) -> EngineHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let tracker = self.tracker.clone();
        let dispatcher = tokio::spawn(self.dispatch(cmd_rx, stop.clone()));
        EngineHandle {
            sender: EventSender { cmd_tx },
            stop,
            dispatcher,
            tracker,
        }
    }

    async fn dispatch(self, mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>, stop: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = stop.cancelled() => break,
                command = cmd_rx.recv() => command,
            };
            match command {
                Some(command) => self.handle_command(command),
                None => break,
            }
        }

        // Events reported before the stop request still get a decision.
        cmd_rx.close();
        while let Ok(command) = cmd_rx.try_recv() {
            self.handle_command(command);
        }
    }

    fn handle_command(&self, command: EngineCommand) {
        match command {
            EngineCommand::Submit(event) => {
                self.decide(event);
            }
        }
    }

    /// Run the gate for one event and start the pipeline when admitted.
    pub fn decide(&self, event: ReleaseEvent) -> Decision {
        let decision = self.gate.evaluate(&event);
        match decision {
            Decision::NotFreeleech => {
                monitor_debug!("[MONITOR] Ignoring {} (not freeleech)", event.id);
            }
            Decision::Filtered => {
                monitor_info!(
                    "[MONITOR] Filtered {} {} [{}] from {}",
                    event.id,
                    event.title,
                    event.category,
                    event.source
                );
            }
            Decision::Duplicate => {
                monitor_debug!("[MONITOR] Already handled {} (reported by {})", event.id, event.source);
            }
            Decision::Admitted => {
                self.stats.record_match();
                monitor_info!(
                    "[MONITOR] Matched {} {} [{}] via {}",
                    event.id,
                    event.title,
                    event.category,
                    event.source
                );
                let pipeline = self.pipeline.clone();
                self.tracker.spawn(async move {
                    pipeline.process(&event).await;
                });
            }
        }
        decision
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

impl EngineHandle {
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn submit(&self, event: ReleaseEvent) -> bool {
        self.sender.submit(event)
    }

    /// Stop intake, then wait up to `grace` for in-flight releases.
    /// Returns `false` when tasks were still running at the deadline.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.stop.cancel();
        if let Err(err) = self.dispatcher.await {
            monitor_warn!("[MONITOR] Dispatcher ended abnormally: {err}");
        }

        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            monitor_info!("[MONITOR] Waiting up to {}s for {pending} transfer(s)", grace.as_secs());
        }
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                monitor_warn!(
                    "[MONITOR] Abandoning {} unfinished transfer(s)",
                    self.tracker.len()
                );
                false
            }
        }
    }
}
