//! Async driver for [`ReconnectionPolicy`].
//!
//! One task owns the policy, the live link and the backoff timer. Commands
//! arrive on a channel and are raced against the timer, so a logout during a
//! backoff wait takes effect immediately instead of after the sleep.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::realtime::events::PushMessage;

use super::policy::{BackoffConfig, ConnectionState, Disconnect, ReconnectionPolicy};

/// Opens connections to the realtime endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    async fn connect(&self) -> anyhow::Result<Self::Link>;
}

/// One open connection.
#[async_trait]
pub trait Link: Send + 'static {
    /// Next pushed frame, `None` once the server side is gone.
    async fn next(&mut self) -> Option<PushMessage>;

    async fn close(&mut self);
}

/// Full refetch of server state after a (re)connect. Anything pushed while
/// disconnected was missed, so this runs before any push is forwarded.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Connect,
    Disconnect,
}

enum Flow {
    Continue,
    Shutdown,
}

/// Caller's side of a running supervisor. Dropping it stops the task.
pub struct SupervisorHandle {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn connect(&self) {
        let _ = self.control.send(Control::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.control.send(Control::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes, e.g. to show "live updates paused".
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stops the supervisor, closing any open link first.
    pub async fn shutdown(self) {
        drop(self.control);
        let _ = self.task.await;
    }
}

pub fn spawn<T, R>(
    transport: T,
    reconciler: R,
    config: BackoffConfig,
    pushes: mpsc::Sender<PushMessage>,
) -> SupervisorHandle
where
    T: Transport,
    R: Reconciler,
{
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let policy = ReconnectionPolicy::new(config);
    let (state_tx, state_rx) = watch::channel(policy.state());

    let supervisor = Supervisor {
        transport,
        reconciler,
        policy,
        control: control_rx,
        state: state_tx,
        pushes,
    };
    let task = tokio::spawn(supervisor.run());

    SupervisorHandle {
        control: control_tx,
        state: state_rx,
        task,
    }
}

struct Supervisor<T, R> {
    transport: T,
    reconciler: R,
    policy: ReconnectionPolicy,
    control: mpsc::UnboundedReceiver<Control>,
    state: watch::Sender<ConnectionState>,
    pushes: mpsc::Sender<PushMessage>,
}

impl<T: Transport, R: Reconciler> Supervisor<T, R> {
    async fn run(mut self) {
        loop {
            let flow = match self.policy.state() {
                ConnectionState::Disconnected(Disconnect::Backoff { attempt, delay }) => {
                    debug!(attempt, ?delay, "Waiting before reconnect");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            self.policy.backoff_elapsed();
                            self.publish();
                            Flow::Continue
                        }
                        ctl = self.control.recv() => self.on_control(ctl),
                    }
                }
                ConnectionState::Disconnected(_) => {
                    let ctl = self.control.recv().await;
                    self.on_control(ctl)
                }
                ConnectionState::Connecting => self.attempt().await,
                // only reachable if a link was handed back without pumping
                ConnectionState::Connected => {
                    self.policy.connection_lost();
                    self.publish();
                    Flow::Continue
                }
            };
            if let Flow::Shutdown = flow {
                debug!("Supervisor stopped");
                return;
            }
        }
    }

    fn on_control(&mut self, ctl: Option<Control>) -> Flow {
        match ctl {
            Some(Control::Connect) => self.policy.connect_requested(),
            Some(Control::Disconnect) => self.policy.disconnect_requested(),
            None => return Flow::Shutdown,
        };
        self.publish();
        Flow::Continue
    }

    /// Connect, reconcile, then pump until the link drops or is closed.
    async fn attempt(&mut self) -> Flow {
        let opening = open(&self.transport, &self.reconciler);
        tokio::pin!(opening);
        let opened = loop {
            tokio::select! {
                opened = &mut opening => break opened,
                ctl = self.control.recv() => match ctl {
                    // already on it; restarting would strand the half-open link
                    Some(Control::Connect) => debug!("Connect already in progress"),
                    Some(Control::Disconnect) => {
                        self.policy.disconnect_requested();
                        self.publish();
                        return Flow::Continue;
                    }
                    None => return Flow::Shutdown,
                },
            }
        };

        let mut link = match opened {
            Ok(link) => link,
            Err(e) => {
                let state = self.policy.connect_failed();
                warn!(attempt = self.policy.attempt(), ?state, "Live updates connect failed: {:#}", e);
                self.publish();
                return Flow::Continue;
            }
        };

        if !self.policy.connected() {
            link.close().await;
            return Flow::Continue;
        }
        info!("Live updates connected");
        self.publish();

        loop {
            tokio::select! {
                frame = link.next() => match frame {
                    Some(message) => {
                        if self.pushes.send(message).await.is_err() {
                            // nobody is listening any more
                            link.close().await;
                            return Flow::Shutdown;
                        }
                    }
                    None => {
                        let state = self.policy.connection_lost();
                        warn!(?state, "Live updates connection lost");
                        self.publish();
                        return Flow::Continue;
                    }
                },
                ctl = self.control.recv() => match ctl {
                    Some(Control::Connect) => {}
                    Some(Control::Disconnect) => {
                        link.close().await;
                        self.policy.disconnect_requested();
                        self.publish();
                        return Flow::Continue;
                    }
                    None => {
                        link.close().await;
                        return Flow::Shutdown;
                    }
                },
            }
        }
    }

    fn publish(&self) {
        self.state.send_replace(self.policy.state());
    }
}

async fn open<T: Transport, R: Reconciler>(transport: &T, reconciler: &R) -> anyhow::Result<T::Link> {
    let mut link = transport.connect().await?;
    if let Err(e) = reconciler.reconcile().await {
        link.close().await;
        return Err(e.context("reconciliation failed"));
    }
    Ok(link)
}
