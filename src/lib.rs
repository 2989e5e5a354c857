//! A decentralized cluster membership protocol.
//!
//! Every node keeps a local view of the group: a table of members with their last known heartbeat.
//! Nodes join through a well-known bootstrap node, then on every tick they increment their own heartbeat,
//! gossip their whole table to a few random peers, and merge the tables they receive. A member whose
//! heartbeat stops increasing is suspected, then considered failed, then removed.
//!
//! The protocol itself lives in [Engine](engine::Engine), which is driven tick by tick and talks to the
//! outside world through a [Network](network::Network) and a [Clock](node::clock::Clock).
//! [Simulation](simulation::Simulation) runs many engines in one process; [Conclave] runs one engine on a
//! tokio interval.

use std::sync::Arc;

use membership::{MemberRecord, MembershipEvent};
use network::Network;
use node::{
    clock::{Clock, LogicalClock, Tick},
    Address,
};
use tokio::{
    select,
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::Interval,
};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

mod builder;

pub mod codec;
pub mod engine;
pub mod error;
pub mod membership;
pub mod network;
pub mod node;
pub mod simulation;

pub use self::builder::*;
pub use self::error::Error;

/// A membership engine running in its own tokio task.
///
/// The task ticks the engine on a fixed interval. Its view of the group is published after every tick,
/// and every membership event is broadcast to the streams returned by [Conclave::events].
pub struct Conclave {
    address: Address,
    view_receiver: watch::Receiver<View>,
    events_sender: broadcast::Sender<MembershipEvent>,
    command_sender: mpsc::Sender<Command>,
    main_thread: JoinHandle<()>,
}

/// What a running [Conclave] knows about the group after its latest tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub tick: Tick,
    pub in_group: bool,
    pub members: Vec<MemberRecord>,
}

impl View {
    pub(crate) fn of<N: Network, C: Clock>(engine: &engine::Engine<N, C>, tick: Tick) -> Self {
        Self {
            tick,
            in_group: engine.is_in_group(),
            members: engine.current_view(),
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.members.iter().map(MemberRecord::address)
    }
}

impl Conclave {
    pub fn builder(this_node_address: Address) -> ConclaveBuilder {
        ConclaveBuilder::new(this_node_address)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn view(&self) -> View {
        self.view_receiver.borrow().clone()
    }

    pub fn is_in_group(&self) -> bool {
        self.view_receiver.borrow().in_group
    }

    /// A receiver notified every time the view is published
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.view_receiver.clone()
    }

    /// Membership events recorded from now on. A subscriber that lags too far behind skips the events it missed.
    pub fn events(&self) -> impl Stream<Item = MembershipEvent> {
        BroadcastStream::new(self.events_sender.subscribe()).filter_map(|event| event.ok())
    }

    /// Sends a new join request if this node is still waiting to be admitted
    pub async fn rejoin(&self) -> Result<(), Error> {
        self.command_sender
            .send(Command::Rejoin)
            .await
            .map_err(|_| Error::DriverStopped)
    }

    /// Stops ticking. Peers will eventually detect this node as failed and remove it.
    pub async fn shutdown(self) -> Result<(), Error> {
        let (done_sender, done_receiver) = oneshot::channel();
        self.command_sender
            .send(Command::Shutdown { done: done_sender })
            .await
            .map_err(|_| Error::DriverStopped)?;
        done_receiver.await.map_err(|_| Error::DriverStopped)?;
        self.main_thread.await.map_err(|_| Error::DriverStopped)
    }

    pub(crate) async fn main_thread<N: Network>(
        mut outgoing_gossip_interval: Interval,
        mut engine: engine::Engine<N, Arc<LogicalClock>>,
        clock: Arc<LogicalClock>,
        mut command_receiver: mpsc::Receiver<Command>,
        view_sender: watch::Sender<View>,
        events_sender: broadcast::Sender<MembershipEvent>,
    ) {
        loop {
            select! {
                command = command_receiver.recv() => {
                    match command {
                        Some(Command::Rejoin) => engine.start(),
                        Some(Command::Shutdown { done }) => {
                            engine.mark_failed();
                            let _ = done.send(());
                            break;
                        }
                        None => break,
                    }
                },
                _ = outgoing_gossip_interval.tick() => {
                    let now = clock.advance();
                    engine.tick();
                    for event in engine.drain_events() {
                        // Nobody listening is fine
                        let _ = events_sender.send(event);
                    }
                    view_sender.send_replace(View::of(&engine, now));
                }
            }
        }
    }
}

/// Commands sent by a [Conclave] handle to its running task
pub(crate) enum Command {
    Rejoin,
    Shutdown { done: oneshot::Sender<()> },
}
