use std::{sync::Arc, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::{broadcast, mpsc, watch};

use crate::{
    engine::Engine,
    error::Error,
    network::Network,
    node::{
        clock::{Clock, LogicalClock, Tick},
        Address,
    },
    Conclave, View,
};

/// The address of the node founding the group, unless configured otherwise
pub const DEFAULT_BOOTSTRAP_ADDRESS: Address = Address::new(1, 0);

/// Protocol constants shared by every node of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Every node joins through this address. The node owning it founds the group.
    pub bootstrap_address: Address,
    /// Ticks without a fresher heartbeat before a member is suspected, and again before it is failed
    pub fail_timeout: Tick,
    /// Ticks a member stays failed before it is removed
    pub cleanup_timeout: Tick,
    /// Number of peers each node gossips with on every tick
    pub fanout: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap_address: DEFAULT_BOOTSTRAP_ADDRESS,
            fail_timeout: 5,
            cleanup_timeout: 20,
            fanout: 3,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if self.fanout == 0 {
            return Err(Error::InvalidConfig("gossip fan-out must be at least 1"));
        }
        if self.fail_timeout == 0 {
            return Err(Error::InvalidConfig("fail timeout must be at least 1 tick"));
        }
        if self.bootstrap_address.is_null() {
            return Err(Error::InvalidConfig("bootstrap address cannot be null"));
        }
        let removal_delay = self
            .fail_timeout
            .checked_mul(2)
            .and_then(|failure_delay| failure_delay.checked_add(self.cleanup_timeout));
        if removal_delay.is_none() {
            return Err(Error::InvalidConfig(
                "fail and cleanup timeouts overflow the tick counter",
            ));
        }
        Ok(())
    }
}

pub struct ConclaveBuilder {
    this_node_address: Address,
    config: Config,
    tick_interval: Duration,
    rng_seed: Option<u64>,
}

impl ConclaveBuilder {
    pub fn new(this_node_address: Address) -> Self {
        Self {
            this_node_address,
            config: Config::default(),
            tick_interval: Duration::from_secs(1),
            rng_seed: None,
        }
    }
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
    pub fn with_bootstrap_address(mut self, bootstrap_address: Address) -> Self {
        self.config.bootstrap_address = bootstrap_address;
        self
    }
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.config.fanout = fanout;
        self
    }
    pub fn with_fail_timeout(mut self, ticks: Tick) -> Self {
        self.config.fail_timeout = ticks;
        self
    }
    pub fn with_cleanup_timeout(mut self, ticks: Tick) -> Self {
        self.config.cleanup_timeout = ticks;
        self
    }
    /// How often the driver started by [ConclaveBuilder::start] ticks its engine
    pub fn with_tick_interval(mut self, interval_duration: Duration) -> Self {
        self.tick_interval = interval_duration;
        self
    }
    /// Seeds the random source used to pick gossip destinations
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Builds a bare [Engine], to be ticked by the caller
    pub fn build_engine<N: Network, C: Clock>(
        self,
        network: N,
        clock: C,
    ) -> Result<Engine<N, C>, Error> {
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Engine::with_rng(self.this_node_address, self.config, network, clock, rng)
    }

    /// Starts the engine and spawns a task ticking it on the configured interval.
    /// Must be called from within a tokio runtime.
    pub fn start<N>(self, network: N) -> Result<Conclave, Error>
    where
        N: Network + Send + 'static,
    {
        let tick_interval = self.tick_interval;
        let clock = Arc::new(LogicalClock::new());
        let mut engine = self.build_engine(network, Arc::clone(&clock))?;
        engine.start();

        let (events_sender, _) = broadcast::channel(64);
        let (view_sender, view_receiver) = watch::channel(View::of(&engine, clock.now()));
        let (command_sender, command_receiver) = mpsc::channel(8);

        let mut outgoing_gossip_interval = tokio::time::interval(tick_interval);
        outgoing_gossip_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let address = engine.address();
        let main_thread = tokio::spawn(Conclave::main_thread(
            outgoing_gossip_interval,
            engine,
            clock,
            command_receiver,
            view_sender,
            events_sender.clone(),
        ));

        Ok(Conclave {
            address,
            view_receiver,
            events_sender,
            command_sender,
            main_thread,
        })
    }
}
