use std::time::Duration;

/// Simulation ticks per second
pub const DEFAULT_TICK_RATE: u32 = 60;
/// Snapshots per second (every third tick at the default tick rate)
pub const DEFAULT_SNAPSHOT_RATE: u32 = 20;
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// Runtime settings handed from `main` to the engine, hub and listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` the listener binds to.
    pub bind_addr: String,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Snapshots broadcast per second.
    pub snapshot_rate: u32,
    /// Frames a client may have queued before it is dropped as too slow.
    pub outbound_capacity: usize,
    /// Pending hub events before broadcasts start being shed.
    pub hub_capacity: usize,
}

impl ServerConfig {
    /// Length of one fixed tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Number of ticks between two snapshots, at least one.
    pub fn snapshot_interval(&self) -> u32 {
        (self.tick_rate / self.snapshot_rate.max(1)).max(1)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            snapshot_rate: DEFAULT_SNAPSHOT_RATE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            hub_capacity: DEFAULT_HUB_CAPACITY,
        }
    }
}
