pub mod busy;
pub mod capacity;
pub mod counters;
pub mod driver;
pub mod instances;
pub mod registry;
pub mod roster;
pub mod session;

pub use busy::{BusyFlag, BusyGuard};
pub use capacity::{FixedProbe, MemSample, MemoryProbe, ProcMeminfo};
pub use counters::{MessageCounters, RateWindow};
pub use driver::{stagger_delay, ChannelDriver, InstanceHandles, ScriptedDriver};
pub use instances::ChannelInstanceTable;
pub use registry::SessionRegistry;
pub use roster::{ChannelProfile, ChannelRoster, RosterError, RosterStore};
pub use session::{ConfigCell, PauseGate, ReadyGate, StormSession};
