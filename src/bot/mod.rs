/// Command table and argument parsing
pub mod commands;
/// Event loop feeding the router and heartbeat
pub mod dispatcher;
/// Connection health monitor
pub mod heartbeat;
/// Command routing and reply decisions
pub mod router;

pub use dispatcher::Dispatcher;
pub use heartbeat::{HeartbeatMonitor, HeartbeatState};
pub use router::{Action, CommandRouter};
