//! Observer events emitted by the server.
//!
//! GUI and tray surfaces consume these over the unbounded channel handed out
//! by [`StatsServer::new`](crate::server::StatsServer::new). Each variant
//! corresponds to one slot of the observer surface; a consumer that only
//! cares about some variants ignores the rest, and a consumer that dropped
//! its receiver is ignored by the sender.

/// Whether a log event is shown unconditionally or only in debug mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogVisibility {
    /// Shown regardless of the debug flag.
    Always,
    /// Suppressed at emission unless the debug flag is set.
    Verbose,
}

/// A state change or log line the server reports to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A notable event. Verbose entries are already filtered by the debug
    /// flag; the tag is kept so consumers can still tell the classes apart.
    Log {
        message: String,
        visibility: LogVisibility,
    },
    /// The active-connection count changed.
    ConnectionsChanged { count: usize },
    /// The server started or stopped.
    StatusChanged { running: bool },
    /// Periodic host stats for display widgets, in percent (0-100).
    Stats { cpu: f32, mem: f32 },
}
