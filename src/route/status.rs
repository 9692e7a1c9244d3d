use std::fmt;

/// Lifecycle state of a route.
///
/// Transitions always follow `Stopped -> Starting -> Started -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl RouteStatus {
    pub fn is_stopped(self) -> bool {
        self == RouteStatus::Stopped
    }

    pub fn is_starting(self) -> bool {
        self == RouteStatus::Starting
    }

    pub fn is_started(self) -> bool {
        self == RouteStatus::Started
    }

    pub fn is_stopping(self) -> bool {
        self == RouteStatus::Stopping
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteStatus::Stopped => "stopped",
            RouteStatus::Starting => "starting",
            RouteStatus::Started => "started",
            RouteStatus::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
