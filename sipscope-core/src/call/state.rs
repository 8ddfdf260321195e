use std::fmt;

/// Progress of an INVITE dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// INVITE seen, no final response yet.
    CallSetup,
    /// Initial INVITE answered with 2xx.
    InCall,
    /// Established call torn down with BYE.
    Completed,
    /// CANCEL before a final response.
    Cancelled,
    /// 4xx/5xx/6xx final response, other than busy.
    Rejected,
    /// 486 or 600.
    Busy,
    /// 3xx redirect.
    Diverted,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::CallSetup => "CALL SETUP",
            CallState::InCall => "IN CALL",
            CallState::Completed => "COMPLETED",
            CallState::Cancelled => "CANCELLED",
            CallState::Rejected => "REJECTED",
            CallState::Busy => "BUSY",
            CallState::Diverted => "DIVERTED",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallState::CallSetup | CallState::InCall)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
