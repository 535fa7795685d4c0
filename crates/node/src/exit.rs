/// The exit status of the node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Clean shutdown.
    Clean,
    /// Fatal initialization error, or an unexpected stop.
    Fatal,
    /// Store corruption detected.
    Corruption,
    /// Unrecoverable L1 disconnection.
    L1Disconnected,
}

impl ExitStatus {
    /// Returns the process exit code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::Fatal => 1,
            Self::Corruption => 2,
            Self::L1Disconnected => 3,
        }
    }
}
