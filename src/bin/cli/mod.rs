pub mod args;
pub mod commands;
pub mod plain;
pub mod state;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    /// Invalid command line (e.g. unparsable heartbeat)
    pub const USAGE_ERROR: u8 = 2;
    /// The session task stopped unexpectedly
    pub const SESSION_ERROR: u8 = 3;
}
