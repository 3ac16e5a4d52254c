//! Close codes and the canned reasons clients see.

/// Close code for a refused handshake (bad or missing secret).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code for a connect attempted after shutdown began.
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// Close code sent to every session once the drain has finished.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close reason for handshake authorization failures.
pub const INVALID_AUTHORIZATION: &str =
    "Your connection was closed: Missing, or invalid Authorization header.";
/// Error text used when a failure carries no message of its own.
pub const UNKNOWN_EXCEPTION: &str = "An unknown exception had occurred.";
/// Close reason for connections refused while closing.
pub const CLOSING_TIME: &str = "Your connection was closed: The socket is about to close.";
/// Reply to inbound requests received while closing.
pub const UNACCEPTED_CLOSING: &str = "Your message was not accepted: The socket is about to close.";
/// Close reason sent after the final drain.
pub const SHUTTING_DOWN: &str = "server shutting down";
