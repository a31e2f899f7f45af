/// Router Module Index
///
/// Splits the HTTP surface by who may reach it. Access control is attached per module
/// in `create_router`, and every protected handler also extracts its session, so a
/// route moved to the wrong module still refuses anonymous callers.

/// Anonymous reads of approved content, health, login and logout.
pub mod public;

/// Any live session.
pub mod authenticated;

/// Admin-class sessions only, nested under `/admin`.
pub mod admin;
