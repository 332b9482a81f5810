// Identity reconciliation: maps the authenticated principal onto a user row, creating
// or re-keying it as needed.

pub mod handlers;
pub mod service;
