// Operator surface: user management and usage analytics. Prompt administration lives
// in `registry`.

pub mod handlers;
