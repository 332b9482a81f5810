// Prompt version registry: versioned system/user prompt pairs, exactly one of which may
// be active, plus an admin sandbox for trying a version before activating it.

pub mod handlers;
pub mod service;
