pub mod analytics;
pub mod payment;
pub mod prompt;
pub mod resume;
pub mod user;
