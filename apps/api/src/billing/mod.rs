// Credit-pack purchases: a fixed catalog, hosted checkout at the payment provider, and
// webhook reconciliation that grants credits at most once per checkout session.

pub mod catalog;
pub mod checkout;
pub mod handlers;
pub mod provider;
