pub mod optimization_example;
pub mod risk_audit_log;
pub mod shadow_account;
pub mod shadow_store;
pub mod shadow_trade;
