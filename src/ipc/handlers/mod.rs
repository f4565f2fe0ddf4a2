pub mod allocation;
pub mod batch;
pub mod bulk;
pub mod commit;
pub mod core;
pub mod pricing;
pub mod session;
