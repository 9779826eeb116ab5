mod get;

pub use get::run_get;
