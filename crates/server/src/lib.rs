pub mod auth;
pub mod errors;
pub mod metrics;
pub mod routes;
pub mod startup;

pub use startup::run;
