pub mod error;
pub mod launch;
pub mod plan;
