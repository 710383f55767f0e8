pub mod config;
pub mod dag;
pub mod executor;
pub mod output;
pub mod planner;
