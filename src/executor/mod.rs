pub mod actions;
pub mod cloudformation;
pub mod parallel;
pub mod retry;
