pub mod graph;
pub mod stack;
pub mod visualizer;
