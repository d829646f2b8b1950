pub mod graph;
pub mod node;
pub mod parser;
