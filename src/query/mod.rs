pub mod algebra;
pub mod optimiser;
