/*
  Update commands and the processor that approximates them against stores
  without native update support.
*/

pub mod commands;
pub mod context;
pub mod manager;
pub mod processor;
