pub mod backend;
pub mod codec;
pub mod cursor;
pub mod memory;
pub mod store;
