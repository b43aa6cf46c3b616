pub mod macros;
pub mod nodes;
