pub mod control;
pub mod outbound;
pub mod position;
pub mod types;
