pub mod ids;
pub mod mention;
pub mod poll;
