pub mod call;
pub mod schedule;
pub mod tenant;
