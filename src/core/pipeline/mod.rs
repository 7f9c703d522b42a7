pub mod judging;
pub mod worker;
