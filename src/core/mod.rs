pub mod checker;
pub mod domain;
pub mod errors;
pub mod executable;
pub mod pipeline;
pub mod testset;
pub mod traits;
pub mod verdict;
