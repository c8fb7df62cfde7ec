pub mod engine;
pub mod retrieval;
pub mod separation;
pub mod stems;
pub mod workspace;
