pub mod gateway;
pub mod handler;
pub mod lambda;
pub mod models;
