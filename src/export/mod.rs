pub mod error;
pub mod frame;
pub mod naming;
pub mod pool;
pub mod sink;
