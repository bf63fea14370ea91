pub mod block;
pub mod exports;
pub mod writers;
