pub mod buffer_pool;
pub mod ccsid;
pub mod col;
pub mod constant;
pub mod error;
mod opts;
pub mod protocol;
pub mod row;
pub mod sync;
pub mod value;


pub use opts::Opts;
