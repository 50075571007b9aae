mod conn;
pub mod row_cache;

pub use conn::Conn;
pub use row_cache::{
    CacheState, Concurrency, CursorSettings, FirstRowPosition, RowCache, Sensitivity,
    WarningTarget,
};
