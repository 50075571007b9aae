pub mod compression;
pub mod data_format;
pub mod fetch;
pub mod header;
pub mod primitive;
pub mod reply;
pub mod request;
pub mod result_data;
pub mod sqlca;
pub mod r#trait;

pub use reply::{RawField, RawFields, ReplyField, ReplyFrame};
pub use request::{LibraryEntry, RequestFrame};
pub use r#trait::Exchange;
