mod event_source;
mod pagination;
mod repository;

pub use event_source::*;
pub use pagination::*;
pub use repository::*;
