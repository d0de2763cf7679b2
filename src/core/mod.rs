//! Core types - pure abstractions shared across the codebase.

mod page;
mod state;
mod unit;

pub use page::{ERROR_PAGE, PageId, normalize};
pub use state::{is_shutdown, register_server, setup_shutdown_handler};
pub use unit::{page_from_unit, unit_name};
