//! Configuration section definitions.
//!
//! Each module corresponds to a section in `ondemand.toml`:
//!
//! | Module      | TOML Section    | Purpose                           |
//! |-------------|-----------------|-----------------------------------|
//! | `build`     | `[build]`       | Page sources and output           |
//! | `on_demand` | `[on_demand]`   | Entry retention policy            |
//! | `serve`     | `[serve]`       | Development server                |

mod build;
mod on_demand;
mod serve;

pub use build::BuildConfig;
pub use on_demand::OnDemandConfig;
pub use serve::ServeConfig;
