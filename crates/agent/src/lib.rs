//! `carspeed-agent` library: configuration loading and the processing
//! pipeline that turns raw speed readings into severity states, driver
//! alerts and CSV log rows.

pub mod config;
pub mod pipeline;

pub use config::AppConfig;
pub use pipeline::Pipeline;
