pub mod record;
pub mod push;
pub mod sink;
pub mod loki;
pub mod shipper;
pub mod adapter;

pub mod caller;
pub mod store;
pub mod request;

pub mod encoder;
pub mod logger;
pub mod config;
pub mod env;
pub mod noop_sink;

pub use logger::{Logger, LoggerConfig, RemoteConfig};
pub use record::{LogRecord, Severity};
pub use shipper::{RemoteShipper, ShipperConfig};
pub use store::{RequestContext, RequestLogStore};
