pub mod aggregate;
pub mod bus;
pub mod codec;
pub mod config;
pub mod device;
pub mod logging;
pub mod metrics;
pub mod platform;
pub mod query;
pub mod recorder;
pub mod registry;
pub mod service;
pub mod simulator;
pub mod source;
pub mod store;
pub mod telemetry;

pub use config::AppConfig;
pub use device::DeviceId;
pub use registry::RecorderRegistry;
pub use service::Service;
