pub mod severity;
pub mod value;
pub mod record;
pub mod client;
pub mod handler;
pub mod layer;

#[cfg(feature = "cloud")]
pub mod auth;
#[cfg(feature = "cloud")]
pub mod cloud;

pub mod env;
pub mod init;
pub mod memory;

pub use client::{ClientError, Entry, LogClient, LogStream, Payload};
pub use handler::{CloudLogHandler, HandleError, Handler, HandlerOptions};
pub use layer::CloudLogLayer;
pub use record::Record;
pub use severity::Severity;
pub use value::{Attr, Value};
