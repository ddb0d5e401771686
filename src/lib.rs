//! Data-driven request-execution core for cloud-service SDKs.
//!
//! This crate turns a declarative service catalog plus user parameters
//! into signed, executed, retried, parsed, and paginated HTTP operations:
//!
//! - [`Registry`] — loads a JSON operation catalog once; immutable after
//! - [`Command`] — chainable request builder bound to one descriptor
//! - [`Executor`] — signs, dispatches, and retries with backoff
//! - [`ServiceResult`] — uniform nested-path access over parsed responses
//! - [`Waiter`] — polls a command until an acceptor declares an outcome
//! - [`Paginator`] — lazy element stream across result pages
//! - [`Client`] — composes all of the above for one service
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rs_cloud_runtime::{Client, ClientConfig, Credentials, StaticProvider};
//!
//! # async fn example(catalog_json: &str) -> rs_cloud_runtime::Result<()> {
//! let client = Client::from_catalog(
//!     catalog_json,
//!     Arc::new(StaticProvider::new(Credentials::new("access-key", "secret-key"))),
//!     ClientConfig::new("https://storage.us-east-1.example.com"),
//! )?;
//!
//! let mut command = client.get_command("CreateBucket", [])?;
//! command.set("BucketName", "my-bucket")?;
//! let result = client.execute(&mut command).await?;
//!
//! println!("request id: {:?}", result.get("RequestId"));
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod command;
pub mod config;
pub mod credential;
pub mod error;
pub mod executor;
pub mod paginator;
pub mod result;
pub mod transport;
pub mod waiter;

mod mapper;
mod sign;

pub use catalog::{
    Acceptor, DeclaredError, FieldSource, MatcherKind, OperationDescriptor, PaginationRule,
    ParamLocation, ParamSpec, ParamType, PayloadFormat, Registry, ResultShape, ServiceCatalog,
    WaitState, WaiterSpec,
};
pub use client::Client;
pub use command::{Command, CommandState};
pub use config::ClientConfig;
pub use credential::{
    ChainProvider, CredentialProvider, Credentials, EnvProvider, ProfileProvider, StaticProvider,
};
pub use error::{Result, SdkError};
pub use executor::Executor;
pub use paginator::Paginator;
pub use result::ServiceResult;
pub use transport::{BodyKind, HttpRequestSpec, HttpResponse, ReqwestTransport, Transport};
pub use waiter::Waiter;

// Compile-time assertions: key types must be Send + Sync for use across threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Client>;
    let _ = assert_send_sync::<SdkError>;
    let _ = assert_send_sync::<Credentials>;
    let _ = assert_send_sync::<Command>;
    let _ = assert_send_sync::<ServiceResult>;
};
