//! berth-runtime — the container runtime capability.
//!
//! Tenant containers are created and controlled through the
//! [`ContainerRuntime`] trait so orchestration logic never shells out
//! directly. Two implementations ship:
//!
//! - **`docker`**: [`DockerCli`], drives the `docker` command-line client
//!   with a bounded timeout on every invocation
//! - **`fake`**: [`FakeRuntime`], an in-memory table with call recording
//!   and failure injection, for tests

pub mod docker;
pub mod error;
pub mod fake;
pub mod traits;
pub mod types;

pub use docker::DockerCli;
pub use error::{RuntimeError, RuntimeResult};
pub use fake::{FakeContainer, FakeRuntime, Op};
pub use traits::ContainerRuntime;
pub use types::*;
