//! Mirror Job
//!
//! Defines the procedure that copies a container image from a public registry
//! into a private one, and executes it step by step against container tooling.

pub mod buildspec;
pub mod catalog;
pub mod definition;
pub mod docker;
pub mod error;
pub mod executor;
pub mod memory;
pub mod tooling;

pub use buildspec::BuildSpec;
pub use catalog::JobCatalog;
pub use definition::{MirrorJob, MirrorStep, RegistryCredentials};
pub use docker::DockerCli;
pub use error::MirrorError;
pub use executor::{ExecutionContext, MirrorExecutor, MirrorReport};
pub use memory::InMemoryRegistry;
pub use tooling::{ContainerTooling, Digest};
