pub mod error;
pub mod source;
pub mod types;

pub use error::{Error, Result};
pub use source::{FetchOutput, GitRepo, RemoteFetcher, RevisionSource};
pub use types::*;
