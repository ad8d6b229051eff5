//! 远程 AI 服务客户端抽象：分析与生成两类调用。
//!
//! Remote AI service client surface.
//!
//! The orchestrator talks to the service only through [`RemoteAiClient`]; the reqwest adapter
//! lives in [`crate::transport::http`] and is assembled by [`HttpClientBuilder`].
//!
//! | Submodule | Role |
//! |-----------|------|
//! | `remote` | the `RemoteAiClient` trait |
//! | `validation` | payload and prompt pre-flight checks |
//! | `credentials` | bearer token providers |
//! | `builder` | `HttpClientBuilder` for the production adapter |

pub mod builder;
pub mod credentials;
pub mod remote;
pub mod validation;

pub use builder::HttpClientBuilder;
pub use credentials::{CredentialProvider, EnvCredential, StaticCredential};
pub use remote::RemoteAiClient;
