//! Gateway module - the generation pipeline and its HTTP surface.
//!
//! This module provides an OpenAI-compatible gateway with:
//! - Region-aware session handling and object-store request signing
//! - The upload → draft → poll generation pipeline
//! - Image, video and chat endpoints plus session provisioning

pub mod credit;
pub mod draft;
pub mod generator;
pub mod handlers;
pub mod image_input;
pub mod messages;
pub mod middleware;
pub mod poller;
pub mod region;
pub mod server;
pub mod session;
pub mod signer;
pub mod token_pool;
pub mod uploader;
pub mod upstream;

// Re-export core types
pub use generator::Generator;
pub use poller::{PollingStatus, SmartPoller};
pub use region::{RegionInfo, SessionToken};
pub use server::{build_router, AppState};
pub use session::SessionProvider;
pub use token_pool::TokenPool;
pub use upstream::UpstreamClient;
