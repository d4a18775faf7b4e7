//! HTTP adapters for the advertising platforms the harvester collects from.
//!
//! Every adapter implements [`PlatformAdapter`]; [`PlatformAdapters`] maps a
//! [`adharvest_core::Platform`] to its adapter at runtime.

mod adapter;
mod error;
mod google;
mod http;
mod meta;
mod naver;
mod types;

pub use adapter::{PlatformAdapter, PlatformAdapters};
pub use error::PlatformError;
pub use google::GoogleAdsAdapter;
pub use meta::MetaAdsAdapter;
pub use naver::NaverAdsAdapter;
pub use types::{AuthorizationRequest, CodeExchange, HttpSettings, PlatformCredential, TokenGrant};
