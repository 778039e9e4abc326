//! Network and disk effects.
//!
//! [`Downloader`] drives the whole pipeline; the transfer loop and the
//! in-process key registry are private helpers.

mod downloader;
mod http;
mod in_flight;
mod resumable;

pub use downloader::{Downloader, FetchOutcome};
pub use http::{BoxStream, HttpClient, HttpResponse};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
