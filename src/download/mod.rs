//! Support for downloading the sandbox engine and base filesystem image

mod client;

pub use client::*;

pub(crate) use client::copy_download;
