#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
#[cfg(feature = "feed")]
pub mod feed;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
