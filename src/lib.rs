//! Decide which localized version of a site a visitor should see, and whether
//! to offer a switch when that guess may be wrong.

pub mod config;
pub mod error;
pub mod i18n;
pub mod location;
pub mod navigation;
pub mod recommender;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod storage;
