//! Data models for hitport.

mod export;
mod hit;

pub use export::{ExportJob, ExportStatus, UNVERIFIED_PREFIX};
pub use hit::{
    Hit, MAX_SCREEN_VALUES, ParseSessionError, RefScheme, ScreenSize, ScreenSizeError, SessionRef,
};
