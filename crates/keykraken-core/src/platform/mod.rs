//! Platform backends for [`crate::input::SystemInjector`]
//!
//! Each backend exposes the same free functions and shells out to the
//! platform's input tooling.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub mod fallback;

// Re-export the current platform
#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(target_os = "linux")]
pub use linux as current;

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub use fallback as current;
