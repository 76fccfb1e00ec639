pub mod file_format;
pub mod file_utils;
pub mod log_setup;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}
