//! Process-wide knobs read once from the environment.

use std::env;
use std::sync::OnceLock;

/// Local workgroup size used by GPU executors unless overridden explicitly.
pub const DEFAULT_GPU_LOCAL_SIZE: usize = 64;

static GPU_LOCAL_SIZE: OnceLock<usize> = OnceLock::new();

fn parse_positive(value: &str) -> Option<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(size) => Some(size),
    }
}

/// Reads `LINEXEC_GPU_LOCAL_SIZE`, falling back to [`DEFAULT_GPU_LOCAL_SIZE`] when it is unset or
/// not a positive integer.
pub fn gpu_local_size() -> usize {
    *GPU_LOCAL_SIZE.get_or_init(|| match env::var("LINEXEC_GPU_LOCAL_SIZE") {
        Ok(value) if !value.trim().is_empty() => match parse_positive(&value) {
            Some(size) => size,
            None => {
                log::warn!(
                    "ignoring LINEXEC_GPU_LOCAL_SIZE={value:?}; using {DEFAULT_GPU_LOCAL_SIZE}"
                );
                DEFAULT_GPU_LOCAL_SIZE
            }
        },
        _ => DEFAULT_GPU_LOCAL_SIZE,
    })
}
