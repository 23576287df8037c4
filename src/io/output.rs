use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Serialize `value` as pretty JSON and write it atomically.
///
/// Output is deterministic for equal values, so re-writing the same data
/// yields byte-identical files.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::MalformedPayload(format!("cannot serialize: {}", e)))?;
    write_atomic(path, json.as_bytes())
}

/// Write through a sibling temp file so readers never see partial content
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::persistence(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(|e| PipelineError::persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| PipelineError::persistence(path, e))?;
    debug!("Wrote {:?} ({} bytes)", path, bytes.len());
    Ok(())
}

/// Format seconds as MM:SS.s
pub fn format_timestamp(seconds: f64) -> String {
    let tenths = (seconds.max(0.0) * 10.0).round() as u64;
    let minutes = tenths / 600;
    let secs = (tenths % 600) / 10;
    format!("{:02}:{:02}.{}", minutes, secs, tenths % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00.0");
        assert_eq!(format_timestamp(1.5), "00:01.5");
        assert_eq!(format_timestamp(65.0), "01:05.0");
        assert_eq!(format_timestamp(3661.5), "61:01.5");
    }

    #[test]
    fn test_write_json_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_json(&path, &vec![1.5f64, 2.0]).unwrap();
        let first = fs::read(&path).unwrap();
        write_json(&path, &vec![1.5f64, 2.0]).unwrap();

        assert_eq!(fs::read(&path).unwrap(), first);
        assert_eq!(String::from_utf8(first).unwrap(), "[\n  1.5,\n  2.0\n]");
    }
}
