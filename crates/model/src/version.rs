//! File format versions and version comparison.

/// Version written into detection logs; older logs are recomputed.
pub const DETECTION_LOG_VERSION: &str = "1.0.0";

/// Version written into raw signal files.
pub const RAW_SIGNAL_VERSION: &str = "1.0.0";

/// Version of the tracking algorithm, recorded in run metadata.
pub const TRACKING_VERSION: &str = "1.0.0";

/// Version written into motion scripts.
pub const SCRIPT_VERSION: &str = "1.0";

/// Compare dot-separated numeric versions, `"0.2.1" < "0.10.0"`.
///
/// A `_suffix` after the numeric part is ignored, missing components count as
/// zero, and non-numeric components compare as zero.
pub fn version_is_less_than(a: &str, b: &str) -> bool {
    let pa = version_parts(a);
    let pb = version_parts(b);
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let x = pa.get(i).copied().unwrap_or(0);
        let y = pb.get(i).copied().unwrap_or(0);
        if x != y {
            return x < y;
        }
    }
    false
}

fn version_parts(version: &str) -> Vec<u64> {
    let numeric = version.split('_').next().unwrap_or_default();
    numeric
        .split('.')
        .map(|part| part.trim().parse::<u64>().unwrap_or(0))
        .collect()
}
