//! Offset-vector helpers shared by the nested block family.

use basalt_buffer::Buffer;
use basalt_error::{BasaltResult, basalt_bail};

/// Per-position bookkeeping of a nested block: a 4-byte offset plus a null
/// byte.
pub(crate) const PER_POSITION_OVERHEAD: usize = 5;

/// Validate an offset vector over a flat child block: non-empty, monotonic,
/// null positions zero-width, end within the child.
pub(crate) fn check_offsets(
    name: &str,
    offsets: &Buffer<i32>,
    nulls: Option<&Buffer<bool>>,
    child_count: usize,
) -> BasaltResult<()> {
    if offsets.is_empty() {
        basalt_bail!("{} offsets must hold at least one entry", name);
    }
    let position_count = offsets.len() - 1;
    if let Some(nulls) = nulls {
        if nulls.len() != position_count {
            basalt_bail!(
                "{} null vector length {} does not match position count {}",
                name,
                nulls.len(),
                position_count
            );
        }
    }
    if offsets[0] < 0 {
        basalt_bail!(DataIntegrity: "{} offsets start below zero: {}", name, offsets[0]);
    }
    for i in 0..position_count {
        if offsets[i] > offsets[i + 1] {
            basalt_bail!(
                DataIntegrity: "{} offsets must be monotonic: offsets[{}]={} > offsets[{}]={}",
                name,
                i,
                offsets[i],
                i + 1,
                offsets[i + 1]
            );
        }
        if nulls.is_some_and(|n| n[i]) && offsets[i] != offsets[i + 1] {
            basalt_bail!(
                DataIntegrity: "{} null position {} must be zero-width, got {} entries",
                name,
                i,
                offsets[i + 1] - offsets[i]
            );
        }
    }
    if offsets[position_count] as usize > child_count {
        basalt_bail!(
            "{} offsets end {} past child block of {} positions",
            name,
            offsets[position_count],
            child_count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use basalt_buffer::Buffer;

    use super::check_offsets;

    #[test]
    fn valid_offsets_pass() {
        let offsets = Buffer::from_vec(vec![0, 2, 2, 5]);
        let nulls = Buffer::from_vec(vec![false, true, false]);
        assert!(check_offsets("array", &offsets, Some(&nulls), 5).is_ok());
    }

    #[test]
    fn non_monotonic_rejected() {
        let offsets = Buffer::from_vec(vec![0, 3, 2]);
        let err = check_offsets("array", &offsets, None, 5).unwrap_err();
        assert!(err.to_string().contains("monotonic"));
    }

    #[test]
    fn overrun_rejected() {
        let offsets = Buffer::from_vec(vec![0, 4]);
        assert!(check_offsets("map", &offsets, None, 3).is_err());
    }
}
