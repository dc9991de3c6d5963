use std::mem;
use std::sync::Arc;

use basalt_buffer::{Buffer, BufferMut};
use basalt_error::{BasaltResult, BasaltUnwrap, basalt_bail};
use rustc_hash::FxHasher;

use crate::block::{Block, BlockRef};
use crate::builder::BlockBuilder;
use crate::checks::{check_readable_position, check_valid_positions, check_valid_region};
use crate::compact::{compact_nulls, compact_offsets};
use crate::status::BlockBuilderStatus;

/// Per-position bookkeeping: a 4-byte offset plus a null byte.
const PER_POSITION_OVERHEAD: usize = 5;

/// Variable-width values (strings, binary) in a shared byte arena addressed
/// by an offset vector: position `i` occupies bytes
/// `[offsets[i], offsets[i + 1])`. Offsets are absolute into the arena, so a
/// region view is a pure slice of the offset vector.
#[derive(Clone, Debug)]
pub struct VariableWidthBlock {
    bytes: Buffer<u8>,
    offsets: Buffer<i32>,
    nulls: Option<Buffer<bool>>,
}

impl VariableWidthBlock {
    pub fn try_new(
        bytes: Buffer<u8>,
        offsets: Buffer<i32>,
        nulls: Option<Buffer<bool>>,
    ) -> BasaltResult<Self> {
        if offsets.is_empty() {
            basalt_bail!("offsets must hold at least one entry");
        }
        let position_count = offsets.len() - 1;
        if let Some(nulls) = &nulls {
            if nulls.len() != position_count {
                basalt_bail!(
                    "null vector length {} does not match position count {}",
                    nulls.len(),
                    position_count
                );
            }
        }
        for i in 0..position_count {
            if offsets[i] > offsets[i + 1] {
                basalt_bail!(
                    DataIntegrity: "offsets must be monotonic: offsets[{}]={} > offsets[{}]={}",
                    i,
                    offsets[i],
                    i + 1,
                    offsets[i + 1]
                );
            }
            if nulls.as_ref().is_some_and(|n| n[i]) && offsets[i] != offsets[i + 1] {
                basalt_bail!(
                    DataIntegrity: "null position {} must be zero-width, got {} bytes",
                    i,
                    offsets[i + 1] - offsets[i]
                );
            }
        }
        if offsets[position_count] as usize > bytes.len() {
            basalt_bail!(
                "offsets end {} past byte arena of {} bytes",
                offsets[position_count],
                bytes.len()
            );
        }
        Ok(Self {
            bytes,
            offsets,
            nulls,
        })
    }

    pub fn from_strings<'a, I: IntoIterator<Item = Option<&'a str>>>(items: I) -> Self {
        let mut builder = VariableWidthBlockBuilder::new(None, 0, 0);
        for item in items {
            match item {
                Some(s) => builder.write_bytes(s.as_bytes()),
                None => builder.append_null(),
            }
        }
        let block = builder.build();
        block
            .as_any()
            .downcast_ref::<Self>()
            .cloned()
            // An all-null build collapses to RLE; rebuild plain for callers
            // that asked for this concrete representation.
            .unwrap_or_else(|| Self {
                bytes: Buffer::empty(),
                offsets: Buffer::full(0, block.position_count() + 1),
                nulls: Some(Buffer::full(true, block.position_count())),
            })
    }

    fn single_null() -> Self {
        Self {
            bytes: Buffer::empty(),
            offsets: Buffer::from_vec(vec![0, 0]),
            nulls: Some(Buffer::full(true, 1)),
        }
    }

    #[inline]
    fn value_range(&self, position: usize) -> (usize, usize) {
        check_readable_position(self.position_count(), position);
        (
            self.offsets[position] as usize,
            self.offsets[position + 1] as usize,
        )
    }

    fn bytes_in_region(&self, position: usize, length: usize) -> usize {
        (self.offsets[position + length] - self.offsets[position]) as usize
    }
}

impl Block for VariableWidthBlock {
    fn block_name(&self) -> &'static str {
        "VariableWidthBlock"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn size_in_bytes(&self) -> usize {
        self.bytes_in_region(0, self.position_count())
            + PER_POSITION_OVERHEAD * self.position_count()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.bytes.retained_size_in_bytes()
            + self.offsets.retained_size_in_bytes()
            + self.nulls.as_ref().map_or(0, Buffer::retained_size_in_bytes)
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> usize {
        check_valid_region(self.position_count(), position, length);
        self.bytes_in_region(position, length) + PER_POSITION_OVERHEAD * length
    }

    fn positions_size_in_bytes(&self, positions: &[bool], selected_count: usize) -> usize {
        check_valid_region(self.position_count(), 0, positions.len());
        let data_bytes: usize = positions
            .iter()
            .enumerate()
            .filter(|&(_, &used)| used)
            .map(|(p, _)| self.bytes_in_region(p, 1))
            .sum();
        data_bytes + PER_POSITION_OVERHEAD * selected_count
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> usize {
        if self.is_null(position) {
            0
        } else {
            self.bytes_in_region(position, 1)
        }
    }

    fn may_have_null(&self) -> bool {
        self.nulls.is_some()
    }

    fn is_null(&self, position: usize) -> bool {
        check_readable_position(self.position_count(), position);
        self.nulls.as_ref().is_some_and(|nulls| nulls[position])
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Buffer<u8> {
        let (start, end) = self.value_range(position);
        if offset + length > end - start {
            basalt_error::basalt_panic!(
                OutOfBounds: "slice [{}, {}+{}) out of range for {}-byte value",
                offset,
                offset,
                length,
                end - start
            );
        }
        self.bytes.slice(start + offset..start + offset + length)
    }

    fn get_slice_length(&self, position: usize) -> usize {
        let (start, end) = self.value_range(position);
        end - start
    }

    fn hash_position(&self, position: usize) -> u64 {
        use std::hash::{Hash, Hasher};
        let (start, end) = self.value_range(position);
        let mut hasher = FxHasher::default();
        self.bytes.as_slice()[start..end].hash(&mut hasher);
        hasher.finish()
    }

    fn positions_equal(&self, position: usize, other: &dyn Block, other_position: usize) -> bool {
        if self.is_null(position) || other.is_null(other_position) {
            return self.is_null(position) == other.is_null(other_position);
        }
        let length = self.get_slice_length(position);
        if length != other.get_slice_length(other_position) {
            return false;
        }
        self.get_slice(position, 0, length).as_slice()
            == other.get_slice(other_position, 0, length).as_slice()
    }

    fn get_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        Arc::new(Self {
            bytes: self.bytes.clone(),
            offsets: self.offsets.slice(position..position + length + 1),
            nulls: self
                .nulls
                .as_ref()
                .map(|nulls| nulls.slice(position..position + length)),
        })
    }

    fn copy_region(&self, position: usize, length: usize) -> BlockRef {
        check_valid_region(self.position_count(), position, length);
        let start = self.offsets[position] as usize;
        let byte_length = self.bytes_in_region(position, length);
        let bytes = if start == 0 && byte_length == self.bytes.len() && self.bytes.is_whole() {
            self.bytes.clone()
        } else {
            Buffer::copy_from(&self.bytes.as_slice()[start..start + byte_length])
        };
        Arc::new(Self {
            bytes,
            offsets: compact_offsets(&self.offsets, position, length),
            nulls: compact_nulls(self.nulls.as_ref(), position, length),
        })
    }

    fn copy_positions(&self, positions: &[usize]) -> BlockRef {
        check_valid_positions(positions, self.position_count());
        let mut bytes = BufferMut::empty();
        let mut offsets = BufferMut::with_capacity(positions.len() + 1);
        offsets.push(0i32);
        for &p in positions {
            let (start, end) = self.value_range(p);
            bytes.extend_from_slice(&self.bytes.as_slice()[start..end]);
            offsets.push(bytes.len() as i32);
        }
        let nulls = self
            .nulls
            .as_ref()
            .map(|nulls| positions.iter().map(|&p| nulls[p]).collect());
        Arc::new(Self {
            bytes: bytes.freeze(),
            offsets: offsets.freeze(),
            nulls,
        })
    }

    fn get_single_value_block(&self, position: usize) -> BlockRef {
        check_readable_position(self.position_count(), position);
        if self.is_null(position) {
            return Arc::new(Self::single_null());
        }
        let (start, end) = self.value_range(position);
        Arc::new(Self {
            bytes: Buffer::copy_from(&self.bytes.as_slice()[start..end]),
            offsets: Buffer::from_vec(vec![0, (end - start) as i32]),
            nulls: self.nulls.as_ref().map(|_| Buffer::full(false, 1)),
        })
    }

    fn loaded_block(self: Arc<Self>) -> BlockRef {
        self
    }
}

/// Builder for [`VariableWidthBlock`].
#[derive(Debug)]
pub struct VariableWidthBlockBuilder {
    status: Option<BlockBuilderStatus>,
    bytes: BufferMut<u8>,
    offsets: BufferMut<i32>,
    nulls: BufferMut<bool>,
    has_null_value: bool,
    has_non_null_value: bool,
}

impl VariableWidthBlockBuilder {
    pub fn new(
        status: Option<BlockBuilderStatus>,
        expected_entries: usize,
        expected_bytes: usize,
    ) -> Self {
        let mut offsets = BufferMut::with_capacity(expected_entries + 1);
        offsets.push(0i32);
        Self {
            status,
            bytes: BufferMut::with_capacity(expected_bytes),
            offsets,
            nulls: BufferMut::with_capacity(expected_entries),
            has_null_value: false,
            has_non_null_value: false,
        }
    }

    fn report_bytes(&mut self, data_bytes: usize) {
        if let Some(status) = &mut self.status {
            status.add_bytes(data_bytes + PER_POSITION_OVERHEAD);
        }
    }
}

impl BlockBuilder for VariableWidthBlockBuilder {
    fn builder_name(&self) -> &'static str {
        "VariableWidthBlockBuilder"
    }

    fn position_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn size_in_bytes(&self) -> usize {
        self.bytes.len() + PER_POSITION_OVERHEAD * self.position_count()
    }

    fn retained_size_in_bytes(&self) -> usize {
        size_of::<Self>()
            + self.bytes.capacity()
            + self.offsets.capacity() * size_of::<i32>()
            + self.nulls.capacity()
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
        self.offsets.push(self.bytes.len() as i32);
        self.nulls.push(false);
        self.has_non_null_value = true;
        self.report_bytes(bytes.len());
    }

    fn append_null(&mut self) {
        self.offsets.push(self.bytes.len() as i32);
        self.nulls.push(true);
        self.has_null_value = true;
        self.report_bytes(0);
    }

    fn build(&mut self) -> BlockRef {
        let position_count = self.position_count();
        let bytes = mem::take(&mut self.bytes).freeze();
        let offsets = mem::take(&mut self.offsets).freeze();
        let nulls = mem::take(&mut self.nulls).freeze();
        self.offsets.push(0i32);

        let block: BlockRef = if !self.has_non_null_value && position_count > 0 {
            Arc::new(
                crate::blocks::RunLengthEncodedBlock::try_new(
                    Arc::new(VariableWidthBlock::single_null()),
                    position_count,
                )
                .basalt_unwrap(),
            )
        } else {
            Arc::new(VariableWidthBlock {
                bytes,
                offsets,
                nulls: self.has_null_value.then_some(nulls),
            })
        };
        self.has_null_value = false;
        self.has_non_null_value = false;
        block
    }

    fn new_block_builder_like(&self, status: Option<BlockBuilderStatus>) -> Box<dyn BlockBuilder> {
        Box::new(Self::new(status, self.nulls.capacity(), self.bytes.capacity()))
    }
}

#[cfg(test)]
mod tests {
    use basalt_buffer::Buffer;

    use crate::blocks::{VariableWidthBlock, VariableWidthBlockBuilder};
    use crate::{Block, BlockBuilder};

    fn sample() -> VariableWidthBlock {
        VariableWidthBlock::from_strings([Some("alpha"), Some(""), None, Some("delta")])
    }

    #[test]
    fn round_trip_with_empty_and_null() {
        let block = sample();
        assert_eq!(block.position_count(), 4);
        assert_eq!(block.get_slice(0, 0, 5).as_slice(), b"alpha");
        assert_eq!(block.get_slice_length(1), 0);
        assert!(block.is_null(2));
        assert_eq!(block.get_slice(3, 1, 3).as_slice(), b"elt");
        assert_eq!(block.estimated_data_size_for_stats(2), 0);
        assert_eq!(block.estimated_data_size_for_stats(3), 5);
    }

    #[test]
    fn region_shares_arena_copy_region_compacts() {
        let block = sample();
        let region = block.get_region(1, 3);
        assert_eq!(region.position_count(), 3);
        assert_eq!(region.get_slice(2, 0, 5).as_slice(), b"delta");

        let copied = block.copy_region(3, 1);
        let copied = copied
            .as_any()
            .downcast_ref::<VariableWidthBlock>()
            .unwrap();
        assert_eq!(copied.size_in_bytes(), 5 + 5);
        assert_eq!(copied.get_slice(0, 0, 5).as_slice(), b"delta");
    }

    #[test]
    fn copy_positions_reorders() {
        let block = sample();
        let copied = block.copy_positions(&[3, 0]);
        assert_eq!(copied.get_slice(0, 0, 5).as_slice(), b"delta");
        assert_eq!(copied.get_slice(1, 0, 5).as_slice(), b"alpha");
    }

    #[test]
    fn monotonic_offsets_enforced() {
        let err = VariableWidthBlock::try_new(
            Buffer::from_vec(b"abc".to_vec()),
            Buffer::from_vec(vec![0, 2, 1]),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("monotonic"));
    }

    #[test]
    fn null_positions_must_be_zero_width() {
        let err = VariableWidthBlock::try_new(
            Buffer::from_vec(b"abc".to_vec()),
            Buffer::from_vec(vec![0, 2]),
            Some(Buffer::from_vec(vec![true])),
        )
        .unwrap_err();
        assert!(err.to_string().contains("zero-width"));
    }

    #[test]
    fn positions_equal_compares_bytes() {
        let a = sample();
        let b = VariableWidthBlock::from_strings([Some("delta")]);
        assert!(a.positions_equal(3, &b, 0));
        assert!(!a.positions_equal(0, &b, 0));
    }

    #[test]
    fn builder_reports_size() {
        let mut builder = VariableWidthBlockBuilder::new(None, 2, 16);
        builder.write_bytes(b"xy");
        builder.append_null();
        assert_eq!(builder.size_in_bytes(), 2 + 5 * 2);
    }
}
