use fc_runtime::{AllocationError, DeviceBuffer, ExecutionContext, MemoryResource};
use serde::{Deserialize, Serialize};

/// Packed per-row validity bits (LSB first, `true` = valid) with a cached
/// null count.
#[derive(Debug)]
pub struct ValidityMask {
    bits: DeviceBuffer,
    len: usize,
    null_count: usize,
}

fn byte_len(len: usize) -> usize {
    len.div_ceil(8)
}

fn fill_bytes(bits: &mut [u8], len: usize, valid: bool) {
    if valid {
        bits.fill(u8::MAX);
        let remainder = len % 8;
        if remainder > 0 {
            if let Some(last) = bits.last_mut() {
                *last = (1_u8 << remainder) - 1;
            }
        }
    } else {
        bits.fill(0);
    }
}

impl ValidityMask {
    #[must_use]
    pub fn all_valid(len: usize) -> Self {
        let mut bits = vec![0_u8; byte_len(len)];
        fill_bytes(&mut bits, len, true);
        Self {
            bits: DeviceBuffer::from_vec(bits),
            len,
            null_count: 0,
        }
    }

    #[must_use]
    pub fn all_invalid(len: usize) -> Self {
        Self {
            bits: DeviceBuffer::from_vec(vec![0_u8; byte_len(len)]),
            len,
            null_count: len,
        }
    }

    #[must_use]
    pub fn from_bools(values: &[bool]) -> Self {
        let mut mask = Self::all_invalid(values.len());
        for (idx, valid) in values.iter().enumerate() {
            mask.set(idx, *valid);
        }
        mask
    }

    /// Allocate a uniformly valid or invalid mask from `resource`.
    pub fn new_in(
        len: usize,
        valid: bool,
        resource: &dyn MemoryResource,
    ) -> Result<Self, AllocationError> {
        let mut bits = resource.allocate(byte_len(len))?;
        fill_bytes(&mut bits, len, valid);
        Ok(Self {
            bits,
            len,
            null_count: if valid { 0 } else { len },
        })
    }

    /// Build a mask whose bit `i` is `valid(i)`, evaluating rows through the
    /// context's executor. Each output byte is written by exactly one task.
    pub fn from_fn_in<F>(len: usize, ctx: &ExecutionContext, valid: F) -> Result<Self, AllocationError>
    where
        F: Fn(usize) -> bool + Send + Sync,
    {
        let mut bits = ctx.allocate(byte_len(len))?;
        ctx.executor().for_each_row_mut(&mut bits, 1, |byte_idx, slot| {
            let start = byte_idx * 8;
            let end = (start + 8).min(len);
            let mut byte = 0_u8;
            for row in start..end {
                if valid(row) {
                    byte |= 1_u8 << (row - start);
                }
            }
            slot[0] = byte;
        });
        let valid_count: usize = bits.iter().map(|b| b.count_ones() as usize).sum();
        Ok(Self {
            bits,
            len,
            null_count: len - valid_count,
        })
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.bits[idx / 8] >> (idx % 8)) & 1 == 1
    }

    /// Mutate one bit; only meaningful while the mask is still being built.
    pub fn set(&mut self, idx: usize, value: bool) {
        if idx >= self.len || self.get(idx) == value {
            return;
        }
        let bit = 1_u8 << (idx % 8);
        if value {
            self.bits[idx / 8] |= bit;
            self.null_count -= 1;
        } else {
            self.bits[idx / 8] &= !bit;
            self.null_count += 1;
        }
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.null_count
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.len - self.null_count
    }

    /// Nulls among rows `start..start + len`, clamped to the mask length.
    #[must_use]
    pub fn count_nulls_in(&self, start: usize, len: usize) -> usize {
        if start == 0 && len >= self.len {
            return self.null_count;
        }
        let end = start.saturating_add(len).min(self.len);
        (start.min(end)..end).filter(|idx| !self.get(*idx)).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }
}

impl Clone for ValidityMask {
    fn clone(&self) -> Self {
        Self {
            bits: DeviceBuffer::from_vec(self.bits.to_vec()),
            len: self.len,
            null_count: self.null_count,
        }
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Eq for ValidityMask {}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("ValidityMask", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ValidityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Self::from_bools(&raw.bits))
    }
}

#[cfg(test)]
mod tests {
    use fc_runtime::{BoundedResource, ExecutionContext, Executor, MemoryResource};

    use super::ValidityMask;

    #[test]
    fn from_bools_packs_correctly() {
        let mask = ValidityMask::from_bools(&[true, false, true]);
        assert_eq!(mask.len(), 3);
        assert!(mask.get(0));
        assert!(!mask.get(1));
        assert!(mask.get(2));
        assert_eq!(mask.null_count(), 1);
        assert_eq!(mask.count_valid(), 2);
    }

    #[test]
    fn all_valid_and_all_invalid() {
        let valid = ValidityMask::all_valid(100);
        assert_eq!(valid.null_count(), 0);
        assert!((0..100).all(|i| valid.get(i)));
        assert_eq!(valid.as_bytes().len(), 13);
        assert_eq!(valid.as_bytes()[12], 0b0000_1111);

        let invalid = ValidityMask::all_invalid(100);
        assert_eq!(invalid.null_count(), 100);
        assert!((0..100).all(|i| !invalid.get(i)));
    }

    #[test]
    fn set_maintains_null_count() {
        let mut mask = ValidityMask::all_invalid(16);
        mask.set(0, true);
        mask.set(7, true);
        mask.set(8, true);
        mask.set(15, true);
        assert_eq!(mask.null_count(), 12);

        mask.set(7, true);
        assert_eq!(mask.null_count(), 12, "re-setting a bit is a no-op");

        mask.set(7, false);
        assert!(!mask.get(7));
        assert_eq!(mask.null_count(), 13);
    }

    #[test]
    fn out_of_range_access_is_inert() {
        let mut mask = ValidityMask::all_valid(3);
        assert!(!mask.get(3));
        mask.set(10, false);
        assert_eq!(mask.null_count(), 0);
    }

    #[test]
    fn count_nulls_in_respects_range() {
        let mask = ValidityMask::from_bools(&[false, true, true, true, false]);
        assert_eq!(mask.count_nulls_in(0, 5), 2);
        assert_eq!(mask.count_nulls_in(1, 3), 0);
        assert_eq!(mask.count_nulls_in(3, 10), 1);
        assert_eq!(mask.count_nulls_in(9, 2), 0);
    }

    #[test]
    fn from_fn_in_matches_between_executors() {
        let rule = |row: usize| row % 3 != 0;
        let seq = ValidityMask::from_fn_in(1_000, &ExecutionContext::sequential(), rule)
            .expect("alloc");
        let par_ctx = ExecutionContext::sequential().with_executor(Executor::Parallel { min_rows: 1 });
        let par = ValidityMask::from_fn_in(1_000, &par_ctx, rule).expect("alloc");
        assert_eq!(seq, par);
        assert_eq!(seq.null_count(), 334);
        assert_eq!(seq.bits().filter(|b| !b).count(), seq.null_count());
    }

    #[test]
    fn new_in_draws_from_resource() {
        let resource = BoundedResource::new(2);
        let mask = ValidityMask::new_in(16, false, &resource).expect("fits");
        assert_eq!(mask.null_count(), 16);
        assert_eq!(resource.bytes_in_use(), 2);
        assert!(ValidityMask::new_in(1, true, &resource).is_err());
        drop(mask);
        assert_eq!(resource.bytes_in_use(), 0);
    }

    #[test]
    fn boundary_65_elements() {
        let mut bools = vec![true; 65];
        bools[64] = false;
        let mask = ValidityMask::from_bools(&bools);
        assert_eq!(mask.null_count(), 1);
        assert!(mask.get(63));
        assert!(!mask.get(64));
    }

    #[test]
    fn serde_round_trip() {
        let mask = ValidityMask::from_bools(&[true, false, true]);
        let json = serde_json::to_string(&mask).expect("serialize");
        assert_eq!(json, r#"{"bits":[true,false,true]}"#);
        let back: ValidityMask = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(mask, back);
        assert_eq!(back.null_count(), 1);
    }

    #[test]
    fn empty_mask() {
        let mask = ValidityMask::from_bools(&[]);
        assert!(mask.is_empty());
        assert_eq!(mask.null_count(), 0);
        assert_eq!(mask.bits().count(), 0);
    }
}
