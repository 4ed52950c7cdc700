use std::ops::Range;
use std::sync::Arc;

use fc_runtime::{DeviceBuffer, ExecutionContext};
use fc_types::{DType, FixedWidth, Layout, Scalar, TypeError};

use crate::ColumnError;
use crate::validity::ValidityMask;

/// Byte width of one entry in a string column's offsets buffer.
pub const OFFSET_WIDTH: usize = 4;

/// Physical buffers behind a column. Buffers are shared between a column
/// and every view sliced from it.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Fixed {
        values: Arc<DeviceBuffer>,
    },
    /// `offsets` holds `rows + 1` little-endian `i32` entries delimiting each
    /// row's bytes in `chars`.
    Strings {
        offsets: Arc<DeviceBuffer>,
        chars: Arc<DeviceBuffer>,
    },
}

fn read_offset(offsets: &[u8], idx: usize) -> usize {
    let start = idx * OFFSET_WIDTH;
    i32::read_le(&offsets[start..start + OFFSET_WIDTH]) as usize
}

fn checked_offset(bytes: usize) -> Result<i32, ColumnError> {
    i32::try_from(bytes).map_err(|_| ColumnError::SizeOverflow { bytes })
}

/// Encode a prefix-sum sequence into an offsets buffer drawn from `ctx`.
pub fn encode_offsets(offsets: &[usize], ctx: &ExecutionContext) -> Result<DeviceBuffer, ColumnError> {
    if let Some(last) = offsets.last() {
        checked_offset(*last)?;
    }
    let mut buf = ctx.allocate(offsets.len() * OFFSET_WIDTH)?;
    ctx.executor()
        .for_each_row_mut(&mut buf, OFFSET_WIDTH, |idx, slot| {
            // Bounded by the check on the final (largest) offset above.
            (offsets[idx] as i32).write_le(slot);
        });
    Ok(buf)
}

fn offsets_to_bytes(offsets: &[usize]) -> Result<Vec<u8>, ColumnError> {
    let mut out = vec![0_u8; offsets.len() * OFFSET_WIDTH];
    for (slot, offset) in out.chunks_exact_mut(OFFSET_WIDTH).zip(offsets) {
        checked_offset(*offset)?.write_le(slot);
    }
    Ok(out)
}

fn check_validity_len(rows: usize, validity: Option<&[bool]>) -> Result<(), ColumnError> {
    match validity {
        Some(bits) if bits.len() != rows => Err(ColumnError::LengthMismatch {
            left: rows,
            right: bits.len(),
        }),
        _ => Ok(()),
    }
}

/// Owned column produced by an operator or a constructor.
#[derive(Debug)]
pub struct Column {
    dtype: DType,
    len: usize,
    data: ColumnData,
    validity: Option<Arc<ValidityMask>>,
}

impl Column {
    /// Assemble a column from already-built buffers, checking that they are
    /// large enough for `len` rows of `dtype`.
    pub fn from_parts(
        dtype: DType,
        len: usize,
        data: ColumnData,
        validity: Option<ValidityMask>,
    ) -> Result<Self, ColumnError> {
        match (dtype.layout(), &data) {
            (Layout::FixedWidth { width }, ColumnData::Fixed { values }) => {
                if values.len() < len * width {
                    return Err(ColumnError::StorageMismatch { dtype });
                }
            }
            (Layout::VariableLength, ColumnData::Strings { offsets, chars }) => {
                if offsets.len() != (len + 1) * OFFSET_WIDTH {
                    return Err(ColumnError::StorageMismatch { dtype });
                }
                let monotone = (0..len).all(|i| read_offset(offsets, i) <= read_offset(offsets, i + 1));
                if !monotone || read_offset(offsets, len) > chars.len() {
                    return Err(ColumnError::StorageMismatch { dtype });
                }
            }
            _ => return Err(ColumnError::StorageMismatch { dtype }),
        }
        if let Some(mask) = &validity {
            if mask.len() < len {
                return Err(ColumnError::LengthMismatch {
                    left: len,
                    right: mask.len(),
                });
            }
        }
        Ok(Self {
            dtype,
            len,
            data,
            validity: validity.map(Arc::new),
        })
    }

    /// Fixed-width column from native values; `validity[i] == false` marks
    /// row `i` null.
    pub fn from_fixed<T: FixedWidth>(
        dtype: DType,
        values: &[T],
        validity: Option<&[bool]>,
    ) -> Result<Self, ColumnError> {
        if dtype.native() != Some(T::NATIVE) {
            return Err(TypeError::NativeMismatch {
                dtype,
                native: T::NATIVE,
            }
            .into());
        }
        check_validity_len(values.len(), validity)?;
        let width = T::NATIVE.width();
        let mut bytes = vec![0_u8; values.len() * width];
        for (slot, value) in bytes.chunks_exact_mut(width).zip(values) {
            value.write_le(slot);
        }
        Self::from_parts(
            dtype,
            values.len(),
            ColumnData::Fixed {
                values: Arc::new(DeviceBuffer::from_vec(bytes)),
            },
            validity.map(ValidityMask::from_bools),
        )
    }

    /// String column; rows marked null get an empty byte span.
    pub fn from_strings(values: &[&str], validity: Option<&[bool]>) -> Result<Self, ColumnError> {
        check_validity_len(values.len(), validity)?;
        let rows: Vec<Option<&str>> = values
            .iter()
            .enumerate()
            .map(|(idx, value)| match validity {
                Some(bits) if !bits[idx] => None,
                _ => Some(*value),
            })
            .collect();
        let mut column = Self::from_optional_strings(&rows)?;
        if validity.is_some() && column.validity.is_none() {
            column.validity = Some(Arc::new(ValidityMask::all_valid(values.len())));
        }
        Ok(column)
    }

    pub fn from_optional_strings(values: &[Option<&str>]) -> Result<Self, ColumnError> {
        let mut offsets = Vec::with_capacity(values.len() + 1);
        let mut chars = Vec::new();
        offsets.push(0);
        for value in values {
            if let Some(value) = value {
                chars.extend_from_slice(value.as_bytes());
            }
            offsets.push(chars.len());
        }
        let validity = values
            .iter()
            .any(Option::is_none)
            .then(|| ValidityMask::from_bools(&values.iter().map(Option::is_some).collect::<Vec<_>>()));
        Self::from_parts(
            DType::Utf8,
            values.len(),
            ColumnData::Strings {
                offsets: Arc::new(DeviceBuffer::from_vec(offsets_to_bytes(&offsets)?)),
                chars: Arc::new(DeviceBuffer::from_vec(chars)),
            },
            validity,
        )
    }

    /// Column of `dtype` holding each scalar's value and validity.
    pub fn from_scalars(dtype: DType, values: &[Scalar]) -> Result<Self, ColumnError> {
        if let Some(mismatch) = values.iter().find(|value| value.dtype() != dtype) {
            return Err(ColumnError::ScalarTypeMismatch {
                expected: dtype,
                actual: mismatch.dtype(),
            });
        }
        let validity = values
            .iter()
            .any(|value| !value.is_valid())
            .then(|| ValidityMask::from_bools(&values.iter().map(Scalar::is_valid).collect::<Vec<_>>()));
        match dtype.layout() {
            Layout::FixedWidth { width } => {
                let mut bytes = vec![0_u8; values.len() * width];
                for (slot, value) in bytes.chunks_exact_mut(width).zip(values) {
                    let payload = value.payload();
                    let n = payload.len().min(width);
                    slot[..n].copy_from_slice(&payload[..n]);
                }
                Self::from_parts(
                    dtype,
                    values.len(),
                    ColumnData::Fixed {
                        values: Arc::new(DeviceBuffer::from_vec(bytes)),
                    },
                    validity,
                )
            }
            Layout::VariableLength => {
                let rows = values
                    .iter()
                    .map(Scalar::as_str)
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_optional_strings(&rows)
            }
        }
    }

    #[must_use]
    pub fn empty(dtype: DType) -> Self {
        let data = match dtype.layout() {
            Layout::FixedWidth { .. } => ColumnData::Fixed {
                values: Arc::new(DeviceBuffer::from_vec(Vec::new())),
            },
            Layout::VariableLength => ColumnData::Strings {
                offsets: Arc::new(DeviceBuffer::from_vec(vec![0_u8; OFFSET_WIDTH])),
                chars: Arc::new(DeviceBuffer::from_vec(Vec::new())),
            },
        };
        Self {
            dtype,
            len: 0,
            data,
            validity: None,
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
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
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    #[must_use]
    pub fn validity(&self) -> Option<&ValidityMask> {
        self.validity.as_deref()
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.validity
            .as_ref()
            .map_or(0, |mask| mask.count_nulls_in(0, self.len))
    }

    #[must_use]
    pub fn has_nulls(&self) -> bool {
        self.null_count() > 0
    }

    /// Read-only view over the whole column, sharing its buffers.
    #[must_use]
    pub fn view(&self) -> ColumnView {
        ColumnView {
            dtype: self.dtype,
            offset: 0,
            len: self.len,
            data: self.data.clone(),
            validity: self.validity.clone(),
        }
    }

    #[must_use]
    pub fn into_view(self) -> ColumnView {
        ColumnView {
            dtype: self.dtype,
            offset: 0,
            len: self.len,
            data: self.data,
            validity: self.validity,
        }
    }

    #[must_use]
    pub fn value_eq(&self, other: &Self) -> bool {
        self.view().value_eq(&other.view())
    }
}

/// Zero-copy window over a column's buffers: rows
/// `offset..offset + len` of the underlying storage.
#[derive(Debug, Clone)]
pub struct ColumnView {
    dtype: DType,
    offset: usize,
    len: usize,
    data: ColumnData,
    validity: Option<Arc<ValidityMask>>,
}

impl ColumnView {
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Row offset into the shared buffers.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn has_validity(&self) -> bool {
        self.validity.is_some()
    }

    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        row < self.len
            && self
                .validity
                .as_ref()
                .is_none_or(|mask| mask.get(self.offset + row))
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        self.validity
            .as_ref()
            .map_or(0, |mask| mask.count_nulls_in(self.offset, self.len))
    }

    /// Sub-view of rows `start..start + len`, relative to this view.
    pub fn slice(&self, start: usize, len: usize) -> Result<Self, ColumnError> {
        let end = start.checked_add(len).filter(|end| *end <= self.len).ok_or(
            ColumnError::SliceOutOfBounds {
                start,
                end: start.saturating_add(len),
                len: self.len,
            },
        )?;
        Ok(Self {
            dtype: self.dtype,
            offset: self.offset + start,
            len: end - start,
            data: self.data.clone(),
            validity: self.validity.clone(),
        })
    }

    /// Raw bytes of fixed-width row `row`, whether or not the row is valid.
    #[must_use]
    pub fn fixed_bytes(&self, row: usize) -> Option<&[u8]> {
        let (ColumnData::Fixed { values }, Some(width)) = (&self.data, self.dtype.width()) else {
            return None;
        };
        if row >= self.len {
            return None;
        }
        let start = (self.offset + row) * width;
        values.get(start..start + width)
    }

    /// Typed value of `row`; `None` when the row is null.
    pub fn value<T: FixedWidth>(&self, row: usize) -> Result<Option<T>, ColumnError> {
        if self.dtype.native() != Some(T::NATIVE) {
            return Err(TypeError::NativeMismatch {
                dtype: self.dtype,
                native: T::NATIVE,
            }
            .into());
        }
        let bytes = self.fixed_bytes(row).ok_or(ColumnError::RowOutOfBounds {
            row,
            len: self.len,
        })?;
        Ok(self.is_valid(row).then(|| T::read_le(bytes)))
    }

    pub fn values<T: FixedWidth>(&self) -> Result<Vec<Option<T>>, ColumnError> {
        (0..self.len).map(|row| self.value::<T>(row)).collect()
    }

    /// Physical byte range of string row `row` inside the shared chars buffer.
    #[must_use]
    pub fn string_span(&self, row: usize) -> Option<Range<usize>> {
        let ColumnData::Strings { offsets, .. } = &self.data else {
            return None;
        };
        if row >= self.len {
            return None;
        }
        let physical = self.offset + row;
        Some(read_offset(offsets, physical)..read_offset(offsets, physical + 1))
    }

    /// Byte length of string row `row`; null rows count as empty.
    #[must_use]
    pub fn string_len(&self, row: usize) -> usize {
        if !self.is_valid(row) {
            return 0;
        }
        self.string_span(row).map_or(0, |span| span.len())
    }

    /// Shared chars buffer of a string column.
    #[must_use]
    pub fn chars(&self) -> Option<&[u8]> {
        match &self.data {
            ColumnData::Strings { chars, .. } => Some(&chars[..]),
            ColumnData::Fixed { .. } => None,
        }
    }

    #[must_use]
    pub fn bytes_value(&self, row: usize) -> Option<&[u8]> {
        if !self.is_valid(row) {
            return None;
        }
        let span = self.string_span(row)?;
        self.chars()?.get(span)
    }

    #[must_use]
    pub fn str_value(&self, row: usize) -> Option<&str> {
        std::str::from_utf8(self.bytes_value(row)?).ok()
    }

    pub fn scalar_at(&self, row: usize) -> Result<Scalar, ColumnError> {
        if row >= self.len {
            return Err(ColumnError::RowOutOfBounds { row, len: self.len });
        }
        if !self.is_valid(row) {
            return Ok(Scalar::null(self.dtype));
        }
        let scalar = match self.dtype.layout() {
            Layout::VariableLength => {
                let bytes = self.bytes_value(row).unwrap_or_default();
                let text = std::str::from_utf8(bytes).map_err(|_| TypeError::InvalidUtf8)?;
                Scalar::utf8(text)
            }
            Layout::FixedWidth { .. } => fixed_scalar(self.dtype, self.fixed_bytes(row).unwrap_or_default())?,
        };
        Ok(scalar)
    }

    pub fn to_scalars(&self) -> Result<Vec<Scalar>, ColumnError> {
        (0..self.len).map(|row| self.scalar_at(row)).collect()
    }

    /// Row-wise equality: same dtype and length, same validity, and equal
    /// values wherever both rows are valid. Storage layout is ignored.
    #[must_use]
    pub fn value_eq(&self, other: &Self) -> bool {
        if self.dtype != other.dtype || self.len != other.len {
            return false;
        }
        (0..self.len).all(|row| match (self.is_valid(row), other.is_valid(row)) {
            (true, true) => match self.dtype.layout() {
                Layout::FixedWidth { .. } => self.fixed_bytes(row) == other.fixed_bytes(row),
                Layout::VariableLength => self.bytes_value(row) == other.bytes_value(row),
            },
            (false, false) => true,
            _ => false,
        })
    }
}

fn fixed_scalar(dtype: DType, bytes: &[u8]) -> Result<Scalar, TypeError> {
    use fc_types::NativeType;

    match dtype.native() {
        Some(NativeType::Bool) => Scalar::new(dtype, bool::read_le(bytes)),
        Some(NativeType::I8) => Scalar::new(dtype, i8::read_le(bytes)),
        Some(NativeType::I16) => Scalar::new(dtype, i16::read_le(bytes)),
        Some(NativeType::I32) => Scalar::new(dtype, i32::read_le(bytes)),
        Some(NativeType::I64) => Scalar::new(dtype, i64::read_le(bytes)),
        Some(NativeType::U8) => Scalar::new(dtype, u8::read_le(bytes)),
        Some(NativeType::U16) => Scalar::new(dtype, u16::read_le(bytes)),
        Some(NativeType::U32) => Scalar::new(dtype, u32::read_le(bytes)),
        Some(NativeType::U64) => Scalar::new(dtype, u64::read_le(bytes)),
        Some(NativeType::F32) => Scalar::new(dtype, f32::read_le(bytes)),
        Some(NativeType::F64) => Scalar::new(dtype, f64::read_le(bytes)),
        None => Err(TypeError::NotAString { dtype }),
    }
}

/// Split `view` into sub-views at `(start, end)` row pairs, without copying.
pub fn slice(view: &ColumnView, ranges: &[(usize, usize)]) -> Result<Vec<ColumnView>, ColumnError> {
    ranges
        .iter()
        .map(|&(start, end)| {
            if start > end || end > view.len() {
                return Err(ColumnError::SliceOutOfBounds {
                    start,
                    end,
                    len: view.len(),
                });
            }
            view.slice(start, end - start)
        })
        .collect()
}
