use std::ops::Range;
use std::sync::Arc;

use fc_columnar::{Column, ColumnData, ColumnError, ColumnView, ValidityMask, encode_offsets};
use fc_runtime::ExecutionContext;
use fc_types::Scalar;
use tracing::{debug, instrument};

use crate::CopyError;
use crate::dispatch::{PathTag, dispatch};

/// Row mapping of one shift: output row `i` reads source row `i - offset`
/// when that lands inside the column and the fill otherwise.
#[derive(Debug, Clone, Copy)]
struct ShiftPlan {
    rows: usize,
    offset: i64,
}

impl ShiftPlan {
    fn new(rows: usize, offset: i64) -> Self {
        Self { rows, offset }
    }

    fn source(&self, row: usize) -> Option<usize> {
        let source = row as i128 - i128::from(self.offset);
        (0..self.rows as i128)
            .contains(&source)
            .then_some(source as usize)
    }

    /// Number of output rows taken from the fill.
    fn fill_rows(&self) -> usize {
        usize::try_from(self.offset.unsigned_abs())
            .unwrap_or(usize::MAX)
            .min(self.rows)
    }

    /// Source rows that appear in the output.
    fn kept_sources(&self) -> Range<usize> {
        let kept = self.rows - self.fill_rows();
        if self.offset >= 0 {
            0..kept
        } else {
            self.rows - kept..self.rows
        }
    }
}

/// Shift `view` by `offset` rows using the default execution context.
///
/// Positive offsets move values toward higher row indices. Vacated rows take
/// `fill`'s value and validity. `|offset| >= view.len()` yields a column made
/// entirely of the fill.
pub fn shift(view: &ColumnView, offset: i64, fill: &Scalar) -> Result<Column, CopyError> {
    shift_with(view, offset, fill, &ExecutionContext::default())
}

/// [`shift`] with an explicit executor and memory resource.
#[instrument(
    name = "copying::shift",
    level = "debug",
    skip_all,
    fields(dtype = %view.dtype(), rows = view.len(), offset = offset)
)]
pub fn shift_with(
    view: &ColumnView,
    offset: i64,
    fill: &Scalar,
    ctx: &ExecutionContext,
) -> Result<Column, CopyError> {
    let path = dispatch(view.dtype(), fill.dtype())?;
    if view.is_empty() {
        return Ok(Column::empty(view.dtype()));
    }
    let plan = ShiftPlan::new(view.len(), offset);
    let column = match path {
        PathTag::FixedWidth { width } => shift_fixed(view, plan, width, fill, ctx)?,
        PathTag::VariableLength => shift_strings(view, plan, fill, ctx)?,
    };
    debug!(
        fill_rows = plan.fill_rows(),
        null_count = column.null_count(),
        "shift complete"
    );
    Ok(column)
}

/// Shift several equal-length columns by the same offset, each with its own
/// fill. All types are checked before any output is allocated.
pub fn shift_columns(
    views: &[ColumnView],
    offset: i64,
    fills: &[Scalar],
    ctx: &ExecutionContext,
) -> Result<Vec<Column>, CopyError> {
    if views.len() != fills.len() {
        return Err(CopyError::FillCountMismatch {
            columns: views.len(),
            fills: fills.len(),
        });
    }
    if let Some(first) = views.first() {
        if let Some(other) = views.iter().find(|view| view.len() != first.len()) {
            return Err(ColumnError::LengthMismatch {
                left: first.len(),
                right: other.len(),
            }
            .into());
        }
    }
    for (view, fill) in views.iter().zip(fills) {
        dispatch(view.dtype(), fill.dtype())?;
    }
    views
        .iter()
        .zip(fills)
        .map(|(view, fill)| shift_with(view, offset, fill, ctx))
        .collect()
}

fn shift_fixed(
    view: &ColumnView,
    plan: ShiftPlan,
    width: usize,
    fill: &Scalar,
    ctx: &ExecutionContext,
) -> Result<Column, CopyError> {
    // Null fills carry a zeroed payload; short payloads are zero-padded.
    let mut fill_bytes = vec![0_u8; width];
    let payload = fill.payload();
    let copied = payload.len().min(width);
    fill_bytes[..copied].copy_from_slice(&payload[..copied]);

    let mut values = ctx.allocate(plan.rows * width)?;
    ctx.executor().for_each_row_mut(&mut values, width, |row, slot| {
        match plan.source(row).and_then(|source| view.fixed_bytes(source)) {
            Some(bytes) => slot.copy_from_slice(bytes),
            None => slot.copy_from_slice(&fill_bytes),
        }
    });
    let validity = shifted_validity(view, plan, fill, ctx)?;
    Ok(Column::from_parts(
        view.dtype(),
        plan.rows,
        ColumnData::Fixed {
            values: Arc::new(values),
        },
        validity,
    )?)
}

fn shift_strings(
    view: &ColumnView,
    plan: ShiftPlan,
    fill: &Scalar,
    ctx: &ExecutionContext,
) -> Result<Column, CopyError> {
    let fill_bytes: &[u8] = if fill.is_valid() { fill.payload() } else { &[] };
    let executor = ctx.executor();

    let lengths = executor.map_rows(plan.rows, |row| match plan.source(row) {
        Some(source) => view.string_len(source),
        None => fill_bytes.len(),
    });
    let bounds = executor.exclusive_scan(&lengths);
    let offsets = encode_offsets(&bounds, ctx)?;

    let mut chars = ctx.allocate(bounds.last().copied().unwrap_or(0))?;
    executor.for_each_segment_mut(&mut chars, &bounds, |row, segment| {
        let bytes = match plan.source(row) {
            Some(source) => view.bytes_value(source).unwrap_or_default(),
            None => fill_bytes,
        };
        segment.copy_from_slice(bytes);
    })?;

    let validity = shifted_validity(view, plan, fill, ctx)?;
    Ok(Column::from_parts(
        view.dtype(),
        plan.rows,
        ColumnData::Strings {
            offsets: Arc::new(offsets),
            chars: Arc::new(chars),
        },
        validity,
    )?)
}

/// Output mask, or `None` when every output row is valid.
fn shifted_validity(
    view: &ColumnView,
    plan: ShiftPlan,
    fill: &Scalar,
    ctx: &ExecutionContext,
) -> Result<Option<ValidityMask>, CopyError> {
    let fill_nulls = plan.fill_rows() > 0 && !fill.is_valid();
    let kept = plan.kept_sources();
    let source_nulls =
        view.has_validity() && view.slice(kept.start, kept.len())?.null_count() > 0;
    if !fill_nulls && !source_nulls {
        return Ok(None);
    }
    let mask = ValidityMask::from_fn_in(plan.rows, ctx, |row| match plan.source(row) {
        Some(source) => view.is_valid(source),
        None => fill.is_valid(),
    })?;
    Ok(Some(mask))
}
