use fc_types::{DType, Layout};
use tracing::debug;

use crate::CopyError;

/// Algorithm shape selected for a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTag {
    FixedWidth { width: usize },
    VariableLength,
}

/// Check that a fill of type `fill` may be written into a column of type
/// `column` and pick the path that does it. Types must match exactly; no
/// widening or narrowing is performed.
pub fn dispatch(column: DType, fill: DType) -> Result<PathTag, CopyError> {
    if column != fill {
        return Err(CopyError::TypeMismatch { column, fill });
    }
    let path = match column.layout() {
        Layout::FixedWidth { width } => PathTag::FixedWidth { width },
        Layout::VariableLength => PathTag::VariableLength,
    };
    debug!(dtype = %column, ?path, "dispatched copy path");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use fc_types::DType;

    use super::{PathTag, dispatch};
    use crate::CopyError;

    #[test]
    fn matching_types_select_their_layout() {
        assert_eq!(
            dispatch(DType::Int16, DType::Int16),
            Ok(PathTag::FixedWidth { width: 2 })
        );
        assert_eq!(
            dispatch(DType::TimestampNanoseconds, DType::TimestampNanoseconds),
            Ok(PathTag::FixedWidth { width: 8 })
        );
        assert_eq!(dispatch(DType::Utf8, DType::Utf8), Ok(PathTag::VariableLength));
    }

    #[test]
    fn every_fixed_width_type_dispatches_to_its_width() {
        for dtype in DType::ALL.iter().copied().filter(|d| d.is_fixed_width()) {
            let width = dtype.width().expect("fixed width");
            assert_eq!(dispatch(dtype, dtype), Ok(PathTag::FixedWidth { width }));
        }
    }

    #[test]
    fn any_difference_is_a_mismatch() {
        // Same physical width is not enough.
        assert_eq!(
            dispatch(DType::Int32, DType::TimestampDays),
            Err(CopyError::TypeMismatch {
                column: DType::Int32,
                fill: DType::TimestampDays
            })
        );
        assert!(dispatch(DType::Int64, DType::Int32).is_err());
        assert!(dispatch(DType::Utf8, DType::Int8).is_err());
        assert!(dispatch(DType::UInt8, DType::Utf8).is_err());
    }
}
