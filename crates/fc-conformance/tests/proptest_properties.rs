#![forbid(unsafe_code)]

//! Property-based tests for the shift transform and regex flag predicates.
//!
//! Every generated case is checked against a naive row-by-row model of the
//! shift mapping, under both the sequential and an eager parallel executor.

use proptest::prelude::*;

use fc_columnar::Column;
use fc_copying::{CopyError, shift, shift_with};
use fc_runtime::{ExecutionContext, Executor};
use fc_strings::{RegexFlags, is_dotall, is_multiline};
use fc_types::{DType, Scalar};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

fn arb_int_rows(max_len: usize) -> impl Strategy<Value = Vec<Option<i32>>> {
    proptest::collection::vec(proptest::option::weighted(0.8, any::<i32>()), 0..max_len)
}

fn arb_text_rows(max_len: usize) -> impl Strategy<Value = Vec<Option<String>>> {
    proptest::collection::vec(proptest::option::weighted(0.8, "[a-zé]{0,6}"), 0..max_len)
}

fn arb_offset() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => -48_i64..48,
        1 => Just(i64::MIN),
        1 => Just(i64::MAX),
    ]
}

fn int_column(rows: &[Option<i32>]) -> Column {
    let values: Vec<i32> = rows.iter().map(|row| row.unwrap_or_default()).collect();
    let validity: Vec<bool> = rows.iter().map(Option::is_some).collect();
    Column::from_fixed(DType::Int32, &values, Some(&validity)).expect("int column")
}

fn text_column(rows: &[Option<String>]) -> Column {
    let refs: Vec<Option<&str>> = rows.iter().map(Option::as_deref).collect();
    Column::from_optional_strings(&refs).expect("text column")
}

fn int_fill(fill: Option<i32>) -> Scalar {
    fill.map_or_else(|| Scalar::null(DType::Int32), Scalar::int32)
}

fn text_fill(fill: Option<&str>) -> Scalar {
    fill.map_or_else(|| Scalar::null(DType::Utf8), Scalar::utf8)
}

/// Row `i` of the result takes row `i - offset` when it exists, else the fill.
fn model<T: Clone>(rows: &[Option<T>], offset: i64, fill: &Option<T>) -> Vec<Option<T>> {
    (0..rows.len())
        .map(|row| {
            let source = row as i128 - i128::from(offset);
            if (0..rows.len() as i128).contains(&source) {
                rows[source as usize].clone()
            } else {
                fill.clone()
            }
        })
        .collect()
}

fn text_rows(column: &Column) -> Vec<Option<String>> {
    let view = column.view();
    (0..view.len())
        .map(|row| view.str_value(row).map(str::to_owned))
        .collect()
}

fn contexts() -> [ExecutionContext; 2] {
    [
        ExecutionContext::sequential(),
        ExecutionContext::sequential().with_executor(Executor::Parallel { min_rows: 1 }),
    ]
}

// ---------------------------------------------------------------------------
// Shift over fixed-width columns
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Shifting by zero is value-identical to the input.
    #[test]
    fn prop_zero_offset_is_identity(rows in arb_int_rows(40), fill in any::<Option<i32>>()) {
        let input = int_column(&rows);
        let out = shift(&input.view(), 0, &int_fill(fill)).expect("shift");
        prop_assert!(out.value_eq(&input));
    }

    /// Empty input yields an empty column of the same dtype for every offset.
    #[test]
    fn prop_empty_input_stays_empty(offset in any::<i64>(), fill in any::<Option<i32>>()) {
        let out = shift(&Column::empty(DType::Int32).view(), offset, &int_fill(fill)).expect("shift");
        prop_assert!(out.is_empty());
        prop_assert_eq!(out.dtype(), DType::Int32);
    }

    /// Offsets at least as large as the column produce only fill rows.
    #[test]
    fn prop_large_offsets_are_all_fill(
        rows in arb_int_rows(30),
        extra in 0_i64..1_000,
        negative in any::<bool>(),
        fill in any::<Option<i32>>(),
    ) {
        let magnitude = rows.len() as i64 + extra;
        let offset = if negative { -magnitude } else { magnitude };
        let out = shift(&int_column(&rows).view(), offset, &int_fill(fill)).expect("shift");
        let values = out.view().values::<i32>().expect("values");
        prop_assert!(values.iter().all(|value| *value == fill));
    }

    /// A fill of any other dtype is rejected for every offset.
    #[test]
    fn prop_mismatched_fill_is_rejected(
        rows in arb_int_rows(20),
        offset in arb_offset(),
        fill_index in 0_usize..DType::ALL.len(),
    ) {
        let fill_dtype = DType::ALL[fill_index];
        prop_assume!(fill_dtype != DType::Int32);
        let err = shift(&int_column(&rows).view(), offset, &Scalar::null(fill_dtype))
            .expect_err("mismatch");
        prop_assert_eq!(err, CopyError::TypeMismatch { column: DType::Int32, fill: fill_dtype });
    }

    /// Values and validity follow the row mapping under every executor.
    #[test]
    fn prop_fixed_width_matches_model(
        rows in arb_int_rows(60),
        offset in arb_offset(),
        fill in any::<Option<i32>>(),
    ) {
        let input = int_column(&rows);
        let expected = model(&rows, offset, &fill);
        for ctx in contexts() {
            let out = shift_with(&input.view(), offset, &int_fill(fill), &ctx).expect("shift");
            prop_assert_eq!(out.view().values::<i32>().expect("values"), expected.clone());
            prop_assert_eq!(out.null_count(), expected.iter().filter(|v| v.is_none()).count());
        }
    }

    /// A mask is emitted exactly when some output row is null.
    #[test]
    fn prop_mask_present_iff_nulls(
        rows in arb_int_rows(40),
        offset in arb_offset(),
        fill in any::<Option<i32>>(),
    ) {
        let out = shift(&int_column(&rows).view(), offset, &int_fill(fill)).expect("shift");
        prop_assert_eq!(out.validity().is_some(), out.null_count() > 0);
        if let Some(mask) = out.validity() {
            prop_assert_eq!(mask.len(), out.len());
            prop_assert_eq!(mask.bits().filter(|bit| !bit).count(), mask.null_count());
        }
    }

    /// Shifting a slice equals shifting a column built from the same rows.
    #[test]
    fn prop_sliced_view_matches_copy(
        rows in arb_int_rows(40),
        cut in (0_usize..40, 0_usize..40),
        offset in -20_i64..20,
        fill in any::<Option<i32>>(),
    ) {
        let start = cut.0.min(rows.len());
        let end = cut.1.clamp(start, rows.len());
        let input = int_column(&rows);
        let sliced = input.view().slice(start, end - start).expect("slice");
        let copied = int_column(&rows[start..end]);
        let a = shift(&sliced, offset, &int_fill(fill)).expect("sliced");
        let b = shift(&copied.view(), offset, &int_fill(fill)).expect("copied");
        prop_assert!(a.value_eq(&b));
    }
}

// ---------------------------------------------------------------------------
// Shift over string columns
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_strings_match_model(
        rows in arb_text_rows(40),
        offset in arb_offset(),
        fill in proptest::option::of("[xyz]{0,3}"),
    ) {
        let input = text_column(&rows);
        let expected = model(&rows, offset, &fill);
        for ctx in contexts() {
            let out = shift_with(&input.view(), offset, &text_fill(fill.as_deref()), &ctx)
                .expect("shift");
            prop_assert_eq!(text_rows(&out), expected.clone());
        }
    }

    /// Output chars are exactly the concatenation of the valid output rows.
    #[test]
    fn prop_string_output_is_packed(
        rows in arb_text_rows(30),
        offset in -35_i64..35,
        fill in proptest::option::of("[xyz]{0,3}"),
    ) {
        let out = shift(&text_column(&rows).view(), offset, &text_fill(fill.as_deref()))
            .expect("shift");
        let view = out.view();
        let packed: usize = text_rows(&out).iter().flatten().map(String::len).sum();
        prop_assert_eq!(view.chars().map(<[u8]>::len), Some(packed));
    }

    #[test]
    fn prop_string_zero_offset_is_identity(rows in arb_text_rows(30)) {
        let input = text_column(&rows);
        let out = shift(&input.view(), 0, &Scalar::utf8("fill")).expect("shift");
        prop_assert!(out.value_eq(&input));
    }
}

// ---------------------------------------------------------------------------
// Regex flags
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Predicates depend only on their own bit, whatever else is set.
    #[test]
    fn prop_flag_predicates_read_single_bits(bits in any::<u32>()) {
        let flags = RegexFlags::from_bits_retain(bits);
        prop_assert_eq!(is_multiline(flags), bits & 8 != 0);
        prop_assert_eq!(is_dotall(flags), bits & 16 != 0);
        prop_assert_eq!(RegexFlags::from_bits(bits).is_ok(), bits & !24 == 0);
    }

    #[test]
    fn prop_known_flags_display_round_trip(multiline in any::<bool>(), dotall in any::<bool>()) {
        let mut flags = RegexFlags::DEFAULT;
        if multiline {
            flags |= RegexFlags::MULTILINE;
        }
        if dotall {
            flags |= RegexFlags::DOTALL;
        }
        prop_assert_eq!(flags.to_string().parse::<RegexFlags>(), Ok(flags));
    }
}
