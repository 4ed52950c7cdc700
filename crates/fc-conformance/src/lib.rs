#![forbid(unsafe_code)]

//! Fixture-driven conformance harness. Each JSON file under `fixtures/` is a
//! named suite of cases; a case builds its inputs, runs one operation, and
//! compares the outcome against the recorded expectation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use fc_columnar::{Column, ColumnError, ColumnView, slice};
use fc_copying::shift_with;
use fc_runtime::{ExecutionContext, RuntimeConfig};
use fc_strings::{RegexFlags, is_dotall, is_multiline};
use fc_types::{DType, NativeType, Scalar, TypeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub runtime: RuntimeConfig,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            runtime: RuntimeConfig::default(),
        }
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    Shift,
    RegexFlags,
}

/// One cell of a fixture column. `"min"`/`"max"` on a fixed-width dtype
/// stand for the dtype's lowest and highest values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

/// Column literal; JSON `null` entries are null rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureColumn {
    pub dtype: DType,
    pub values: Vec<Option<FixtureValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureScalar {
    pub dtype: DType,
    #[serde(default)]
    pub value: Option<FixtureValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFixture {
    pub case_id: String,
    pub operation: FixtureOperation,
    #[serde(default)]
    pub input: Option<FixtureColumn>,
    /// `[start, end)` rows of `input` to shift instead of the whole column.
    #[serde(default)]
    pub slice: Option<[usize; 2]>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub fill: Option<FixtureScalar>,
    #[serde(default)]
    pub expected: Option<FixtureColumn>,
    #[serde(default)]
    pub expected_error_contains: Option<String>,
    #[serde(default)]
    pub flags: Option<Vec<String>>,
    #[serde(default)]
    pub expected_bits: Option<u32>,
    #[serde(default)]
    pub expected_multiline: Option<bool>,
    #[serde(default)]
    pub expected_dotall: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureFile {
    pub suite: String,
    pub cases: Vec<CaseFixture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub suite: String,
    pub case_id: String,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    #[serde(default)]
    pub elapsed_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results
            .iter()
            .filter(|result| result.status == CaseStatus::Fail)
    }
}

/// Run every case in every fixture file.
pub fn run_suite(config: &HarnessConfig) -> Result<SuiteReport, HarnessError> {
    let files = load_fixtures(config)?;
    build_report(config, "all".to_owned(), &files)
}

/// Run only the fixture file whose `suite` is `name`.
pub fn run_suite_by_name(config: &HarnessConfig, name: &str) -> Result<SuiteReport, HarnessError> {
    let files: Vec<FixtureFile> = load_fixtures(config)?
        .into_iter()
        .filter(|file| file.suite == name)
        .collect();
    if files.is_empty() {
        return Err(HarnessError::FixtureFormat(format!("no fixture suite named '{name}'")));
    }
    build_report(config, name.to_owned(), &files)
}

fn build_report(
    config: &HarnessConfig,
    suite: String,
    files: &[FixtureFile],
) -> Result<SuiteReport, HarnessError> {
    let ctx = ExecutionContext::from_config(&config.runtime);
    let results: Vec<CaseResult> = files
        .iter()
        .flat_map(|file| {
            file.cases
                .iter()
                .map(|case| run_fixture(&ctx, &file.suite, case))
        })
        .collect();
    let failed = results
        .iter()
        .filter(|result| result.status == CaseStatus::Fail)
        .count();
    let passed = results.len().saturating_sub(failed);
    info!(suite = %suite, passed, failed, "conformance suite finished");
    Ok(SuiteReport {
        suite,
        fixture_count: results.len(),
        passed,
        failed,
        results,
    })
}

/// Load every `*.json` fixture file under the fixture root, ordered by file
/// name.
pub fn load_fixtures(config: &HarnessConfig) -> Result<Vec<FixtureFile>, HarnessError> {
    list_fixture_files(&config.fixture_root)?
        .iter()
        .map(|path| load_fixture(path))
        .collect()
}

fn load_fixture(path: &Path) -> Result<FixtureFile, HarnessError> {
    let body = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Execute one case. Malformed cases fail with a description instead of
/// aborting the suite.
#[must_use]
pub fn run_fixture(ctx: &ExecutionContext, suite: &str, fixture: &CaseFixture) -> CaseResult {
    let started = Instant::now();
    let mismatch = match fixture.operation {
        FixtureOperation::Shift => run_shift_case(ctx, fixture),
        FixtureOperation::RegexFlags => run_flags_case(fixture),
    }
    .err();
    let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    debug!(suite, case_id = %fixture.case_id, passed = mismatch.is_none(), "fixture case ran");
    CaseResult {
        suite: suite.to_owned(),
        case_id: fixture.case_id.clone(),
        operation: fixture.operation,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        elapsed_us,
    }
}

fn run_shift_case(ctx: &ExecutionContext, fixture: &CaseFixture) -> Result<(), String> {
    let input = fixture
        .input
        .as_ref()
        .ok_or("shift case is missing `input`")?;
    let fill = fixture.fill.as_ref().ok_or("shift case is missing `fill`")?;
    let column = column_from_fixture(input).map_err(|err| err.to_string())?;
    let view = match fixture.slice {
        Some([start, end]) => slice(&column.view(), &[(start, end)])
            .map_err(|err| err.to_string())?
            .pop()
            .ok_or("slice produced no view")?,
        None => column.view(),
    };
    let fill = scalar_from_fixture(fill.dtype, fill.value.as_ref()).map_err(|err| err.to_string())?;
    let outcome = shift_with(&view, fixture.offset.unwrap_or(0), &fill, ctx);

    match (outcome, &fixture.expected, &fixture.expected_error_contains) {
        (Ok(actual), Some(expected), None) => {
            let expected = column_from_fixture(expected).map_err(|err| err.to_string())?;
            if actual.value_eq(&expected) {
                Ok(())
            } else {
                Err(format!(
                    "expected {:?}, got {:?}",
                    render_view(&expected.view()),
                    render_view(&actual.view())
                ))
            }
        }
        (Err(err), None, Some(needle)) => {
            if err.to_string().contains(needle.as_str()) {
                Ok(())
            } else {
                Err(format!("expected error containing '{needle}', got '{err}'"))
            }
        }
        (Ok(_), None, Some(needle)) => Err(format!(
            "expected error containing '{needle}', but shift succeeded"
        )),
        (Err(err), Some(_), None) => Err(format!("unexpected error: {err}")),
        _ => Err("case must set exactly one of `expected` and `expected_error_contains`".to_owned()),
    }
}

fn run_flags_case(fixture: &CaseFixture) -> Result<(), String> {
    let names = fixture.flags.as_ref().ok_or("flags case is missing `flags`")?;
    let mut flags = RegexFlags::DEFAULT;
    for name in names {
        flags |= name.parse::<RegexFlags>().map_err(|err| err.to_string())?;
    }
    let checks = [
        ("bits", fixture.expected_bits.map(|bits| bits == flags.bits())),
        (
            "is_multiline",
            fixture
                .expected_multiline
                .map(|expected| expected == is_multiline(flags)),
        ),
        (
            "is_dotall",
            fixture
                .expected_dotall
                .map(|expected| expected == is_dotall(flags)),
        ),
    ];
    if checks.iter().all(|(_, check)| check.is_none()) {
        return Err("flags case has no expectation".to_owned());
    }
    match checks.iter().find(|(_, check)| *check == Some(false)) {
        Some((name, _)) => Err(format!("{name} disagrees for {flags} ({})", flags.bits())),
        None => Ok(()),
    }
}

/// Build a column from a fixture literal.
pub fn column_from_fixture(column: &FixtureColumn) -> Result<Column, HarnessError> {
    let scalars = column
        .values
        .iter()
        .map(|value| scalar_from_fixture(column.dtype, value.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Column::from_scalars(column.dtype, &scalars)?)
}

/// Interpret a fixture value as a scalar of `dtype`; `None` is a null.
pub fn scalar_from_fixture(dtype: DType, value: Option<&FixtureValue>) -> Result<Scalar, HarnessError> {
    let Some(value) = value else {
        return Ok(Scalar::null(dtype));
    };
    let Some(native) = dtype.native() else {
        return match value {
            FixtureValue::Text(text) => Ok(Scalar::utf8(text.as_str())),
            other => Err(unfit(dtype, other)),
        };
    };
    if let FixtureValue::Text(sentinel) = value {
        let bound = match sentinel.as_str() {
            "min" => dtype.lowest(),
            "max" => dtype.highest(),
            _ => None,
        };
        return bound.ok_or_else(|| unfit(dtype, value));
    }
    let scalar = match native {
        NativeType::Bool => match value {
            FixtureValue::Bool(flag) => Scalar::bool8(*flag),
            other => return Err(unfit(dtype, other)),
        },
        NativeType::I8 => Scalar::new(dtype, integer::<i8>(dtype, value)?)?,
        NativeType::I16 => Scalar::new(dtype, integer::<i16>(dtype, value)?)?,
        NativeType::I32 => Scalar::new(dtype, integer::<i32>(dtype, value)?)?,
        NativeType::I64 => Scalar::new(dtype, integer::<i64>(dtype, value)?)?,
        NativeType::U8 => Scalar::new(dtype, integer::<u8>(dtype, value)?)?,
        NativeType::U16 => Scalar::new(dtype, integer::<u16>(dtype, value)?)?,
        NativeType::U32 => Scalar::new(dtype, integer::<u32>(dtype, value)?)?,
        NativeType::U64 => Scalar::new(dtype, integer::<u64>(dtype, value)?)?,
        NativeType::F32 => Scalar::new(dtype, float(dtype, value)? as f32)?,
        NativeType::F64 => Scalar::float64(float(dtype, value)?),
    };
    Ok(scalar)
}

fn unfit(dtype: DType, value: &FixtureValue) -> HarnessError {
    HarnessError::FixtureFormat(format!("{value:?} is not a {dtype} value"))
}

fn integer<T: TryFrom<i128>>(dtype: DType, value: &FixtureValue) -> Result<T, HarnessError> {
    let wide = match value {
        FixtureValue::Int(int) => i128::from(*int),
        FixtureValue::UInt(uint) => i128::from(*uint),
        other => return Err(unfit(dtype, other)),
    };
    T::try_from(wide).map_err(|_| unfit(dtype, value))
}

fn float(dtype: DType, value: &FixtureValue) -> Result<f64, HarnessError> {
    match value {
        FixtureValue::Float(float) => Ok(*float),
        FixtureValue::Int(int) => Ok(*int as f64),
        FixtureValue::UInt(uint) => Ok(*uint as f64),
        other => Err(unfit(dtype, other)),
    }
}

/// Human-readable rows for mismatch reports; nulls render as `null`.
#[must_use]
pub fn render_view(view: &ColumnView) -> Vec<String> {
    (0..view.len())
        .map(|row| {
            view.scalar_at(row)
                .map_or_else(|err| format!("<{err}>"), |scalar| render_scalar(&scalar))
        })
        .collect()
}

fn render_scalar(scalar: &Scalar) -> String {
    fn show<T: fc_types::FixedWidth>(scalar: &Scalar) -> String {
        match scalar.value::<T>() {
            Ok(Some(value)) => format!("{value:?}"),
            Ok(None) => "null".to_owned(),
            Err(err) => format!("<{err}>"),
        }
    }
    match scalar.dtype().native() {
        None => match scalar.as_str() {
            Ok(Some(text)) => format!("{text:?}"),
            Ok(None) => "null".to_owned(),
            Err(err) => format!("<{err}>"),
        },
        Some(NativeType::Bool) => show::<bool>(scalar),
        Some(NativeType::I8) => show::<i8>(scalar),
        Some(NativeType::I16) => show::<i16>(scalar),
        Some(NativeType::I32) => show::<i32>(scalar),
        Some(NativeType::I64) => show::<i64>(scalar),
        Some(NativeType::U8) => show::<u8>(scalar),
        Some(NativeType::U16) => show::<u16>(scalar),
        Some(NativeType::U32) => show::<u32>(scalar),
        Some(NativeType::U64) => show::<u64>(scalar),
        Some(NativeType::F32) => show::<f32>(scalar),
        Some(NativeType::F64) => show::<f64>(scalar),
    }
}
