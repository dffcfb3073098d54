//! Error types and result definitions for pipeline operations.
//!
//! Provides an error system with classification, aggregation, and captured diagnostic
//! metadata for pipeline operations. The [`ConveyorError`] type supports single errors,
//! errors with additional detail, and multiple aggregated errors for the case where
//! several stages fail during the same run.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use conveyor_config::shared::ValidationError;

/// Convenient result type for pipeline operations using [`ConveyorError`] as the error type.
///
/// This type alias reduces boilerplate when working with fallible pipeline operations.
/// Most functions in this crate return this type.
pub type ConveyorResult<T> = Result<T, ConveyorError>;

/// Detailed payload stored for single [`ConveyorError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl ErrorPayload {
    /// Creates a new payload with optional dynamic detail.
    fn new(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
        location: &'static Location<'static>,
        backtrace: Arc<Backtrace>,
    ) -> Self {
        Self {
            kind,
            description,
            detail,
            source,
            location,
            backtrace,
        }
    }
}

/// Main error type for pipeline operations.
///
/// [`ConveyorError`] can represent a single error, an error with additional detail, or
/// multiple aggregated errors. The design allows for rich error information while
/// maintaining ergonomic usage patterns.
#[derive(Debug, Clone)]
pub struct ConveyorError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// This enum supports different error patterns while maintaining a unified interface.
/// Users should not interact with this type directly but use [`ConveyorError`] methods
/// instead.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// This variant is mainly useful to capture multiple stage failures.
    Many {
        errors: Vec<ConveyorError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during pipeline operations.
///
/// This enum provides granular error classification to enable appropriate error handling
/// strategies. Error kinds are organized by functional area and failure mode.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Stage Errors
    FetchFailed,
    ProcessFailed,
    CommitFailed,
    StagePanic,

    // Configuration Errors
    ConfigError,

    // Unknown / Uncategorized
    Unknown,
}

impl ConveyorError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    ///
    /// For single errors, returns a vector with one element. For multiple errors,
    /// returns a flattened vector of all error kinds.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    /// Returns [`None`] if no detailed information is available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => {
                // For multiple errors, return the detail of the first error that has one.
                errors.iter().find_map(|e| e.detail())
            }
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// The stored source is preserved across clones and exposed via [`error::Error::source`].
    /// Has no effect when called on aggregated errors because aggregates forward the first
    /// contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.set_source(Some(Arc::new(source)));
        self
    }

    /// Creates a [`ConveyorError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        ConveyorError {
            repr: ErrorRepr::Single(ErrorPayload::new(
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            )),
        }
    }

    /// Sets the source for this [`ConveyorError`].
    fn set_source(&mut self, source: Option<Arc<dyn error::Error + Send + Sync>>) {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = source;
        }
    }
}

impl PartialEq for ConveyorError {
    fn eq(&self, other: &ConveyorError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ConveyorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                } else {
                    for (index, error) in errors.iter().enumerate() {
                        let rendered = format!("{error}");
                        let mut lines = rendered.lines();
                        if let Some(first_line) = lines.next() {
                            write!(f, "\n  {}. {}", index + 1, first_line)?;
                        } else {
                            write!(f, "\n  {}.", index + 1)?;
                        }

                        for line in lines {
                            if line.is_empty() {
                                write!(f, "\n     ")?;
                            } else {
                                write!(f, "\n     {line}")?;
                            }
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ConveyorError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_deref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // For aggregated errors, we forward the first contained error as the source.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the captured backtrace with indentation.
fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            if line.trim().is_empty() {
                write!(f, "\n{indent_str}  ")?;
            } else {
                write!(f, "\n{indent_str}  {line}")?;
            }
        }
    }

    Ok(())
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    if let Some(detail) = detail {
        let indent_str = "  ".repeat(indent);
        if detail.trim().is_empty() {
            write!(f, "\n{indent_str}Detail: <empty>")?;
        } else {
            write!(f, "\n{indent_str}Detail:")?;
            for line in detail.lines() {
                if line.trim().is_empty() {
                    write!(f, "\n{indent_str}  ")?;
                } else {
                    write!(f, "\n{indent_str}  {line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Creates a [`ConveyorError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ConveyorError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ConveyorError {
        ConveyorError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`ConveyorError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ConveyorError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ConveyorError {
        ConveyorError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`ConveyorError`] from a vector of errors for aggregation.
///
/// If the vector contains exactly one error, returns that error directly without wrapping
/// it in the [`ErrorRepr::Many`] variant.
impl<E> From<Vec<E>> for ConveyorError
where
    E: Into<ConveyorError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ConveyorError {
        let location = Location::caller();

        let mut errors: Vec<ConveyorError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        ConveyorError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`ValidationError`] to [`ConveyorError`] with [`ErrorKind::ConfigError`].
impl From<ValidationError> for ConveyorError {
    #[track_caller]
    fn from(err: ValidationError) -> ConveyorError {
        let detail = err.to_string();
        let source = Arc::new(err);
        ConveyorError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Pipeline configuration is invalid"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conveyor_error;

    #[test]
    fn test_single_error_exposes_its_kind() {
        let err = conveyor_error!(ErrorKind::FetchFailed, "Fetch failed");

        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(err.kinds(), vec![ErrorKind::FetchFailed]);
    }

    #[test]
    fn test_vec_of_one_error_unwraps_instead_of_aggregating() {
        let errors = vec![conveyor_error!(ErrorKind::CommitFailed, "Commit failed")];

        let err: ConveyorError = errors.into();
        assert_eq!(err.kind(), ErrorKind::CommitFailed);
        assert_eq!(err.kinds(), vec![ErrorKind::CommitFailed]);
    }

    #[test]
    fn test_aggregated_errors_expose_all_kinds() {
        let errors = vec![
            conveyor_error!(ErrorKind::FetchFailed, "Fetch failed"),
            conveyor_error!(ErrorKind::ProcessFailed, "Process failed"),
        ];

        let err: ConveyorError = errors.into();
        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::FetchFailed, ErrorKind::ProcessFailed]
        );
    }

    #[test]
    fn test_errors_compare_by_kind() {
        let a = conveyor_error!(ErrorKind::FetchFailed, "Fetch failed");
        let b = conveyor_error!(ErrorKind::FetchFailed, "A different description");
        let c = conveyor_error!(ErrorKind::CommitFailed, "Commit failed");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_aggregate_forwards_detail_of_first_error_that_has_one() {
        let errors = vec![
            conveyor_error!(ErrorKind::FetchFailed, "Fetch failed"),
            conveyor_error!(ErrorKind::ProcessFailed, "Process failed", detail = "copy stalled"),
        ];

        let err: ConveyorError = errors.into();
        assert_eq!(err.detail(), Some("copy stalled"));
    }
}
