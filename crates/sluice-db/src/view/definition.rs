//! View definitions: the post-parse shape of `CREATE WINDOW VIEW`.
//!
//! SQL parsing lives outside this crate; callers hand the facade a
//! [`ViewDefinition`] carrying exactly what the DDL would: source and
//! destination table names, the aggregate list, GROUP BY columns, the
//! window spec, and the fire policy. Resolution against the source schema
//! happens once, at CREATE time, and every rejection (bad window spec,
//! unknown aggregate, bad column types) happens there.

use std::sync::Arc;
use std::time::Duration;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};

use sluice_core::aggregate::{AggregateFactory, AggregateFunction};
use sluice_core::window::WindowSpec;
use sluice_core::Error as CoreError;

use crate::error::DbError;

/// When a view considers a window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirePolicy {
    /// Fire once the window end has passed in processing time (default).
    ProcessingTime,
    /// Fire once the event-time watermark has passed the window end by
    /// `allowed_lateness`.
    EventTime {
        /// Grace period for out-of-order rows.
        allowed_lateness: Duration,
    },
}

impl FirePolicy {
    /// Event-time firing with no grace period.
    #[must_use]
    pub fn event_time() -> Self {
        Self::EventTime {
            allowed_lateness: Duration::ZERO,
        }
    }
}

/// One aggregate requested by a view's query.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    /// The aggregate function.
    pub function: AggregateFunction,
    /// Argument column, or `None` for `COUNT(*)`.
    pub column: Option<String>,
    /// Output column name in the destination table.
    pub alias: String,
}

impl AggregateSpec {
    /// Creates an aggregate spec.
    #[must_use]
    pub fn new(
        function: AggregateFunction,
        column: Option<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            function,
            column,
            alias: alias.into(),
        }
    }

    /// `COUNT(*) AS alias`.
    #[must_use]
    pub fn count(alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Count, None, alias)
    }

    /// `SUM(column) AS alias`.
    #[must_use]
    pub fn sum(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Sum, Some(column.into()), alias)
    }

    /// `MIN(column) AS alias`.
    #[must_use]
    pub fn min(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Min, Some(column.into()), alias)
    }

    /// `MAX(column) AS alias`.
    #[must_use]
    pub fn max(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Max, Some(column.into()), alias)
    }

    /// `AVG(column) AS alias`.
    #[must_use]
    pub fn avg(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Avg, Some(column.into()), alias)
    }
}

/// Everything `CREATE WINDOW VIEW` declares about one view.
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    /// View name (also the name `DROP TABLE` targets).
    pub name: String,
    /// Source table whose inserts feed the view.
    pub source: String,
    /// Destination table receiving fired window results.
    pub destination: String,
    /// GROUP BY columns (empty means one global group).
    pub group_by: Vec<String>,
    /// Aggregates to maintain per window and group.
    pub aggregates: Vec<AggregateSpec>,
    /// Window size/hop and the event-time column.
    pub window: WindowSpec,
    /// Fire policy; `None` uses the database default.
    pub fire: Option<FirePolicy>,
}

impl ViewDefinition {
    /// Creates a definition with no group-by and no aggregates yet.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        window: WindowSpec,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            window,
            fire: None,
        }
    }

    /// Adds a GROUP BY column.
    #[must_use]
    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    /// Adds an aggregate.
    #[must_use]
    pub fn aggregate(mut self, spec: AggregateSpec) -> Self {
        self.aggregates.push(spec);
        self
    }

    /// Overrides the fire policy.
    #[must_use]
    pub fn fire_policy(mut self, policy: FirePolicy) -> Self {
        self.fire = Some(policy);
        self
    }
}

/// A definition resolved against its source schema: column names turned
/// into indices, aggregate specs into factories, and the destination
/// schema derived.
pub(crate) struct ResolvedView {
    pub definition: ViewDefinition,
    pub fire: FirePolicy,
    pub time_column: usize,
    pub group_columns: Vec<usize>,
    pub factories: Vec<Box<dyn AggregateFactory>>,
    pub output_schema: SchemaRef,
}

impl ResolvedView {
    /// Resolves `definition` against the source table schema.
    pub(crate) fn resolve(
        definition: ViewDefinition,
        source_schema: &SchemaRef,
        default_fire: FirePolicy,
    ) -> Result<Self, DbError> {
        definition.window.validate().map_err(DbError::Core)?;

        let time_column = column_index(source_schema, &definition.window.time_column)?;
        let time_type = source_schema.field(time_column).data_type();
        if !is_time_type(time_type) {
            return Err(DbError::Core(CoreError::UnsupportedColumnType {
                column: definition.window.time_column.clone(),
                data_type: time_type.clone(),
                position: "time column",
            }));
        }

        let mut group_columns = Vec::with_capacity(definition.group_by.len());
        let mut output_fields = vec![
            Field::new("window_start", DataType::Int64, false),
            Field::new("window_end", DataType::Int64, false),
        ];
        for name in &definition.group_by {
            let index = column_index(source_schema, name)?;
            let field = source_schema.field(index);
            if !is_group_key_type(field.data_type()) {
                return Err(DbError::Core(CoreError::UnsupportedColumnType {
                    column: name.clone(),
                    data_type: field.data_type().clone(),
                    position: "group key",
                }));
            }
            group_columns.push(index);
            output_fields.push(Field::new(name, field.data_type().clone(), true));
        }

        let mut factories = Vec::with_capacity(definition.aggregates.len());
        for spec in &definition.aggregates {
            let column = match &spec.column {
                Some(name) => {
                    let index = column_index(source_schema, name)?;
                    Some((index, source_schema.field(index).data_type().clone(), name))
                }
                None => None,
            };
            let factory = spec
                .function
                .resolve(
                    &spec.alias,
                    column.as_ref().map(|(i, dt, n)| (*i, dt, n.as_str())),
                )
                .map_err(DbError::Core)?;
            output_fields.push(factory.result_field());
            factories.push(factory);
        }

        let fire = definition.fire.unwrap_or(default_fire);
        Ok(Self {
            definition,
            fire,
            time_column,
            group_columns,
            factories,
            output_schema: Arc::new(Schema::new(output_fields)),
        })
    }
}

fn column_index(schema: &SchemaRef, name: &str) -> Result<usize, DbError> {
    schema
        .index_of(name)
        .map_err(|_| DbError::Core(CoreError::ColumnNotFound(name.to_string())))
}

fn is_time_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int64 | DataType::Timestamp(TimeUnit::Millisecond, _)
    )
}

fn is_group_key_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int64 | DataType::Float64 | DataType::Utf8 | DataType::Boolean
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("ts", DataType::Int64, false),
            Field::new("user", DataType::Utf8, false),
            Field::new("amount", DataType::Int64, true),
        ]))
    }

    fn definition() -> ViewDefinition {
        ViewDefinition::new(
            "v",
            "mt",
            "dst",
            WindowSpec::tumbling(Duration::from_secs(1), "ts"),
        )
    }

    #[test]
    fn test_resolve_output_schema() {
        let def = definition()
            .group_by("user")
            .aggregate(AggregateSpec::count("n"))
            .aggregate(AggregateSpec::sum("amount", "total"));
        let resolved =
            ResolvedView::resolve(def, &source_schema(), FirePolicy::ProcessingTime).unwrap();

        let names: Vec<_> = resolved
            .output_schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, ["window_start", "window_end", "user", "n", "total"]);
        assert_eq!(resolved.time_column, 0);
        assert_eq!(resolved.group_columns, vec![1]);
        assert_eq!(resolved.factories.len(), 2);
    }

    #[test]
    fn test_resolve_rejects_missing_time_column() {
        let def = ViewDefinition::new(
            "v",
            "mt",
            "dst",
            WindowSpec::tumbling(Duration::from_secs(1), "nope"),
        );
        let err =
            ResolvedView::resolve(def, &source_schema(), FirePolicy::ProcessingTime).unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ColumnNotFound(_))));
    }

    #[test]
    fn test_resolve_rejects_string_time_column() {
        let def = ViewDefinition::new(
            "v",
            "mt",
            "dst",
            WindowSpec::tumbling(Duration::from_secs(1), "user"),
        );
        let err =
            ResolvedView::resolve(def, &source_schema(), FirePolicy::ProcessingTime).unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::UnsupportedColumnType { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_invalid_window() {
        let def = ViewDefinition::new(
            "v",
            "mt",
            "dst",
            WindowSpec::hopping(Duration::from_millis(2500), Duration::from_secs(1), "ts"),
        );
        let err =
            ResolvedView::resolve(def, &source_schema(), FirePolicy::ProcessingTime).unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidWindowSpec(_))
        ));
    }

    #[test]
    fn test_resolve_uses_default_fire_policy() {
        let resolved = ResolvedView::resolve(
            definition().aggregate(AggregateSpec::count("n")),
            &source_schema(),
            FirePolicy::ProcessingTime,
        )
        .unwrap();
        assert_eq!(resolved.fire, FirePolicy::ProcessingTime);

        let resolved = ResolvedView::resolve(
            definition()
                .aggregate(AggregateSpec::count("n"))
                .fire_policy(FirePolicy::event_time()),
            &source_schema(),
            FirePolicy::ProcessingTime,
        )
        .unwrap();
        assert_eq!(resolved.fire, FirePolicy::event_time());
    }
}
