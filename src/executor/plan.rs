//! Evaluation plans: scan, filter and project over one relation.
//!
//! A plan is a small tree. Filters are pushed down to `Relation::select`, so
//! only the final projection reads row bytes.

use crate::access::{Handle, Identifier, Relation, RelationError, RelationResult, Row};

pub enum EvalPlan<'a> {
    /// All rows of a relation. `None` scans nothing.
    TableScan(Option<&'a mut dyn Relation>),
    /// Rows equal to the predicate on every column it names.
    Filter(Box<EvalPlan<'a>>, Option<Row>),
    /// Narrows rows to the given columns, `None` keeps them all.
    Project(Box<EvalPlan<'a>>, Option<Vec<Identifier>>),
}

/// A resolved plan: the relation and the handles it selected.
pub struct EvalPipeline<'a> {
    pub relation: Option<&'a mut dyn Relation>,
    pub handles: Vec<Handle>,
}

impl<'a> EvalPipeline<'a> {
    fn empty() -> Self {
        Self {
            relation: None,
            handles: Vec::new(),
        }
    }
}

impl<'a> EvalPlan<'a> {
    pub fn table_scan(relation: &'a mut dyn Relation) -> Self {
        EvalPlan::TableScan(Some(relation))
    }

    pub fn empty() -> Self {
        EvalPlan::TableScan(None)
    }

    pub fn filter(self, predicate: Option<Row>) -> Self {
        EvalPlan::Filter(Box::new(self), predicate)
    }

    pub fn project(self, columns: Option<Vec<Identifier>>) -> Self {
        EvalPlan::Project(Box::new(self), columns)
    }

    /// Resolves the plan to its relation and the selected handles.
    pub fn pipeline(self) -> RelationResult<EvalPipeline<'a>> {
        match self {
            EvalPlan::TableScan(None) => Ok(EvalPipeline::empty()),
            EvalPlan::TableScan(Some(relation)) => {
                let handles = relation.select(None)?;
                Ok(EvalPipeline {
                    relation: Some(relation),
                    handles,
                })
            }
            EvalPlan::Filter(source, predicate) => match *source {
                EvalPlan::TableScan(None) => Ok(EvalPipeline::empty()),
                EvalPlan::TableScan(Some(relation)) => {
                    let handles = relation.select(predicate.as_ref())?;
                    Ok(EvalPipeline {
                        relation: Some(relation),
                        handles,
                    })
                }
                _ => Err(RelationError::NotSupported(
                    "filter must be applied directly to a table scan".to_string(),
                )),
            },
            EvalPlan::Project(..) => Err(RelationError::NotSupported(
                "a projection cannot be pipelined, evaluate it instead".to_string(),
            )),
        }
    }

    /// Runs the plan and returns the resulting rows.
    pub fn evaluate(self) -> RelationResult<Vec<Row>> {
        let (source, columns) = match self {
            EvalPlan::Project(source, columns) => (*source, columns),
            plan => (plan, None),
        };

        let EvalPipeline { relation, handles } = source.pipeline()?;
        match relation {
            Some(relation) => relation.project_all(&handles, columns.as_deref()),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{row, ColumnSchema, DataType, HeapTable, Value};
    use anyhow::Result;
    use tempfile::TempDir;

    fn setup() -> Result<(TempDir, HeapTable)> {
        let dir = tempfile::tempdir()?;
        let schema = ColumnSchema::from_pairs([
            ("id", DataType::Int),
            ("name", DataType::Text),
            ("active", DataType::Boolean),
        ])?;
        let mut table = HeapTable::new(dir.path(), "users", schema);
        table.create()?;

        for (id, name, active) in [(1, "Alice", true), (2, "Bob", false), (3, "Carol", true)] {
            table.insert(&row([
                ("id", Value::Int(id)),
                ("name", Value::from(name)),
                ("active", Value::Boolean(active)),
            ]))?;
        }
        Ok((dir, table))
    }

    #[test]
    fn test_table_scan() -> Result<()> {
        let (_dir, mut table) = setup()?;

        let rows = EvalPlan::table_scan(&mut table).evaluate()?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], Value::from("Alice"));
        assert_eq!(rows[2]["id"], Value::Int(3));
        Ok(())
    }

    #[test]
    fn test_filter_then_project() -> Result<()> {
        let (_dir, mut table) = setup()?;

        let rows = EvalPlan::table_scan(&mut table)
            .filter(Some(row([("active", Value::Boolean(true))])))
            .project(Some(vec!["name".to_string()]))
            .evaluate()?;

        assert_eq!(
            rows,
            vec![
                row([("name", Value::from("Alice"))]),
                row([("name", Value::from("Carol"))]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_pipeline_returns_filtered_handles() -> Result<()> {
        let (_dir, mut table) = setup()?;

        let pipeline = EvalPlan::table_scan(&mut table)
            .filter(Some(row([("id", Value::Int(2))])))
            .pipeline()?;
        assert_eq!(pipeline.handles.len(), 1);
        assert_eq!(pipeline.handles[0].record_id, 2);
        assert!(pipeline.relation.is_some());

        // a filter without a predicate keeps every row
        let pipeline = EvalPlan::table_scan(&mut table).filter(None).pipeline()?;
        assert_eq!(pipeline.handles.len(), 3);
        Ok(())
    }

    #[test]
    fn test_empty_scan() -> Result<()> {
        let rows = EvalPlan::empty()
            .filter(Some(row([("id", Value::Int(1))])))
            .project(None)
            .evaluate()?;
        assert!(rows.is_empty());
        Ok(())
    }

    #[test]
    fn test_unsupported_shapes() -> Result<()> {
        let (_dir, mut table) = setup()?;

        let nested = EvalPlan::table_scan(&mut table).filter(None).filter(None);
        assert!(matches!(
            nested.evaluate(),
            Err(RelationError::NotSupported(_))
        ));

        let projected = EvalPlan::table_scan(&mut table).project(None);
        assert!(matches!(
            projected.pipeline(),
            Err(RelationError::NotSupported(_))
        ));

        let filtered_projection = EvalPlan::table_scan(&mut table).project(None).filter(None);
        assert!(matches!(
            filtered_projection.pipeline(),
            Err(RelationError::NotSupported(_))
        ));
        Ok(())
    }

    #[test]
    fn test_project_unknown_column() -> Result<()> {
        let (_dir, mut table) = setup()?;

        let result = EvalPlan::table_scan(&mut table)
            .project(Some(vec!["email".to_string()]))
            .evaluate();
        assert!(matches!(result, Err(RelationError::UnknownColumn(_))));
        Ok(())
    }
}
