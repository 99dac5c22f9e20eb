//! Query builder.
//!
//! A query names a source table, an optional filter, and an optional join
//! target. Queries are built per call and discarded after use; they hold no
//! long-lived state.

use serde_json::Value;

use crate::filter::Filter;
use crate::row::Row;
use crate::txn::Connection;

use super::errors::QueryResult;
use super::executor::run_simple;
use super::join::left_outer_join;
use super::result::ResultSet;

/// Single-column join descriptor
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Table whose rows are aggregated onto each source row
    pub target_table: String,
    /// Join column on the source side
    pub source_column: String,
    /// Join column on the target side
    pub target_column: String,
}

/// A single logical query against one table.
pub struct Query<'c> {
    conn: &'c Connection,
    table: String,
    filter: Filter,
    join: Option<JoinSpec>,
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Starts a query against a table.
    pub fn query(&self, table: impl Into<String>) -> Query<'_> {
        Query {
            conn: self,
            table: table.into(),
            filter: Filter::empty(),
            join: None,
        }
    }
}

impl<'c> Query<'c> {
    /// Sets the filter
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Parses and sets a wire-grammar filter
    pub fn filter_json(self, filter: &Value) -> QueryResult<Self> {
        Ok(self.filter(Filter::parse(filter)?))
    }

    /// Attaches a join target, making the query compound.
    pub fn join(
        mut self,
        target_table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        self.join = Some(JoinSpec {
            target_table: target_table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        });
        self
    }

    /// Resolves the query.
    ///
    /// Simple queries return the planned row set directly. Compound queries
    /// resolve the source side first, then the target table (a missing
    /// target propagates as the table-lookup failure), then aggregate the
    /// target rows onto each source row under the field named
    /// `<target table>s`.
    pub async fn find(self) -> QueryResult<ResultSet> {
        let source = run_simple(self.conn, &self.table, &self.filter).await?;
        let Some(join) = self.join else {
            return Ok(source);
        };

        self.conn.table(&join.target_table)?;
        let target = run_simple(self.conn, &join.target_table, &self.filter).await?;
        let agg_name = format!("{}s", join.target_table);
        let rows = left_outer_join(
            source.rows(),
            target.rows(),
            &join.source_column,
            &join.target_column,
            &agg_name,
        );
        Ok(ResultSet::new(rows, source.provenance()))
    }

    /// Resolves the query ignoring any filter: a full scan of the source.
    pub async fn find_all(mut self) -> QueryResult<ResultSet> {
        self.filter = Filter::empty();
        self.find().await
    }

    /// Resolves the query and returns its first row, if any.
    pub async fn find_one(self) -> QueryResult<Option<Row>> {
        Ok(self.find().await?.into_rows().into_iter().next())
    }
}
