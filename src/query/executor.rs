//! Query execution.
//!
//! Drives one logical query end to end: plan the access path, obtain a
//! transaction through the coordinator (reusing the connection's active one
//! when possible), run the cursor to completion, and commit only if this
//! call opened the transaction. An engine failure mid-scan aborts a
//! transaction this call owns and propagates unchanged.

use tracing::debug;

use crate::engine::RowCursor;
use crate::filter::{self, Filter};
use crate::row::Row;
use crate::txn::{BeginOptions, Connection, Transaction};

use super::errors::QueryResult;
use super::planner::{plan, AccessPath};
use super::result::{Provenance, ResultSet};

/// Runs a cursor to exhaustion.
async fn drain(mut cursor: Box<dyn RowCursor>) -> QueryResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.advance().await.map_err(crate::txn::TxnError::from)? {
        rows.push(row);
    }
    Ok(rows)
}

async fn collect(
    txn: &Transaction,
    table_name: &str,
    path: &AccessPath,
    filter: &Filter,
) -> QueryResult<(Vec<Row>, Provenance)> {
    let store = txn.store(table_name)?;
    match path {
        AccessPath::FullScan => {
            let rows = drain(store.open_cursor(None).await?).await?;
            Ok((rows, Provenance::Scan))
        }
        AccessPath::KeyLookup(range) => {
            let rows = drain(store.open_cursor(Some(range.clone())).await?).await?;
            Ok((rows, Provenance::ByKey))
        }
        AccessPath::IndexLookup { index, range } => {
            let rows = drain(store.open_index_cursor(index, Some(range.clone())).await?).await?;
            Ok((rows, Provenance::ByIndex))
        }
        AccessPath::FilteredScan => {
            let mut cursor = store.open_cursor(None).await?;
            let mut rows = Vec::new();
            while let Some(row) = cursor.advance().await.map_err(crate::txn::TxnError::from)? {
                if filter::matches(&row, filter) {
                    rows.push(row);
                }
            }
            Ok((rows, Provenance::Scan))
        }
    }
}

/// Resolves a simple (non-compound) query against one table.
pub(super) async fn run_simple(
    conn: &Connection,
    table_name: &str,
    filter: &Filter,
) -> QueryResult<ResultSet> {
    let table = conn.table(table_name)?;
    let path = plan(table, filter);
    debug!(table = table_name, path = path.as_str(), "planned access path");

    let owned = conn.current_transaction().is_none();
    let txn = conn
        .begin(BeginOptions::read_only().with_scope([table_name]))
        .await?;

    match collect(&txn, table_name, &path, filter).await {
        Ok((rows, provenance)) => {
            if owned {
                txn.commit().await?;
            }
            Ok(ResultSet::new(rows, provenance))
        }
        Err(err) => {
            // Only a transaction this call opened is ours to tear down.
            if owned {
                let _ = txn.abort().await;
            }
            Err(err)
        }
    }
}
