//! Query builder for stored connections.
//!
//! # Example
//!
//! ```
//! use headwatch_store::{ConnectionQuery, Store};
//!
//! let store = Store::open_in_memory()?;
//!
//! // Timeline of one day
//! let day = ConnectionQuery::new().date("2024-05-01");
//! let sessions = store.query_connections(&day)?;
//!
//! // Most recent sessions of one device
//! let recent = ConnectionQuery::new().device("Buds").newest_first().limit(5);
//! let sessions = store.query_connections(&recent)?;
//! # Ok::<(), headwatch_store::Error>(())
//! ```

/// Fluent query builder for [`Store::query_connections`](crate::Store::query_connections).
///
/// By default results are ordered by `connected_time` ascending
/// (chronological), which is the order a day timeline is drawn in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionQuery {
    /// Filter by calendar date (`YYYY-MM-DD`).
    pub date: Option<String>,
    /// Filter by device name.
    pub device_name: Option<String>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by connected_time descending.
    pub newest_first: bool,
}

impl ConnectionQuery {
    /// Create a query matching every stored connection, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only sessions that started on `date`.
    pub fn date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }

    /// Only sessions of `device_name`.
    pub fn device(mut self, device_name: &str) -> Self {
        self.device_name = Some(device_name.to_string());
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results newest first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref date) = self.date {
            conditions.push("date = ?");
            params.push(Box::new(date.clone()));
        }

        if let Some(ref device_name) = self.device_name {
            conditions.push("device_name = ?");
            params.push(Box::new(device_name.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_name, device_type, connected_time, disconnected_time, \
             duration, date FROM connections {} ORDER BY connected_time {}, id {}",
            where_clause, order, order
        );

        // SQLite only accepts OFFSET after a LIMIT.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        sql
    }
}
