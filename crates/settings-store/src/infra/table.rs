//! Settings table accessor.
//!
//! Scope columns are declared at deployment time, so statements are built
//! with sea-query against `Alias` identifiers instead of a generated entity.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Asterisk, ColumnDef, ConditionalStatement, Expr, Func, Index, Order, Query, SimpleExpr,
    Table,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult, Statement, StatementBuilder, Value};

use common::{AppError, AppResult};
use domain::{
    Scope, ScopeKind, ScopeValue, SettingRow, TableSchema, COLUMN_ID, COLUMN_KEY, COLUMN_VALUE,
};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Equality filter over the key and scope columns, AND-composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Restrict to one key; `None` matches every key
    pub key: Option<String>,
    pub scope: Scope,
}

impl RowFilter {
    /// Match a single key within a scope.
    pub fn key(key: impl Into<String>, scope: &Scope) -> Self {
        Self {
            key: Some(key.into()),
            scope: scope.clone(),
        }
    }

    /// Match every key within a scope.
    pub fn scope(scope: &Scope) -> Self {
        Self {
            key: None,
            scope: scope.clone(),
        }
    }
}

/// Table operations the repository is built on.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SettingsTable: Send + Sync {
    /// Count rows matching the filter
    async fn count(&self, filter: &RowFilter) -> AppResult<u64>;

    /// Value column of the first matching row (outer `None` = no row)
    async fn value(&self, filter: &RowFilter) -> AppResult<Option<Option<String>>>;

    /// Insert a row; its scope supplies the extra column values
    async fn insert(&self, row: &SettingRow) -> AppResult<()>;

    /// Set the value column on every matching row
    async fn update(&self, filter: &RowFilter, value: Option<String>) -> AppResult<u64>;

    /// Delete every matching row
    async fn delete(&self, filter: &RowFilter) -> AppResult<u64>;

    /// Delete every row in the table
    async fn truncate(&self) -> AppResult<u64>;

    /// All matching rows in insertion order
    async fn rows(&self, filter: &RowFilter) -> AppResult<Vec<SettingRow>>;
}

/// SQL implementation of [`SettingsTable`] on a sea-orm connection.
pub struct SqlTable {
    db: Arc<DatabaseConnection>,
    schema: TableSchema,
}

impl SqlTable {
    /// Create an accessor for the table described by `schema`.
    pub fn new(db: Arc<DatabaseConnection>, schema: TableSchema) -> AppResult<Self> {
        schema.validate()?;
        Ok(Self { db, schema })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Create the table and its key index if they do not exist yet.
    pub async fn ensure_schema(&self) -> AppResult<()> {
        let mut create = Table::create();
        create
            .table(self.table())
            .if_not_exists()
            .col(
                ColumnDef::new(Alias::new(COLUMN_ID))
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Alias::new(COLUMN_KEY)).string().not_null())
            .col(ColumnDef::new(Alias::new(COLUMN_VALUE)).text().null());

        for column in &self.schema.scope_columns {
            let mut def = ColumnDef::new(Alias::new(&column.name));
            match column.kind {
                ScopeKind::Integer => def.big_integer(),
                ScopeKind::Text => def.string(),
                ScopeKind::Boolean => def.boolean(),
            };
            def.null();
            create.col(&mut def);
        }

        self.db.execute(self.build(&create)).await?;

        let index = Index::create()
            .if_not_exists()
            .name(format!("idx_{}_key", self.schema.table))
            .table(self.table())
            .col(Alias::new(COLUMN_KEY))
            .to_owned();
        self.db.execute(self.build(&index)).await?;

        tracing::info!(table = %self.schema.table, "Settings table ready");
        Ok(())
    }

    fn table(&self) -> Alias {
        Alias::new(&self.schema.table)
    }

    fn build<S: StatementBuilder>(&self, stmt: &S) -> Statement {
        self.db.get_database_backend().build(stmt)
    }

    /// Add the filter's conditions to a statement, rejecting undeclared scope columns.
    fn apply_filter<S: ConditionalStatement>(&self, stmt: &mut S, filter: &RowFilter) -> AppResult<()> {
        self.schema.validate_scope(&filter.scope)?;

        if let Some(key) = &filter.key {
            stmt.and_where(Expr::col(Alias::new(COLUMN_KEY)).eq(key.as_str()));
        }
        for (column, value) in filter.scope.iter() {
            stmt.and_where(Expr::col(Alias::new(column)).eq(sql_value(value)));
        }

        Ok(())
    }

    fn read_row(&self, row: &QueryResult) -> AppResult<SettingRow> {
        let key: String = row.try_get("", COLUMN_KEY)?;
        let value: Option<String> = row.try_get("", COLUMN_VALUE)?;

        let mut scope = Scope::new();
        for column in &self.schema.scope_columns {
            let value = match column.kind {
                ScopeKind::Integer => row
                    .try_get::<Option<i64>>("", &column.name)?
                    .map(ScopeValue::Integer),
                ScopeKind::Text => row
                    .try_get::<Option<String>>("", &column.name)?
                    .map(ScopeValue::Text),
                ScopeKind::Boolean => row
                    .try_get::<Option<bool>>("", &column.name)?
                    .map(ScopeValue::Boolean),
            };
            if let Some(value) = value {
                scope = scope.with(column.name.as_str(), value);
            }
        }

        Ok(SettingRow { key, value, scope })
    }
}

#[async_trait]
impl SettingsTable for SqlTable {
    async fn count(&self, filter: &RowFilter) -> AppResult<u64> {
        let mut select = Query::select();
        select
            .from(self.table())
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("total"));
        self.apply_filter(&mut select, filter)?;

        let total = match self.db.query_one(self.build(&select)).await? {
            Some(row) => row.try_get::<i64>("", "total")?,
            None => 0,
        };

        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn value(&self, filter: &RowFilter) -> AppResult<Option<Option<String>>> {
        let mut select = Query::select();
        select
            .from(self.table())
            .column(Alias::new(COLUMN_VALUE))
            .order_by(Alias::new(COLUMN_ID), Order::Asc)
            .limit(1);
        self.apply_filter(&mut select, filter)?;

        match self.db.query_one(self.build(&select)).await? {
            Some(row) => Ok(Some(row.try_get::<Option<String>>("", COLUMN_VALUE)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, row: &SettingRow) -> AppResult<()> {
        self.schema.validate_scope(&row.scope)?;

        let mut columns = vec![Alias::new(COLUMN_KEY), Alias::new(COLUMN_VALUE)];
        let mut values: Vec<SimpleExpr> = vec![row.key.as_str().into(), row.value.clone().into()];
        for (column, value) in row.scope.iter() {
            columns.push(Alias::new(column));
            values.push(sql_value(value).into());
        }

        let mut insert = Query::insert();
        insert.into_table(self.table()).columns(columns);
        insert
            .values(values)
            .map_err(|e| AppError::internal(format!("Invalid insert statement: {}", e)))?;

        self.db.execute(self.build(&insert)).await?;
        Ok(())
    }

    async fn update(&self, filter: &RowFilter, value: Option<String>) -> AppResult<u64> {
        let mut update = Query::update();
        update
            .table(self.table())
            .value(Alias::new(COLUMN_VALUE), value);
        self.apply_filter(&mut update, filter)?;

        let result = self.db.execute(self.build(&update)).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, filter: &RowFilter) -> AppResult<u64> {
        let mut delete = Query::delete();
        delete.from_table(self.table());
        self.apply_filter(&mut delete, filter)?;

        let result = self.db.execute(self.build(&delete)).await?;
        Ok(result.rows_affected())
    }

    async fn truncate(&self) -> AppResult<u64> {
        // Plain DELETE: SQLite has no TRUNCATE statement.
        let delete = Query::delete().from_table(self.table()).to_owned();

        let result = self.db.execute(self.build(&delete)).await?;
        Ok(result.rows_affected())
    }

    async fn rows(&self, filter: &RowFilter) -> AppResult<Vec<SettingRow>> {
        let mut select = Query::select();
        select
            .from(self.table())
            .column(Alias::new(COLUMN_KEY))
            .column(Alias::new(COLUMN_VALUE));
        for column in &self.schema.scope_columns {
            select.column(Alias::new(&column.name));
        }
        select.order_by(Alias::new(COLUMN_ID), Order::Asc);
        self.apply_filter(&mut select, filter)?;

        self.db
            .query_all(self.build(&select))
            .await?
            .iter()
            .map(|row| self.read_row(row))
            .collect()
    }
}

fn sql_value(value: &ScopeValue) -> Value {
    match value {
        ScopeValue::Integer(v) => Value::from(*v),
        ScopeValue::Text(v) => Value::from(v.clone()),
        ScopeValue::Boolean(v) => Value::from(*v),
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    fn tenant_schema() -> TableSchema {
        TableSchema::new("settings").with_scope_column("tenant_id", ScopeKind::Integer)
    }

    #[test]
    fn test_row_filter_constructors() {
        let scope = Scope::from([("tenant_id", 1)]);

        assert_eq!(RowFilter::key("key", &scope).key.as_deref(), Some("key"));
        assert_eq!(RowFilter::scope(&scope).key, None);
        assert_eq!(RowFilter::scope(&scope).scope, scope);
    }

    #[test]
    fn test_new_rejects_invalid_schema() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Sqlite).into_connection());
        let schema = TableSchema::new("settings").with_scope_column("value", ScopeKind::Text);

        assert!(matches!(SqlTable::new(db, schema), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_undeclared_scope_column_is_rejected_before_querying() {
        // No query results are queued, so reaching the database would fail differently.
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Sqlite).into_connection());
        let table = SqlTable::new(db, tenant_schema()).unwrap();

        let filter = RowFilter::key("key", &Scope::from([("region", "eu")]));

        assert!(matches!(table.count(&filter).await, Err(AppError::Validation(_))));
        assert!(matches!(table.delete(&filter).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_reports_rows_affected() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                }])
                .into_connection(),
        );
        let table = SqlTable::new(db, tenant_schema()).unwrap();

        let affected = table
            .update(&RowFilter::key("key", &Scope::new()), Some("v".to_string()))
            .await
            .unwrap();

        assert_eq!(affected, 2);
    }
}
