use sqlx::sqlite::SqliteRow;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

use super::entity::Entity;
use crate::error::StoreError;
use crate::store::StoreContext;
use crate::value::{self, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn operator(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "ASC"),
            Direction::Descending => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub attribute: String,
    pub comparison: Comparison,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub attribute: String,
    pub direction: Direction,
}

/// Filter, ordering and limit for [`Repository::fetch_all`].
///
/// Predicates are combined with AND. An empty request fetches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<u32>,
}

impl FetchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, attribute: &str, comparison: Comparison, value: Value) -> Self {
        self.predicates.push(Predicate {
            attribute: attribute.to_string(),
            comparison,
            value,
        });
        self
    }

    pub fn order_by(mut self, attribute: &str, direction: Direction) -> Self {
        self.order_by.push(SortKey {
            attribute: attribute.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Renders the request against `E`'s table, checking every attribute
    /// name and value type. Returns the SQL and its parameters in order.
    fn to_sql<E: Entity>(&self) -> Result<(String, Vec<Value>), StoreError> {
        let mut sql = format!("SELECT {} FROM {}", column_list::<E>(), E::TABLE);
        let mut params = Vec::new();

        let mut clauses = Vec::new();
        for predicate in &self.predicates {
            let attribute = E::attribute(&predicate.attribute)
                .ok_or_else(|| StoreError::unknown_attribute(E::NAME, &predicate.attribute))?;
            if !predicate.value.matches(attribute.kind) {
                return Err(StoreError::invalid_value(E::NAME, attribute.name, attribute.kind));
            }
            let clause = match (&predicate.value, predicate.comparison) {
                (Value::Null, Comparison::Eq) => format!("{} IS NULL", attribute.name),
                (Value::Null, Comparison::Ne) => format!("{} IS NOT NULL", attribute.name),
                (Value::Null, _) => {
                    return Err(StoreError::invalid_value(E::NAME, attribute.name, attribute.kind))
                }
                (value, comparison) => {
                    params.push(value.clone());
                    format!("{} {} ?", attribute.name, comparison.operator())
                }
            };
            clauses.push(clause);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let mut keys = Vec::new();
            for key in &self.order_by {
                let attribute = E::attribute(&key.attribute)
                    .ok_or_else(|| StoreError::unknown_attribute(E::NAME, &key.attribute))?;
                keys.push(format!("{} {}", attribute.name, key.direction));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok((sql, params))
    }
}

/// Typed access to one entity's table. Every call runs as one job on the
/// store's context and yields exactly one result.
pub struct Repository<E: Entity> {
    context: StoreContext,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self::new(self.context.clone())
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(context: StoreContext) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    /// Inserts `entity`, replacing any stored row with the same id.
    pub async fn save(&self, entity: &E) -> Result<Uuid, StoreError> {
        let entity = entity.clone();
        self.context
            .perform(move |pool| async move {
                let mut conn = pool.acquire().await?;
                upsert(&mut *conn, &entity).await?;
                Ok(entity.id())
            })
            .await
    }

    pub async fn fetch(&self, id: Uuid) -> Result<Option<E>, StoreError> {
        self.context
            .perform(move |pool| async move {
                let sql = format!("SELECT {} FROM {} WHERE id = ?", column_list::<E>(), E::TABLE);
                let row = sqlx::query(&sql)
                    .bind(id.to_string())
                    .fetch_optional(&pool)
                    .await?;
                row.map(|row| decode::<E>(&row)).transpose()
            })
            .await
    }

    pub async fn fetch_all(&self, request: FetchRequest) -> Result<Vec<E>, StoreError> {
        let (sql, params) = request.to_sql::<E>()?;
        self.context
            .perform(move |pool| async move { select::<E>(&pool, &sql, &params).await })
            .await
    }

    /// Deletes the row with `id`. Returns false if there was none.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.context
            .perform(move |pool| async move {
                let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
                let result = sqlx::query(&sql)
                    .bind(id.to_string())
                    .execute(&pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        self.context
            .perform(|pool| async move {
                let mut conn = pool.acquire().await?;
                count::<E>(&mut *conn).await
            })
            .await
    }
}

fn column_list<E: Entity>() -> String {
    E::attributes()
        .iter()
        .map(|a| a.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode<E: Entity>(row: &SqliteRow) -> Result<E, StoreError> {
    let record = value::decode_row(
        E::NAME,
        E::attributes().iter().map(|a| (a.name, a.kind)),
        row,
    )?;
    E::from_record(&record)
}

// Pool-level helpers for code that already runs on the store's worker.

pub(crate) async fn upsert<E: Entity>(conn: &mut SqliteConnection, entity: &E) -> Result<(), StoreError> {
    let columns = column_list::<E>();
    let placeholders = vec!["?"; E::attributes().len()].join(", ");
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        E::TABLE,
        columns,
        placeholders
    );

    let mut query = sqlx::query(&sql);
    for attribute in E::attributes() {
        query = value::bind_value(query, &(attribute.get)(entity));
    }
    query.execute(conn).await?;
    Ok(())
}

pub(crate) async fn select<E: Entity>(
    pool: &SqlitePool,
    sql: &str,
    params: &[Value],
) -> Result<Vec<E>, StoreError> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = value::bind_value(query, param);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(decode::<E>).collect()
}

pub(crate) async fn count<E: Entity>(conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {}", E::TABLE);
    let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(conn).await?;
    Ok(count)
}
