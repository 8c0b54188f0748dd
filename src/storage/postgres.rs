//! Postgres-backed `DataStoreGateway` implementation.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::filter::{compile_result_filter, compile_where, result_filter_target, split_result_filters, to_column_selection, SqlParam};
use crate::model::{Dataset, Filter, FilterParams, Variable};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::gateway::{DataStoreGateway, EqualityFilter, Extrema, FilteredData};
use crate::storage::histogram::{bucket_domain, snap_interval, Bucket, Histogram};

/// Expression standing in for a predicted-filter's column: text-compared for
/// categorical targets, cast to double for numeric ones.
fn predicted_filter_expr(dataset: &Dataset, target_key: &str) -> String {
    let numeric = dataset.variable(target_key).map(|v| v.semantic_type.is_numeric()).unwrap_or(false);
    if numeric {
        "cast(r.value as double precision)".to_string()
    } else {
        "r.value".to_string()
    }
}

fn residual_filter_expr(_dataset: &Dataset, target_key: &str) -> String {
    format!("(cast(r.value as double precision) - cast(d.\"{target_key}\" as double precision))")
}

fn correctness_filter_expr(_dataset: &Dataset, target_key: &str) -> String {
    format!("CASE WHEN r.value = cast(d.\"{target_key}\" as text) THEN 'correct' ELSE 'incorrect' END")
}

/// Compiles the generic filters (applied to `d.`) plus whichever single
/// predicted/residual/correctness filter is present (applied to the joined
/// `r.value`/derived expression), starting the `$n` cursor at `cursor_start`.
fn compile_joined_filters(
    dataset: &Dataset,
    filter_params: &FilterParams,
    cursor_start: usize,
) -> StorageResult<(String, Vec<SqlParam>)> {
    let split = split_result_filters(&filter_params.filters).map_err(|e| StorageError::Other(e.to_string()))?;
    let generic: Vec<Filter> = split.generic.into_iter().cloned().collect();
    let (generic_sql, generic_params) =
        compile_where(&generic, dataset, cursor_start).map_err(|e| StorageError::Other(e.to_string()))?;

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let mut cursor = cursor_start;
    if !generic_sql.is_empty() {
        cursor += generic_params.len();
        clauses.push(generic_sql);
        params.extend(generic_params);
    }

    for (filter, expr_fn) in [
        (split.predicted, predicted_filter_expr as fn(&Dataset, &str) -> String),
        (split.residual, residual_filter_expr as fn(&Dataset, &str) -> String),
        (split.correctness, correctness_filter_expr as fn(&Dataset, &str) -> String),
    ] {
        if let Some(filter) = filter {
            let target_key = result_filter_target(filter).unwrap_or_default();
            let expr = expr_fn(dataset, target_key);
            let (clause, consumed) =
                compile_result_filter(filter, &expr, cursor).map_err(|e| StorageError::Other(e.to_string()))?;
            cursor += consumed.len();
            params.extend(consumed);
            clauses.push(clause);
        }
    }

    Ok((clauses.join(" AND "), params))
}

pub struct PostgresGateway {
    pool: PgPool,
}

impl PostgresGateway {
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn bind_all<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        params: &'q [SqlParam],
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        for p in params {
            query = match p {
                SqlParam::Text(s) => query.bind(s.as_str()),
                SqlParam::Float(f) => query.bind(f),
                SqlParam::Int(i) => query.bind(i),
            };
        }
        query
    }

    async fn rows_to_filtered_data(
        &self,
        sql: &str,
        params: &[SqlParam],
        columns: Vec<String>,
    ) -> StorageResult<FilteredData> {
        let query = Self::bind_all(sqlx::query(sql), params);
        let pg_rows = query.fetch_all(&self.pool).await?;
        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut row = Vec::with_capacity(columns.len());
            for (i, _) in columns.iter().enumerate() {
                let value: Option<String> = pg_row.try_get(i).ok();
                row.push(value.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null));
            }
            rows.push(row);
        }
        Ok(FilteredData { columns, rows })
    }
}

#[async_trait]
impl DataStoreGateway for PostgresGateway {
    async fn fetch_rows(
        &self,
        dataset: &Dataset,
        filter_params: &FilterParams,
        invert: bool,
    ) -> StorageResult<FilteredData> {
        if invert && filter_params.filters.is_empty() {
            let columns = to_column_selection(&filter_params.filters, dataset);
            return Ok(FilteredData { columns, rows: Vec::new() });
        }

        let columns = if filter_params.variables.is_empty() {
            to_column_selection(&filter_params.filters, dataset)
        } else {
            filter_params.variables.clone()
        };
        let (where_clause, params) = compile_where(&filter_params.filters, dataset, 1)
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let index_key = dataset
            .index_variable()
            .map(|v| v.key.clone())
            .unwrap_or_else(|| "d3mIndex".to_string());

        let projection = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT {projection} FROM \"{}\"", dataset.storage_name);
        if !where_clause.is_empty() {
            if invert {
                sql.push_str(&format!(" WHERE NOT ({where_clause})"));
            } else {
                sql.push_str(&format!(" WHERE {where_clause}"));
            }
        }
        sql.push_str(&format!(" ORDER BY \"{index_key}\" LIMIT {}", filter_params.size));

        self.rows_to_filtered_data(&sql, &params, columns).await
    }

    async fn fetch_num_rows(&self, table: &str, equality_filters: &[EqualityFilter]) -> StorageResult<i64> {
        let mut sql = format!("SELECT count(*) FROM \"{table}\"");
        let mut params = Vec::new();
        if !equality_filters.is_empty() {
            let clauses: Vec<String> = equality_filters
                .iter()
                .enumerate()
                .map(|(i, f)| format!("\"{}\" = ${}", f.column, i + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            params.extend(equality_filters.iter().map(|f| f.value.clone()));
        }
        let query = Self::bind_all(sqlx::query(&sql), &params);
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn fetch_variable_summary(
        &self,
        dataset: &Dataset,
        variable: &Variable,
        filter_params: &FilterParams,
        result_uri: Option<&str>,
    ) -> StorageResult<Histogram> {
        let _ = result_uri;
        if variable.semantic_type.is_numeric() {
            let extrema = self.fetch_extrema(dataset, variable, result_uri).await;
            let extrema = match extrema {
                Ok(e) => e,
                Err(StorageError::NoData) => return Ok(Histogram::Empty),
                Err(e) => return Err(e),
            };
            if (extrema.max - extrema.min).abs() < f64::EPSILON {
                return Ok(Histogram::Numerical {
                    buckets: vec![Bucket { key: extrema.min.to_string(), count: 0 }],
                    interval: 0.0,
                    min: extrema.min,
                    max: extrema.max,
                });
            }
            let interval = snap_interval(extrema.min, extrema.max);
            let (bucket_min, bucket_max, count) = bucket_domain(extrema.min, extrema.max, interval);

            let (where_clause, params) = compile_where(&filter_params.filters, dataset, 2)
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let mut sql = format!(
                "SELECT width_bucket(cast(\"{key}\" as double precision), $1, $1 + {span}, {count}) AS bucket, count(*) \
                 FROM \"{table}\"",
                key = variable.key,
                span = bucket_max - bucket_min,
                count = count,
                table = dataset.storage_name,
            );
            if !where_clause.is_empty() {
                sql.push_str(&format!(" WHERE {where_clause}"));
            }
            sql.push_str(" GROUP BY bucket ORDER BY bucket");

            let mut full_params = vec![SqlParam::Float(bucket_min)];
            full_params.extend(params);
            let query = Self::bind_all(sqlx::query(&sql), &full_params);
            let pg_rows = query.fetch_all(&self.pool).await?;

            let mut buckets = vec![0u64; count as usize];
            for row in &pg_rows {
                let idx: i32 = row.try_get("bucket")?;
                let n: i64 = row.try_get(1)?;
                let idx = idx.clamp(1, count as i32) as usize - 1;
                buckets[idx] += n as u64;
            }
            let named = buckets
                .into_iter()
                .enumerate()
                .map(|(i, count)| Bucket {
                    key: format!("{}", bucket_min + interval * i as f64),
                    count,
                })
                .collect();
            Ok(Histogram::Numerical { buckets: named, interval, min: bucket_min, max: bucket_max })
        } else {
            let (where_clause, params) = compile_where(&filter_params.filters, dataset, 1)
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let mut sql = format!(
                "SELECT \"{key}\" AS key, count(*) AS count FROM \"{table}\"",
                key = variable.key,
                table = dataset.storage_name,
            );
            if !where_clause.is_empty() {
                sql.push_str(&format!(" WHERE {where_clause}"));
            }
            sql.push_str(&format!(
                " GROUP BY \"{}\" ORDER BY count DESC, \"{}\" ASC LIMIT 10",
                variable.key, variable.key
            ));
            let query = Self::bind_all(sqlx::query(&sql), &params);
            let pg_rows = query.fetch_all(&self.pool).await?;
            let buckets = pg_rows
                .iter()
                .map(|row| -> StorageResult<Bucket> {
                    let key: String = row.try_get::<Option<String>, _>("key")?.unwrap_or_default();
                    let count: i64 = row.try_get("count")?;
                    Ok(Bucket { key, count: count as u64 })
                })
                .collect::<StorageResult<Vec<_>>>()?;
            Ok(Histogram::Categorical { buckets })
        }
    }

    async fn fetch_extrema(
        &self,
        dataset: &Dataset,
        variable: &Variable,
        result_uri: Option<&str>,
    ) -> StorageResult<Extrema> {
        let table = result_uri
            .map(|_| format!("{}_result", dataset.storage_name))
            .unwrap_or_else(|| dataset.storage_name.clone());
        let sql = format!(
            "SELECT min(cast(\"{key}\" as double precision)), max(cast(\"{key}\" as double precision)) FROM \"{table}\"",
            key = variable.key,
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let min: Option<f64> = row.try_get(0)?;
        let max: Option<f64> = row.try_get(1)?;
        match (min, max) {
            (None, None) => Err(StorageError::NoData),
            (Some(min), Some(max)) => Ok(Extrema { min, max }),
            (Some(v), None) | (None, Some(v)) => Ok(Extrema { min: v, max: v }),
        }
    }

    async fn persist_result(&self, dataset: &Dataset, result_uri: &str, result_id: &str) -> StorageResult<u64> {
        let rows = crate::ingest::parse_result_csv(result_uri).await?;
        let table = format!("{}_result", dataset.storage_name);
        let mut inserted = 0u64;
        let mut tx = self.pool.begin().await?;
        for row in &rows.rows {
            let sql = format!(
                "INSERT INTO \"{table}\" (result_id, row_index, target, value) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (result_id, row_index) DO NOTHING"
            );
            let result = sqlx::query(&sql)
                .bind(result_id)
                .bind(row.row_index)
                .bind(&row.target_name)
                .bind(&row.value)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn fetch_results(
        &self,
        dataset: &Dataset,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<FilteredData> {
        let index_key = dataset
            .index_variable()
            .map(|v| v.key.clone())
            .unwrap_or_else(|| "d3mIndex".to_string());
        let result_table = format!("{}_result", dataset.storage_name);

        let columns = if filter_params.variables.is_empty() {
            to_column_selection(&filter_params.filters, dataset)
        } else {
            filter_params.variables.clone()
        };
        let projection = columns
            .iter()
            .map(|c| format!("d.\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT {projection}, r.value FROM \"{data}\" d JOIN \"{result}\" r \
             ON d.\"{index}\" = r.row_index AND r.result_id = $1",
            data = dataset.storage_name,
            result = result_table,
            index = index_key,
        );
        let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 2)?;
        let mut params = vec![SqlParam::Text(result_id.to_string())];
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
            params.extend(where_params);
        }
        let mut out_columns = columns;
        out_columns.push("value".to_string());
        self.rows_to_filtered_data(&sql, &params, out_columns).await
    }

    async fn fetch_predicted_summary(
        &self,
        dataset: &Dataset,
        target: &Variable,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<Histogram> {
        let index_key = dataset
            .index_variable()
            .map(|v| v.key.clone())
            .unwrap_or_else(|| "d3mIndex".to_string());
        let join = format!(
            "FROM \"{data}\" d JOIN \"{result}_result\" r ON d.\"{index}\" = r.row_index AND r.result_id = $1",
            data = dataset.storage_name,
            result = dataset.storage_name,
            index = index_key,
        );

        if target.semantic_type.is_numeric() {
            let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 2)?;
            let mut extrema_sql =
                format!("SELECT min(cast(r.value as double precision)), max(cast(r.value as double precision)) {join}");
            if !where_clause.is_empty() {
                extrema_sql.push_str(&format!(" WHERE {where_clause}"));
            }
            let mut extrema_params = vec![SqlParam::Text(result_id.to_string())];
            extrema_params.extend(where_params);
            let query = Self::bind_all(sqlx::query(&extrema_sql), &extrema_params);
            let row = query.fetch_one(&self.pool).await?;
            let (min, max) = match (row.try_get::<Option<f64>, _>(0)?, row.try_get::<Option<f64>, _>(1)?) {
                (Some(min), Some(max)) => (min, max),
                _ => return Ok(Histogram::Empty),
            };
            if (max - min).abs() < f64::EPSILON {
                return Ok(Histogram::Numerical {
                    buckets: vec![Bucket { key: min.to_string(), count: 0 }],
                    interval: 0.0,
                    min,
                    max,
                });
            }
            let interval = snap_interval(min, max);
            let (bucket_min, bucket_max, count) = bucket_domain(min, max, interval);

            let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 3)?;
            let mut sql = format!(
                "SELECT width_bucket(cast(r.value as double precision), $2, $2 + {span}, {count}) AS bucket, count(*) {join}",
                span = bucket_max - bucket_min,
            );
            if !where_clause.is_empty() {
                sql.push_str(&format!(" WHERE {where_clause}"));
            }
            sql.push_str(" GROUP BY bucket ORDER BY bucket");
            let mut params = vec![SqlParam::Text(result_id.to_string()), SqlParam::Float(bucket_min)];
            params.extend(where_params);
            let query = Self::bind_all(sqlx::query(&sql), &params);
            let pg_rows = query.fetch_all(&self.pool).await?;
            Ok(Histogram::Numerical {
                buckets: bucketed_counts(&pg_rows, bucket_min, interval, count)?,
                interval,
                min: bucket_min,
                max: bucket_max,
            })
        } else {
            let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 2)?;
            let mut sql = format!("SELECT r.value AS key, count(*) AS count {join}");
            if !where_clause.is_empty() {
                sql.push_str(&format!(" WHERE {where_clause}"));
            }
            sql.push_str(" GROUP BY r.value ORDER BY count DESC, r.value ASC LIMIT 10");
            let mut params = vec![SqlParam::Text(result_id.to_string())];
            params.extend(where_params);
            let query = Self::bind_all(sqlx::query(&sql), &params);
            let pg_rows = query.fetch_all(&self.pool).await?;
            Ok(Histogram::Categorical { buckets: named_counts(&pg_rows)? })
        }
    }

    async fn fetch_residual_summary(
        &self,
        dataset: &Dataset,
        target: &Variable,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<Histogram> {
        let index_key = dataset
            .index_variable()
            .map(|v| v.key.clone())
            .unwrap_or_else(|| "d3mIndex".to_string());
        let join = format!(
            "FROM \"{data}\" d JOIN \"{result}_result\" r ON d.\"{index}\" = r.row_index AND r.result_id = $1",
            data = dataset.storage_name,
            result = dataset.storage_name,
            index = index_key,
        );
        let residual = format!("(cast(r.value as double precision) - cast(d.\"{}\" as double precision))", target.key);

        let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 2)?;
        let mut extrema_sql = format!("SELECT min({residual}), max({residual}) {join}");
        if !where_clause.is_empty() {
            extrema_sql.push_str(&format!(" WHERE {where_clause}"));
        }
        let mut extrema_params = vec![SqlParam::Text(result_id.to_string())];
        extrema_params.extend(where_params);
        let query = Self::bind_all(sqlx::query(&extrema_sql), &extrema_params);
        let row = query.fetch_one(&self.pool).await?;
        let (min, max) = match (row.try_get::<Option<f64>, _>(0)?, row.try_get::<Option<f64>, _>(1)?) {
            (Some(min), Some(max)) => (min, max),
            _ => return Ok(Histogram::Empty),
        };
        if (max - min).abs() < f64::EPSILON {
            return Ok(Histogram::Numerical {
                buckets: vec![Bucket { key: min.to_string(), count: 0 }],
                interval: 0.0,
                min,
                max,
            });
        }
        let interval = snap_interval(min, max);
        let (bucket_min, bucket_max, count) = bucket_domain(min, max, interval);

        let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 3)?;
        let mut sql = format!(
            "SELECT width_bucket({residual}, $2, $2 + {span}, {count}) AS bucket, count(*) {join}",
            span = bucket_max - bucket_min,
        );
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        sql.push_str(" GROUP BY bucket ORDER BY bucket");
        let mut params = vec![SqlParam::Text(result_id.to_string()), SqlParam::Float(bucket_min)];
        params.extend(where_params);
        let query = Self::bind_all(sqlx::query(&sql), &params);
        let pg_rows = query.fetch_all(&self.pool).await?;
        Ok(Histogram::Numerical {
            buckets: bucketed_counts(&pg_rows, bucket_min, interval, count)?,
            interval,
            min: bucket_min,
            max: bucket_max,
        })
    }

    async fn fetch_correctness_summary(
        &self,
        dataset: &Dataset,
        target: &Variable,
        result_id: &str,
        filter_params: &FilterParams,
    ) -> StorageResult<Histogram> {
        let index_key = dataset
            .index_variable()
            .map(|v| v.key.clone())
            .unwrap_or_else(|| "d3mIndex".to_string());
        let join = format!(
            "FROM \"{data}\" d JOIN \"{result}_result\" r ON d.\"{index}\" = r.row_index AND r.result_id = $1",
            data = dataset.storage_name,
            result = dataset.storage_name,
            index = index_key,
        );
        let correctness = format!("CASE WHEN r.value = cast(d.\"{}\" as text) THEN 'correct' ELSE 'incorrect' END", target.key);

        let (where_clause, where_params) = compile_joined_filters(dataset, filter_params, 2)?;
        let mut sql = format!("SELECT {correctness} AS key, count(*) AS count {join}");
        if !where_clause.is_empty() {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        sql.push_str(&format!(" GROUP BY {correctness}"));
        let mut params = vec![SqlParam::Text(result_id.to_string())];
        params.extend(where_params);
        let query = Self::bind_all(sqlx::query(&sql), &params);
        let pg_rows = query.fetch_all(&self.pool).await?;

        let mut counts = [("correct".to_string(), 0u64), ("incorrect".to_string(), 0u64)].into_iter().collect::<std::collections::HashMap<_, _>>();
        for row in &pg_rows {
            let key: String = row.try_get("key")?;
            let count: i64 = row.try_get("count")?;
            counts.insert(key, count as u64);
        }
        Ok(Histogram::Categorical {
            buckets: vec![
                Bucket { key: "correct".to_string(), count: counts["correct"] },
                Bucket { key: "incorrect".to_string(), count: counts["incorrect"] },
            ],
        })
    }
}

/// Scatters `(bucket, count)` rows into a dense, zero-filled bucket array.
fn bucketed_counts(rows: &[sqlx::postgres::PgRow], bucket_min: f64, interval: f64, count: u32) -> StorageResult<Vec<Bucket>> {
    let mut buckets = vec![0u64; count as usize];
    for row in rows {
        let idx: i32 = row.try_get("bucket")?;
        let n: i64 = row.try_get(1)?;
        let idx = idx.clamp(1, count as i32) as usize - 1;
        buckets[idx] += n as u64;
    }
    Ok(buckets
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bucket { key: format!("{}", bucket_min + interval * i as f64), count })
        .collect())
}

fn named_counts(rows: &[sqlx::postgres::PgRow]) -> StorageResult<Vec<Bucket>> {
    rows.iter()
        .map(|row| -> StorageResult<Bucket> {
            let key: String = row.try_get::<Option<String>, _>("key")?.unwrap_or_default();
            let count: i64 = row.try_get("count")?;
            Ok(Bucket { key, count: count as u64 })
        })
        .collect()
}
