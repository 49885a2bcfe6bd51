use std::sync::Arc;

use sqlx::{Database, Executor, FromRow};

use crate::{
    Error, Input, MapperConfig, MapperRegistry, Project, QueryLogger, ResolvedQuery,
    StatementKind, TemplateSource, TracingLogger, ValueDatabase, bind, extract, project, resolve,
};

/// Turns one template and its input into a [`ResolvedQuery`].
pub fn build(template: &str, input: Input<'_>) -> Result<ResolvedQuery, Error> {
    let env = bind(input)?;
    let resolved = resolve(template, &env)?;
    Ok(extract(&resolved))
}

/// [`build`] reporting to a logger.
#[derive(Clone, Copy)]
pub struct QueryBuilder<'l> {
    logger: &'l dyn QueryLogger,
}

impl<'l> QueryBuilder<'l> {
    pub fn new(logger: &'l dyn QueryLogger) -> Self {
        Self { logger }
    }

    pub fn build(&self, template: &str, input: Input<'_>) -> Result<ResolvedQuery, Error> {
        let result = build(template, input);
        match &result {
            Ok(query) => self.logger.query_resolved(query),
            Err(e) => self.logger.failed(e),
        }
        result
    }
}

/// Runs mapper statements by name.
///
/// Holds no connection: every call borrows the executor it runs on, so one session can
/// serve a pool, a connection or a transaction alike.
#[derive(Clone)]
pub struct SqlSession {
    source: Arc<dyn TemplateSource>,
    logger: Arc<dyn QueryLogger>,
    persistent: bool,
}

impl SqlSession {
    /// Loads every mapper document named by `config`.
    pub fn new(config: &MapperConfig) -> Result<Self, Error> {
        Ok(Self::with_source(MapperRegistry::load(config)?))
    }

    /// Logs through [`TracingLogger`] until [`SqlSession::set_logger`] says otherwise.
    pub fn with_source(source: impl TemplateSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            logger: Arc::new(TracingLogger),
            persistent: true,
        }
    }

    pub fn set_logger(mut self, logger: impl QueryLogger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Forwarded to [`crate::SqlTemplateExecute::set_persistent`].
    pub fn set_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Looks up `mapper`/`id` among the statements of `kind` and builds it.
    pub fn prepare(
        &self,
        kind: StatementKind,
        mapper: &str,
        id: &str,
        input: Input<'_>,
    ) -> Result<ResolvedQuery, Error> {
        let Some(template) = self.source.lookup(mapper, kind, id) else {
            let e = Error::configuration(format!(
                "specified mapper or id does not exist. mapper: {mapper}, {kind} id: {id}"
            ));
            self.logger.failed(&e);
            return Err(e);
        };
        self.logger.statement_loaded(mapper, kind, id);
        QueryBuilder::new(self.logger.as_ref()).build(template, input)
    }

    /// Exactly one row; [`sqlx::Error::RowNotFound`] when there is none.
    pub async fn select_one<'c, DB, E, O>(
        &self,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<O, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + Project,
    {
        let query = self.prepare(StatementKind::Select, mapper, id, input)?;
        let row = self
            .observe(query.to_execute::<DB>())?
            .set_persistent(self.persistent)
            .fetch_one_as(executor)
            .await;
        let row = self.observe(row)?;
        self.rows_fetched(std::slice::from_ref(&row));
        Ok(row)
    }

    pub async fn select_optional<'c, DB, E, O>(
        &self,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<Option<O>, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + Project,
    {
        let query = self.prepare(StatementKind::Select, mapper, id, input)?;
        let row = self
            .observe(query.to_execute::<DB>())?
            .set_persistent(self.persistent)
            .fetch_optional_as(executor)
            .await;
        let row = self.observe(row)?;
        self.rows_fetched(row.as_slice());
        Ok(row)
    }

    pub async fn select_list<'c, DB, E, O>(
        &self,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<Vec<O>, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
        O: Send + Unpin + for<'r> FromRow<'r, DB::Row> + Project,
    {
        let query = self.prepare(StatementKind::Select, mapper, id, input)?;
        let rows = self
            .observe(query.to_execute::<DB>())?
            .set_persistent(self.persistent)
            .fetch_all_as(executor)
            .await;
        let rows = self.observe(rows)?;
        self.rows_fetched(&rows);
        Ok(rows)
    }

    pub async fn insert<'c, DB, E>(
        &self,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<DB::QueryResult, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
    {
        self.modify(StatementKind::Insert, mapper, id, input, executor)
            .await
    }

    pub async fn update<'c, DB, E>(
        &self,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<DB::QueryResult, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
    {
        self.modify(StatementKind::Update, mapper, id, input, executor)
            .await
    }

    pub async fn delete<'c, DB, E>(
        &self,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<DB::QueryResult, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
    {
        self.modify(StatementKind::Delete, mapper, id, input, executor)
            .await
    }

    async fn modify<'c, DB, E>(
        &self,
        kind: StatementKind,
        mapper: &str,
        id: &str,
        input: Input<'_>,
        executor: E,
    ) -> Result<DB::QueryResult, Error>
    where
        DB: Database + for<'q> ValueDatabase<'q>,
        E: Executor<'c, Database = DB>,
    {
        let query = self.prepare(kind, mapper, id, input)?;
        let result = self
            .observe(query.to_execute::<DB>())?
            .set_persistent(self.persistent)
            .execute(executor)
            .await;
        self.observe(result)
    }

    fn observe<T>(&self, result: Result<T, sqlx::Error>) -> Result<T, Error> {
        result.map_err(|e| {
            let e = Error::from(e);
            self.logger.failed(&e);
            e
        })
    }

    fn rows_fetched<O: Project>(&self, rows: &[O]) {
        let projection = self.logger.debug_enabled().then(|| project(rows));
        self.logger.rows_fetched(rows.len(), projection.as_ref());
    }
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}
