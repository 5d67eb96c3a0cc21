use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::VacancyAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, ReservationFilter};
use crate::tenant::TenantManager;

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(VacancyFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

pub struct VacancyHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<VacancyQueryParser>,
}

impl VacancyHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(VacancyQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    async fn run_sql(&self, engine: &Engine, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = std::time::Instant::now();

        let result = self.execute_command(engine, cmd).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::InsertUnit { id, owner_id } => {
                engine.register_unit(id, owner_id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::DeleteUnit { id } => {
                engine.retire_unit(&id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectUnits => {
                let schema = Arc::new(units_schema());
                let rows = engine
                    .list_units()
                    .into_iter()
                    .map(|unit| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&unit.id)?;
                        encoder.encode_field(&unit.owner_id)?;
                        Ok(encoder.take_row())
                    })
                    .collect::<Vec<PgWireResult<_>>>();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertRequester { id } => {
                engine.register_requester(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::InsertReservation { request } => {
                engine.create_reservation(request).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::DeleteReservation { id } => {
                engine.delete_reservation(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectReservations { filter } => {
                let reservations = match filter {
                    ReservationFilter::All => engine.list_reservations().await,
                    ReservationFilter::Id(id) => match engine.get_reservation(id).await {
                        Ok(r) => vec![r],
                        Err(EngineError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(engine_err(e)),
                    },
                    ReservationFilter::Unit(unit_id) => engine.reservations_for_unit(&unit_id).await,
                    ReservationFilter::UnitAndRequester(unit_id, requester_id) => {
                        engine
                            .reservations_for_unit_and_requester(&unit_id, &requester_id)
                            .await
                    }
                };
                Ok(reservations_response(reservations))
            }
            Command::SelectAvailability { unit_id, start, end } => {
                let available = engine
                    .is_available(&unit_id, start, end)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&unit_id)?;
                encoder.encode_field(&start.to_string())?;
                encoder.encode_field(&end.to_string())?;
                encoder.encode_field(&available)?;
                let rows: Vec<PgWireResult<_>> = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectAvailableUnits { start, end } => {
                let units = engine
                    .list_available_units(start, end)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(available_units_schema());
                let rows = units
                    .into_iter()
                    .map(|unit_id| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&unit_id)?;
                        Ok(encoder.take_row())
                    })
                    .collect::<Vec<PgWireResult<_>>>();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectConflicts { unit_id, start, end } => {
                let conflicts = engine
                    .reservations_overlapping(&unit_id, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(reservations_response(conflicts))
            }
        }
    }
}

fn reservations_response(reservations: Vec<Reservation>) -> Response {
    let schema = Arc::new(reservations_schema());
    let rows = reservations
        .into_iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.unit_id)?;
            encoder.encode_field(&r.requester_id)?;
            encoder.encode_field(&r.range.start.to_string())?;
            encoder.encode_field(&r.range.end.to_string())?;
            Ok(encoder.take_row())
        })
        .collect::<Vec<PgWireResult<_>>>();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn units_schema() -> Vec<FieldInfo> {
    vec![text_field("id"), text_field("owner_id")]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("unit_id"),
        text_field("requester_id"),
        text_field("start_date"),
        text_field("end_date"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("unit_id"),
        text_field("start_date"),
        text_field("end_date"),
        FieldInfo::new("available".into(), None, None, Type::BOOL, FieldFormat::Text),
    ]
}

fn available_units_schema() -> Vec<FieldInfo> {
    vec![text_field("unit_id")]
}

/// Result columns of a statement, decided from the table it selects from.
/// Statements still carrying `$n` placeholders cannot be fully parsed, so this
/// looks only at the token after FROM.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let mut tokens = sql.split_whitespace();
    let is_select = tokens
        .next()
        .is_some_and(|t| t.eq_ignore_ascii_case("select"));
    if !is_select {
        return vec![];
    }
    let table = tokens
        .skip_while(|t| !t.eq_ignore_ascii_case("from"))
        .nth(1)
        .map(|t| t.trim_end_matches(';').trim_matches('"').to_lowercase());
    match table.as_deref() {
        Some("units") => units_schema(),
        Some("reservations") | Some("conflicts") => reservations_schema(),
        Some("availability") => availability_schema(),
        Some("available_units") => available_units_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for VacancyHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        Ok(vec![self.run_sql(&engine, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct VacancyQueryParser;

#[async_trait]
impl QueryParser for VacancyQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for VacancyHandler {
    type Statement = String;
    type QueryParser = VacancyQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        self.run_sql(&engine, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Replace `$1`, `$2`, ... with the bound text parameters as quoted literals.
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute_text_params(&portal.statement.statement, &params)
}

/// Single pass over the original text: bound values are emitted once and never
/// rescanned, and placeholders inside quoted literals are left alone.
fn substitute_text_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_literal = false;
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            result.push(c);
            continue;
        }
        if c != '$' || in_literal {
            result.push(c);
            continue;
        }
        let digits_start = i + 1;
        let mut digits_end = digits_start;
        while let Some(&(j, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits_end = j + 1;
            chars.next();
        }
        let bound = sql[digits_start..digits_end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| params.get(idx));
        match bound {
            Some(Some(text)) => {
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            Some(None) => result.push_str("NULL"),
            None => result.push_str(&sql[i..digits_end]),
        }
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct VacancyFactory {
    handler: Arc<VacancyHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<VacancyAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl VacancyFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = VacancyAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(VacancyHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for VacancyFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) | EngineError::LimitExceeded(_) => "22023",
        EngineError::Conflict(_) => "23P01",
        EngineError::NotFound(_) => "P0002",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::HasReservations(_) => "23503",
        EngineError::Storage(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
