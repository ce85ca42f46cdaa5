#![allow(dead_code)] // each integration test uses a subset of the harness

use asupersync::runtime::{Runtime, RuntimeBuilder};
use quarry::{
    Accessor, AttributeInfo, Backend, Cx, Entity, EntityModel, Error, ModelBuilder, Outcome,
    ReferentialAction, RelationshipInfo, RelationshipKind, Result, Row, SqlType, Value,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
    }
}

pub fn unwrap_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => std::panic::panic_any(format!("expected error, got: {other:?}")),
    }
}

pub fn harness() -> (Runtime, Cx) {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    (rt, Cx::for_testing())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub id: Option<i64>,
    pub name: String,
}

impl Entity for Artist {
    const TABLE_NAME: &'static str = "artist";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[RelationshipInfo::new(
        "albums",
        "album",
        RelationshipKind::OneToMany,
        "artist_id",
    )
    .cascade(ReferentialAction::Cascade)];

    fn attributes() -> &'static [AttributeInfo] {
        static ATTRS: &[AttributeInfo] = &[
            AttributeInfo::new("id", "id", SqlType::BigInt)
                .primary_key(true)
                .generated(true),
            AttributeInfo::new("name", "name", SqlType::Text),
        ];
        ATTRS
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Artist>] = &[
            Accessor::new(
                |e: &Artist| Value::from(e.id),
                |e: &mut Artist, v| {
                    e.id = v.as_i64();
                    Ok(())
                },
            ),
            Accessor::new(
                |e: &Artist| Value::from(e.name.clone()),
                |e: &mut Artist, v| {
                    e.name = v.as_str().unwrap_or_default().to_string();
                    Ok(())
                },
            ),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: Option<i64>,
    pub artist_id: Option<i64>,
    pub title: String,
}

impl Entity for Album {
    const TABLE_NAME: &'static str = "album";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn attributes() -> &'static [AttributeInfo] {
        static ATTRS: &[AttributeInfo] = &[
            AttributeInfo::new("id", "id", SqlType::BigInt)
                .primary_key(true)
                .generated(true),
            AttributeInfo::new("artist_id", "artist_id", SqlType::BigInt)
                .nullable(true)
                .foreign_key("artist.id"),
            AttributeInfo::new("title", "title", SqlType::Text),
        ];
        ATTRS
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Album>] = &[
            Accessor::new(
                |e: &Album| Value::from(e.id),
                |e: &mut Album, v| {
                    e.id = v.as_i64();
                    Ok(())
                },
            ),
            Accessor::new(
                |e: &Album| Value::from(e.artist_id),
                |e: &mut Album, v| {
                    e.artist_id = v.as_i64();
                    Ok(())
                },
            ),
            Accessor::new(
                |e: &Album| Value::from(e.title.clone()),
                |e: &mut Album, v| {
                    e.title = v.as_str().unwrap_or_default().to_string();
                    Ok(())
                },
            ),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            artist_id: row.get("artist_id")?,
            title: row.get("title")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub balance: i64,
    pub revision: i64,
}

impl Entity for Account {
    const TABLE_NAME: &'static str = "account";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn attributes() -> &'static [AttributeInfo] {
        static ATTRS: &[AttributeInfo] = &[
            AttributeInfo::new("id", "id", SqlType::BigInt).primary_key(true),
            AttributeInfo::new("balance", "balance", SqlType::BigInt),
            AttributeInfo::new("revision", "revision", SqlType::BigInt).version(true),
        ];
        ATTRS
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Account>] = &[
            Accessor::new(
                |e: &Account| Value::BigInt(e.id),
                |e: &mut Account, v| {
                    e.id = v.as_i64().unwrap_or_default();
                    Ok(())
                },
            ),
            Accessor::new(
                |e: &Account| Value::BigInt(e.balance),
                |e: &mut Account, v| {
                    e.balance = v.as_i64().unwrap_or_default();
                    Ok(())
                },
            ),
            Accessor::new(
                |e: &Account| Value::BigInt(e.revision),
                |e: &mut Account, v| {
                    e.revision = v.as_i64().unwrap_or_default();
                    Ok(())
                },
            ),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            balance: row.get("balance")?,
            revision: row.get("revision")?,
        })
    }
}

pub fn model() -> EntityModel {
    ModelBuilder::new("music")
        .register::<Artist>()
        .and_then(ModelBuilder::register::<Album>)
        .and_then(ModelBuilder::register::<Account>)
        .and_then(ModelBuilder::seal)
        .expect("valid test model")
}

pub fn key_row(id: i64) -> Row {
    Row::new(vec!["id".to_string()], vec![Value::BigInt(id)])
}

#[derive(Debug, Default)]
struct MockState {
    executed: Vec<(String, Vec<Value>)>,
    query_calls: usize,
    rows: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    keys: VecDeque<Vec<Row>>,
    fail_execute: Option<Error>,
}

/// A scripted backend recording every statement it is handed.
///
/// Clones share state, so the factory side of a pool and the assertions in
/// a test can observe the same traffic.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().rows.push_back(rows);
    }

    pub fn push_keys(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().keys.push_back(rows);
    }

    pub fn push_affected(&self, n: u64) {
        self.state.lock().unwrap().affected.push_back(n);
    }

    pub fn fail_next_execute(&self, err: Error) {
        self.state.lock().unwrap().fail_execute = Some(err);
    }

    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed().into_iter().map(|(sql, _)| sql).collect()
    }

    pub fn query_calls(&self) -> usize {
        self.state.lock().unwrap().query_calls
    }
}

#[allow(clippy::manual_async_fn)] // impls must match the trait signatures
impl Backend for MockBackend {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().unwrap();
            guard.query_calls += 1;
            guard.executed.push((sql, params));
            Outcome::Ok(guard.rows.pop_front().unwrap_or_default())
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().unwrap();
            guard.executed.push((sql, params));
            if let Some(err) = guard.fail_execute.take() {
                return Outcome::Err(err);
            }
            Outcome::Ok(guard.affected.pop_front().unwrap_or(1))
        }
    }

    fn execute_returning(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
        _returning: &[String],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let state = Arc::clone(&self.state);
        let sql = sql.to_string();
        let params = params.to_vec();
        async move {
            let mut guard = state.lock().unwrap();
            guard.executed.push((sql, params));
            if let Some(err) = guard.fail_execute.take() {
                return Outcome::Err(err);
            }
            Outcome::Ok(guard.keys.pop_front().unwrap_or_default())
        }
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }
}
