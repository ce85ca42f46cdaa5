mod common;

use common::{Artist, MockBackend, harness, key_row, model, unwrap_outcome};
use quarry::{EntityStore, Error, Pool, PoolConfig, PoolErrorKind, StoreConfig};

#[test]
fn store_runs_on_a_pool_checkout() {
    let (rt, cx) = harness();
    let backend = MockBackend::default();
    backend.push_keys(vec![key_row(7)]);

    let factory_backend = backend.clone();
    let pool: Pool<MockBackend> =
        Pool::new(PoolConfig::new(2), move || Ok(factory_backend.clone()));

    let conn = pool.acquire().expect("pool has capacity");
    let mut store = EntityStore::new(conn, model(), StoreConfig::default());

    rt.block_on(async {
        let mut nina = Artist {
            id: None,
            name: "Nina".to_string(),
        };
        unwrap_outcome(store.insert(&cx, &mut nina).await);
        assert_eq!(nina.id, Some(7));
    });

    assert_eq!(
        backend.executed_sql(),
        vec!["INSERT INTO \"artist\" (\"name\") VALUES ($1)".to_string()]
    );
    assert_eq!(pool.stats().active_connections, 1);
}

#[test]
fn dropping_the_store_returns_the_connection() {
    let backend = MockBackend::default();
    let factory_backend = backend.clone();
    let pool: Pool<MockBackend> = Pool::new(
        PoolConfig::new(1).acquire_timeout(20),
        move || Ok(factory_backend.clone()),
    );

    {
        let conn = pool.acquire().expect("pool has capacity");
        let _store = EntityStore::new(conn, model(), StoreConfig::default());
        assert_eq!(pool.stats().idle_connections, 0);
    }

    assert_eq!(pool.stats().idle_connections, 1);
    pool.acquire().expect("released connection is reusable");
}

#[test]
fn exhausted_pool_surfaces_a_timeout() {
    let backend = MockBackend::default();
    let factory_backend = backend.clone();
    let pool: Pool<MockBackend> = Pool::new(
        PoolConfig::new(1).acquire_timeout(20),
        move || Ok(factory_backend.clone()),
    );

    let _held = pool.acquire().expect("pool has capacity");
    let err = pool.acquire().expect_err("no second connection");
    match err {
        Error::ConnectionUnavailable(pool_err) => {
            assert_eq!(pool_err.kind, PoolErrorKind::Timeout);
        }
        other => panic!("expected pool timeout, got {other:?}"),
    }
}

#[test]
fn stores_can_share_one_writer_gate() {
    let backend = MockBackend::default();
    let config = StoreConfig::default().serialize_writes(true);
    let a = EntityStore::new(backend.clone(), model(), config.clone());
    let mut b = EntityStore::new(backend, model(), config);

    assert!(!std::sync::Arc::ptr_eq(&a.write_gate(), &b.write_gate()));
    b.set_write_gate(a.write_gate());
    // Both stores now contend on the same mutex for writes.
    assert!(std::sync::Arc::ptr_eq(&a.write_gate(), &b.write_gate()));
}
