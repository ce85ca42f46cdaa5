mod common;

use common::{Account, MockBackend, harness, model, unwrap_err, unwrap_outcome};
use quarry::{EntityStore, Error, StatementError, StoreConfig};

fn store() -> (EntityStore<MockBackend>, MockBackend) {
    let backend = MockBackend::default();
    let store = EntityStore::new(backend.clone(), model(), StoreConfig::default());
    (store, backend)
}

#[test]
fn versioned_update_is_compare_and_swap() {
    let (rt, cx) = harness();
    let (mut store, backend) = store();

    let mut account = Account {
        id: 1,
        balance: 100,
        revision: 1,
    };
    rt.block_on(async {
        unwrap_outcome(store.insert(&cx, &mut account).await);
        account.balance = 150;
        unwrap_outcome(store.update(&cx, &mut account).await);
    });

    assert_eq!(account.revision, 2);
    let (sql, _) = backend.executed().pop().expect("an UPDATE was issued");
    assert_eq!(
        sql,
        "UPDATE \"account\" SET \"balance\" = $1, \"revision\" = $2 \
         WHERE \"revision\" = $3 AND \"id\" = $4"
    );
}

#[test]
fn concurrent_writer_leaves_loser_stale() {
    let (rt, cx) = harness();
    let (mut store, backend) = store();

    let mut winner = Account {
        id: 1,
        balance: 100,
        revision: 1,
    };
    let mut loser = winner.clone();

    rt.block_on(async {
        unwrap_outcome(store.insert(&cx, &mut winner).await);

        winner.balance = 150;
        unwrap_outcome(store.update(&cx, &mut winner).await);
        assert_eq!(winner.revision, 2);

        // The loser still carries revision 1; its CAS matches no row.
        loser.balance = 90;
        backend.push_affected(0);
        let err = unwrap_err(store.update_attributes(&cx, &mut loser, &["balance"]).await);
        assert!(matches!(err, Error::StaleEntity { entity: "account", .. }));
        assert_eq!(loser.revision, 1);
        assert_eq!(loser.balance, 90);
    });
}

#[test]
fn poisoned_transaction_refuses_commit() {
    let (rt, cx) = harness();
    let (mut store, backend) = store();

    rt.block_on(async {
        unwrap_outcome(store.begin(&cx).await);
        backend.fail_next_execute(Error::Statement(
            StatementError::constraint("duplicate key").with_sqlstate("23505"),
        ));
        let mut account = Account {
            id: 1,
            balance: 0,
            revision: 0,
        };
        let err = unwrap_err(store.insert(&cx, &mut account).await);
        assert!(err.is_constraint_violation());

        // The failure marked the transaction rollback-only.
        let err = unwrap_err(store.commit(&cx).await);
        assert!(matches!(err, Error::TransactionRolledBack(_)));
        assert!(!store.in_transaction());
    });

    let sql = backend.executed_sql();
    assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn nested_scopes_join_the_outer_transaction() {
    let (rt, cx) = harness();
    let (mut store, backend) = store();

    rt.block_on(async {
        unwrap_outcome(store.begin(&cx).await);
        unwrap_outcome(store.begin(&cx).await);

        let mut account = Account {
            id: 1,
            balance: 10,
            revision: 0,
        };
        unwrap_outcome(store.insert(&cx, &mut account).await);

        // Inner commit is a no-op; the outer one reaches the database.
        unwrap_outcome(store.commit(&cx).await);
        assert!(store.in_transaction());
        unwrap_outcome(store.commit(&cx).await);
        assert!(!store.in_transaction());
    });

    let sql = backend.executed_sql();
    assert_eq!(sql.iter().filter(|s| *s == "BEGIN").count(), 1);
    assert_eq!(sql.iter().filter(|s| *s == "COMMIT").count(), 1);
}

#[test]
fn inner_rollback_poisons_the_outer_commit() {
    let (rt, cx) = harness();
    let (mut store, backend) = store();

    rt.block_on(async {
        unwrap_outcome(store.begin(&cx).await);
        unwrap_outcome(store.begin(&cx).await);
        unwrap_outcome(store.rollback(&cx).await);

        let err = unwrap_err(store.commit(&cx).await);
        assert!(matches!(err, Error::TransactionRolledBack(_)));
    });

    let sql = backend.executed_sql();
    assert_eq!(sql.last().map(String::as_str), Some("ROLLBACK"));
}
