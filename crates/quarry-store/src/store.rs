//! The data-store runtime.
//!
//! [`EntityStore`] coordinates reads and writes for registered entity types
//! against one backend connection: it compiles queries for the configured
//! dialect, assigns generated keys, tracks entity state for dirty-only
//! updates, serves repeated key lookups from the weak cache, cascades
//! deletes, and demarcates transactions with join-outer nesting.

use crate::cache::EntityCache;
use crate::stream::{CancelToken, EntityStream};
use crate::tracker::{EntityState, ObjectKey, StateTracker};
use crate::transaction::{Completion, TransactionState};
use asupersync::sync::Mutex as AsyncMutex;
use quarry_core::{
    AttributeInfo, Backend, Cx, Entity, EntityModel, Error, Outcome, ReferentialAction,
    RelationshipKind, Result, Row, TransactionError, ValidationError, Value, find_relationship,
};
use quarry_query::{Dialect, Expr, Join, Query, QueryDefinition, compile};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

/// Propagate the non-Ok arms of an [`Outcome`] unchanged.
macro_rules! otry {
    ($outcome:expr) => {
        match $outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

/// Lift a [`Result`] error into `Outcome::Err`.
macro_rules! rtry {
    ($result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e.into()),
        }
    };
}

/// Data-store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQL dialect the statement compiler targets
    pub dialect: Dialect,
    /// Whether the weak entity cache is consulted and populated
    pub caching: bool,
    /// Route writes through a shared single-writer gate
    pub serialize_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Postgres,
            caching: true,
            serialize_writes: false,
        }
    }
}

impl StoreConfig {
    /// Create a configuration for the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    /// Enable or disable the entity cache.
    pub fn caching(mut self, value: bool) -> Self {
        self.caching = value;
        self
    }

    /// Enable or disable the single-writer gate.
    pub fn serialize_writes(mut self, value: bool) -> Self {
        self.serialize_writes = value;
        self
    }
}

/// The object store: CRUD, queries, transactions, and relationship loading
/// for entity types registered in an [`EntityModel`].
pub struct EntityStore<B: Backend> {
    backend: B,
    model: EntityModel,
    config: StoreConfig,
    cache: EntityCache,
    tracker: StateTracker,
    tx: TransactionState,
    write_gate: Arc<AsyncMutex<()>>,
}

impl<B: Backend> EntityStore<B> {
    pub fn new(backend: B, model: EntityModel, config: StoreConfig) -> Self {
        let cache = EntityCache::new(config.caching);
        Self {
            backend,
            model,
            config,
            cache,
            tracker: StateTracker::new(),
            tx: TransactionState::new(),
            write_gate: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_active()
    }

    /// The single-writer gate, for sharing across stores over the same
    /// single-writer backend.
    ///
    /// The gate is an async mutex, so a waiting write parks its task
    /// instead of blocking the runtime thread.
    pub fn write_gate(&self) -> Arc<AsyncMutex<()>> {
        Arc::clone(&self.write_gate)
    }

    pub fn set_write_gate(&mut self, gate: Arc<AsyncMutex<()>>) {
        self.write_gate = gate;
    }

    /// Insert a new entity row.
    ///
    /// Backend-generated key values are written back into the entity before
    /// it is tracked as managed. Key conflicts surface as constraint
    /// violation statement errors.
    pub async fn insert<E: Entity + Clone>(&mut self, cx: &Cx, entity: &mut E) -> Outcome<(), Error> {
        let gate = self.writer_gate();
        let _guard = match gate.as_ref() {
            Some(g) => match g.lock(cx).await {
                Ok(guard) => Some(guard),
                Err(_) => return Outcome::Err(gate_unavailable()),
            },
            None => None,
        };
        rtry!(self.model.require::<E>());
        if !E::STATELESS {
            let key = ObjectKey::of(entity);
            if matches!(
                self.tracker.state(&key),
                Some(EntityState::Managed | EntityState::Modified)
            ) {
                return Outcome::Err(
                    ValidationError::illegal_state(format!(
                        "'{}' instance is already managed; update it instead of inserting",
                        E::TABLE_NAME
                    ))
                    .into(),
                );
            }
        }
        otry!(self.insert_row(cx, entity).await);
        self.remember(entity);
        tracing::debug!(table = E::TABLE_NAME, "inserted entity");
        Outcome::Ok(())
    }

    /// Update the changed attributes of a managed entity.
    ///
    /// No statement is issued when the entity is clean. Entities with a
    /// version attribute get a compare-and-swap WHERE clause; zero affected
    /// rows then means a concurrent writer won and the call fails with
    /// [`Error::StaleEntity`].
    pub async fn update<E: Entity + Clone>(&mut self, cx: &Cx, entity: &mut E) -> Outcome<(), Error> {
        self.update_with(cx, entity, None).await
    }

    /// Update an explicit attribute list regardless of tracked state.
    pub async fn update_attributes<E: Entity + Clone>(
        &mut self,
        cx: &Cx,
        entity: &mut E,
        attributes: &[&str],
    ) -> Outcome<(), Error> {
        self.update_with(cx, entity, Some(attributes)).await
    }

    async fn update_with<E: Entity + Clone>(
        &mut self,
        cx: &Cx,
        entity: &mut E,
        attributes: Option<&[&str]>,
    ) -> Outcome<(), Error> {
        let gate = self.writer_gate();
        let _guard = match gate.as_ref() {
            Some(g) => match g.lock(cx).await {
                Ok(guard) => Some(guard),
                Err(_) => return Outcome::Err(gate_unavailable()),
            },
            None => None,
        };
        rtry!(self.model.require::<E>());
        if E::STATELESS {
            return Outcome::Err(
                ValidationError::illegal_state(format!(
                    "'{}' is a stateless value type and cannot be updated in place",
                    E::TABLE_NAME
                ))
                .into(),
            );
        }

        let key = ObjectKey::of(entity);
        let version_attr = E::attributes().iter().find(|a| a.version);
        let changed = rtry!(self.changed_writable::<E>(&key, entity, attributes));
        if changed.is_empty() {
            tracing::trace!(table = E::TABLE_NAME, "update skipped, entity is clean");
            return Outcome::Ok(());
        }

        let mut q = Query::update(E::TABLE_NAME);
        for attr in &changed {
            q = q.set(attr.column_name, rtry!(entity.read_attribute(attr.name)));
        }
        let next_version = match version_attr {
            Some(attr) => {
                let current = rtry!(entity.read_attribute(attr.name));
                let next = rtry!(bumped_version(attr, &current));
                q = q.set(attr.column_name, next.clone());
                q = q.filter(Expr::col(attr.column_name).eq(current));
                Some((attr, next))
            }
            None => None,
        };
        let pk_values = entity.primary_key_value();
        q = key_filter::<E>(q, &pk_values);

        let def = rtry!(q.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        let affected = otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        if affected == 0 {
            let key_text = key_description(&pk_values);
            return Outcome::Err(if version_attr.is_some() {
                Error::StaleEntity {
                    entity: E::TABLE_NAME,
                    key: key_text,
                }
            } else {
                Error::EntityNotFound {
                    entity: E::TABLE_NAME,
                    key: key_text,
                }
            });
        }
        if let Some((attr, next)) = next_version {
            rtry!(entity.write_attribute(attr.name, next));
        }
        self.remember(entity);
        tracing::debug!(table = E::TABLE_NAME, attributes = changed.len(), "updated entity");
        Outcome::Ok(())
    }

    /// Insert the entity, or update the existing row with the same key.
    ///
    /// Dialects with a native upsert idiom get a single statement; the
    /// Generic dialect falls back to SELECT-then-INSERT-or-UPDATE inside a
    /// transaction. Upserting the same state twice is a no-op either way.
    pub async fn upsert<E: Entity + Clone>(&mut self, cx: &Cx, entity: &mut E) -> Outcome<(), Error> {
        let gate = self.writer_gate();
        let _guard = match gate.as_ref() {
            Some(g) => match g.lock(cx).await {
                Ok(guard) => Some(guard),
                Err(_) => return Outcome::Err(gate_unavailable()),
            },
            None => None,
        };
        rtry!(self.model.require::<E>());

        if self.config.dialect.upsert_style().is_some() {
            let mut q = Query::upsert(E::TABLE_NAME);
            for (attr, (_, value)) in E::attributes().iter().zip(entity.to_row()) {
                if !attr.generated {
                    q = q.set(attr.column_name, value);
                }
            }
            let conflict = pk_columns::<E>();
            q = q.on_conflict(&conflict);
            let def = rtry!(q.build());
            let stmt = rtry!(compile(&def, self.config.dialect));
            otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        } else {
            otry!(self.begin(cx).await);
            match self.upsert_fallback(cx, entity).await {
                Outcome::Ok(()) => otry!(self.commit(cx).await),
                other => {
                    if let Outcome::Err(e) = self.rollback(cx).await {
                        tracing::warn!(error = %e, "rollback failed after upsert fallback error");
                    }
                    return other;
                }
            }
        }
        self.remember(entity);
        tracing::debug!(table = E::TABLE_NAME, "upserted entity");
        Outcome::Ok(())
    }

    /// SELECT-then-INSERT-or-UPDATE for dialects without a native upsert.
    /// Assumes an open transaction.
    async fn upsert_fallback<E: Entity + Clone>(
        &mut self,
        cx: &Cx,
        entity: &mut E,
    ) -> Outcome<(), Error> {
        let pk_values = entity.primary_key_value();
        let columns = pk_columns::<E>();
        let mut probe = Query::select(E::TABLE_NAME).columns(&columns).limit(1);
        probe = key_filter::<E>(probe, &pk_values);
        let def = rtry!(probe.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);

        if rows.is_empty() {
            return self.insert_row(cx, entity).await;
        }

        let mut q = Query::update(E::TABLE_NAME);
        for (attr, (_, value)) in E::attributes().iter().zip(entity.to_row()) {
            if !attr.generated && !attr.primary_key {
                q = q.set(attr.column_name, value);
            }
        }
        q = key_filter::<E>(q, &pk_values);
        let def = rtry!(q.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        Outcome::Ok(())
    }

    /// Delete an entity row, honoring relationship cascade policies.
    ///
    /// `Cascade` relations delete dependents first: junction rows, then
    /// child rows, then the parent, all in one transaction. `SetNull`
    /// clears the foreign key on dependents. The default `NoAction` issues
    /// only the parent DELETE; dependents then surface as a constraint
    /// violation from the backend.
    pub async fn delete<E: Entity>(&mut self, cx: &Cx, entity: &E) -> Outcome<(), Error> {
        let gate = self.writer_gate();
        let _guard = match gate.as_ref() {
            Some(g) => match g.lock(cx).await {
                Ok(guard) => Some(guard),
                Err(_) => return Outcome::Err(gate_unavailable()),
            },
            None => None,
        };
        rtry!(self.model.require::<E>());

        let pk_values = entity.primary_key_value();
        let key = ObjectKey::of(entity);
        let cascade = rtry!(cascade_statements::<E>(&pk_values));
        let parent = {
            let q = key_filter::<E>(Query::delete(E::TABLE_NAME), &pk_values);
            rtry!(q.build())
        };

        if cascade.is_empty() {
            let stmt = rtry!(compile(&parent, self.config.dialect));
            otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        } else {
            otry!(self.begin(cx).await);
            match self.delete_with_cascade(cx, &cascade, &parent).await {
                Outcome::Ok(()) => otry!(self.commit(cx).await),
                other => {
                    if let Outcome::Err(e) = self.rollback(cx).await {
                        tracing::warn!(error = %e, "rollback failed after cascade delete error");
                    }
                    return other;
                }
            }
        }

        self.cache.invalidate(&key);
        self.tracker.mark_removed(key);
        tracing::debug!(table = E::TABLE_NAME, cascades = cascade.len(), "deleted entity");
        Outcome::Ok(())
    }

    async fn delete_with_cascade(
        &mut self,
        cx: &Cx,
        cascade: &[QueryDefinition],
        parent: &QueryDefinition,
    ) -> Outcome<(), Error> {
        for def in cascade {
            let stmt = rtry!(compile(def, self.config.dialect));
            otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        }
        let stmt = rtry!(compile(parent, self.config.dialect));
        otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        Outcome::Ok(())
    }

    /// Look up an entity by single-column primary key.
    ///
    /// Cache-first: a live cached handle is returned without touching the
    /// backend. A missing row is `None`, not an error.
    pub async fn find_by_key<E: Entity + Clone>(
        &mut self,
        cx: &Cx,
        pk: impl Into<Value>,
    ) -> Outcome<Option<Arc<RwLock<E>>>, Error> {
        self.find_by_composite_key(cx, &[pk.into()]).await
    }

    /// Look up an entity by composite primary key.
    pub async fn find_by_composite_key<E: Entity + Clone>(
        &mut self,
        cx: &Cx,
        pk_values: &[Value],
    ) -> Outcome<Option<Arc<RwLock<E>>>, Error> {
        rtry!(self.model.require::<E>());
        let key = ObjectKey::from_pk::<E>(pk_values);
        if !E::STATELESS {
            if let Some(handle) = self.cache.get::<E>(&key) {
                tracing::trace!(table = E::TABLE_NAME, "entity cache hit");
                return Outcome::Ok(Some(handle));
            }
        }

        let def = rtry!(key_select::<E>(pk_values));
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);
        let Some(row) = rows.first() else {
            return Outcome::Ok(None);
        };
        let entity = rtry!(E::from_row(row));
        let handle = Arc::new(RwLock::new(entity));
        if !E::STATELESS {
            {
                let guard = handle.read().unwrap_or_else(PoisonError::into_inner);
                self.tracker.track(key.clone(), &*guard);
            }
            self.cache.put(key, &handle);
        }
        Outcome::Ok(Some(handle))
    }

    /// Run a SELECT built by the caller and stream decoded entities.
    ///
    /// The backend fetches the full row set before the stream is built;
    /// the stream defers decoding, not the fetch. Cancelling the stream's
    /// token stops decoding only.
    pub async fn query<E: Entity>(&mut self, cx: &Cx, query: Query) -> Outcome<EntityStream<E>, Error> {
        self.query_with_token(cx, query, CancelToken::new()).await
    }

    /// Like [`query`](EntityStore::query), with a caller-held cancel token.
    pub async fn query_with_token<E: Entity>(
        &mut self,
        cx: &Cx,
        query: Query,
        token: CancelToken,
    ) -> Outcome<EntityStream<E>, Error> {
        rtry!(self.model.require::<E>());
        let def = rtry!(query.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);
        tracing::trace!(table = E::TABLE_NAME, rows = rows.len(), "query fetched");
        Outcome::Ok(EntityStream::new(rows, token))
    }

    /// Re-read an entity from the database, discarding local modifications.
    ///
    /// Relation caches are replaced along with the rest of the instance.
    /// Fails with [`Error::EntityNotFound`] when the row no longer exists.
    pub async fn refresh<E: Entity + Clone>(&mut self, cx: &Cx, entity: &mut E) -> Outcome<(), Error> {
        rtry!(self.model.require::<E>());
        let pk_values = entity.primary_key_value();
        let key = ObjectKey::from_pk::<E>(&pk_values);
        let def = rtry!(key_select::<E>(&pk_values));
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);
        let Some(row) = rows.first() else {
            self.tracker.forget(&key);
            self.cache.invalidate(&key);
            return Outcome::Err(Error::EntityNotFound {
                entity: E::TABLE_NAME,
                key: key_description(&pk_values),
            });
        };
        *entity = rtry!(E::from_row(row));
        self.remember(entity);
        Outcome::Ok(())
    }

    /// Re-read only the named attributes of an entity.
    pub async fn refresh_attributes<E: Entity + Clone>(
        &mut self,
        cx: &Cx,
        entity: &mut E,
        attributes: &[&str],
    ) -> Outcome<(), Error> {
        rtry!(self.model.require::<E>());
        let mut columns = Vec::with_capacity(attributes.len());
        for name in attributes {
            let attr = rtry!(attribute_of::<E>(name));
            columns.push(attr.column_name);
        }
        let pk_values = entity.primary_key_value();
        let mut q = Query::select(E::TABLE_NAME).columns(&columns).limit(1);
        q = key_filter::<E>(q, &pk_values);
        let def = rtry!(q.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);
        let Some(row) = rows.first() else {
            return Outcome::Err(Error::EntityNotFound {
                entity: E::TABLE_NAME,
                key: key_description(&pk_values),
            });
        };
        for name in attributes {
            let attr = rtry!(attribute_of::<E>(name));
            if let Some(value) = row.value(attr.column_name) {
                rtry!(entity.write_attribute(attr.name, value.clone()));
            }
        }
        self.remember(entity);
        Outcome::Ok(())
    }

    /// Begin a transaction scope. Nested calls join the outer transaction.
    pub async fn begin(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if !self.tx.enter() {
            tracing::trace!(depth = self.tx.depth(), "joined open transaction");
            return Outcome::Ok(());
        }
        match self.backend.execute(cx, "BEGIN", &[]).await {
            Outcome::Ok(_) => Outcome::Ok(()),
            Outcome::Err(e) => {
                let _ = self.tx.exit(false);
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                let _ = self.tx.exit(false);
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                let _ = self.tx.exit(false);
                Outcome::Panicked(p)
            }
        }
    }

    /// Commit the current scope.
    ///
    /// Only the outermost commit reaches the database. A rollback-only
    /// transaction is rolled back instead and the call fails with
    /// [`Error::TransactionRolledBack`].
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if !self.tx.is_active() {
            return Outcome::Err(
                ValidationError::illegal_state("commit outside a transaction").into(),
            );
        }
        match self.tx.exit(true) {
            Completion::Nested => Outcome::Ok(()),
            Completion::Commit => {
                otry!(self.backend.execute(cx, "COMMIT", &[]).await);
                Outcome::Ok(())
            }
            Completion::Rollback => {
                otry!(self.backend.execute(cx, "ROLLBACK", &[]).await);
                Outcome::Err(
                    TransactionError {
                        message: "commit refused: transaction is rollback-only".to_string(),
                    }
                    .into(),
                )
            }
        }
    }

    /// Roll back the current scope.
    ///
    /// An inner rollback marks the whole transaction rollback-only; the
    /// database ROLLBACK happens when the outermost scope exits.
    pub async fn rollback(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if !self.tx.is_active() {
            return Outcome::Err(
                ValidationError::illegal_state("rollback outside a transaction").into(),
            );
        }
        match self.tx.exit(false) {
            Completion::Nested => Outcome::Ok(()),
            Completion::Commit | Completion::Rollback => {
                otry!(self.backend.execute(cx, "ROLLBACK", &[]).await);
                Outcome::Ok(())
            }
        }
    }

    /// Run a closure inside a transaction: commit on success, roll back on
    /// any failure. Nested calls join the outer transaction.
    pub async fn run_in_transaction<T, F>(&mut self, cx: &Cx, f: F) -> Outcome<T, Error>
    where
        F: for<'a> FnOnce(
            &'a mut Self,
            &'a Cx,
        ) -> Pin<Box<dyn Future<Output = Outcome<T, Error>> + 'a>>,
    {
        otry!(self.begin(cx).await);
        match f(self, cx).await {
            Outcome::Ok(value) => {
                otry!(self.commit(cx).await);
                Outcome::Ok(value)
            }
            Outcome::Err(e) => {
                if let Outcome::Err(rollback_err) = self.rollback(cx).await {
                    tracing::warn!(error = %rollback_err, "rollback failed after transaction error");
                }
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                let _ = self.rollback(cx).await;
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                let _ = self.rollback(cx).await;
                Outcome::Panicked(p)
            }
        }
    }

    /// Resolve a to-one relation wrapper by its foreign key.
    ///
    /// Resolution is single-flight per instance: an already-resolved wrapper
    /// is left untouched and no statement is issued.
    pub async fn load_one<T: Entity + Clone>(
        &mut self,
        cx: &Cx,
        related: &quarry_core::Related<T>,
    ) -> Outcome<(), Error> {
        if related.is_resolved() {
            return Outcome::Ok(());
        }
        let Some(fk) = related.fk().cloned() else {
            let _ = related.resolve_with(None);
            return Outcome::Ok(());
        };
        let found = otry!(self.find_by_composite_key::<T>(cx, &[fk]).await);
        let resolved = found.map(|handle| {
            handle
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        });
        let _ = related.resolve_with(resolved);
        Outcome::Ok(())
    }

    /// Resolve a one-to-many collection by a secondary query on the owning
    /// key.
    pub async fn load_many<P: Entity, C: Entity>(
        &mut self,
        cx: &Cx,
        parent: &P,
        relation: &str,
        collection: &quarry_core::RelatedMany<C>,
    ) -> Outcome<(), Error> {
        if collection.is_resolved() {
            return Outcome::Ok(());
        }
        let Some(rel) = find_relationship::<P>(relation) else {
            return Outcome::Err(
                ValidationError::unknown_attribute(P::TABLE_NAME, relation).into(),
            );
        };
        if rel.kind != RelationshipKind::OneToMany {
            return Outcome::Err(
                ValidationError::illegal_state(format!(
                    "relation '{}.{}' is {:?}, expected OneToMany",
                    P::TABLE_NAME,
                    relation,
                    rel.kind
                ))
                .into(),
            );
        }
        rtry!(check_relation_target::<C>(P::TABLE_NAME, rel.name, rel.related_table));
        let owner_key = rtry!(single_key(parent, P::TABLE_NAME));

        let q = Query::select(C::TABLE_NAME).filter(Expr::col(rel.key_column).eq(owner_key));
        let def = rtry!(q.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(rtry!(C::from_row(row)));
        }
        let _ = collection.resolve_with(items);
        Outcome::Ok(())
    }

    /// Resolve a many-to-many collection through the junction table.
    pub async fn load_many_to_many<P: Entity, C: Entity>(
        &mut self,
        cx: &Cx,
        parent: &P,
        relation: &str,
        collection: &quarry_core::RelatedMany<C>,
    ) -> Outcome<(), Error> {
        if collection.is_resolved() {
            return Outcome::Ok(());
        }
        let Some(rel) = find_relationship::<P>(relation) else {
            return Outcome::Err(
                ValidationError::unknown_attribute(P::TABLE_NAME, relation).into(),
            );
        };
        let Some(junction) = rel.junction else {
            return Outcome::Err(
                ValidationError::illegal_state(format!(
                    "relation '{}.{}' has no junction table",
                    P::TABLE_NAME,
                    relation
                ))
                .into(),
            );
        };
        rtry!(check_relation_target::<C>(P::TABLE_NAME, rel.name, rel.related_table));
        let owner_key = rtry!(single_key(parent, P::TABLE_NAME));
        let child_key = pk_columns::<C>()
            .first()
            .copied()
            .unwrap_or("id");

        let mut q = Query::select(C::TABLE_NAME);
        for attr in C::attributes() {
            q = q.column(Expr::qualified(C::TABLE_NAME, attr.column_name));
        }
        q = q
            .join(Join::inner(
                junction.table_name,
                Expr::qualified(junction.table_name, junction.related_column)
                    .eq(Expr::qualified(C::TABLE_NAME, child_key)),
            ))
            .filter(Expr::qualified(junction.table_name, junction.owner_column).eq(owner_key));
        let def = rtry!(q.build());
        let stmt = rtry!(compile(&def, self.config.dialect));
        let rows = otry!(self.fetch(cx, &stmt.sql, &stmt.params).await);
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(rtry!(C::from_row(row)));
        }
        let _ = collection.resolve_with(items);
        Outcome::Ok(())
    }

    // ------------------------------------------------------------------
    // internals

    async fn insert_row<E: Entity>(&mut self, cx: &Cx, entity: &mut E) -> Outcome<(), Error> {
        let mut q = Query::insert(E::TABLE_NAME);
        let mut generated: Vec<&'static AttributeInfo> = Vec::new();
        for (attr, (_, value)) in E::attributes().iter().zip(entity.to_row()) {
            if attr.generated {
                generated.push(attr);
            } else {
                q = q.set(attr.column_name, value);
            }
        }
        if !generated.is_empty() {
            let columns: Vec<&str> = generated.iter().map(|a| a.column_name).collect();
            q = q.returning(&columns);
        }
        let def = rtry!(q.build());
        let stmt = rtry!(compile(&def, self.config.dialect));

        if stmt.returning.is_empty() {
            otry!(self.exec(cx, &stmt.sql, &stmt.params).await);
        } else {
            let rows = otry!(
                self.exec_returning(cx, &stmt.sql, &stmt.params, &stmt.returning)
                    .await
            );
            if let Some(row) = rows.first() {
                for attr in &generated {
                    if let Some(value) = row.value(attr.column_name) {
                        rtry!(entity.write_attribute(attr.name, value.clone()));
                    }
                }
            }
        }
        Outcome::Ok(())
    }

    fn changed_writable<E: Entity>(
        &self,
        key: &ObjectKey,
        entity: &E,
        attributes: Option<&[&str]>,
    ) -> Result<Vec<&'static AttributeInfo>> {
        let names: Vec<&str> = match attributes {
            Some(list) => list.to_vec(),
            None => self.tracker.changed_attributes(key, entity),
        };
        let mut changed = Vec::with_capacity(names.len());
        for name in names {
            let attr = attribute_of::<E>(name)?;
            if !attr.primary_key && !attr.generated && !attr.version {
                changed.push(attr);
            }
        }
        Ok(changed)
    }

    /// Record post-write state: snapshot for dirty tracking, write-through
    /// into any live cached handle.
    fn remember<E: Entity + Clone>(&mut self, entity: &E) {
        if E::STATELESS {
            return;
        }
        let key = ObjectKey::of(entity);
        if let Some(handle) = self.cache.get::<E>(&key) {
            let mut slot = handle.write().unwrap_or_else(PoisonError::into_inner);
            *slot = entity.clone();
        }
        self.tracker.track(key, entity);
    }

    fn writer_gate(&self) -> Option<Arc<AsyncMutex<()>>> {
        self.config
            .serialize_writes
            .then(|| Arc::clone(&self.write_gate))
    }

    async fn exec(&mut self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<u64, Error> {
        tracing::trace!(sql, params = params.len(), "execute");
        let out = self.backend.execute(cx, sql, params).await;
        self.observe(out)
    }

    async fn exec_returning(
        &mut self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
        returning: &[String],
    ) -> Outcome<Vec<Row>, Error> {
        tracing::trace!(sql, params = params.len(), "execute returning keys");
        let out = self
            .backend
            .execute_returning(cx, sql, params, returning)
            .await;
        self.observe(out)
    }

    async fn fetch(&mut self, cx: &Cx, sql: &str, params: &[Value]) -> Outcome<Vec<Row>, Error> {
        tracing::trace!(sql, params = params.len(), "query");
        let out = self.backend.query(cx, sql, params).await;
        self.observe(out)
    }

    /// Statement failures inside an open transaction poison it.
    fn observe<T>(&mut self, out: Outcome<T, Error>) -> Outcome<T, Error> {
        if let Outcome::Err(Error::Statement(_)) = &out {
            if self.tx.is_active() {
                self.tx.mark_rollback_only();
            }
        }
        out
    }
}

fn gate_unavailable() -> Error {
    Error::Custom("failed to acquire write gate".to_string())
}

fn attribute_of<E: Entity>(name: &str) -> Result<&'static AttributeInfo> {
    E::attributes()
        .iter()
        .find(|a| a.name == name)
        .ok_or_else(|| ValidationError::unknown_attribute(E::TABLE_NAME, name).into())
}

fn pk_columns<E: Entity>() -> Vec<&'static str> {
    E::PRIMARY_KEY
        .iter()
        .map(|name| {
            E::attributes()
                .iter()
                .find(|a| a.name == *name)
                .map_or(*name, |a| a.column_name)
        })
        .collect()
}

fn key_filter<E: Entity>(mut q: Query, pk_values: &[Value]) -> Query {
    for (column, value) in pk_columns::<E>().iter().zip(pk_values) {
        q = q.filter(Expr::col(*column).eq(value.clone()));
    }
    q
}

fn key_select<E: Entity>(pk_values: &[Value]) -> Result<QueryDefinition> {
    if pk_values.len() != E::PRIMARY_KEY.len() {
        return Err(ValidationError::invalid_query(format!(
            "'{}' has {} key attribute(s), got {} value(s)",
            E::TABLE_NAME,
            E::PRIMARY_KEY.len(),
            pk_values.len()
        ))
        .into());
    }
    key_filter::<E>(Query::select(E::TABLE_NAME).limit(1), pk_values).build()
}

/// Dependent-row statements to run before a parent DELETE, junction rows
/// first, then child rows.
fn cascade_statements<E: Entity>(pk_values: &[Value]) -> Result<Vec<QueryDefinition>> {
    let mut junctions = Vec::new();
    let mut children = Vec::new();
    if E::RELATIONSHIPS.is_empty() {
        return Ok(junctions);
    }
    let Some(owner_key) = pk_values.first().cloned() else {
        return Err(ValidationError::illegal_state(format!(
            "cannot cascade delete '{}' without a key value",
            E::TABLE_NAME
        ))
        .into());
    };

    for rel in E::RELATIONSHIPS {
        match (rel.kind, rel.cascade) {
            (RelationshipKind::ManyToMany, ReferentialAction::Cascade) => {
                if let Some(junction) = rel.junction {
                    junctions.push(
                        Query::delete(junction.table_name)
                            .filter(Expr::col(junction.owner_column).eq(owner_key.clone()))
                            .build()?,
                    );
                }
            }
            (RelationshipKind::OneToMany, ReferentialAction::Cascade) => {
                children.push(
                    Query::delete(rel.related_table)
                        .filter(Expr::col(rel.key_column).eq(owner_key.clone()))
                        .build()?,
                );
            }
            (RelationshipKind::OneToMany, ReferentialAction::SetNull) => {
                children.push(
                    Query::update(rel.related_table)
                        .set(rel.key_column, Value::Null)
                        .filter(Expr::col(rel.key_column).eq(owner_key.clone()))
                        .build()?,
                );
            }
            _ => {}
        }
    }
    junctions.extend(children);
    Ok(junctions)
}

fn check_relation_target<C: Entity>(
    parent_table: &'static str,
    relation: &'static str,
    related_table: &'static str,
) -> Result<()> {
    if related_table == C::TABLE_NAME {
        Ok(())
    } else {
        Err(ValidationError::illegal_state(format!(
            "relation '{parent_table}.{relation}' targets '{related_table}', not '{}'",
            C::TABLE_NAME
        ))
        .into())
    }
}

fn single_key<E: Entity>(entity: &E, table: &'static str) -> Result<Value> {
    entity
        .primary_key_value()
        .into_iter()
        .next()
        .ok_or_else(|| {
            ValidationError::illegal_state(format!("'{table}' instance has no key value")).into()
        })
}

fn bumped_version(attr: &AttributeInfo, current: &Value) -> Result<Value> {
    match current {
        Value::Int(v) => Ok(Value::Int(v + 1)),
        Value::BigInt(v) => Ok(Value::BigInt(v + 1)),
        other => Err(ValidationError::illegal_state(format!(
            "version attribute '{}' must be an integer, found {}",
            attr.name,
            other.type_name()
        ))
        .into()),
    }
}

fn key_description(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
    parts.join(",")
}
