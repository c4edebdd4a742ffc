//! In-memory catalog for unit tests.
//!
//! `begin` takes the state lock and works on a copy; `commit` publishes the copy,
//! rollback or drop discards it. Holding the lock for the whole transaction is
//! stronger than the organization row lock the Postgres catalog takes, which is
//! all the tests need.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::database::catalog::{Catalog, CatalogTx};
use crate::database::manager::DatabaseError;
use crate::database::models::{Member, Organization, TriggerDefinition, TriggerEvent, TriggerTiming, UserTable};
use crate::services::central::{AccountService, CentralError, RoleChange};
use crate::services::quota_trigger::QUOTA_FUNCTION_NAME;

/// Catalog operations that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ListTriggers,
    CreateNamespace,
    MoveTable,
    TableRecordLookup,
    SetTableNamespace,
    DropTrigger,
    DropFunction,
    CreateFunction,
    CreateTrigger,
    SearchPath,
    SetMemberSchema,
    SetOwner,
    Commit,
}

#[derive(Debug, Clone)]
pub struct PhysicalTable {
    pub owner_role: String,
    pub rows: u64,
    pub bytes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFunction {
    pub language: String,
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub organizations: HashMap<Uuid, Organization>,
    pub members: HashMap<Uuid, Member>,
    pub table_records: HashMap<Uuid, UserTable>,
    pub namespaces: BTreeSet<String>,
    pub tables: BTreeMap<(String, String), PhysicalTable>,
    pub triggers: Vec<TriggerDefinition>,
    pub functions: BTreeMap<(String, String), StoredFunction>,
    pub search_paths: HashMap<String, Vec<String>>,
    /// DDL issued through transactions, in order
    pub ddl_log: Vec<String>,
}

impl CatalogState {
    pub fn has_table(&self, namespace: &str, table: &str) -> bool {
        self.tables.contains_key(&key(namespace, table))
    }

    /// Triggers attached to tables in `namespace`, ordered by table then name
    pub fn triggers_in(&self, namespace: &str) -> Vec<TriggerDefinition> {
        let mut triggers: Vec<_> = self
            .triggers
            .iter()
            .filter(|t| t.table_namespace == namespace)
            .cloned()
            .collect();
        triggers.sort_by(|a, b| (&a.table_name, &a.trigger_name).cmp(&(&b.table_name, &b.trigger_name)));
        triggers
    }

    fn dependents(&self, namespace: &str, function: &str) -> i64 {
        self.triggers
            .iter()
            .filter(|t| t.function_namespace == namespace && t.function_name == function)
            .count() as i64
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[derive(Clone)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
    failpoints: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        let mut state = CatalogState::default();
        state.namespaces.insert("public".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
            failpoints: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    pub fn fail_on(&self, point: FailPoint) {
        self.failpoints.lock().unwrap().insert(point);
    }

    pub fn clear_failures(&self) {
        self.failpoints.lock().unwrap().clear();
    }

    pub async fn snapshot(&self) -> CatalogState {
        self.state.lock().await.clone()
    }

    pub async fn add_organization(&self, name: &str) -> Uuid {
        let now = Utc::now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            seats: 5,
            quota_in_bytes: 1_234_567_890,
            owner_id: None,
            created_at: now,
            updated_at: now,
        };
        let id = organization.id;
        self.state.lock().await.organizations.insert(id, organization);
        id
    }

    /// Member living in the shared schema, owning tables through `<username>_role`
    pub async fn add_member(&self, organization_id: Uuid, username: &str, quota_in_bytes: i64) -> Uuid {
        let now = Utc::now();
        let member = Member {
            id: Uuid::new_v4(),
            username: username.to_string(),
            organization_id: Some(organization_id),
            database_schema: "public".to_string(),
            database_username: format!("{}_role", username),
            quota_in_bytes,
            created_at: now,
            updated_at: now,
        };
        let id = member.id;
        self.state.lock().await.members.insert(id, member);
        id
    }

    pub async fn set_owner(&self, organization_id: Uuid, member_id: Uuid) {
        if let Some(org) = self.state.lock().await.organizations.get_mut(&organization_id) {
            org.owner_id = Some(member_id);
        }
    }

    pub async fn set_member_schema(&self, member_id: Uuid, namespace: &str) {
        let mut state = self.state.lock().await;
        state.namespaces.insert(namespace.to_string());
        if let Some(member) = state.members.get_mut(&member_id) {
            member.database_schema = namespace.to_string();
        }
    }

    pub async fn member_id(&self, username: &str) -> Uuid {
        let state = self.state.lock().await;
        state
            .members
            .values()
            .find(|m| m.username == username)
            .map(|m| m.id)
            .unwrap_or_else(|| panic!("no member {}", username))
    }

    pub async fn organization_id(&self, name: &str) -> Uuid {
        let state = self.state.lock().await;
        state
            .organizations
            .values()
            .find(|o| o.name == name)
            .map(|o| o.id)
            .unwrap_or_else(|| panic!("no organization {}", name))
    }

    /// Create a physical table owned by the member; `registered` adds its user_tables record
    pub async fn create_table(&self, member_id: Uuid, namespace: &str, name: &str, registered: bool) {
        let mut state = self.state.lock().await;
        let role = state.members[&member_id].database_username.clone();
        state.namespaces.insert(namespace.to_string());
        state.tables.insert(
            key(namespace, name),
            PhysicalTable {
                owner_role: role,
                rows: 0,
                bytes: 0,
            },
        );
        if registered {
            let now = Utc::now();
            let record = UserTable {
                id: Uuid::new_v4(),
                user_id: member_id,
                name: name.to_string(),
                database_schema: namespace.to_string(),
                created_at: now,
                updated_at: now,
            };
            state.table_records.insert(record.id, record);
        }
    }

    /// Install a trigger and, unless it already exists, its function
    pub async fn install_trigger(&self, definition: TriggerDefinition) {
        let mut state = self.state.lock().await;
        state
            .functions
            .entry(key(&definition.function_namespace, &definition.function_name))
            .or_insert_with(|| StoredFunction {
                language: definition.function_language.clone(),
                source: definition.function_source.clone(),
            });
        state.triggers.push(definition);
    }

    /// The trigger from the "moves triggers to the new schema" scenario
    pub fn truncate_trigger(namespace: &str, table: &str) -> TriggerDefinition {
        TriggerDefinition {
            trigger_name: "testing_trigger".to_string(),
            table_namespace: namespace.to_string(),
            table_name: table.to_string(),
            timing: TriggerTiming::After,
            events: vec![TriggerEvent::Insert],
            for_each_row: false,
            arguments: vec![],
            function_namespace: namespace.to_string(),
            function_name: "truncate_table".to_string(),
            function_language: "plpgsql".to_string(),
            function_source: format!("\nbegin\n  delete from {}.{};\n  return NEW;\nend;\n", namespace, table),
        }
    }

    /// Insert a row of `bytes` size, firing INSERT triggers the way Postgres would
    /// resolve them. The quota check sums every table owned by the table's owner.
    /// Returns the names of the triggers that fired.
    pub async fn insert_row(&self, namespace: &str, table: &str, bytes: i64) -> Result<Vec<String>, String> {
        let mut state = self.state.lock().await;
        if !state.has_table(namespace, table) {
            return Err(format!("relation {}.{} does not exist", namespace, table));
        }

        let mut firing: Vec<_> = state
            .triggers
            .iter()
            .filter(|t| t.table_namespace == namespace && t.table_name == table && t.fires_on(TriggerEvent::Insert))
            .cloned()
            .collect();
        firing.sort_by(|a, b| a.trigger_name.cmp(&b.trigger_name));

        let mut fired = Vec::new();
        for trigger in firing {
            if !state.functions.contains_key(&key(&trigger.function_namespace, &trigger.function_name)) {
                return Err(format!("function {} does not exist", trigger.qualified_function()));
            }
            if trigger.function_name == QUOTA_FUNCTION_NAME {
                let limit: i64 = trigger
                    .arguments
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or_else(|| "invalid quota argument".to_string())?;
                let owner = &state.tables[&key(namespace, table)].owner_role;
                let used: i64 = state
                    .tables
                    .values()
                    .filter(|t| &t.owner_role == owner)
                    .map(|t| t.bytes)
                    .sum();
                if used > limit {
                    return Err(format!("Quota exceeded by {}KB", (used - limit) / 1024));
                }
            }
            fired.push(trigger.trigger_name.clone());
        }

        if let Some(t) = state.tables.get_mut(&key(namespace, table)) {
            t.rows += 1;
            t.bytes += bytes;
        }
        Ok(fired)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, DatabaseError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx {
            guard,
            work,
            failpoints: self.failpoints.clone(),
        })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<CatalogState>,
    work: CatalogState,
    failpoints: Arc<StdMutex<HashSet<FailPoint>>>,
}

impl MemoryTx {
    fn check(&self, point: FailPoint) -> Result<(), DatabaseError> {
        if self.failpoints.lock().unwrap().contains(&point) {
            return Err(DatabaseError::QueryError(format!("simulated failure at {:?}", point)));
        }
        Ok(())
    }

    fn require_namespace(&self, namespace: &str) -> Result<(), DatabaseError> {
        if !self.work.namespaces.contains(namespace) {
            return Err(DatabaseError::QueryError(format!("schema \"{}\" does not exist", namespace)));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn lock_organization(&mut self, id: Uuid) -> Result<Option<Organization>, DatabaseError> {
        Ok(self.work.organizations.get(&id).cloned())
    }

    async fn find_member(&mut self, id: Uuid) -> Result<Option<Member>, DatabaseError> {
        Ok(self.work.members.get(&id).cloned())
    }

    async fn find_table_record(&mut self, user_id: Uuid, name: &str) -> Result<Option<UserTable>, DatabaseError> {
        self.check(FailPoint::TableRecordLookup)?;
        Ok(self
            .work
            .table_records
            .values()
            .find(|r| r.user_id == user_id && r.name == name)
            .cloned())
    }

    async fn set_table_namespace(&mut self, table_id: Uuid, namespace: &str) -> Result<(), DatabaseError> {
        self.check(FailPoint::SetTableNamespace)?;
        let record = self
            .work
            .table_records
            .get_mut(&table_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user table {}", table_id)))?;
        record.database_schema = namespace.to_string();
        Ok(())
    }

    async fn set_member_schema(&mut self, member_id: Uuid, namespace: &str) -> Result<(), DatabaseError> {
        self.check(FailPoint::SetMemberSchema)?;
        let member = self
            .work
            .members
            .get_mut(&member_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user {}", member_id)))?;
        member.database_schema = namespace.to_string();
        Ok(())
    }

    async fn set_organization_owner(&mut self, organization_id: Uuid, member_id: Uuid) -> Result<(), DatabaseError> {
        self.check(FailPoint::SetOwner)?;
        let organization = self
            .work
            .organizations
            .get_mut(&organization_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("organization {}", organization_id)))?;
        organization.owner_id = Some(member_id);
        Ok(())
    }

    async fn namespace_exists(&mut self, namespace: &str) -> Result<bool, DatabaseError> {
        Ok(self.work.namespaces.contains(namespace))
    }

    async fn table_exists(&mut self, namespace: &str, table: &str) -> Result<bool, DatabaseError> {
        Ok(self.work.has_table(namespace, table))
    }

    async fn owned_tables(&mut self, namespace: &str, owner_role: &str) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .work
            .tables
            .iter()
            .filter(|((ns, _), t)| ns == namespace && t.owner_role == owner_role)
            .map(|((_, name), _)| name.clone())
            .collect())
    }

    async fn list_triggers(&mut self, namespace: &str, tables: &[String]) -> Result<Vec<TriggerDefinition>, DatabaseError> {
        self.check(FailPoint::ListTriggers)?;
        let functions = &self.work.functions;
        Ok(self
            .work
            .triggers_in(namespace)
            .into_iter()
            .filter(|t| tables.contains(&t.table_name))
            .map(|mut t| {
                if let Some(f) = functions.get(&key(&t.function_namespace, &t.function_name)) {
                    t.function_language = f.language.clone();
                    t.function_source = f.source.clone();
                }
                t
            })
            .collect())
    }

    async fn function_dependents(&mut self, namespace: &str, function: &str) -> Result<i64, DatabaseError> {
        Ok(self.work.dependents(namespace, function))
    }

    async fn create_namespace(&mut self, namespace: &str, owner_role: &str) -> Result<(), DatabaseError> {
        self.check(FailPoint::CreateNamespace)?;
        self.work.namespaces.insert(namespace.to_string());
        self.work
            .ddl_log
            .push(format!("CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}", namespace, owner_role));
        Ok(())
    }

    async fn move_table(&mut self, from: &str, to: &str, table: &str) -> Result<(), DatabaseError> {
        self.check(FailPoint::MoveTable)?;
        self.require_namespace(to)?;
        if self.work.has_table(to, table) {
            return Err(DatabaseError::QueryError(format!("relation \"{}\" already exists in schema \"{}\"", table, to)));
        }
        let physical = self
            .work
            .tables
            .remove(&key(from, table))
            .ok_or_else(|| DatabaseError::QueryError(format!("relation \"{}.{}\" does not exist", from, table)))?;
        self.work.tables.insert(key(to, table), physical);

        // Triggers belong to the table and follow it; their functions stay put
        for trigger in self.work.triggers.iter_mut() {
            if trigger.table_namespace == from && trigger.table_name == table {
                trigger.table_namespace = to.to_string();
            }
        }
        self.work.ddl_log.push(format!("ALTER TABLE {}.{} SET SCHEMA {}", from, table, to));
        Ok(())
    }

    async fn drop_trigger(&mut self, namespace: &str, table: &str, trigger: &str) -> Result<(), DatabaseError> {
        self.check(FailPoint::DropTrigger)?;
        self.work
            .triggers
            .retain(|t| !(t.table_namespace == namespace && t.table_name == table && t.trigger_name == trigger));
        self.work
            .ddl_log
            .push(format!("DROP TRIGGER IF EXISTS {} ON {}.{}", trigger, namespace, table));
        Ok(())
    }

    async fn drop_function(&mut self, namespace: &str, function: &str) -> Result<(), DatabaseError> {
        self.check(FailPoint::DropFunction)?;
        if self.work.dependents(namespace, function) > 0 {
            return Err(DatabaseError::QueryError(format!(
                "cannot drop function {}.{}() because other objects depend on it",
                namespace, function
            )));
        }
        self.work.functions.remove(&key(namespace, function));
        self.work
            .ddl_log
            .push(format!("DROP FUNCTION IF EXISTS {}.{}()", namespace, function));
        Ok(())
    }

    async fn create_function(&mut self, definition: &TriggerDefinition) -> Result<(), DatabaseError> {
        self.check(FailPoint::CreateFunction)?;
        self.require_namespace(&definition.function_namespace)?;
        self.work.functions.insert(
            key(&definition.function_namespace, &definition.function_name),
            StoredFunction {
                language: definition.function_language.clone(),
                source: definition.function_source.clone(),
            },
        );
        self.work.ddl_log.push(definition.function_sql());
        Ok(())
    }

    async fn create_trigger(&mut self, definition: &TriggerDefinition) -> Result<(), DatabaseError> {
        self.check(FailPoint::CreateTrigger)?;
        if !self.work.has_table(&definition.table_namespace, &definition.table_name) {
            return Err(DatabaseError::QueryError(format!(
                "relation {} does not exist",
                definition.qualified_table()
            )));
        }
        if !self
            .work
            .functions
            .contains_key(&key(&definition.function_namespace, &definition.function_name))
        {
            return Err(DatabaseError::QueryError(format!(
                "function {}() does not exist",
                definition.qualified_function()
            )));
        }
        let duplicate = self.work.triggers.iter().any(|t| {
            t.table_namespace == definition.table_namespace
                && t.table_name == definition.table_name
                && t.trigger_name == definition.trigger_name
        });
        if duplicate {
            return Err(DatabaseError::QueryError(format!(
                "trigger \"{}\" for relation {} already exists",
                definition.trigger_name,
                definition.qualified_table()
            )));
        }
        self.work.triggers.push(definition.clone());
        self.work.ddl_log.push(definition.trigger_sql());
        Ok(())
    }

    async fn set_role_search_path(&mut self, role: &str, namespaces: &[&str]) -> Result<(), DatabaseError> {
        self.check(FailPoint::SearchPath)?;
        self.work
            .search_paths
            .insert(role.to_string(), namespaces.iter().map(|ns| ns.to_string()).collect());
        self.work
            .ddl_log
            .push(format!("ALTER ROLE {} SET search_path = {}", role, namespaces.join(", ")));
        Ok(())
    }

    async fn commit(self) -> Result<(), DatabaseError> {
        self.check(FailPoint::Commit)?;
        let MemoryTx { mut guard, work, .. } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Account service that records notifications, optionally failing them
#[derive(Clone, Default)]
pub struct RecordingAccountService {
    calls: Arc<StdMutex<Vec<RoleChange>>>,
    fail: bool,
}

impl RecordingAccountService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RoleChange> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountService for RecordingAccountService {
    async fn member_role_changed(&self, change: &RoleChange) -> Result<(), CentralError> {
        self.calls.lock().unwrap().push(change.clone());
        if self.fail {
            return Err(CentralError::Rejected {
                status: 503,
                body: "central unavailable".to_string(),
            });
        }
        Ok(())
    }
}
