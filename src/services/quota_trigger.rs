use crate::database::models::{Member, Organization, TriggerDefinition, TriggerEvent, TriggerTiming};

pub const QUOTA_TRIGGER_NAME: &str = "enforce_quota";
pub const QUOTA_FUNCTION_NAME: &str = "enforce_quota";

/// Rejects the statement once the tables owned by the role owning the trigger's
/// table use more than TG_ARGV[0] bytes. Usage follows the owner rather than
/// the schema, so the body never names a namespace and gives the same figure
/// before and after the tables move.
const QUOTA_FUNCTION_SOURCE: &str = r#"
DECLARE
  quota_limit bigint := TG_ARGV[0]::bigint;
  used_bytes bigint;
BEGIN
  SELECT COALESCE(sum(pg_catalog.pg_total_relation_size(c.oid)), 0)
    INTO used_bytes
    FROM pg_catalog.pg_class c
   WHERE c.relowner = (SELECT t.relowner FROM pg_catalog.pg_class t WHERE t.oid = TG_RELID)
     AND c.relkind = 'r';

  IF used_bytes > quota_limit THEN
    RAISE EXCEPTION 'Quota exceeded by %KB', (used_bytes - quota_limit) / 1024;
  END IF;

  RETURN NULL;
END;
"#;

/// Builds the canonical quota trigger and its backing function.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuotaTriggerBuilder;

impl QuotaTriggerBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Pure function of its inputs: same arguments, byte-identical SQL.
    pub fn build(&self, namespace: &str, table: &str, quota_limit_bytes: i64) -> TriggerDefinition {
        TriggerDefinition {
            trigger_name: QUOTA_TRIGGER_NAME.to_string(),
            table_namespace: namespace.to_string(),
            table_name: table.to_string(),
            timing: TriggerTiming::Before,
            events: vec![TriggerEvent::Insert, TriggerEvent::Update],
            for_each_row: false,
            arguments: vec![quota_limit_bytes.to_string()],
            function_namespace: namespace.to_string(),
            function_name: QUOTA_FUNCTION_NAME.to_string(),
            function_language: "plpgsql".to_string(),
            function_source: QUOTA_FUNCTION_SOURCE.to_string(),
        }
    }

    pub fn is_quota_trigger(definition: &TriggerDefinition) -> bool {
        definition.trigger_name == QUOTA_TRIGGER_NAME
    }
}

/// Supplies the byte limit handed to the quota trigger
pub trait QuotaPolicy: Send + Sync {
    fn quota_limit(&self, organization: &Organization, member: &Member) -> i64;
}

/// Members keep their personal quota when they become owner
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberQuotaPolicy;

impl QuotaPolicy for MemberQuotaPolicy {
    fn quota_limit(&self, _organization: &Organization, member: &Member) -> i64 {
        member.quota_in_bytes
    }
}
