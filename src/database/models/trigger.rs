use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::manager::{quote_identifier, quote_literal};

// pg_trigger.tgtype bit flags (see catalog/pg_trigger.h)
const TRIGGER_TYPE_ROW: i16 = 1 << 0;
const TRIGGER_TYPE_BEFORE: i16 = 1 << 1;
const TRIGGER_TYPE_INSERT: i16 = 1 << 2;
const TRIGGER_TYPE_DELETE: i16 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i16 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i16 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i16 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerEvent {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
            TriggerEvent::Truncate => "TRUNCATE",
        }
    }
}

/// A trigger together with the function it invokes.
///
/// Triggers belong to their table and follow it on `ALTER TABLE .. SET SCHEMA`,
/// but functions stay behind, so the pair is always captured and rebuilt together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub trigger_name: String,
    pub table_namespace: String,
    pub table_name: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub for_each_row: bool,
    pub arguments: Vec<String>,
    pub function_namespace: String,
    pub function_name: String,
    pub function_language: String,
    pub function_source: String,
}

/// Raw introspection row from pg_trigger / pg_proc
#[derive(Debug, Clone, FromRow)]
pub struct TriggerRow {
    pub trigger_name: String,
    pub table_namespace: String,
    pub table_name: String,
    pub trigger_type: i16,
    pub trigger_args: Vec<u8>,
    pub function_namespace: String,
    pub function_name: String,
    pub function_language: String,
    pub function_source: String,
}

impl From<TriggerRow> for TriggerDefinition {
    fn from(row: TriggerRow) -> Self {
        let (timing, events, for_each_row) = decode_trigger_type(row.trigger_type);
        Self {
            trigger_name: row.trigger_name,
            table_namespace: row.table_namespace,
            table_name: row.table_name,
            timing,
            events,
            for_each_row,
            arguments: decode_trigger_args(&row.trigger_args),
            function_namespace: row.function_namespace,
            function_name: row.function_name,
            function_language: row.function_language,
            function_source: row.function_source,
        }
    }
}

/// Split pg_trigger.tgtype into timing, events and level
pub fn decode_trigger_type(tgtype: i16) -> (TriggerTiming, Vec<TriggerEvent>, bool) {
    let timing = if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
        TriggerTiming::InsteadOf
    } else if tgtype & TRIGGER_TYPE_BEFORE != 0 {
        TriggerTiming::Before
    } else {
        TriggerTiming::After
    };

    let events = [
        (TRIGGER_TYPE_INSERT, TriggerEvent::Insert),
        (TRIGGER_TYPE_UPDATE, TriggerEvent::Update),
        (TRIGGER_TYPE_DELETE, TriggerEvent::Delete),
        (TRIGGER_TYPE_TRUNCATE, TriggerEvent::Truncate),
    ]
    .into_iter()
    .filter(|(flag, _)| tgtype & flag != 0)
    .map(|(_, event)| event)
    .collect();

    (timing, events, tgtype & TRIGGER_TYPE_ROW != 0)
}

/// pg_trigger.tgargs stores each argument NUL-terminated
pub fn decode_trigger_args(raw: &[u8]) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    raw.split(|b| *b == 0)
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

impl TriggerDefinition {
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", quote_identifier(&self.table_namespace), quote_identifier(&self.table_name))
    }

    pub fn qualified_function(&self) -> String {
        format!("{}.{}", quote_identifier(&self.function_namespace), quote_identifier(&self.function_name))
    }

    pub fn fires_on(&self, event: TriggerEvent) -> bool {
        self.events.contains(&event)
    }

    /// CREATE OR REPLACE FUNCTION statement for the backing function
    pub fn function_sql(&self) -> String {
        let tag = dollar_tag(&self.function_source);
        format!(
            "CREATE OR REPLACE FUNCTION {}() RETURNS trigger AS {tag}{}{tag} LANGUAGE {}",
            self.qualified_function(),
            self.function_source,
            self.function_language,
        )
    }

    /// CREATE TRIGGER statement binding the function to the table
    pub fn trigger_sql(&self) -> String {
        let events = self
            .events
            .iter()
            .map(TriggerEvent::as_sql)
            .collect::<Vec<_>>()
            .join(" OR ");
        let level = if self.for_each_row { "ROW" } else { "STATEMENT" };
        let args = self
            .arguments
            .iter()
            .map(|a| quote_literal(a))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE TRIGGER {} {} {} ON {} FOR EACH {} EXECUTE PROCEDURE {}({})",
            quote_identifier(&self.trigger_name),
            self.timing.as_sql(),
            events,
            self.qualified_table(),
            level,
            self.qualified_function(),
            args,
        )
    }

    /// Functions in these languages are plain source and can be recreated
    /// anywhere; `internal` and `c` functions are bound in place instead.
    pub fn is_portable(&self) -> bool {
        matches!(self.function_language.as_str(), "plpgsql" | "sql")
    }

    /// Same trigger bound to the table in `to`, with the function living there too.
    ///
    /// Only references to `moved` objects are rewritten in the body; anything
    /// else in `from` stays where it is.
    pub fn relocated(&self, from: &str, to: &str, moved: &[String]) -> TriggerDefinition {
        TriggerDefinition {
            table_namespace: to.to_string(),
            function_namespace: to.to_string(),
            function_source: substitute_references(&self.function_source, from, to, moved),
            ..self.clone()
        }
    }

    /// Same trigger bound to the table in `to`, still calling the original function
    pub fn rebound(&self, to: &str) -> TriggerDefinition {
        TriggerDefinition {
            table_namespace: to.to_string(),
            ..self.clone()
        }
    }
}

/// Pick a dollar-quote tag that does not occur in the body
fn dollar_tag(body: &str) -> String {
    let mut tag = "$body$".to_string();
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$body{}$", n);
    }
    tag
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '"'
}

/// Read the identifier at the start of `sql`: its name as Postgres resolves it
/// and its length in bytes.
fn leading_identifier(sql: &str) -> Option<(String, usize)> {
    if let Some(rest) = sql.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '"' {
                if let Some((_, '"')) = chars.peek() {
                    chars.next();
                    name.push('"');
                    continue;
                }
                return Some((name, i + 2));
            }
            name.push(c);
        }
        return None;
    }

    let len = sql
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map_or(sql.len(), |(i, _)| i);
    (len > 0).then(|| (sql[..len].to_lowercase(), len))
}

/// Rewrite schema-qualified references `from.x` / `"from".x` to `"to".x` for
/// every `x` in `names`.
///
/// Only matches at identifier boundaries, so `republic.t` is left alone.
/// Unquoted names fold to lower case in Postgres, hence the case-insensitive match.
pub fn substitute_references(sql: &str, from: &str, to: &str, names: &[String]) -> String {
    let replacement = format!("{}.", quote_identifier(to));
    let quoted = format!("{}.", quote_identifier(from));
    let bare = format!("{}.", from.to_lowercase());

    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    let mut prev: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        if prev.map_or(true, |p| !is_identifier_char(p)) {
            let prefix = if rest.starts_with(&quoted) {
                Some(quoted.len())
            } else if rest.get(..bare.len()).map_or(false, |head| head.eq_ignore_ascii_case(&bare)) {
                Some(bare.len())
            } else {
                None
            };

            if let Some(prefix) = prefix {
                let target = leading_identifier(&rest[prefix..]);
                if let Some((_, len)) = target.filter(|(name, _)| names.contains(name)) {
                    out.push_str(&replacement);
                    out.push_str(&rest[prefix..prefix + len]);
                    rest = &rest[prefix + len..];
                    prev = Some('"');
                    continue;
                }
                out.push_str(&rest[..prefix]);
                rest = &rest[prefix..];
                prev = Some('.');
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
        prev = Some(c);
    }

    out
}
