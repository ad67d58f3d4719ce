//! Parameter extraction from free text.
//!
//! With a request schema, each property is tried against a fixed sequence
//! of strategies (explicit mention, typed entity, enum, schema regex,
//! name-fragment heuristics, quoted text) and the first value that coerces
//! to the declared type wins. Without a schema, typed entities, quoted
//! strings and numbers are collected under fixed keys.

use std::sync::LazyLock;

use regex::Regex;
use sa_protocol::{Schema, SchemaType};
use serde_json::{Map, Number, Value};

use crate::patterns;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://[^\s]+").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[+]?[(]?[0-9]{1,3}[)]?[-\s.]?[(]?[0-9]{1,4}[)]?[-\s.]?[0-9]{1,4}[-\s.]?[0-9]{1,9}")
        .unwrap()
});
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b|\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b").unwrap()
});
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AP]M)?\b").unwrap());
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
});
static IP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").unwrap());

static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["'](.*?)["']"#).unwrap());
static AFTER_PREPOSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:for|with|of|about)\s+([a-zA-Z0-9_]+)").unwrap());
static BEFORE_COPULA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([a-zA-Z0-9_]+)\s+(?:is|are|was|were)").unwrap());

/// Name fragments with dedicated context patterns, checked in order.
static CONTEXT_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    let table: [(&str, &[&str]); 8] = [
        (
            "username",
            &[
                r"(?i)user(?:name)?\s+(?:is\s+)?([a-zA-Z0-9_]+)",
                r"(?i)(?:as|for)\s+([a-zA-Z0-9_]+)",
            ],
        ),
        (
            "password",
            &[
                r"(?i)password\s+(?:is\s+)?([^\s]+)",
                r"(?i)with\s+password\s+([^\s]+)",
            ],
        ),
        (
            "name",
            &[
                r"(?i)(?:called|named)\s+([a-zA-Z\s]+?)(?:\s|$)",
                r"(?i)name\s+(?:is\s+)?([a-zA-Z\s]+?)(?:\s|$)",
            ],
        ),
        (
            "title",
            &[
                r#"(?i)(?:titled|called)\s+"([^"]+)""#,
                r"(?i)title\s+(?:is\s+)?([^,\n]+)",
            ],
        ),
        (
            "description",
            &[
                r#"(?i)description\s+(?:is\s+)?["']([^"']+)"#,
                r#"(?i)described\s+as\s+["']([^"']+)"#,
            ],
        ),
        (
            "id",
            &[r"(?i)\bid\s+(?:is\s+)?([a-zA-Z0-9_-]+)", r"#([a-zA-Z0-9_-]+)"],
        ),
        (
            "quantity",
            &[
                r"(?i)(\d+)\s+(?:items?|pieces?|units?)",
                r"(?i)quantity\s+(?:of\s+)?(\d+)",
            ],
        ),
        (
            "price",
            &[
                r"\$([0-9]+(?:\.[0-9]{2})?)",
                r"(?i)([0-9]+(?:\.[0-9]{2})?)\s+(?:dollars?|USD)",
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(fragment, patterns)| {
            let compiled = patterns.iter().map(|p| Regex::new(p).unwrap()).collect();
            (fragment, compiled)
        })
        .collect()
});

/// Typed entities recognised in free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Email,
    Url,
    Phone,
    Date,
    Time,
    Number,
    Uuid,
    Ip,
}

impl Entity {
    pub const ALL: [Entity; 8] = [
        Self::Email,
        Self::Url,
        Self::Phone,
        Self::Date,
        Self::Time,
        Self::Number,
        Self::Uuid,
        Self::Ip,
    ];

    fn regex(&self) -> &'static Regex {
        match self {
            Self::Email => &EMAIL,
            Self::Url => &URL,
            Self::Phone => &PHONE,
            Self::Date => &DATE,
            Self::Time => &TIME,
            Self::Number => &NUMBER,
            Self::Uuid => &UUID,
            Self::Ip => &IP,
        }
    }

    /// First occurrence in `text`.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex().find(text).map(|m| m.as_str())
    }

    /// Entity implied by a property's declared type and format.
    fn for_schema(kind: SchemaType, format: Option<&str>) -> Option<Self> {
        match (kind, format) {
            (SchemaType::String, Some("email")) => Some(Self::Email),
            (SchemaType::String, Some("uri" | "url")) => Some(Self::Url),
            (SchemaType::String, Some("date" | "date-time")) => Some(Self::Date),
            (SchemaType::String, Some("time")) => Some(Self::Time),
            (SchemaType::String, Some("uuid")) => Some(Self::Uuid),
            (SchemaType::String, Some("ipv4")) => Some(Self::Ip),
            (SchemaType::String, Some("phone")) => Some(Self::Phone),
            (SchemaType::Integer | SchemaType::Number, _) => Some(Self::Number),
            _ => None,
        }
    }
}

/// Stateless extractor; identical `(text, schema)` always yields identical
/// output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterExtractor;

impl ParameterExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract arguments, guided by `schema` when it declares properties.
    pub fn extract(&self, text: &str, schema: Option<&Schema>) -> Map<String, Value> {
        match schema {
            Some(schema) if !schema.properties.is_empty() => extract_with_schema(text, schema),
            _ => extract_heuristic(text),
        }
    }

    /// Extract a single property value.
    pub fn extract_property(&self, text: &str, name: &str, property: &Schema) -> Option<Value> {
        extract_single(text, name, property)
    }

    /// Value for a `{name}` path segment: an explicit mention or a
    /// name-fragment context first, then the first UUID or number literal
    /// not already in `taken`.
    pub fn extract_path_param(&self, text: &str, name: &str, taken: &[String]) -> Option<Value> {
        let free = |raw: &String| !taken.contains(raw);
        by_name_mention(text, name)
            .and_then(|raw| raw.split_whitespace().next().map(str::to_string))
            .or_else(|| by_name_fragment(text, name))
            .or_else(|| {
                UUID.find_iter(text)
                    .chain(NUMBER.find_iter(text))
                    .map(|m| m.as_str().to_string())
                    .find(free)
            })
            .map(|raw| match raw.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(raw),
            })
    }
}

fn extract_with_schema(text: &str, schema: &Schema) -> Map<String, Value> {
    let mut args = Map::new();
    for (name, property) in &schema.properties {
        if let Some(value) = extract_single(text, name, property) {
            args.insert(name.clone(), value);
        }
    }
    for (name, property) in &schema.properties {
        if schema.is_required(name)
            && !args.contains_key(name)
            && let Some(value) = extract_required(text, property)
        {
            args.insert(name.clone(), value);
        }
    }
    args
}

fn declared_kind(property: &Schema) -> SchemaType {
    property.kind.unwrap_or(SchemaType::String)
}

fn extract_single(text: &str, name: &str, property: &Schema) -> Option<Value> {
    let kind = declared_kind(property);
    let coerce_text = |raw: String| coerce(Value::String(raw), kind);

    by_name_mention(text, name)
        .and_then(coerce_text)
        .or_else(|| {
            Entity::for_schema(kind, property.format.as_deref())
                .and_then(|entity| entity.find(text))
                .and_then(|raw| coerce_text(raw.to_string()))
        })
        .or_else(|| by_enum(text, &property.enum_values).and_then(|v| coerce(v, kind)))
        .or_else(|| by_schema_pattern(text, property.pattern.as_deref()).and_then(coerce_text))
        .or_else(|| by_name_fragment(text, name).and_then(coerce_text))
        .or_else(|| {
            if kind == SchemaType::String {
                first_quoted(text).and_then(coerce_text)
            } else {
                None
            }
        })
}

/// "name: value", "name = value", "name is value", "with name value",
/// "set name to value".
fn by_name_mention(text: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let value = r#"["']*([^"',\n]+)"#;
    let mentions = [
        format!(r"\b{name}[\s:=]+{value}"),
        format!(r"\b{name}\s+is\s+{value}"),
        format!(r"with\s+{name}\s+{value}"),
        format!(r"set\s+{name}\s+to\s+{value}"),
    ];
    mentions.iter().find_map(|pattern| {
        let regex = patterns::compiled_ignore_case(pattern)?;
        let captured = regex.captures(text)?.get(1)?.as_str().trim();
        (!captured.is_empty()).then(|| captured.to_string())
    })
}

/// An enum value mentioned verbatim, or by its first three characters when
/// longer than three.
fn by_enum(text: &str, values: &[Value]) -> Option<Value> {
    let lower = text.to_lowercase();
    values
        .iter()
        .find(|value| {
            let label = match value {
                Value::String(s) => s.to_lowercase(),
                other => other.to_string().to_lowercase(),
            };
            if label.is_empty() {
                return false;
            }
            if lower.contains(&label) {
                return true;
            }
            label.chars().count() > 3 && {
                let prefix: String = label.chars().take(3).collect();
                lower.contains(&prefix)
            }
        })
        .cloned()
}

fn by_schema_pattern(text: &str, pattern: Option<&str>) -> Option<String> {
    let regex = patterns::compiled_ignore_case(pattern?)?;
    regex.find(text).map(|m| m.as_str().to_string())
}

fn by_name_fragment(text: &str, name: &str) -> Option<String> {
    let name = name.to_lowercase();
    CONTEXT_PATTERNS
        .iter()
        .filter(|(fragment, _)| name.contains(fragment))
        .flat_map(|(_, patterns)| patterns.iter())
        .find_map(|regex| {
            let captured = regex.captures(text)?.get(1)?.as_str().trim();
            (!captured.is_empty()).then(|| captured.to_string())
        })
}

fn first_quoted(text: &str) -> Option<String> {
    QUOTED
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Second, more aggressive pass for required properties still missing.
fn extract_required(text: &str, property: &Schema) -> Option<Value> {
    let kind = declared_kind(property);
    let raw = match kind {
        SchemaType::String => first_quoted(text).or_else(|| {
            [&*AFTER_PREPOSITION, &*BEFORE_COPULA]
                .into_iter()
                .find_map(|regex| regex.captures(text)?.get(1).map(|m| m.as_str().to_string()))
        }),
        SchemaType::Integer | SchemaType::Number => {
            NUMBER.find(text).map(|m| m.as_str().to_string())
        }
        _ => None,
    }?;
    coerce(Value::String(raw), kind)
}

/// Coerce a raw value to the declared type. `None` when it does not fit.
pub fn coerce(raw: Value, kind: SchemaType) -> Option<Value> {
    let Value::String(text) = raw else {
        return Some(raw);
    };
    let text = text.trim();
    match kind {
        SchemaType::Integer => text.parse::<i64>().ok().map(Value::from),
        SchemaType::Number => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        SchemaType::Boolean => Some(Value::Bool(matches!(
            text.to_lowercase().as_str(),
            "true" | "yes" | "1" | "on" | "enabled"
        ))),
        SchemaType::Array => Some(Value::Array(
            text.split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        )),
        _ => Some(Value::String(text.to_string())),
    }
}

fn extract_heuristic(text: &str) -> Map<String, Value> {
    let mut args = Map::new();

    for entity in Entity::ALL {
        let key = match entity {
            Entity::Email => "email",
            Entity::Url => "url",
            Entity::Phone => "phone",
            Entity::Date => "date",
            Entity::Uuid => "id",
            Entity::Time | Entity::Number | Entity::Ip => continue,
        };
        if let Some(found) = entity.find(text) {
            args.insert(key.into(), Value::String(found.to_string()));
        }
    }

    for (i, quote) in QUOTED
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .take(3)
        .enumerate()
    {
        let quote = quote.as_str();
        let key = if quote.contains('@') {
            "email".to_string()
        } else if quote.chars().count() < 20 {
            format!("value{}", i + 1)
        } else {
            "text".to_string()
        };
        args.insert(key, Value::String(quote.to_string()));
    }

    for literal in NUMBER.find_iter(text).take(2) {
        let Ok(number) = literal.as_str().parse::<f64>() else {
            continue;
        };
        if !args.contains_key("quantity") && number.fract() == 0.0 && number <= i64::MAX as f64 {
            args.insert("quantity".into(), Value::from(number as i64));
        } else if !args.contains_key("amount")
            && let Some(amount) = Number::from_f64(number)
        {
            args.insert("amount".into(), Value::Number(amount));
        }
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(text: &str, schema: &Schema) -> Map<String, Value> {
        ParameterExtractor::new().extract(text, Some(schema))
    }

    fn prop(kind: SchemaType) -> Schema {
        Schema::of(kind)
    }

    // ── quoted text ──

    #[test]
    fn required_text_from_quotes() {
        let schema = Schema::object([("text", prop(SchemaType::String))], &["text"]);
        let args = extract(r#"create a todo "buy milk""#, &schema);
        assert_eq!(args.get("text"), Some(&json!("buy milk")));
    }

    #[test]
    fn single_quotes_work_too() {
        let schema = Schema::object([("text", prop(SchemaType::String))], &[]);
        let args = extract("add note 'call mom'", &schema);
        assert_eq!(args["text"], "call mom");
    }

    // ── explicit mention ──

    #[test]
    fn name_colon_value() {
        let schema = Schema::object([("priority", prop(SchemaType::Integer))], &[]);
        let args = extract("create task priority: 3", &schema);
        assert_eq!(args["priority"], 3);
    }

    #[test]
    fn with_name_value() {
        let schema = Schema::object([("role", prop(SchemaType::String))], &[]);
        let args = extract("invite sam with role admin, today", &schema);
        assert_eq!(args["role"], "admin");
    }

    #[test]
    fn mention_requires_word_boundary() {
        let schema = Schema::object([("id", prop(SchemaType::String))], &[]);
        // "paid 40" is not a mention of "id"
        let args = extract("I paid 40 for order 7", &schema);
        assert!(args.get("id").is_none());
    }

    #[test]
    fn failed_coercion_falls_through_to_next_strategy() {
        let schema = Schema::object([("quantity", prop(SchemaType::Integer))], &[]);
        // mention captures "lots", which is not an integer
        let args = extract("quantity lots, 5 units", &schema);
        assert_eq!(args["quantity"], 5);
    }

    // ── typed entities ──

    #[test]
    fn email_by_format() {
        let schema = Schema::object(
            [("contact", prop(SchemaType::String).with_format("email"))],
            &[],
        );
        let args = extract("invite jane.doe@example.com to the team", &schema);
        assert_eq!(args["contact"], "jane.doe@example.com");
    }

    #[test]
    fn uuid_by_format() {
        let uuid = prop(SchemaType::String).with_format("uuid");
        let schema = Schema::object([("ref", uuid)], &[]);
        let text = "look up 123E4567-e89b-12d3-a456-426614174000 now";
        let args = extract(text, &schema);
        assert_eq!(args["ref"], "123E4567-e89b-12d3-a456-426614174000");
    }

    #[test]
    fn number_coerced_to_float() {
        let schema = Schema::object([("amount", prop(SchemaType::Number))], &[]);
        let args = extract("transfer 12.50 to savings", &schema);
        assert_eq!(args["amount"], json!(12.5));
    }

    // ── enums and patterns ──

    #[test]
    fn enum_exact_and_prefix() {
        let schema = Schema::object(
            [(
                "priority",
                prop(SchemaType::String).with_enum(vec![json!("low"), json!("urgent")]),
            )],
            &[],
        );
        assert_eq!(extract("mark it urgent", &schema)["priority"], "urgent");
        assert_eq!(extract("this is urg stuff", &schema)["priority"], "urgent");
        assert_eq!(extract("keep it low key", &schema)["priority"], "low");
    }

    #[test]
    fn schema_pattern() {
        let schema = Schema::object(
            [("sku", prop(SchemaType::String).with_pattern(r"[A-Z]{3}-\d{4}"))],
            &[],
        );
        let args = extract("restock abc-1234 today", &schema);
        assert_eq!(args["sku"], "abc-1234");
    }

    // ── name fragments ──

    #[test]
    fn username_fragment() {
        let schema = Schema::object([("username", prop(SchemaType::String))], &[]);
        let args = extract("sign in as alice_99", &schema);
        assert_eq!(args["username"], "alice_99");
    }

    #[test]
    fn price_fragment() {
        let schema = Schema::object([("unit_price", prop(SchemaType::String))], &[]);
        let args = extract("list it for $19.99", &schema);
        assert_eq!(args["unit_price"], "19.99");
    }

    #[test]
    fn hash_id_fragment() {
        let schema = Schema::object([("order_id", prop(SchemaType::String))], &[]);
        let args = extract("cancel order #A-77", &schema);
        assert_eq!(args["order_id"], "A-77");
    }

    // ── required pass ──

    #[test]
    fn required_string_after_preposition() {
        let schema = Schema::object([("topic", prop(SchemaType::String))], &["topic"]);
        let args = extract("find articles about rust", &schema);
        assert_eq!(args["topic"], "rust");
    }

    #[test]
    fn optional_missing_stays_missing() {
        let schema = Schema::object([("topic", prop(SchemaType::String))], &[]);
        let args = extract("find articles about rust", &schema);
        assert!(!args.contains_key("topic"));
    }

    // ── coercion ──

    #[test]
    fn coerce_values() {
        assert_eq!(coerce(json!("42"), SchemaType::Integer), Some(json!(42)));
        assert_eq!(coerce(json!("4.2"), SchemaType::Integer), None);
        assert_eq!(coerce(json!("abc"), SchemaType::Number), None);
        assert_eq!(coerce(json!("Yes"), SchemaType::Boolean), Some(json!(true)));
        assert_eq!(
            coerce(json!("off"), SchemaType::Boolean),
            Some(json!(false))
        );
        assert_eq!(
            coerce(json!("a, b,c"), SchemaType::Array),
            Some(json!(["a", "b", "c"]))
        );
        assert_eq!(coerce(json!(7), SchemaType::String), Some(json!(7)));
    }

    // ── path parameters ──

    #[test]
    fn path_param_from_bare_number() {
        let x = ParameterExtractor::new();
        let found = x.extract_path_param("delete todo 42", "id", &[]);
        assert_eq!(found, Some(json!(42)));
        assert_eq!(x.extract_path_param("delete the todo", "id", &[]), None);
    }

    #[test]
    fn path_param_prefers_mention_and_fragment() {
        let x = ParameterExtractor::new();
        let found = x.extract_path_param("show order 3 with id 17 please", "id", &[]);
        assert_eq!(found, Some(json!(17)));
        let found = x.extract_path_param("remove ticket #ab-9", "id", &[]);
        assert_eq!(found, Some(json!("ab-9")));
    }

    #[test]
    fn path_param_uuid_before_numbers() {
        let x = ParameterExtractor::new();
        let text = "fetch 2 records for 123e4567-e89b-12d3-a456-426614174000";
        assert_eq!(
            x.extract_path_param(text, "key", &[]),
            Some(json!("123e4567-e89b-12d3-a456-426614174000"))
        );
    }

    #[test]
    fn path_param_skips_taken_literals() {
        let x = ParameterExtractor::new();
        let taken = ["7".to_string()];
        let found = x.extract_path_param("user 7 post 12", "post_id", &taken);
        assert_eq!(found, Some(json!(12)));
    }

    // ── heuristic ──

    #[test]
    fn heuristic_entities() {
        let args = ParameterExtractor::new().extract(
            "email bob@corp.io about https://corp.io/x on 2024-01-15",
            None,
        );
        assert_eq!(args["email"], "bob@corp.io");
        assert_eq!(args["url"], "https://corp.io/x");
        assert_eq!(args["date"], "2024-01-15");
    }

    #[test]
    fn heuristic_quotes_and_numbers() {
        let args = ParameterExtractor::new().extract(
            r#"order 3 of "red shoes" and "a much longer quoted description" at 4.5"#,
            None,
        );
        assert_eq!(args["value1"], "red shoes");
        assert_eq!(args["text"], "a much longer quoted description");
        assert_eq!(args["quantity"], 3);
        assert_eq!(args["amount"], json!(4.5));
    }

    #[test]
    fn schema_without_properties_is_heuristic() {
        let args = ParameterExtractor::new().extract("buy 2 apples", Some(&Schema::default()));
        assert_eq!(args["quantity"], 2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let schema = Schema::object(
            [
                ("title", prop(SchemaType::String)),
                ("count", prop(SchemaType::Integer)),
                ("when", prop(SchemaType::String).with_format("date")),
            ],
            &["title"],
        );
        let text = r#"schedule "standup" with count 3 on 01/02/2025"#;
        let first = extract(text, &schema);
        for _ in 0..10 {
            assert_eq!(extract(text, &schema), first);
        }
        let keys: Vec<&String> = first.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
