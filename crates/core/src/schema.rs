// Input schema generation from method descriptors

use crate::descriptor::MethodDescriptor;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// JSON type vocabulary used in tool input schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    /// Map a source type hint to a JSON type; `None` when the hint is not recognized
    pub fn parse_hint(hint: &str) -> Option<Self> {
        let base = strip_optional(hint.trim());
        // Generic arguments do not change the container type
        let origin = base
            .split(['[', '<', '('])
            .next()
            .unwrap_or(base)
            .trim()
            .rsplit(['.', ':'])
            .next()
            .unwrap_or(base)
            .to_lowercase();

        match origin.as_str() {
            "int" | "integer" | "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8"
            | "u16" | "u32" | "u64" | "u128" | "usize" | "long" => Some(Self::Integer),
            "float" | "number" | "f32" | "f64" | "double" | "decimal" => Some(Self::Number),
            "bool" | "boolean" => Some(Self::Boolean),
            "str" | "string" => Some(Self::String),
            "list" | "array" | "vec" | "tuple" | "set" | "frozenset" | "sequence" | "slice"
            | "hashset" | "btreeset" => Some(Self::Array),
            "dict" | "object" | "map" | "mapping" | "hashmap" | "btreemap" => Some(Self::Object),
            _ => None,
        }
    }
}

/// Whether a type hint admits `None`/null besides its base type
pub fn is_optional_hint(hint: &str) -> bool {
    let hint = hint.trim();
    ["Optional[", "Option<", "typing.Optional["]
        .iter()
        .any(|wrapper| hint.starts_with(wrapper))
        || union_without_none(hint).is_some()
}

fn strip_optional(hint: &str) -> &str {
    for wrapper in ["Optional[", "Option<", "typing.Optional["] {
        if let Some(inner) = hint.strip_prefix(wrapper) {
            return inner
                .strip_suffix([']', '>'])
                .unwrap_or(inner)
                .trim();
        }
    }
    union_without_none(hint).unwrap_or(hint)
}

/// `int | None` and `None | int` reduce to `int`
fn union_without_none(hint: &str) -> Option<&str> {
    let (left, right) = hint.split_once('|')?;
    match (left.trim(), right.trim()) {
        ("None", other) | (other, "None") if !other.contains('|') => Some(other),
        _ => None,
    }
}

/// Schema of a single input property.
///
/// On the wire `type` is either a single name or `[<type>, "null"]` when nullable.
/// `inferred` marks properties whose type was guessed rather than declared; they are
/// advertised as `string` but not type-checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PropertyWire", into = "PropertyWire")]
pub struct PropertySchema {
    pub json_type: JsonType,
    pub nullable: bool,
    pub inferred: bool,
    pub description: Option<String>,
    pub default: Option<Value>,
}

impl PropertySchema {
    pub fn new(json_type: JsonType) -> Self {
        Self {
            json_type,
            nullable: false,
            inferred: false,
            description: None,
            default: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PropertyType {
    Single(JsonType),
    Union(Vec<JsonType>),
}

#[derive(Serialize, Deserialize)]
struct PropertyWire {
    #[serde(rename = "type")]
    property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl From<PropertyWire> for PropertySchema {
    fn from(wire: PropertyWire) -> Self {
        let (json_type, nullable) = match wire.property_type {
            PropertyType::Single(json_type) => (json_type, false),
            PropertyType::Union(types) => {
                let base = types.iter().copied().find(|t| *t != JsonType::Null);
                let nullable = types.contains(&JsonType::Null) && base.is_some();
                (base.unwrap_or(JsonType::Null), nullable)
            }
        };

        Self {
            json_type,
            nullable,
            inferred: false,
            description: wire.description,
            default: wire.default,
        }
    }
}

impl From<PropertySchema> for PropertyWire {
    fn from(property: PropertySchema) -> Self {
        let property_type = if property.nullable && property.json_type != JsonType::Null {
            PropertyType::Union(vec![property.json_type, JsonType::Null])
        } else {
            PropertyType::Single(property.json_type)
        };

        Self {
            property_type,
            description: property.description,
            default: property.default,
        }
    }
}

/// Object-shaped input schema of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: JsonType,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: JsonType::Object,
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    /// The schema arguments are checked against: inferred properties carry no type
    /// constraint, and `required` is only enforced when `strict`.
    pub fn validation_schema(&self, strict: bool) -> Value {
        let mut value = self.to_value();

        if let Some(properties) = value.get_mut("properties").and_then(Value::as_object_mut) {
            for (name, property) in &self.properties {
                if !property.inferred {
                    continue;
                }
                if let Some(schema) = properties.get_mut(name).and_then(Value::as_object_mut) {
                    schema.remove("type");
                }
            }
        }
        if !strict {
            if let Some(schema) = value.as_object_mut() {
                schema.remove("required");
            }
        }

        value
    }
}

/// Build the input schema of a descriptor
pub fn build_schema(descriptor: &MethodDescriptor) -> InputSchema {
    let mut schema = InputSchema::default();

    for parameter in descriptor
        .parameters
        .iter()
        .filter(|p| p.kind.is_representable())
    {
        let hint = parameter.type_hint.as_deref();
        let declared = hint.and_then(JsonType::parse_hint);
        let default = parameter.default.as_ref().map(|d| d.to_schema_value());

        let property = PropertySchema {
            json_type: declared.unwrap_or(JsonType::String),
            nullable: hint.is_some_and(is_optional_hint)
                || matches!(default, Some(Value::Null)),
            inferred: declared.is_none(),
            description: descriptor
                .documentation
                .as_deref()
                .and_then(|doc| parameter_description(doc, &parameter.name)),
            default,
        };

        if !parameter.has_default() {
            schema.required.push(parameter.name.clone());
        }
        schema.properties.insert(parameter.name.clone(), property);
    }

    schema
}

/// Find a parameter description in free-text documentation.
///
/// Recognizes lines such as `:param limit: max items` or `limit (int): arg, max items`,
/// taking the text after the last colon.
pub fn parameter_description(documentation: &str, name: &str) -> Option<String> {
    let name = name.to_lowercase();
    documentation
        .lines()
        .map(|line| line.to_lowercase())
        .find(|line| line.contains(&name) && (line.contains("param") || line.contains("arg")))
        .and_then(|line| {
            let (_, description) = line.rsplit_once(':')?;
            let description = description.trim();
            (!description.is_empty()).then(|| description.to_string())
        })
}

/// Optional collaborator that rewrites property descriptions
#[async_trait::async_trait]
pub trait SchemaEnhancer: Send + Sync {
    async fn enhance(
        &self,
        schema: &InputSchema,
        documentation: Option<&str>,
    ) -> Result<InputSchema>;
}

/// Upper bound on a single enhancement
pub const ENHANCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run an enhancer, keeping the local schema on failure or timeout.
/// Only descriptions are taken from the enhanced schema; types, defaults and
/// required fields stay as built from the descriptor.
pub async fn enhance_or_keep(
    enhancer: Option<&dyn SchemaEnhancer>,
    mut schema: InputSchema,
    documentation: Option<&str>,
) -> InputSchema {
    let Some(enhancer) = enhancer else {
        return schema;
    };

    let improved =
        match tokio::time::timeout(ENHANCE_TIMEOUT, enhancer.enhance(&schema, documentation)).await
        {
            Ok(Ok(improved)) if improved.schema_type == JsonType::Object => improved,
            Ok(Ok(_)) => {
                tracing::warn!("Schema enhancer returned a non-object schema, keeping local schema");
                return schema;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Schema enhancement failed, keeping local schema");
                return schema;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = ENHANCE_TIMEOUT.as_secs(),
                    "Schema enhancement timed out, keeping local schema"
                );
                return schema;
            }
        };

    for (name, property) in schema.properties.iter_mut() {
        if let Some(description) = improved
            .properties
            .get(name)
            .and_then(|p| p.description.clone())
            .filter(|d| !d.trim().is_empty())
        {
            property.description = Some(description);
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Parameter, ParameterKind};

    fn descriptor() -> MethodDescriptor {
        MethodDescriptor::new("repos.list_commits")
            .documented(":param owner: repository owner\n:param limit: max commits")
            .param(Parameter::new("self").with_kind(ParameterKind::Receiver))
            .param(Parameter::typed("owner", "str"))
            .param(Parameter::typed("limit", "int").with_default(30))
            .param(Parameter::typed("since", "datetime").with_opaque_default("<now>"))
            .param(Parameter::new("args").with_kind(ParameterKind::VariadicPositional))
            .param(Parameter::new("kwargs").with_kind(ParameterKind::VariadicKeyword))
    }

    #[test]
    fn test_required_and_defaults() {
        let schema = build_schema(&descriptor());

        assert_eq!(schema.required, vec!["owner"]);
        assert_eq!(schema.properties.len(), 3);
        assert_eq!(schema.properties["limit"].default, Some(Value::from(30)));
        assert_eq!(
            schema.properties["since"].default,
            Some(Value::String("<now>".to_string()))
        );
        assert!(!schema.properties.contains_key("self"));
        assert!(!schema.properties.contains_key("kwargs"));
    }

    #[test]
    fn test_every_parameter_is_required_or_defaulted() {
        let descriptor = descriptor();
        let schema = build_schema(&descriptor);

        for parameter in descriptor.parameters.iter().filter(|p| p.kind.is_representable()) {
            assert_eq!(schema.is_required(&parameter.name), !parameter.has_default());
        }
    }

    #[test]
    fn test_type_hint_mapping() {
        assert_eq!(JsonType::parse_hint("int"), Some(JsonType::Integer));
        assert_eq!(JsonType::parse_hint("u64"), Some(JsonType::Integer));
        assert_eq!(JsonType::parse_hint("float"), Some(JsonType::Number));
        assert_eq!(JsonType::parse_hint("bool"), Some(JsonType::Boolean));
        assert_eq!(JsonType::parse_hint("str"), Some(JsonType::String));
        assert_eq!(JsonType::parse_hint("List[str]"), Some(JsonType::Array));
        assert_eq!(JsonType::parse_hint("Vec<String>"), Some(JsonType::Array));
        assert_eq!(JsonType::parse_hint("typing.Dict[str, int]"), Some(JsonType::Object));
        assert_eq!(JsonType::parse_hint("Optional[int]"), Some(JsonType::Integer));
        assert_eq!(JsonType::parse_hint("Option<bool>"), Some(JsonType::Boolean));
        assert_eq!(JsonType::parse_hint("int | None"), Some(JsonType::Integer));
        assert_eq!(JsonType::parse_hint("CustomThing"), None);
    }

    #[test]
    fn test_optional_hints() {
        assert!(is_optional_hint("Optional[int]"));
        assert!(is_optional_hint("Option<String>"));
        assert!(is_optional_hint("None | str"));
        assert!(!is_optional_hint("int"));
        assert!(!is_optional_hint("int | str"));
    }

    #[test]
    fn test_nullable_and_inferred_properties() {
        let schema = build_schema(
            &MethodDescriptor::new("fs.scan")
                .param(Parameter::typed("depth", "Optional[int]"))
                .param(Parameter::typed("cursor", "str").with_default(Value::Null))
                .param(Parameter::new("label"))
                .param(Parameter::typed("when", "datetime")),
        );

        let depth = &schema.properties["depth"];
        assert_eq!(depth.json_type, JsonType::Integer);
        assert!(depth.nullable && !depth.inferred);
        assert!(schema.properties["cursor"].nullable);
        assert!(schema.properties["label"].inferred);
        assert!(schema.properties["when"].inferred);

        let value = schema.to_value();
        assert_eq!(value["properties"]["depth"]["type"], serde_json::json!(["integer", "null"]));
        assert_eq!(value["properties"]["cursor"]["type"], serde_json::json!(["string", "null"]));
        assert_eq!(value["properties"]["label"]["type"], "string");
    }

    #[test]
    fn test_nullable_type_deserializes() {
        let property: PropertySchema =
            serde_json::from_value(serde_json::json!({"type": ["null", "integer"]})).unwrap();
        assert_eq!(property.json_type, JsonType::Integer);
        assert!(property.nullable);

        let property: PropertySchema =
            serde_json::from_value(serde_json::json!({"type": "boolean", "description": "x"}))
                .unwrap();
        assert_eq!(property, PropertySchema {
            description: Some("x".to_string()),
            ..PropertySchema::new(JsonType::Boolean)
        });
    }

    #[test]
    fn test_descriptions_from_documentation() {
        let schema = build_schema(&descriptor());
        assert_eq!(
            schema.properties["owner"].description.as_deref(),
            Some("repository owner")
        );
        assert_eq!(schema.properties["since"].description, None);
    }

    #[test]
    fn test_schema_serialization() {
        let schema = build_schema(&descriptor());
        let value = schema.to_value();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["limit"]["type"], "integer");
        assert_eq!(value["required"], serde_json::json!(["owner"]));
    }

    #[test]
    fn test_validation_schema() {
        let schema = build_schema(&descriptor());

        let lenient = schema.validation_schema(false);
        assert!(lenient.get("required").is_none());
        assert_eq!(lenient["properties"]["limit"]["type"], "integer");
        assert_eq!(lenient["properties"]["owner"]["type"], "string");
        // `datetime` is not a recognized hint
        assert!(lenient["properties"]["since"].get("type").is_none());

        let strict = schema.validation_schema(true);
        assert_eq!(strict["required"], serde_json::json!(["owner"]));
    }

    struct FailingEnhancer;

    #[async_trait::async_trait]
    impl SchemaEnhancer for FailingEnhancer {
        async fn enhance(&self, _: &InputSchema, _: Option<&str>) -> Result<InputSchema> {
            anyhow::bail!("model unavailable")
        }
    }

    struct StalledEnhancer;

    #[async_trait::async_trait]
    impl SchemaEnhancer for StalledEnhancer {
        async fn enhance(&self, _: &InputSchema, _: Option<&str>) -> Result<InputSchema> {
            std::future::pending().await
        }
    }

    /// Rewrites descriptions but also tries to loosen types and drop required fields
    struct SloppyEnhancer;

    #[async_trait::async_trait]
    impl SchemaEnhancer for SloppyEnhancer {
        async fn enhance(&self, schema: &InputSchema, _: Option<&str>) -> Result<InputSchema> {
            let mut improved = schema.clone();
            improved.required.clear();
            for property in improved.properties.values_mut() {
                property.json_type = JsonType::String;
                property.description = Some("better".to_string());
            }
            improved
                .properties
                .insert("invented".to_string(), PropertySchema::new(JsonType::Object));
            Ok(improved)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_enhancer_times_out() {
        let schema = build_schema(&descriptor());
        let kept = enhance_or_keep(Some(&StalledEnhancer), schema.clone(), None).await;
        assert_eq!(kept, schema);
    }

    #[tokio::test]
    async fn test_enhancer_only_rewrites_descriptions() {
        let schema = build_schema(&descriptor());
        let enhanced = enhance_or_keep(Some(&SloppyEnhancer), schema.clone(), None).await;

        assert_eq!(enhanced.required, schema.required);
        assert_eq!(enhanced.properties.len(), schema.properties.len());
        assert_eq!(enhanced.properties["limit"].json_type, JsonType::Integer);
        assert_eq!(enhanced.properties["limit"].description.as_deref(), Some("better"));
        assert!(enhanced.properties["since"].inferred);
    }

    #[tokio::test]
    async fn test_enhancer_failure_keeps_local_schema() {
        let schema = build_schema(&descriptor());
        let kept = enhance_or_keep(Some(&FailingEnhancer), schema.clone(), None).await;
        assert_eq!(kept, schema);

        let untouched = enhance_or_keep(None, schema.clone(), None).await;
        assert_eq!(untouched, schema);
    }
}
