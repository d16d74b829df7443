/// Model definitions and resolved schemas
///
/// A model declares its fields once through a [`ModelDefinition`]. Building it
/// discovers the key layout (primary key, sort key, index keys, discriminator)
/// and freezes it into a [`ModelSchema`]. Polymorphic bases own an
/// [`EntityRegistry`] that their registered subtypes share.

use crate::condition::Attr;
use crate::error::{Error, Result};
use crate::validation::FieldType;
use crate::value::{Document, Value};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Key role of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMarker {
    PartitionKey,
    SortKey,
    Discriminator,
    IndexPartitionKey(String),
    IndexSortKey(String),
}

/// Declared field of a model
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    /// Attribute name used on the wire when it differs from `name`
    pub alias: Option<String>,
    pub field_type: FieldType,
    pub markers: Vec<KeyMarker>,
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            alias: None,
            field_type,
            markers: Vec::new(),
            default: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.markers.push(KeyMarker::PartitionKey);
        self
    }

    pub fn sort_key(mut self) -> Self {
        self.markers.push(KeyMarker::SortKey);
        self
    }

    pub fn discriminator(mut self) -> Self {
        self.markers.push(KeyMarker::Discriminator);
        self
    }

    pub fn gsi_partition_key(mut self, index: impl Into<String>) -> Self {
        self.markers.push(KeyMarker::IndexPartitionKey(index.into()));
        self
    }

    pub fn gsi_sort_key(mut self, index: impl Into<String>) -> Self {
        self.markers.push(KeyMarker::IndexSortKey(index.into()));
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Attribute name as stored: the alias when set, else the field name.
    pub fn wire_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn has(&self, marker: &KeyMarker) -> bool {
        self.markers.contains(marker)
    }
}

/// Table a model is stored in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableConfig {
    pub table_name: String,
    pub region: Option<String>,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// Secondary index layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub pk_name: String,
    pub pk_type: String,
    pub sk_name: Option<String>,
    pub sk_type: Option<String>,
    pub projection: String,
}

impl IndexDefinition {
    fn new(name: &str, pk_name: String, sk_name: Option<String>) -> Self {
        let sk_type = sk_name.as_ref().map(|_| "S".to_string());
        Self {
            name: name.to_string(),
            pk_name,
            pk_type: "S".to_string(),
            sk_name,
            sk_type,
            projection: "ALL".to_string(),
        }
    }
}

/// Typed constructor for a polymorphic base, stored per discriminator value.
pub type Decoder<B> = Arc<dyn Fn(Document) -> Result<B> + Send + Sync>;

struct RegisteredEntity {
    type_name: String,
    decoder: Arc<dyn Any + Send + Sync>,
}

/// Discriminator value to subtype mapping, shared by a base and its subtypes.
#[derive(Default)]
pub struct EntityRegistry {
    entries: RwLock<HashMap<String, RegisteredEntity>>,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.read().iter().map(|(k, v)| (k.clone(), v.type_name.clone())))
            .finish()
    }
}

impl EntityRegistry {
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.read().contains_key(value)
    }

    /// Name of the model registered under `value`.
    pub fn type_name(&self, value: &str) -> Option<String> {
        self.entries.read().get(value).map(|e| e.type_name.clone())
    }

    pub fn values(&self) -> Vec<String> {
        let mut values: Vec<String> = self.entries.read().keys().cloned().collect();
        values.sort();
        values
    }

    fn insert<B: 'static>(&self, value: &str, type_name: &str, decoder: Decoder<B>) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(value) {
            return Err(Error::Definition(format!(
                "Discriminator value '{}' is already registered to {}, cannot register {}",
                value, existing.type_name, type_name
            )));
        }
        entries.insert(
            value.to_string(),
            RegisteredEntity {
                type_name: type_name.to_string(),
                decoder: Arc::new(decoder),
            },
        );
        Ok(())
    }

    fn decoder<B: 'static>(&self, value: &str) -> Option<Decoder<B>> {
        let entries = self.entries.read();
        entries
            .get(value)
            .and_then(|e| e.decoder.downcast_ref::<Decoder<B>>())
            .cloned()
    }
}

/// Declarative model description, resolved once into a [`ModelSchema`].
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: String,
    config: Option<TableConfig>,
    fields: Vec<FieldDef>,
    bases: Vec<Arc<ModelSchema>>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
            fields: Vec::new(),
            bases: Vec::new(),
        }
    }

    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a base model. Its fields and table config are inherited
    /// unless redeclared; the first base declared is the most derived.
    pub fn extends(mut self, base: &Arc<ModelSchema>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // Base fields first, local declarations replace inherited ones in place.
    fn merged_fields(&self) -> Vec<FieldDef> {
        let mut merged: Vec<FieldDef> = Vec::new();
        for base in self.bases.iter().rev() {
            for field in &base.field_defs {
                upsert(&mut merged, field.clone());
            }
        }
        for field in &self.fields {
            upsert(&mut merged, field.clone());
        }
        merged
    }

    /// Validates the definition and discovers its key layout.
    pub fn build(self) -> Result<ModelSchema> {
        let name = self.name.clone();
        let config = match &self.config {
            Some(config) => config.clone(),
            None => self
                .bases
                .first()
                .map(|base| TableConfig {
                    table_name: base.table_name.clone(),
                    region: Some(base.region.clone()),
                })
                .ok_or_else(|| {
                    Error::Definition(format!(
                        "Model {} is missing a table configuration with 'table_name'.",
                        name
                    ))
                })?,
        };
        if config.table_name.is_empty() {
            return Err(Error::Definition(format!(
                "Model {} is missing a 'table_name' in its table configuration.",
                name
            )));
        }

        let fields = self.merged_fields();
        let keys = scan_markers(&name, &fields)?;

        let mut pk_name = keys.pk_name;
        let mut sk_name = keys.sk_name;
        if pk_name.is_none() {
            if let Some(base) = self.bases.first() {
                pk_name = Some(base.pk_name.clone());
                if sk_name.is_none() {
                    sk_name = base.sk_name.clone();
                }
            }
        }
        let pk_name = pk_name.ok_or_else(|| {
            Error::Definition(format!(
                "Model {} must have exactly one field defined with a partition key marker",
                name
            ))
        })?;

        let is_base_entity = keys.discriminator.is_some();
        debug!(
            model = %name,
            table = %config.table_name,
            pk = %pk_name,
            indexes = keys.indexes.len(),
            "model schema resolved"
        );

        Ok(ModelSchema {
            model_name: name,
            table_name: config.table_name,
            pk_name,
            sk_name,
            region: config.region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            indexes: keys.indexes,
            discriminator_field: keys.discriminator,
            is_base_entity,
            parent: None,
            discriminator_value: None,
            field_defs: fields,
            bases: self.bases.iter().map(|b| b.model_name.clone()).collect(),
            registry: Arc::new(EntityRegistry::default()),
        })
    }
}

fn upsert(fields: &mut Vec<FieldDef>, field: FieldDef) {
    match fields.iter_mut().find(|f| f.name == field.name) {
        Some(slot) => *slot = field,
        None => fields.push(field),
    }
}

struct DiscoveredKeys {
    pk_name: Option<String>,
    sk_name: Option<String>,
    discriminator: Option<String>,
    indexes: BTreeMap<String, IndexDefinition>,
}

fn scan_markers(model: &str, fields: &[FieldDef]) -> Result<DiscoveredKeys> {
    fn only_one(model: &str, what: &str, found: &[&FieldDef]) -> Result<Option<String>> {
        match found {
            [] => Ok(None),
            [field] => Ok(Some(field.wire_name().to_string())),
            _ => Err(Error::Definition(format!(
                "Model {} can have only one field defined with a {} marker",
                model, what
            ))),
        }
    }

    let with = |marker: KeyMarker| fields.iter().filter(|f| f.has(&marker)).collect::<Vec<_>>();
    let pk_name = only_one(model, "partition key", &with(KeyMarker::PartitionKey))?;
    let sk_name = only_one(model, "sort key", &with(KeyMarker::SortKey))?;
    let discriminator = only_one(model, "discriminator", &with(KeyMarker::Discriminator))?;

    let mut index_pks: BTreeMap<String, String> = BTreeMap::new();
    let mut index_sks: BTreeMap<String, String> = BTreeMap::new();
    for field in fields {
        for marker in &field.markers {
            let (target, index, role) = match marker {
                KeyMarker::IndexPartitionKey(index) => (&mut index_pks, index, "partition key"),
                KeyMarker::IndexSortKey(index) => (&mut index_sks, index, "sort key"),
                _ => continue,
            };
            if target.insert(index.clone(), field.wire_name().to_string()).is_some() {
                return Err(Error::Definition(format!(
                    "GSI '{}' in model {} can have only one {}",
                    index, model, role
                )));
            }
        }
    }

    let mut indexes = BTreeMap::new();
    for (index, sk) in &index_sks {
        if !index_pks.contains_key(index) {
            return Err(Error::Definition(format!(
                "GSI '{}' in model {} must have a partition key (sort key '{}' has none)",
                index, model, sk
            )));
        }
    }
    for (index, pk) in index_pks {
        let sk = index_sks.remove(&index);
        indexes.insert(index.clone(), IndexDefinition::new(&index, pk, sk));
    }

    Ok(DiscoveredKeys {
        pk_name,
        sk_name,
        discriminator,
        indexes,
    })
}

/// Resolved, immutable key layout of one model type.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    pub model_name: String,
    pub table_name: String,
    pub pk_name: String,
    pub sk_name: Option<String>,
    pub region: String,
    pub indexes: BTreeMap<String, IndexDefinition>,
    pub discriminator_field: Option<String>,
    pub is_base_entity: bool,
    /// Base schema of a registered subtype
    pub parent: Option<Arc<ModelSchema>>,
    pub discriminator_value: Option<String>,
    pub field_defs: Vec<FieldDef>,
    pub bases: Vec<String>,
    registry: Arc<EntityRegistry>,
}

impl ModelSchema {
    pub fn get_index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.get(name)
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Looks up an index, failing with the list of declared ones.
    pub fn require_index(&self, name: &str) -> Result<&IndexDefinition> {
        self.indexes.get(name).ok_or_else(|| {
            let available = self
                .indexes
                .keys()
                .map(|k| format!("'{}'", k))
                .collect::<Vec<_>>()
                .join(", ");
            Error::InvalidArgument(format!(
                "GSI '{}' is not defined on model {}. Available GSIs: [{}]",
                name, self.model_name, available
            ))
        })
    }

    /// Partition and sort key names of the table or of one of its indexes.
    pub fn key_names(&self, index: Option<&str>) -> Result<(String, Option<String>)> {
        match index {
            None => Ok((self.pk_name.clone(), self.sk_name.clone())),
            Some(name) => {
                let index = self.require_index(name)?;
                Ok((index.pk_name.clone(), index.sk_name.clone()))
            }
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        self.discriminator_field.is_some()
    }

    /// Discriminator value for registered subtypes, the model name otherwise.
    pub fn entity_type_name(&self) -> &str {
        self.discriminator_value.as_deref().unwrap_or(&self.model_name)
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.field_defs.iter().find(|f| f.name == name)
    }

    pub fn field_by_wire_name(&self, wire_name: &str) -> Option<&FieldDef> {
        self.field_defs.iter().find(|f| f.wire_name() == wire_name)
    }

    /// Attribute reference for a declared field, by field name or wire name.
    pub fn attr(&self, field: &str) -> Result<Attr> {
        self.field(field)
            .or_else(|| self.field_by_wire_name(field))
            .map(|f| Attr::new(f.wire_name()))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("Model {} has no field '{}'", self.model_name, field))
            })
    }

    /// Attribute references for every declared field, keyed by field name.
    pub fn fields(&self) -> BTreeMap<String, Attr> {
        self.field_defs
            .iter()
            .map(|f| (f.name.clone(), Attr::new(f.wire_name())))
            .collect()
    }

    /// Fills declared defaults into absent or null attributes of a wire-named document.
    pub fn apply_defaults(&self, doc: &mut Document) {
        for field in &self.field_defs {
            if let Some(default) = &field.default {
                let slot = doc.entry(field.wire_name().to_string()).or_insert(Value::Null);
                if slot.is_null() {
                    *slot = default.clone();
                }
            }
        }
    }

    /// Opens registration of a subtype under `value`.
    pub fn register(self: &Arc<Self>, value: impl Into<String>) -> Result<Registrar> {
        if self.discriminator_field.is_none() || !self.is_base_entity {
            return Err(Error::Definition(format!(
                "Model {} has no discriminator field and cannot register subtypes",
                self.model_name
            )));
        }
        Ok(Registrar {
            base: Arc::clone(self),
            value: value.into(),
        })
    }

    /// Builds an instance from a read document.
    ///
    /// On a polymorphic base the discriminator picks the registered decoder;
    /// anything else, including unknown discriminator values, goes to `fallback`.
    pub fn resolve<M: 'static>(
        &self,
        doc: Document,
        fallback: impl FnOnce(Document) -> Result<M>,
    ) -> Result<M> {
        if self.is_base_entity {
            let decoder = self
                .discriminator_field
                .as_ref()
                .and_then(|field| doc.get(field))
                .and_then(Value::as_str)
                .and_then(|value| self.registry.decoder::<M>(value));
            if let Some(decoder) = decoder {
                return decoder(doc);
            }
        }
        fallback(doc)
    }
}

/// Pending registration of a subtype under a discriminator value.
#[derive(Debug)]
pub struct Registrar {
    base: Arc<ModelSchema>,
    value: String,
}

impl Registrar {
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Records the subtype and derives its schema from the base.
    ///
    /// The subtype keeps the base table, keys and indexes, shares its registry,
    /// and defaults the discriminator field to the registered value.
    pub fn finalize<B: 'static>(self, definition: ModelDefinition, decoder: Decoder<B>) -> Result<ModelSchema> {
        let base = self.base;
        if !definition.bases.iter().any(|b| Arc::ptr_eq(b, &base)) {
            return Err(Error::Definition(format!(
                "Model {} must extend {} to be registered under it",
                definition.name, base.model_name
            )));
        }

        base.registry.insert(&self.value, &definition.name, decoder)?;

        let mut fields = definition.merged_fields();
        if let Some(disc) = &base.discriminator_field {
            if let Some(field) = fields.iter_mut().find(|f| f.wire_name() == disc.as_str()) {
                field.default = Some(Value::Str(self.value.clone()));
            }
        }
        debug!(model = %definition.name, base = %base.model_name, value = %self.value, "subtype registered");

        Ok(ModelSchema {
            model_name: definition.name,
            table_name: base.table_name.clone(),
            pk_name: base.pk_name.clone(),
            sk_name: base.sk_name.clone(),
            region: base.region.clone(),
            indexes: base.indexes.clone(),
            discriminator_field: base.discriminator_field.clone(),
            is_base_entity: false,
            parent: Some(Arc::clone(&base)),
            discriminator_value: Some(self.value),
            field_defs: fields,
            bases: definition.bases.iter().map(|b| b.model_name.clone()).collect(),
            registry: Arc::clone(&base.registry),
        })
    }
}

/// Lazily built, cached schema for one model type.
///
/// A failed build is cached too; every later access reports the same error.
pub struct SchemaCell {
    cell: OnceCell<std::result::Result<Arc<ModelSchema>, String>>,
}

impl SchemaCell {
    pub const fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> Result<ModelSchema>) -> Result<Arc<ModelSchema>> {
        self.cell
            .get_or_init(|| init().map(Arc::new).map_err(|e| e.to_string()))
            .clone()
            .map_err(Error::Definition)
    }
}

impl Default for SchemaCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DocumentExt;

    fn user_definition() -> ModelDefinition {
        ModelDefinition::new("User")
            .config(TableConfig::new("users"))
            .field(FieldDef::new("email", FieldType::Str).primary_key())
            .field(FieldDef::new("name", FieldType::Str))
            .field(FieldDef::new("org", FieldType::Str).gsi_partition_key("by_org"))
            .field(FieldDef::new("created", FieldType::DateTime).gsi_sort_key("by_org"))
    }

    fn animal_schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelDefinition::new("Animal")
                .config(TableConfig::new("animals").with_region("eu-west-1"))
                .field(FieldDef::new("id", FieldType::Str).primary_key())
                .field(FieldDef::new("kind", FieldType::Str).alias("type").discriminator())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_build_discovers_keys() {
        let schema = user_definition().build().unwrap();
        assert_eq!(schema.table_name, "users");
        assert_eq!(schema.pk_name, "email");
        assert_eq!(schema.sk_name, None);
        assert_eq!(schema.region, DEFAULT_REGION);
        assert!(!schema.is_base_entity);

        let index = schema.get_index("by_org").unwrap();
        assert_eq!(index.pk_name, "org");
        assert_eq!(index.sk_name.as_deref(), Some("created"));
        assert_eq!(index.projection, "ALL");
    }

    #[test]
    fn test_missing_config() {
        let err = ModelDefinition::new("Orphan")
            .field(FieldDef::new("id", FieldType::Str).primary_key())
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model Orphan is missing a table configuration with 'table_name'."
        );

        let err = ModelDefinition::new("Blank")
            .config(TableConfig::new(""))
            .field(FieldDef::new("id", FieldType::Str).primary_key())
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Model Blank is missing a 'table_name' in its table configuration.");
    }

    #[test]
    fn test_missing_and_duplicate_keys() {
        let err = ModelDefinition::new("NoKey")
            .config(TableConfig::new("t"))
            .field(FieldDef::new("a", FieldType::Str))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Definition(ref m) if m.contains("NoKey") && m.contains("partition key")));

        let err = ModelDefinition::new("TwoSort")
            .config(TableConfig::new("t"))
            .field(FieldDef::new("a", FieldType::Str).primary_key())
            .field(FieldDef::new("b", FieldType::Str).sort_key())
            .field(FieldDef::new("c", FieldType::Str).sort_key())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("TwoSort can have only one field defined with a sort key"));
    }

    #[test]
    fn test_index_errors() {
        let err = ModelDefinition::new("M")
            .config(TableConfig::new("t"))
            .field(FieldDef::new("a", FieldType::Str).primary_key())
            .field(FieldDef::new("b", FieldType::Str).gsi_sort_key("idx"))
            .build()
            .unwrap_err();
        assert!(err.to_string().starts_with("GSI 'idx' in model M must have a partition key"));

        let err = ModelDefinition::new("M")
            .config(TableConfig::new("t"))
            .field(FieldDef::new("a", FieldType::Str).primary_key().gsi_partition_key("idx"))
            .field(FieldDef::new("b", FieldType::Str).gsi_partition_key("idx"))
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "GSI 'idx' in model M can have only one partition key");
    }

    #[test]
    fn test_alias_is_the_key_name() {
        let schema = animal_schema();
        assert_eq!(schema.discriminator_field.as_deref(), Some("type"));
        assert!(schema.is_base_entity);
        assert_eq!(schema.attr("kind").unwrap().name(), "type");
        assert_eq!(schema.fields()["kind"].name(), "type");
        assert!(schema.attr("nope").is_err());
    }

    #[test]
    fn test_inherits_keys_and_config_from_base() {
        let base = Arc::new(user_definition().build().unwrap());
        let admin = ModelDefinition::new("Admin")
            .extends(&base)
            .field(FieldDef::new("level", FieldType::Int))
            .build()
            .unwrap();
        assert_eq!(admin.table_name, "users");
        assert_eq!(admin.pk_name, "email");
        assert!(admin.has_index("by_org"));
        assert_eq!(admin.bases, vec!["User".to_string()]);
        assert!(admin.field("level").is_some());
    }

    #[test]
    fn test_unknown_index_lists_available() {
        let schema = user_definition().build().unwrap();
        let err = schema.require_index("by_name").unwrap_err();
        assert_eq!(
            err.to_string(),
            "GSI 'by_name' is not defined on model User. Available GSIs: ['by_org']"
        );
    }

    #[derive(Debug, PartialEq)]
    enum Animal {
        Plain(String),
        Dog(String),
    }

    fn dog_definition(base: &Arc<ModelSchema>) -> ModelDefinition {
        ModelDefinition::new("Dog")
            .extends(base)
            .field(FieldDef::new("breed", FieldType::Str))
    }

    #[test]
    fn test_register_and_resolve() {
        let base = animal_schema();
        let decoder: Decoder<Animal> =
            Arc::new(|mut doc: Document| -> Result<Animal> { Ok(Animal::Dog(doc.take("id")?)) });
        let dog = base.register("dog").unwrap().finalize(dog_definition(&base), decoder).unwrap();

        assert!(!dog.is_base_entity);
        assert_eq!(dog.discriminator_value.as_deref(), Some("dog"));
        assert_eq!(dog.entity_type_name(), "dog");
        assert_eq!(dog.table_name, "animals");
        assert_eq!(dog.region, "eu-west-1");
        assert!(Arc::ptr_eq(dog.registry(), base.registry()));
        assert_eq!(base.registry().type_name("dog").as_deref(), Some("Dog"));

        let mut defaults = Document::new();
        dog.apply_defaults(&mut defaults);
        assert_eq!(defaults.get("type"), Some(&Value::from("dog")));

        let fallback = |mut doc: Document| -> Result<Animal> { Ok(Animal::Plain(doc.take("id")?)) };

        let mut doc = Document::new();
        doc.put("id", "a1");
        doc.put("type", "dog");
        assert_eq!(base.resolve(doc, fallback).unwrap(), Animal::Dog("a1".into()));

        let mut doc = Document::new();
        doc.put("id", "a2");
        doc.put("type", "unicorn");
        assert_eq!(base.resolve(doc, fallback).unwrap(), Animal::Plain("a2".into()));
    }

    #[test]
    fn test_duplicate_registration_names_owner() {
        let base = animal_schema();
        let decoder: Decoder<Animal> = Arc::new(|_: Document| -> Result<Animal> { Ok(Animal::Plain(String::new())) });
        base.register("dog")
            .unwrap()
            .finalize(dog_definition(&base), decoder.clone())
            .unwrap();

        let other = ModelDefinition::new("Wolf").extends(&base);
        let err = base.register("dog").unwrap().finalize(other, decoder).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Discriminator value 'dog' is already registered to Dog, cannot register Wolf"
        );
    }

    #[test]
    fn test_register_requires_discriminator_and_inheritance() {
        let users = Arc::new(user_definition().build().unwrap());
        assert!(matches!(users.register("x"), Err(Error::Definition(_))));

        let base = animal_schema();
        let decoder: Decoder<Animal> = Arc::new(|_: Document| -> Result<Animal> { Ok(Animal::Plain(String::new())) });
        let stray = ModelDefinition::new("Stray").config(TableConfig::new("animals"));
        assert!(base.register("stray").unwrap().finalize(stray, decoder).is_err());
        assert!(!base.registry().contains("stray"));
    }

    #[test]
    fn test_register_rejects_lookalike_base() {
        let base = animal_schema();
        let lookalike = animal_schema();
        let decoder: Decoder<Animal> = Arc::new(|_: Document| -> Result<Animal> { Ok(Animal::Plain(String::new())) });
        let definition = ModelDefinition::new("Impostor").extends(&lookalike);
        let err = base.register("impostor").unwrap().finalize(definition, decoder).unwrap_err();
        assert_eq!(err.to_string(), "Model Impostor must extend Animal to be registered under it");
        assert!(!base.registry().contains("impostor"));
    }

    #[test]
    fn test_schema_cell_caches_errors() {
        static CELL: SchemaCell = SchemaCell::new();
        let first = CELL.get_or_init(|| ModelDefinition::new("Broken").build());
        let second = CELL.get_or_init(|| user_definition().build());
        assert!(first.is_err());
        assert_eq!(first.unwrap_err().to_string(), second.unwrap_err().to_string());
    }
}
